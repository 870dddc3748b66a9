//! Streaming MIME tokenizer.
//!
//! [`MimeTokenizer`] walks a message line by line and reports its structure
//! to a [`PartHandler`]. It never fails: missing boundaries, unterminated
//! multiparts and broken headers are recovered silently.
//!
//! Nesting is tracked with an explicit stack of open parts. A boundary line is
//! matched against the open multiparts from the innermost outward, so an
//! ancestor's boundary closes every part opened below it.

mod handler;

pub use handler::{CollectingHandler, LoggingHandler, NoopHandler, PartEvent, PartHandler};

use crate::charset::{self, CharsetDecoder};
use crate::content_type::ContentType;
use crate::encoding::{BodyDecoder, TransferEncoding};
use crate::header::{Headers, split_header_block};

/// What the tokenizer passes to [`PartHandler::on_part_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    /// Deliver no body data at all.
    None,
    /// Deliver the body bytes exactly as they appear in the message.
    ///
    /// The part named by [`TokenizerOptions::prune_at`] is treated as a leaf
    /// even if it is a multipart, so its whole body is delivered.
    Raw,
    /// Deliver transfer-decoded bytes and, for `text/*` parts, decoded text.
    #[default]
    Decode,
}

/// Options for [`MimeTokenizer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizerOptions {
    /// Only report the part with this identifier and its descendants.
    ///
    /// `Some("")` is the whole message, like `None`.
    pub prune_at: Option<String>,
    /// What body data to deliver.
    pub body_format: BodyFormat,
    /// Charset for text parts without a `charset` parameter, and for header
    /// bytes that aren't UTF-8. Bodies default to UTF-8 and headers to
    /// windows-1252 when this is unset.
    pub default_charset: Option<String>,
}

/// Header information for [`PartHandler::on_start_part`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    /// Parsed `Content-Type`, `text/plain` if absent or invalid.
    pub content_type: ContentType,
    /// The header block as it appeared, line endings included.
    pub raw_header_text: String,
    /// Unfolded `(name, value)` pairs in declaration order, names as written.
    pub raw_headers: Vec<(String, String)>,
}

impl PartHeaders {
    /// The headers as a map keyed by lower-cased name.
    #[must_use]
    pub fn headers(&self) -> Headers {
        self.raw_headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    /// First value of a header, by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One chunk of body data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartData {
    /// Transfer-decoded bytes (raw bytes with [`BodyFormat::Raw`]).
    pub bytes: Vec<u8>,
    /// Charset-decoded text, for `text/*` parts with [`BodyFormat::Decode`].
    ///
    /// Some charsets only produce text on the final chunk, so a chunk can
    /// have text without bytes and the other way around.
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Reading the header block.
    Headers,
    /// Reading a leaf body.
    Leaf,
    /// Inside a multipart, between boundaries.
    Container,
    /// After a multipart's close delimiter.
    Epilogue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Open,
    Close,
}

/// An open part.
#[derive(Debug)]
struct Frame {
    id: String,
    state: State,
    header_bytes: Vec<u8>,
    /// `--boundary` for a multipart.
    delimiter: Option<Vec<u8>>,
    children: u32,
    body: BodyDecoder,
    text: Option<CharsetDecoder>,
    /// Line ending of the last body line, held back because it belongs to the
    /// next boundary if one follows.
    pending_eol: Vec<u8>,
    /// Inside the requested subtree.
    reported: bool,
}

impl Frame {
    fn new(id: String, options: &TokenizerOptions) -> Self {
        let reported = in_subtree(&id, options.prune_at.as_deref());
        Self {
            id,
            state: State::Headers,
            header_bytes: Vec::new(),
            delimiter: None,
            children: 0,
            body: BodyDecoder::Identity,
            text: None,
            pending_eol: Vec::new(),
            reported,
        }
    }

    fn child_id(&self) -> String {
        if self.id.is_empty() {
            self.children.to_string()
        } else {
            format!("{}.{}", self.id, self.children)
        }
    }
}

fn in_subtree(id: &str, prune_at: Option<&str>) -> bool {
    match prune_at {
        None | Some("") => true,
        Some(root) => {
            id == root
                || id
                    .strip_prefix(root)
                    .is_some_and(|rest| rest.starts_with('.'))
        }
    }
}

/// Incremental MIME tokenizer.
///
/// Feed the message with [`feed`](Self::feed) in chunks of any size, then call
/// [`finish`](Self::finish). Splitting the input differently never changes the
/// events, only how body data is chunked.
#[derive(Debug)]
pub struct MimeTokenizer<H: PartHandler> {
    handler: H,
    options: TokenizerOptions,
    stack: Vec<Frame>,
    /// Bytes of the current incomplete line.
    buffer: Vec<u8>,
}

impl<H: PartHandler> MimeTokenizer<H> {
    /// Creates a tokenizer and reports the start of the message.
    pub fn new(mut handler: H, options: TokenizerOptions) -> Self {
        handler.on_start_message();
        let root = Frame::new(String::new(), &options);
        Self {
            handler,
            options,
            stack: vec![root],
            buffer: Vec::new(),
        }
    }

    /// Processes the next chunk of input.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        let buffer = std::mem::take(&mut self.buffer);

        let mut start = 0;
        while let Some(offset) = buffer[start..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        {
            let end = start + offset;
            let eol_len = match (buffer[end], buffer.get(end + 1)) {
                (b'\r', Some(b'\n')) => 2,
                // Might be half of a CRLF split across chunks
                (b'\r', None) => break,
                _ => 1,
            };
            self.process_line(&buffer[start..end], &buffer[end..end + eol_len]);
            start = end + eol_len;
        }

        self.buffer = buffer[start..].to_vec();
    }

    /// Processes the end of input, closes every open part, and returns the
    /// handler.
    pub fn finish(mut self) -> H {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            match rest.split_last() {
                Some((b'\r', line)) => self.process_line(line, b"\r"),
                _ => self.process_line(&rest, b""),
            }
        }

        while let Some(frame) = self.stack.pop() {
            if frame.state == State::Container {
                tracing::debug!(part = %frame.id, "unterminated multipart closed at end of input");
            }
            self.close(frame, true);
        }

        self.handler.on_end_message();
        self.handler
    }

    /// Returns a reference to the handler.
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    fn process_line(&mut self, content: &[u8], eol: &[u8]) {
        if let Some((index, delimiter)) = self.match_boundary(content) {
            self.on_boundary(index, delimiter);
            return;
        }

        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        match frame.state {
            State::Headers if content.is_empty() => {
                end_headers(frame, &mut self.handler, &self.options);
            }
            State::Headers => {
                frame.header_bytes.extend_from_slice(content);
                frame.header_bytes.extend_from_slice(eol);
            }
            State::Leaf => body_line(frame, &mut self.handler, &self.options, content, eol),
            // Preamble and epilogue text is dropped
            State::Container | State::Epilogue => {}
        }
    }

    /// Finds the innermost open multipart whose boundary this line is.
    fn match_boundary(&self, line: &[u8]) -> Option<(usize, Delimiter)> {
        if !line.starts_with(b"--") {
            return None;
        }
        let line = trim_trailing_whitespace(line);

        self.stack.iter().enumerate().rev().find_map(|(index, frame)| {
            if frame.state != State::Container {
                return None;
            }
            let delimiter = frame.delimiter.as_deref()?;
            let rest = line.strip_prefix(delimiter)?;
            match rest {
                b"" => Some((index, Delimiter::Open)),
                b"--" => Some((index, Delimiter::Close)),
                _ => None,
            }
        })
    }

    fn on_boundary(&mut self, index: usize, delimiter: Delimiter) {
        while self.stack.len() > index + 1 {
            if let Some(frame) = self.stack.pop() {
                self.close(frame, false);
            }
        }

        let Some(parent) = self.stack.last_mut() else {
            return;
        };
        match delimiter {
            Delimiter::Open => {
                parent.children += 1;
                let child = Frame::new(parent.child_id(), &self.options);
                tracing::trace!(parent = %parent.id, part = %child.id, "boundary opens part");
                self.stack.push(child);
            }
            Delimiter::Close => {
                tracing::trace!(part = %parent.id, "close delimiter");
                parent.state = State::Epilogue;
            }
        }
    }

    fn close(&mut self, mut frame: Frame, at_eof: bool) {
        if frame.state == State::Headers {
            end_headers(&mut frame, &mut self.handler, &self.options);
        }

        if frame.state == State::Leaf && frame.reported && self.options.body_format != BodyFormat::None
        {
            // The line ending before a boundary belongs to the boundary
            let tail = if at_eof {
                std::mem::take(&mut frame.pending_eol)
            } else {
                Vec::new()
            };
            deliver(&mut frame, &mut self.handler, &tail, true);
        }

        if frame.reported {
            tracing::debug!(part = %frame.id, "end part");
            self.handler.on_end_part(&frame.id);
        }
    }
}

/// Tokenizes a complete message in one call.
pub fn parse<H: PartHandler>(input: &[u8], handler: H, options: TokenizerOptions) -> H {
    let mut tokenizer = MimeTokenizer::new(handler, options);
    tokenizer.feed(input);
    tokenizer.finish()
}

fn trim_trailing_whitespace(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(0, |i| i + 1);
    &line[..end]
}

fn header_text(bytes: &[u8], options: &TokenizerOptions) -> String {
    charset::convert_8bit(bytes, options.default_charset.as_deref())
        .or_else(|_| charset::convert_8bit(bytes, None))
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

/// Parses the collected header block, reports the part, and prepares the
/// body state.
fn end_headers<H: PartHandler>(frame: &mut Frame, handler: &mut H, options: &TokenizerOptions) {
    let raw_header_text = header_text(&std::mem::take(&mut frame.header_bytes), options);
    let raw_headers = split_header_block(&raw_header_text);
    let headers = PartHeaders {
        content_type: raw_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-type"))
            .map_or_else(ContentType::text_plain, |(_, v)| ContentType::parse(v)),
        raw_header_text,
        raw_headers,
    };

    let content_type = &headers.content_type;
    let raw_subtree = options.body_format == BodyFormat::Raw
        && options.prune_at.as_deref() == Some(frame.id.as_str());

    match content_type.boundary() {
        Some(boundary) if content_type.is_multipart() && !boundary.is_empty() && !raw_subtree => {
            let mut delimiter = b"--".to_vec();
            delimiter.extend_from_slice(boundary.as_bytes());
            frame.delimiter = Some(delimiter);
            frame.state = State::Container;
        }
        _ => {
            if content_type.is_multipart() && !raw_subtree {
                tracing::debug!(part = %frame.id, "multipart without boundary, treating as leaf");
            }
            frame.state = State::Leaf;
            if options.body_format == BodyFormat::Decode {
                let encoding = headers
                    .get("content-transfer-encoding")
                    .map(TransferEncoding::parse)
                    .unwrap_or_default();
                frame.body = BodyDecoder::new(encoding);
                if content_type.is_text() {
                    frame.text = Some(text_decoder(content_type, options));
                }
            }
        }
    }

    if frame.reported {
        tracing::debug!(part = %frame.id, content_type = %content_type.mime_type(), "start part");
        handler.on_start_part(&frame.id, &headers);
    }
}

fn text_decoder(content_type: &ContentType, options: &TokenizerOptions) -> CharsetDecoder {
    let label = content_type
        .charset()
        .or(options.default_charset.as_deref())
        .unwrap_or("utf-8");
    charset::make_decoder(label).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "falling back to UTF-8 for part body");
        CharsetDecoder::Standard(encoding_rs::UTF_8.new_decoder_without_bom_handling())
    })
}

fn body_line<H: PartHandler>(
    frame: &mut Frame,
    handler: &mut H,
    options: &TokenizerOptions,
    content: &[u8],
    eol: &[u8],
) {
    if !frame.reported || options.body_format == BodyFormat::None {
        return;
    }
    let mut raw = std::mem::replace(&mut frame.pending_eol, eol.to_vec());
    raw.extend_from_slice(content);
    deliver(frame, handler, &raw, false);
}

fn deliver<H: PartHandler>(frame: &mut Frame, handler: &mut H, raw: &[u8], last: bool) {
    let mut bytes = frame.body.feed(raw);
    if last {
        bytes.extend(frame.body.finish());
    }
    let text = frame.text.as_mut().map(|decoder| decoder.decode(&bytes, last));

    if bytes.is_empty() && text.as_deref().is_none_or(str::is_empty) {
        return;
    }
    handler.on_part_data(&frame.id, PartData { bytes, text });
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn collect(input: &[u8], options: TokenizerOptions) -> CollectingHandler {
        parse(input, CollectingHandler::new(), options)
    }

    const NESTED: &[u8] = b"Content-Type: multipart/mixed; boundary=outer\r\n\
\r\n\
preamble\r\n\
--outer\r\n\
Content-Type: text/plain\r\n\
\r\n\
first\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
\r\n\
plain\r\n\
--inner\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html</p>\r\n\
--inner--\r\n\
--outer--\r\n\
epilogue\r\n";

    #[test]
    fn test_single_part() {
        let handler = collect(b"Subject: Hi\r\n\r\nHello\r\nWorld\r\n", TokenizerOptions::default());
        assert_eq!(handler.part_ids(), vec![""]);
        assert_eq!(handler.text(""), "Hello\r\nWorld\r\n");
        assert_eq!(handler.events.first(), Some(&PartEvent::StartMessage));
        assert_eq!(handler.events.last(), Some(&PartEvent::EndMessage));
    }

    #[test]
    fn test_part_identifiers() {
        let handler = collect(NESTED, TokenizerOptions::default());
        assert_eq!(handler.part_ids(), vec!["", "1", "2", "2.1", "2.2"]);
        assert_eq!(handler.text("1"), "first");
        assert_eq!(handler.text("2.1"), "plain");
        assert_eq!(handler.text("2.2"), "<p>html</p>");
        // containers get no data
        assert!(handler.bytes("").is_empty());
        assert!(handler.bytes("2").is_empty());
    }

    #[test]
    fn test_events_are_balanced() {
        let handler = collect(NESTED, TokenizerOptions::default());
        let mut open: Vec<String> = Vec::new();
        for event in &handler.events {
            match event {
                PartEvent::StartPart { part, .. } => open.push(part.clone()),
                PartEvent::Data { part, .. } => assert_eq!(open.last(), Some(part)),
                PartEvent::EndPart(part) => assert_eq!(open.pop().as_ref(), Some(part)),
                PartEvent::StartMessage | PartEvent::EndMessage => {}
            }
        }
        assert!(open.is_empty());
    }

    #[test]
    fn test_outer_boundary_closes_inner_parts() {
        let input = b"Content-Type: multipart/mixed; boundary=a\n\n\
--a\n\
Content-Type: multipart/related; boundary=b\n\n\
--b\n\n\
inner\n\
--a\n\n\
second\n\
--a--\n";
        let handler = collect(input, TokenizerOptions::default());
        assert_eq!(handler.part_ids(), vec!["", "1", "1.1", "2"]);
        assert_eq!(handler.text("1.1"), "inner");
        assert_eq!(handler.text("2"), "second");
    }

    #[test]
    fn test_unterminated_multipart() {
        let input = b"Content-Type: multipart/mixed; boundary=x\r\n\r\n--x\r\n\r\nlast part\r\n";
        let handler = collect(input, TokenizerOptions::default());
        assert_eq!(handler.part_ids(), vec!["", "1"]);
        assert_eq!(handler.text("1"), "last part\r\n");
        let ends = handler
            .events
            .iter()
            .filter(|e| matches!(e, PartEvent::EndPart(_)))
            .count();
        assert_eq!(ends, 2);
    }

    #[test]
    fn test_missing_content_type_is_text_plain() {
        let handler = collect(b"From: a@b.c\n\nbody", TokenizerOptions::default());
        let PartEvent::StartPart { headers, .. } = &handler.events[1] else {
            panic!("expected start part");
        };
        assert_eq!(headers.content_type.mime_type(), "text/plain");
        assert_eq!(headers.raw_headers, vec![("From".to_string(), "a@b.c".to_string())]);
        assert_eq!(handler.text(""), "body");
    }

    #[test]
    fn test_no_body_means_no_data() {
        let handler = collect(b"Subject: empty\r\n\r\n", TokenizerOptions::default());
        assert!(!handler.events.iter().any(|e| matches!(e, PartEvent::Data { .. })));
    }

    #[test]
    fn test_transfer_and_charset_decoding() {
        let input = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=E9 cr=\r\n\
=E8me\r\n";
        let handler = collect(input, TokenizerOptions::default());
        assert_eq!(handler.text(""), "café crème\r\n");
        assert_eq!(handler.bytes(""), b"caf\xe9 cr\xe8me\r\n");
    }

    #[test]
    fn test_binary_part_has_no_text() {
        let input = b"Content-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AQID\r\n";
        let handler = collect(input, TokenizerOptions::default());
        assert_eq!(handler.bytes(""), [1, 2, 3]);
        assert!(handler.events.iter().all(|e| match e {
            PartEvent::Data { data, .. } => data.text.is_none(),
            _ => true,
        }));
    }

    #[test]
    fn test_utf7_text_arrives_on_final_chunk() {
        let input = b"Content-Type: text/plain; charset=utf-7\r\n\r\nHi Mom -+Jjo--!\r\n";
        let handler = collect(input, TokenizerOptions::default());
        assert_eq!(handler.text(""), "Hi Mom -\u{263A}-!\r\n");
    }

    #[test]
    fn test_unknown_charset_falls_back() {
        let input = b"Content-Type: text/plain; charset=x-unknown\r\n\r\nplain ascii";
        let handler = collect(input, TokenizerOptions::default());
        assert_eq!(handler.text(""), "plain ascii");
    }

    #[test]
    fn test_prune_at() {
        let options = TokenizerOptions {
            prune_at: Some("2".to_string()),
            ..TokenizerOptions::default()
        };
        let handler = collect(NESTED, options);
        assert_eq!(handler.part_ids(), vec!["2", "2.1", "2.2"]);
        assert!(handler.bytes("1").is_empty());
    }

    #[test]
    fn test_body_format_none() {
        let options = TokenizerOptions {
            body_format: BodyFormat::None,
            ..TokenizerOptions::default()
        };
        let handler = collect(NESTED, options);
        assert_eq!(handler.part_ids().len(), 5);
        assert!(!handler.events.iter().any(|e| matches!(e, PartEvent::Data { .. })));
    }

    #[test]
    fn test_raw_subtree() {
        let options = TokenizerOptions {
            prune_at: Some(String::new()),
            body_format: BodyFormat::Raw,
            ..TokenizerOptions::default()
        };
        let handler = collect(NESTED, options);
        assert_eq!(handler.part_ids(), vec![""]);
        let body = handler.bytes("");
        assert!(body.starts_with(b"preamble\r\n--outer\r\n"));
        assert!(body.ends_with(b"--outer--\r\nepilogue\r\n"));
    }

    #[test]
    fn test_bare_cr_and_lf_line_endings() {
        let cr = collect(b"Subject: x\r\rone\rtwo", TokenizerOptions::default());
        assert_eq!(cr.text(""), "one\rtwo");
        let lf = collect(b"Subject: x\n\none\ntwo", TokenizerOptions::default());
        assert_eq!(lf.text(""), "one\ntwo");
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut tokenizer = MimeTokenizer::new(CollectingHandler::new(), TokenizerOptions::default());
        tokenizer.feed(b"Content-Type: multipart/mixed; boundary=b\r");
        tokenizer.feed(b"\n\r");
        tokenizer.feed(b"\n--b\r");
        tokenizer.feed(b"\n\r\nx\r");
        tokenizer.feed(b"\n--b--\r\n");
        let handler = tokenizer.finish();
        assert_eq!(handler.part_ids(), vec!["", "1"]);
        assert_eq!(handler.text("1"), "x");
    }

    #[test]
    fn test_8bit_headers() {
        let handler = collect(b"Subject: caf\xe9\r\n\r\n", TokenizerOptions::default());
        let PartEvent::StartPart { headers, .. } = &handler.events[1] else {
            panic!("expected start part");
        };
        assert_eq!(headers.get("subject"), Some("café"));
    }

    #[test]
    fn test_boundary_with_trailing_whitespace() {
        let input = b"Content-Type: multipart/mixed; boundary=\"b\"\n\n--b \t\n\nx\n--b--  \n";
        let handler = collect(input, TokenizerOptions::default());
        assert_eq!(handler.part_ids(), vec!["", "1"]);
        assert_eq!(handler.text("1"), "x");
    }
}
