//! Builds a part tree from tokenizer events.
//!
//! [`TreeBuilder`] is a [`PartHandler`] that assembles the parts into a tree,
//! sorts every leaf into body text, body HTML, attachment, or nothing, and
//! keeps running sizes. Part names carry a leading `1` for the message
//! itself, so the tokenizer's `""`, `"2"`, `"2.1"` become `"1"`, `"1.2"`,
//! `"1.2.1"`.

use crate::header::{Headers, get_parameter};
use crate::options::ParseOptions;
use crate::tokenizer::{PartData, PartHandler, PartHeaders};

/// What a part turned out to be once it was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PartKind {
    /// A multipart, or the synthetic message root.
    #[default]
    Container,
    /// Collected as an attachment.
    Attachment,
    /// Part of the plain text body.
    BodyText,
    /// Part of the HTML body.
    BodyHtml,
    /// Inline but unused (`text/enriched`, or empty).
    Discarded,
}

/// One node of the part tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Part {
    /// Dot-separated name, `"1"` for the top-level part, `""` for the root.
    pub name: String,
    /// `type/subtype`, lower-cased.
    pub content_type: String,
    /// Headers by lower-cased name.
    ///
    /// The top-level part keeps only its `content-*` headers; the rest belong
    /// to the root. `content-disposition` and `content-transfer-encoding` are
    /// removed once the part is classified.
    pub headers: Headers,
    /// The header block as it appeared.
    pub raw_header_text: String,
    /// Decoded text, for `text/*` parts.
    pub body: String,
    /// Transfer-decoded bytes.
    ///
    /// Kept only while the part is open, for attachments, and in single-part
    /// extractions.
    pub bytes: Vec<u8>,
    /// Own decoded length plus the sizes of all children.
    pub size: usize,
    /// Child parts in document order.
    pub parts: Vec<Part>,
    /// Classification.
    pub kind: PartKind,
    /// Attachment file name, empty if none was given.
    pub file_name: Option<String>,
    /// Attachment disposition token, parameters stripped.
    pub content_disposition: Option<String>,
    /// Attachment `Content-ID`.
    pub content_id: Option<String>,
}

impl Part {
    fn root() -> Self {
        Self {
            content_type: "message/rfc822".to_string(),
            ..Self::default()
        }
    }

    /// Returns `true` for `multipart/*` parts.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type.starts_with("multipart/")
    }

    /// Finds a descendant (or this part) by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Self> {
        if self.name == name {
            return Some(self);
        }
        self.parts.iter().find_map(|part| part.find(name))
    }

    /// Iterates over this part and all descendants in document order.
    pub fn walk(&self) -> impl Iterator<Item = &Self> {
        let mut pending = vec![self];
        std::iter::from_fn(move || {
            let part = pending.pop()?;
            pending.extend(part.parts.iter().rev());
            Some(part)
        })
    }
}

/// An attachment with its content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Attachment {
    /// Name of the part it came from.
    pub part_name: String,
    /// `type/subtype`, lower-cased.
    pub content_type: String,
    /// File name from the disposition, else the content type `name`, else
    /// empty.
    pub file_name: String,
    /// Disposition token (`attachment`, `inline`), if the header was present.
    pub content_disposition: Option<String>,
    /// `Content-ID`, if present.
    pub content_id: Option<String>,
    /// The part's headers after classification.
    pub headers: Headers,
    /// Decoded size in bytes.
    pub size: usize,
    /// Transfer-decoded content.
    pub content: Vec<u8>,
}

/// Bodies of the inline text parts, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BodyParts {
    /// Every non-empty inline `text/plain` body.
    pub text: Vec<String>,
    /// Every non-empty inline `text/html` body.
    pub html: Vec<String>,
}

/// A whole parsed message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MimeTree {
    /// Synthetic root holding the message headers; its only child is `"1"`.
    pub root: Part,
    /// Attachments in document order.
    pub attachments: Vec<Attachment>,
    /// Inline bodies.
    pub body_parts: BodyParts,
}

impl MimeTree {
    /// The message headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }
}

/// Result of [`extract_mime_msg`](crate::extract_mime_msg).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Extraction {
    /// The whole message.
    Tree(MimeTree),
    /// The single part asked for with `mime_part`, bytes included.
    Part(Part),
}

/// Tokenizer consumer that builds a [`MimeTree`].
#[derive(Debug)]
pub struct TreeBuilder {
    include_attachments: bool,
    mime_part: Option<String>,
    /// Open parts; the root is at the bottom.
    stack: Vec<Part>,
    attachments: Vec<Attachment>,
    body_parts: BodyParts,
    result: Option<Extraction>,
}

impl TreeBuilder {
    /// Creates a builder for the given options.
    #[must_use]
    pub fn new(options: &ParseOptions) -> Self {
        Self {
            include_attachments: options.include_attachments,
            mime_part: options.mime_part.clone(),
            stack: vec![Part::root()],
            attachments: Vec::new(),
            body_parts: BodyParts::default(),
            result: None,
        }
    }

    /// Takes the result after `end_message`.
    ///
    /// `None` if the message had no parts, or the requested part wasn't
    /// found.
    #[must_use]
    pub fn into_result(self) -> Option<Extraction> {
        self.result
    }

    const fn single_part(&self) -> bool {
        self.mime_part.is_some()
    }

    fn classify(&mut self, part: &mut Part) {
        let own = part.bytes.len();
        part.size += own;

        if is_attachment(part) {
            part.kind = PartKind::Attachment;
            part.file_name = Some(attachment_name(&part.headers));
            part.content_disposition = part
                .headers
                .get("content-disposition")
                .map(|d| d.split(';').next().unwrap_or_default().trim().to_string());
            part.content_id = part.headers.get("content-id").map(str::to_string);
            // Attachments keep bytes only
            part.body.clear();

            if self.include_attachments {
                let content = if self.single_part() {
                    part.bytes.clone()
                } else {
                    std::mem::take(&mut part.bytes)
                };
                let mut headers = part.headers.clone();
                prune_headers(&mut headers);
                self.attachments.push(Attachment {
                    part_name: part.name.clone(),
                    content_type: part.content_type.clone(),
                    file_name: part.file_name.clone().unwrap_or_default(),
                    content_disposition: part.content_disposition.clone(),
                    content_id: part.content_id.clone(),
                    headers,
                    size: own,
                    content,
                });
            } else {
                part.bytes = Vec::new();
            }
        } else if part.is_multipart() && !has_boundary(&part.headers) {
            // The tokenizer read it as a leaf
            tracing::debug!(part = %part.name, "discarding multipart without boundary");
            part.kind = PartKind::Discarded;
            part.body.clear();
            if !self.single_part() {
                part.bytes = Vec::new();
            }
        } else if !part.is_multipart() {
            if !self.single_part() {
                part.bytes = Vec::new();
            }
            part.kind = match part.content_type.as_str() {
                _ if part.body.is_empty() => PartKind::Discarded,
                "text/html" => {
                    self.body_parts.html.push(part.body.clone());
                    PartKind::BodyHtml
                }
                "text/plain" => {
                    self.body_parts.text.push(part.body.clone());
                    PartKind::BodyText
                }
                _ => PartKind::Discarded,
            };
        }

        prune_headers(&mut part.headers);
    }
}

/// Attachment iff not a multipart and either marked as an attachment or not
/// one of the inline text types.
fn is_attachment(part: &Part) -> bool {
    if part.is_multipart() {
        return false;
    }
    let disposition = part.headers.get("content-disposition").unwrap_or_default();
    let marked = disposition
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("attachment"));
    let inline_text = ["text/plain", "text/html", "text/enriched"].contains(&part.content_type.as_str());
    marked || !inline_text
}

fn has_boundary(headers: &Headers) -> bool {
    headers
        .get("content-type")
        .is_some_and(|value| !get_parameter(value, "boundary").is_empty())
}

fn attachment_name(headers: &Headers) -> String {
    let from = |header: &str, param: &str| {
        headers
            .get(header)
            .map(|value| get_parameter(value, param))
            .filter(|name| !name.is_empty())
    };
    from("content-disposition", "filename")
        .or_else(|| from("content-type", "name"))
        .unwrap_or_default()
}

fn prune_headers(headers: &mut Headers) {
    headers.retain(|name| name != "content-disposition" && name != "content-transfer-encoding");
}

/// Keeps the `content-*` fields of a raw header block.
fn content_header_lines(raw: &str) -> String {
    let mut fields: Vec<String> = Vec::new();
    for line in raw.split_inclusive('\n') {
        match fields.last_mut() {
            Some(field) if line.starts_with([' ', '\t']) => field.push_str(line),
            _ => fields.push(line.to_string()),
        }
    }
    fields
        .iter()
        .filter(|field| {
            field
                .get(..8)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("content-"))
        })
        .map(String::as_str)
        .collect::<String>()
        .trim()
        .to_string()
}

impl PartHandler for TreeBuilder {
    fn on_start_message(&mut self) {
        self.stack = vec![Part::root()];
        self.attachments.clear();
        self.body_parts = BodyParts::default();
        self.result = None;
    }

    fn on_start_part(&mut self, part: &str, headers: &PartHeaders) {
        let name = if part.is_empty() {
            "1".to_string()
        } else {
            format!("1.{part}")
        };
        let mut header_map = headers.headers();
        let mut raw_header_text = headers.raw_header_text.clone();

        if name == "1" {
            if let Some(root) = self.stack.first_mut() {
                root.raw_header_text = std::mem::take(&mut raw_header_text);
                root.headers = header_map.clone();
                raw_header_text = content_header_lines(&root.raw_header_text);
            }
            header_map.retain(|name| name.starts_with("content-"));
        }

        if !header_map.contains("content-type") {
            header_map.add("content-type", "text/plain");
        }

        self.stack.push(Part {
            name,
            content_type: headers.content_type.mime_type(),
            headers: header_map,
            raw_header_text,
            ..Part::default()
        });
    }

    fn on_part_data(&mut self, _part: &str, data: PartData) {
        let Some(current) = self.stack.last_mut() else {
            return;
        };
        current.bytes.extend_from_slice(&data.bytes);
        if let Some(text) = data.text {
            current.body.push_str(&text);
        }
    }

    fn on_end_part(&mut self, part: &str) {
        if self.stack.len() < 2 {
            tracing::warn!(part, "end of a part that was never started");
            return;
        }
        let Some(mut current) = self.stack.pop() else {
            return;
        };
        self.classify(&mut current);
        tracing::trace!(part = %current.name, kind = ?current.kind, size = current.size, "part closed");

        if let Some(parent) = self.stack.last_mut() {
            parent.size += current.size;
            parent.parts.push(current);
        }
    }

    fn on_end_message(&mut self) {
        let Some(root) = self.stack.drain(..).next() else {
            return;
        };
        if root.parts.is_empty() {
            return;
        }

        self.result = match self.mime_part.as_deref() {
            Some(wanted) => root
                .parts
                .into_iter()
                .next()
                .filter(|part| part.name == wanted)
                .map(Extraction::Part),
            None => Some(Extraction::Tree(MimeTree {
                root,
                attachments: std::mem::take(&mut self.attachments),
                body_parts: std::mem::take(&mut self.body_parts),
            })),
        };
    }
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
    use crate::tokenizer::{self, TokenizerOptions};

    fn build(input: &[u8], options: &ParseOptions) -> Option<Extraction> {
        let builder = tokenizer::parse(input, TreeBuilder::new(options), options.tokenizer_options());
        builder.into_result()
    }

    fn tree(input: &[u8]) -> MimeTree {
        match build(input, &ParseOptions::default()) {
            Some(Extraction::Tree(tree)) => tree,
            other => panic!("expected a tree, got {other:?}"),
        }
    }

    const MIXED: &[u8] = b"From: a@x.test\r\n\
Subject: test\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello\r\n\
--b\r\n\
Content-Type: image/png; name=\"x.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-ID: <img1@x.test>\r\n\
\r\n\
AQID\r\n\
--b--\r\n";

    #[test]
    fn test_root_absorbs_message_headers() {
        let tree = tree(MIXED);
        assert_eq!(tree.root.name, "");
        assert_eq!(tree.root.content_type, "message/rfc822");
        assert_eq!(tree.headers().get("subject"), Some("test"));
        assert!(tree.root.raw_header_text.starts_with("From: a@x.test\r\n"));

        let top = &tree.root.parts[0];
        assert_eq!(top.name, "1");
        assert!(top.headers.get("subject").is_none());
        assert_eq!(top.headers.get("content-type"), Some("multipart/mixed; boundary=\"b\""));
        assert_eq!(top.raw_header_text, "Content-Type: multipart/mixed; boundary=\"b\"");
    }

    #[test]
    fn test_classification_and_names() {
        let tree = tree(MIXED);
        let names: Vec<&str> = tree.root.walk().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["", "1", "1.1", "1.2"]);

        assert_eq!(tree.root.find("1.1").unwrap().kind, PartKind::BodyText);
        assert_eq!(tree.root.find("1.2").unwrap().kind, PartKind::Attachment);
        assert_eq!(tree.root.find("1").unwrap().kind, PartKind::Container);
        assert_eq!(tree.body_parts.text, vec!["hello".to_string()]);

        let attachment = &tree.attachments[0];
        assert_eq!(attachment.part_name, "1.2");
        assert_eq!(attachment.file_name, "x.png");
        assert_eq!(attachment.content, [1, 2, 3]);
        assert_eq!(attachment.content_id.as_deref(), Some("<img1@x.test>"));
        assert_eq!(attachment.content_disposition, None);
        assert!(!attachment.headers.contains("content-transfer-encoding"));
    }

    #[test]
    fn test_sizes_add_up() {
        let tree = tree(MIXED);
        for part in tree.root.walk() {
            let children: usize = part.parts.iter().map(|p| p.size).sum();
            assert!(part.size >= children);
        }
        assert_eq!(tree.root.find("1.1").unwrap().size, 5);
        assert_eq!(tree.root.find("1.2").unwrap().size, 3);
        assert_eq!(tree.root.find("1").unwrap().size, 8);
        assert_eq!(tree.root.size, 8);
    }

    #[test]
    fn test_default_content_type_header() {
        let tree = tree(b"Subject: x\r\n\r\nbody");
        let top = &tree.root.parts[0];
        assert_eq!(top.headers.get("content-type"), Some("text/plain"));
        assert_eq!(top.raw_header_text, "");
        assert_eq!(tree.body_parts.text, vec!["body".to_string()]);
    }

    #[test]
    fn test_exclude_attachments() {
        let options = ParseOptions::builder().include_attachments(false).build().unwrap();
        let Some(Extraction::Tree(tree)) = build(MIXED, &options) else {
            panic!("expected tree");
        };
        assert!(tree.attachments.is_empty());
        let part = tree.root.find("1.2").unwrap();
        assert_eq!(part.kind, PartKind::Attachment);
        assert!(part.bytes.is_empty());
        assert_eq!(part.size, 3);
    }

    #[test]
    fn test_single_part() {
        let options = ParseOptions::builder().mime_part("1.2").build().unwrap();
        let Some(Extraction::Part(part)) = build(MIXED, &options) else {
            panic!("expected part");
        };
        assert_eq!(part.name, "1.2");
        assert_eq!(part.bytes, [1, 2, 3]);

        let missing = ParseOptions::builder().mime_part("1.7").build().unwrap();
        assert!(build(MIXED, &missing).is_none());
    }

    #[test]
    fn test_single_part_keeps_body_bytes() {
        let options = ParseOptions::builder().mime_part("1.1").build().unwrap();
        let Some(Extraction::Part(part)) = build(MIXED, &options) else {
            panic!("expected part");
        };
        assert_eq!(part.body, "hello");
        assert_eq!(part.bytes, b"hello");
    }

    #[test]
    fn test_no_parts_is_none() {
        let options = TokenizerOptions {
            prune_at: Some("9".to_string()),
            ..TokenizerOptions::default()
        };
        let builder = tokenizer::parse(MIXED, TreeBuilder::new(&ParseOptions::default()), options);
        assert!(builder.into_result().is_none());
    }

    #[test]
    fn test_is_attachment_rule() {
        let part = |content_type: &str, disposition: Option<&str>| {
            let mut headers = Headers::new();
            if let Some(d) = disposition {
                headers.add("content-disposition", d);
            }
            Part {
                content_type: content_type.to_string(),
                headers,
                ..Part::default()
            }
        };
        assert!(!is_attachment(&part("text/plain", None)));
        assert!(!is_attachment(&part("text/html", Some("inline"))));
        assert!(!is_attachment(&part("text/enriched", None)));
        assert!(is_attachment(&part("text/plain", Some("Attachment; filename=a.txt"))));
        assert!(is_attachment(&part("text/csv", None)));
        assert!(is_attachment(&part("image/png", Some("inline"))));
        assert!(!is_attachment(&part("multipart/mixed", Some("attachment"))));
    }

    #[test]
    fn test_text_attachment_keeps_only_bytes() {
        let input = b"Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=a.txt\r\n\
\r\n\
secret text body\r\n\
--b--\r\n";
        let tree = tree(input);
        let part = tree.root.find("1.1").unwrap();
        assert_eq!(part.kind, PartKind::Attachment);
        assert!(part.body.is_empty());
        assert!(part.bytes.is_empty());
        assert_eq!(part.size, 16);
        assert_eq!(tree.attachments[0].content, b"secret text body");
        assert!(tree.body_parts.text.is_empty());

        let options = ParseOptions::builder().mime_part("1.1").build().unwrap();
        let Some(Extraction::Part(part)) = build(input, &options) else {
            panic!("expected part");
        };
        assert!(part.body.is_empty());
        assert_eq!(part.bytes, b"secret text body");
    }

    #[test]
    fn test_multipart_without_boundary_is_discarded() {
        let input = b"Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: multipart/related\r\n\
\r\n\
no boundary in here\r\n\
--b--\r\n";
        let tree = tree(input);
        let part = tree.root.find("1.1").unwrap();
        assert_eq!(part.kind, PartKind::Discarded);
        assert!(part.parts.is_empty());
        assert!(part.bytes.is_empty());
        assert!(part.body.is_empty());
        assert_eq!(part.size, "no boundary in here".len());
        assert!(tree.attachments.is_empty());
        assert!(tree.body_parts.text.is_empty());
        assert_eq!(tree.root.find("1").unwrap().kind, PartKind::Container);
    }

    #[test]
    fn test_content_header_lines() {
        let raw = "From: a\r\nContent-Type: text/plain;\r\n charset=utf-8\r\nSubject: b\r\ncontent-id: <x>\r\n";
        assert_eq!(
            content_header_lines(raw),
            "Content-Type: text/plain;\r\n charset=utf-8\r\ncontent-id: <x>"
        );
    }
}
