//! Entry points and the flattened [`Mail`] view.

use chrono::{DateTime, FixedOffset};

use crate::error::Result;
use crate::header::{Headers, HeaderRegistry, Mailbox, StructuredValue};
use crate::options::ParseOptions;
use crate::tokenizer::{self, BodyFormat, PartData, PartHandler, PartHeaders, TokenizerOptions};
use crate::tree::{Attachment, Extraction, TreeBuilder};

/// Parses a message into a part tree.
///
/// Returns `None` when the message has no parts, or when
/// [`ParseOptions::mime_part`] names a part that doesn't exist.
///
/// # Errors
///
/// Returns an error if the options are invalid (see
/// [`ParseOptions::validate`]). Damage in the message itself never fails the
/// parse.
pub fn extract_mime_msg(input: impl AsRef<[u8]>, options: &ParseOptions) -> Result<Option<Extraction>> {
    options.validate()?;
    let builder = tokenizer::parse(
        input.as_ref(),
        TreeBuilder::new(options),
        options.tokenizer_options(),
    );
    Ok(builder.into_result())
}

/// Collects the message headers and, optionally, the raw message body.
#[derive(Debug, Default)]
struct MessageCapture {
    headers: Headers,
    body: Vec<u8>,
}

impl PartHandler for MessageCapture {
    fn on_start_part(&mut self, part: &str, headers: &PartHeaders) {
        if part.is_empty() {
            self.headers = headers.headers();
        }
    }

    fn on_part_data(&mut self, part: &str, data: PartData) {
        if part.is_empty() {
            self.body.extend_from_slice(&data.bytes);
        }
    }
}

/// Returns the message headers without looking at the body.
#[must_use]
pub fn extract_headers(input: impl AsRef<[u8]>) -> Headers {
    let options = TokenizerOptions {
        prune_at: Some(String::new()),
        body_format: BodyFormat::None,
        default_charset: None,
    };
    tokenizer::parse(input.as_ref(), MessageCapture::default(), options).headers
}

/// Returns the message headers and the raw, undecoded message body.
///
/// For a multipart message the body includes every boundary and nested part.
#[must_use]
pub fn extract_headers_and_body(input: impl AsRef<[u8]>) -> (Headers, Vec<u8>) {
    let options = TokenizerOptions {
        prune_at: Some(String::new()),
        body_format: BodyFormat::Raw,
        default_charset: None,
    };
    let capture = tokenizer::parse(input.as_ref(), MessageCapture::default(), options);
    (capture.headers, capture.body)
}

/// The joined inline bodies of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Body {
    /// Every inline `text/html` part, joined with `"<br>\n"`.
    pub html: String,
    /// Every inline `text/plain` part, joined with `"\n"`.
    pub text: String,
}

/// A flattened summary of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Mail {
    /// Message headers, raw values.
    pub headers: Headers,
    /// Attachments in document order.
    pub attachments: Vec<Attachment>,
    /// Inline bodies, line endings normalized to `\n`.
    pub body: Body,
    /// Decoded `Subject`.
    pub subject: Option<String>,
    /// Parsed `Date`.
    pub date: Option<DateTime<FixedOffset>>,
    /// Last `From` mailbox.
    pub from: Option<Mailbox>,
    /// Last `Reply-To` mailbox.
    pub reply_to: Option<Mailbox>,
    /// Every `To` mailbox.
    pub to: Vec<Mailbox>,
    /// Every `Cc` mailbox.
    pub cc: Vec<Mailbox>,
    /// Every `Bcc` mailbox.
    pub bcc: Vec<Mailbox>,
    /// Last `Message-ID`.
    pub message_id: Option<String>,
    /// Last `In-Reply-To` id.
    pub in_reply_to: Option<String>,
}

/// Parses a message into a [`Mail`] summary.
///
/// Attachments are included. Subject, date, and address headers are decoded
/// with the built-in structured decoders; for headers that should appear only
/// once, the last occurrence wins.
#[must_use]
pub fn parse_mail(input: impl AsRef<[u8]>) -> Mail {
    let options = ParseOptions::default();
    let builder = tokenizer::parse(
        input.as_ref(),
        TreeBuilder::new(&options),
        options.tokenizer_options(),
    );
    let Some(Extraction::Tree(tree)) = builder.into_result() else {
        return Mail::default();
    };

    let registry = HeaderRegistry::new();
    let headers = tree.root.headers;
    let decode = |name: &str| {
        headers
            .values(name)
            .and_then(|values| registry.decode(name, values).ok())
    };
    let last = |name: &str| decode(name).and_then(|value| value.last().cloned());
    let mailboxes = |name: &str| match decode(name) {
        Some(StructuredValue::Addresses(list)) => list,
        _ => Vec::new(),
    };

    Mail {
        subject: last("subject").and_then(|v| v.as_text().map(str::to_string)),
        date: last("date").and_then(|v| v.as_date().copied()),
        from: mailboxes("from").pop(),
        reply_to: mailboxes("reply-to").pop(),
        to: mailboxes("to"),
        cc: mailboxes("cc"),
        bcc: mailboxes("bcc"),
        message_id: last_id(decode("message-id")),
        in_reply_to: last_id(decode("in-reply-to")),
        body: Body {
            html: normalize_newlines(&tree.body_parts.html.join("<br>\n")),
            text: normalize_newlines(&tree.body_parts.text.join("\n")),
        },
        attachments: tree.attachments,
        headers,
    }
}

fn last_id(value: Option<StructuredValue>) -> Option<String> {
    match value? {
        StructuredValue::MessageIds(mut ids) => ids.pop(),
        _ => None,
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
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
    use crate::error::Error;

    const MESSAGE: &str = "From: Alice <alice@example.com>\r\n\
To: bob@example.com, Carol <carol@example.com>\r\n\
Subject: Hello\r\n\
Date: Fri, 21 Nov 1997 09:55:06 -0600\r\n\
Message-ID: <1234@example.com>\r\n\
\r\n\
Line one\r\n\
Line two\r\n";

    #[test]
    fn test_extract_headers() {
        let headers = extract_headers(MESSAGE);
        assert_eq!(headers.get("subject"), Some("Hello"));
        assert_eq!(headers.get("to"), Some("bob@example.com, Carol <carol@example.com>"));
    }

    #[test]
    fn test_extract_headers_and_body() {
        let (headers, body) = extract_headers_and_body(MESSAGE);
        assert_eq!(headers.get("from"), Some("Alice <alice@example.com>"));
        assert_eq!(body, b"Line one\r\nLine two\r\n");
    }

    #[test]
    fn test_parse_mail_fields() {
        let mail = parse_mail(MESSAGE);
        assert_eq!(mail.subject.as_deref(), Some("Hello"));
        assert_eq!(mail.from, Some(Mailbox::new("Alice", "alice@example.com")));
        assert_eq!(mail.to.len(), 2);
        assert_eq!(mail.to[1].name, "Carol");
        assert!(mail.cc.is_empty());
        assert_eq!(mail.message_id.as_deref(), Some("<1234@example.com>"));
        assert!(mail.in_reply_to.is_none());
        assert_eq!(mail.date.unwrap().to_rfc2822(), "Fri, 21 Nov 1997 09:55:06 -0600");
        assert_eq!(mail.body.text, "Line one\nLine two\n");
        assert_eq!(mail.body.html, "");
    }

    #[test]
    fn test_single_valued_keys_take_last() {
        let mail = parse_mail("Subject: first\r\nSubject: second\r\nFrom: a@x.test\r\nFrom: b@x.test\r\n\r\n");
        assert_eq!(mail.subject.as_deref(), Some("second"));
        assert_eq!(mail.from.unwrap().email, "b@x.test");
    }

    #[test]
    fn test_invalid_mime_part() {
        let options = ParseOptions {
            mime_part: Some("1.a".to_string()),
            ..ParseOptions::default()
        };
        assert!(matches!(extract_mime_msg(MESSAGE, &options), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }
}
