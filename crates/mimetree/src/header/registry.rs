//! Name-keyed structured header decoders and encoders.
//!
//! A [`HeaderRegistry`] knows the grammar of the common message headers
//! (addresses, dates, message ids, ...) and can be extended with decoders and
//! encoders for other names. Built-in names are reserved and cannot be
//! overridden.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};

use super::address::{Mailbox, parse_address_list};
use super::date::parse_date;
use super::rfc2047::decode_rfc2047_words;
use super::{capitalize, parameter::parse_parameter_header};
use crate::content_type::ContentType;
use crate::encoding::encode_rfc2047;
use crate::error::{Error, Result};

/// Decoded value of a structured header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StructuredValue {
    /// Free text with encoded words decoded.
    Text(String),
    /// Mailboxes from every occurrence of the header.
    Addresses(Vec<Mailbox>),
    /// A parsed date.
    Date(DateTime<FixedOffset>),
    /// `<id>` tokens from every occurrence of the header, brackets kept.
    MessageIds(Vec<String>),
    /// A parsed `Content-Type`.
    ContentType(ContentType),
    /// One value per occurrence of a header that should appear once.
    List(Vec<StructuredValue>),
}

impl StructuredValue {
    /// For a [`List`](Self::List), its last element; otherwise `self`.
    #[must_use]
    pub fn last(&self) -> Option<&Self> {
        match self {
            Self::List(items) => items.last(),
            other => Some(other),
        }
    }

    /// Returns the text if this is [`Text`](Self::Text).
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the mailboxes if this is [`Addresses`](Self::Addresses).
    #[must_use]
    pub fn as_addresses(&self) -> Option<&[Mailbox]> {
        match self {
            Self::Addresses(list) => Some(list),
            _ => None,
        }
    }

    /// Returns the date if this is [`Date`](Self::Date).
    #[must_use]
    pub const fn as_date(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Date(date) => Some(date),
            _ => None,
        }
    }
}

impl From<String> for StructuredValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for StructuredValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Decodes every raw value of one header into a structured value.
pub type HeaderDecoder = Box<dyn Fn(&[String]) -> Result<StructuredValue> + Send + Sync>;

/// Renders a structured value as a header field body.
pub type HeaderEncoder = Box<dyn Fn(&StructuredValue) -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Address,
    Unstructured,
    Date,
    MessageIds,
    ContentType,
    Token,
    MimeVersion,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("from", Builtin::Address),
    ("sender", Builtin::Address),
    ("reply-to", Builtin::Address),
    ("to", Builtin::Address),
    ("cc", Builtin::Address),
    ("bcc", Builtin::Address),
    ("resent-from", Builtin::Address),
    ("resent-sender", Builtin::Address),
    ("resent-to", Builtin::Address),
    ("resent-cc", Builtin::Address),
    ("resent-bcc", Builtin::Address),
    ("mail-followup-to", Builtin::Address),
    ("mail-reply-to", Builtin::Address),
    ("disposition-notification-to", Builtin::Address),
    ("return-receipt-to", Builtin::Address),
    ("approved", Builtin::Address),
    ("subject", Builtin::Unstructured),
    ("comments", Builtin::Unstructured),
    ("keywords", Builtin::Unstructured),
    ("content-description", Builtin::Unstructured),
    ("organization", Builtin::Unstructured),
    ("user-agent", Builtin::Unstructured),
    ("x-mailer", Builtin::Unstructured),
    ("date", Builtin::Date),
    ("resent-date", Builtin::Date),
    ("expires", Builtin::Date),
    ("expiry-date", Builtin::Date),
    ("injection-date", Builtin::Date),
    ("nntp-posting-date", Builtin::Date),
    ("reply-by", Builtin::Date),
    ("message-id", Builtin::MessageIds),
    ("in-reply-to", Builtin::MessageIds),
    ("references", Builtin::MessageIds),
    ("resent-message-id", Builtin::MessageIds),
    ("content-id", Builtin::MessageIds),
    ("content-type", Builtin::ContentType),
    ("content-transfer-encoding", Builtin::Token),
    ("mime-version", Builtin::MimeVersion),
];

/// Canonical spellings that [`capitalize`] would get wrong.
const PREFERRED_SPELLINGS: &[&str] = &["MIME-Version", "Message-ID", "Content-ID", "Resent-Message-ID"];

fn builtin(name: &str) -> Option<Builtin> {
    BUILTINS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, kind)| *kind)
}

impl Builtin {
    fn decode(self, values: &[String]) -> StructuredValue {
        match self {
            Self::Address => StructuredValue::Addresses(
                values
                    .iter()
                    .flat_map(|v| parse_address_list(v, true))
                    .collect(),
            ),
            Self::MessageIds => {
                StructuredValue::MessageIds(values.iter().flat_map(|v| parse_message_ids(v)).collect())
            }
            Self::Unstructured => per_value(values, |v| StructuredValue::Text(decode_rfc2047_words(v))),
            Self::Date => per_value(values, |v| {
                parse_date(v).map_or_else(|| StructuredValue::Text(v.to_string()), StructuredValue::Date)
            }),
            Self::ContentType => per_value(values, |v| {
                StructuredValue::ContentType(ContentType::from_parameters(parse_parameter_header(
                    v, true, true,
                )))
            }),
            Self::Token => per_value(values, |v| StructuredValue::Text(v.trim().to_ascii_lowercase())),
            Self::MimeVersion => per_value(values, |v| {
                let version: String = v.split('(').next().unwrap_or_default().split_whitespace().collect();
                StructuredValue::Text(version)
            }),
        }
    }
}

/// One value for a single occurrence, a [`StructuredValue::List`] otherwise.
fn per_value(values: &[String], decode: impl Fn(&str) -> StructuredValue) -> StructuredValue {
    match values {
        [single] => decode(single),
        _ => StructuredValue::List(values.iter().map(|v| decode(v)).collect()),
    }
}

/// Extracts `<id>` tokens; a value without brackets yields its bare words.
fn parse_message_ids(value: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let id: String = rest[start..=start + len].split_whitespace().collect();
        ids.push(id);
        rest = &rest[start + len + 1..];
    }
    if ids.is_empty() {
        ids.extend(value.split_whitespace().map(str::to_string));
    }
    ids
}

/// Structured header decoders and encoders, keyed by case-insensitive name.
///
/// A new registry already knows the built-in headers; their names are
/// reserved.
#[derive(Default)]
pub struct HeaderRegistry {
    decoders: HashMap<String, HeaderDecoder>,
    encoders: HashMap<String, HeaderEncoder>,
}

impl HeaderRegistry {
    /// Creates a registry with only the built-in headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `name` is one of the built-in headers.
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        builtin(name).is_some()
    }

    /// Returns `true` if `name` can be decoded.
    #[must_use]
    pub fn has_decoder(&self, name: &str) -> bool {
        Self::is_reserved(name) || self.decoders.contains_key(&name.to_ascii_lowercase())
    }

    /// Registers a decoder for a header name.
    ///
    /// A later registration for the same custom name replaces the earlier
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is reserved.
    pub fn add_decoder<F>(&mut self, name: &str, decoder: F) -> Result<()>
    where
        F: Fn(&[String]) -> Result<StructuredValue> + Send + Sync + 'static,
    {
        Self::check_overridable(name)?;
        tracing::debug!(header = name, "registering structured header decoder");
        self.decoders.insert(name.to_ascii_lowercase(), Box::new(decoder));
        Ok(())
    }

    /// Registers an encoder for a header name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is reserved.
    pub fn add_encoder<F>(&mut self, name: &str, encoder: F) -> Result<()>
    where
        F: Fn(&StructuredValue) -> String + Send + Sync + 'static,
    {
        Self::check_overridable(name)?;
        tracing::debug!(header = name, "registering structured header encoder");
        self.encoders.insert(name.to_ascii_lowercase(), Box::new(encoder));
        Ok(())
    }

    fn check_overridable(name: &str) -> Result<()> {
        if Self::is_reserved(name) {
            return Err(Error::InvalidArgument(format!("Cannot override header: {name}")));
        }
        Ok(())
    }

    /// Decodes all raw values of header `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHeader`] if no decoder is registered for
    /// `name`, or whatever error a custom decoder returns.
    pub fn decode(&self, name: &str, values: &[String]) -> Result<StructuredValue> {
        if let Some(kind) = builtin(name) {
            return Ok(kind.decode(values));
        }
        match self.decoders.get(&name.to_ascii_lowercase()) {
            Some(decoder) => decoder(values),
            None => Err(Error::UnknownHeader(name.to_string())),
        }
    }

    /// Renders `value` as a header field body.
    ///
    /// A registered encoder wins. Otherwise text is written as-is when it is
    /// ASCII and as a UTF-8 encoded word when it isn't; other values use their
    /// usual header syntax.
    #[must_use]
    pub fn encode(&self, name: &str, value: &StructuredValue) -> String {
        match self.encoders.get(&name.to_ascii_lowercase()) {
            Some(encoder) => encoder(value),
            None => default_encode(value),
        }
    }

    /// Renders a complete header line, `Name: value\r\n`.
    ///
    /// A [`StructuredValue::List`] produces one line per element.
    #[must_use]
    pub fn emit_structured_header(&self, name: &str, value: &StructuredValue) -> String {
        let name = preferred_spelling(name);
        match value {
            StructuredValue::List(items) => items
                .iter()
                .map(|item| format!("{name}: {}\r\n", self.encode(&name, item)))
                .collect(),
            single => format!("{name}: {}\r\n", self.encode(&name, single)),
        }
    }
}

impl fmt::Debug for HeaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderRegistry")
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .field("encoders", &self.encoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn preferred_spelling(name: &str) -> String {
    PREFERRED_SPELLINGS
        .iter()
        .find(|p| p.eq_ignore_ascii_case(name))
        .map_or_else(|| capitalize(name), |p| (*p).to_string())
}

fn default_encode(value: &StructuredValue) -> String {
    match value {
        StructuredValue::Text(text) => encode_rfc2047(text),
        StructuredValue::Addresses(list) => list
            .iter()
            .map(encode_mailbox)
            .collect::<Vec<_>>()
            .join(", "),
        StructuredValue::Date(date) => date.to_rfc2822(),
        StructuredValue::MessageIds(ids) => ids.join(" "),
        StructuredValue::ContentType(content_type) => content_type.to_string(),
        StructuredValue::List(items) => items.iter().map(default_encode).collect::<Vec<_>>().join(", "),
    }
}

fn encode_mailbox(mailbox: &Mailbox) -> String {
    if mailbox.name.is_empty() {
        return mailbox.email.clone();
    }
    let name = if !mailbox.name.is_ascii() || mailbox.name.contains("=?") {
        encode_rfc2047(&mailbox.name)
    } else if mailbox
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || "!#$%&'*+-/=?^_`{|}~".contains(c))
    {
        mailbox.name.clone()
    } else {
        format!("\"{}\"", mailbox.name.replace('\\', "\\\\").replace('"', "\\\""))
    };
    format!("{name} <{}>", mailbox.email)
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
    use crate::encoding::{decode_base64_lenient, encode_base64};

    fn values(v: &[&str]) -> Vec<String> {
        v.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_builtin_addresses_flatten_occurrences() {
        let registry = HeaderRegistry::new();
        let value = registry
            .decode("To", &values(&["a@x.test, B <b@x.test>", "c@x.test"]))
            .unwrap();
        let emails: Vec<&str> = value.as_addresses().unwrap().iter().map(|m| m.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.test", "b@x.test", "c@x.test"]);
    }

    #[test]
    fn test_builtin_subject_and_list() {
        let registry = HeaderRegistry::new();
        let one = registry.decode("subject", &values(&["=?UTF-8?B?8J+YgyBzbWlsZQ==?="])).unwrap();
        assert_eq!(one.as_text(), Some("\u{1F603} smile"));

        let two = registry.decode("Subject", &values(&["first", "second"])).unwrap();
        assert_eq!(two.last().and_then(StructuredValue::as_text), Some("second"));
    }

    #[test]
    fn test_builtin_date() {
        let registry = HeaderRegistry::new();
        let value = registry.decode("date", &values(&["Fri, 21 Nov 1997 09:55:06 -0600"])).unwrap();
        assert!(value.as_date().is_some());

        let bad = registry.decode("date", &values(&["not a date"])).unwrap();
        assert_eq!(bad.as_text(), Some("not a date"));
    }

    #[test]
    fn test_builtin_message_ids_and_tokens() {
        let registry = HeaderRegistry::new();
        assert_eq!(
            registry.decode("References", &values(&["<a@x> <b@x>", "<c@x>"])).unwrap(),
            StructuredValue::MessageIds(values(&["<a@x>", "<b@x>", "<c@x>"]))
        );
        assert_eq!(
            registry.decode("content-transfer-encoding", &values(&[" Base64 "])).unwrap(),
            StructuredValue::Text("base64".to_string())
        );
        assert_eq!(
            registry.decode("MIME-Version", &values(&["1.0 (produced by x)"])).unwrap(),
            StructuredValue::Text("1.0".to_string())
        );
        let StructuredValue::ContentType(ct) = registry
            .decode("content-type", &values(&["text/html; charset=\"utf-8\""]))
            .unwrap()
        else {
            panic!("expected content type");
        };
        assert_eq!(ct.mime_type(), "text/html");
    }

    #[test]
    fn test_custom_decoder() {
        let mut registry = HeaderRegistry::new();
        let err = registry.decode("X-Base64", &values(&["U3RyaW5n"])).unwrap_err();
        assert!(matches!(err, Error::UnknownHeader(_)));
        assert!(err.to_string().contains("Unknown structured header"));

        registry
            .add_decoder("X-Base64", |values| {
                let bytes = decode_base64_lenient(values.concat().as_bytes());
                String::from_utf8(bytes)
                    .map(StructuredValue::Text)
                    .map_err(|e| Error::InvalidInput(e.to_string()))
            })
            .unwrap();
        assert!(registry.has_decoder("x-base64"));
        assert_eq!(
            registry.decode("x-BASE64", &values(&["U3RyaW5n"])).unwrap(),
            StructuredValue::Text("String".to_string())
        );
    }

    #[test]
    fn test_reserved_names() {
        let mut registry = HeaderRegistry::new();
        let err = registry
            .add_decoder("To", |_| Ok(StructuredValue::Text(String::new())))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(registry.add_encoder("SUBJECT", |_| String::new()).is_err());
    }

    #[test]
    fn test_custom_encoder() {
        let mut registry = HeaderRegistry::new();
        let value = StructuredValue::from("String");
        assert_eq!(registry.emit_structured_header("X-Base64", &value), "X-Base64: String\r\n");

        registry
            .add_encoder("X-Base64", |value| {
                encode_base64(value.as_text().unwrap_or_default().as_bytes())
            })
            .unwrap();
        assert_eq!(registry.emit_structured_header("X-Base64", &value), "X-Base64: U3RyaW5n\r\n");
        assert_eq!(registry.emit_structured_header("x-bASe64", &value), "X-Base64: U3RyaW5n\r\n");
    }

    #[test]
    fn test_default_encoder() {
        let registry = HeaderRegistry::new();
        assert_eq!(
            registry.emit_structured_header("subject", &StructuredValue::from("Héllo")),
            "Subject: =?UTF-8?B?SMOpbGxv?=\r\n"
        );
        let to = StructuredValue::Addresses(vec![
            Mailbox::new("Doe, John", "john@x.test"),
            Mailbox::new("", "a@x.test"),
        ]);
        assert_eq!(
            registry.emit_structured_header("to", &to),
            "To: \"Doe, John\" <john@x.test>, a@x.test\r\n"
        );
        assert_eq!(
            registry.emit_structured_header("message-id", &StructuredValue::MessageIds(values(&["<1@x>"]))),
            "Message-ID: <1@x>\r\n"
        );
    }
}
