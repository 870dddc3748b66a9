//! Header maps and the structured header grammar.
//!
//! [`decode_header_field`] is the low-level entry point that turns raw header
//! text into unstructured text, a parameter list, or an address list.
//! [`HeaderRegistry`] sits on top of it and knows which grammar each named
//! header uses.

mod address;
mod date;
mod field;
mod parameter;
mod registry;
mod rfc2047;

pub use address::{Mailbox, parse_address_list};
pub use date::parse_date;
pub use field::{HeaderFlags, HeaderKind, HeaderValue, decode_header_field};
pub use parameter::{ParameterHeader, get_parameter, parse_parameter_header};
pub use registry::{HeaderDecoder, HeaderEncoder, HeaderRegistry, StructuredValue};
pub use rfc2047::decode_rfc2047_words;

use std::collections::HashMap;
use std::fmt;

/// Collection of header values keyed by lower-cased name.
///
/// Names keep the order in which they first appeared; values for a name keep
/// declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
    /// Position of each name in `entries`.
    index: HashMap<String, usize>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        if let Some(&i) = self.index.get(&name) {
            if let Some((_, values)) = self.entries.get_mut(i) {
                values.push(value);
            }
            return;
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, vec![value]));
    }

    /// Sets a header value, replacing any existing values.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.add(name, value);
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.values(name)
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Gets all values for a header as a slice.
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[String]> {
        let i = self.position(name)?;
        self.entries.get(i).map(|(_, v)| v.as_slice())
    }

    /// Returns `true` if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        if let Some(i) = self.position(name) {
            self.entries.remove(i);
            self.reindex();
        }
    }

    /// Keeps only the headers whose name satisfies the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(n, _)| keep(n));
        self.reindex();
    }

    /// Returns the number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.index.get(&name.to_ascii_lowercase()).copied()
        } else {
            self.index.get(name).copied()
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, values) in &self.entries {
            // Capitalize header name (e.g., "content-type" -> "Content-Type")
            let capitalized = capitalize(name);
            for value in values {
                writeln!(f, "{capitalized}: {value}")?;
            }
        }

        Ok(())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Headers {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

pub(crate) fn capitalize(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_ascii_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Splits a header block into `(name, value)` pairs in declaration order.
///
/// Continuation lines are folded onto the previous header by dropping the
/// line break and keeping the leading whitespace. Lines without a colon are
/// skipped. Names keep the case they were written in.
#[must_use]
pub fn split_header_block(text: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = fields.last_mut() {
                value.push_str(line);
            }
            continue;
        }

        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if !name.is_empty() {
                fields.push((name.to_string(), value.to_string()));
            }
        }
    }

    for (_, value) in &mut fields {
        *value = value.trim().to_string();
    }
    fields
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

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
    }

    #[test]
    fn test_headers_keep_declaration_order() {
        let mut headers = Headers::new();
        headers.add("Received", "from a");
        headers.add("Subject", "Hi");
        headers.add("RECEIVED", "from b");
        assert_eq!(headers.get_all("received"), vec!["from a", "from b"]);
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["received", "received", "subject"]);
    }

    #[test]
    fn test_headers_set() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("To", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);

        headers.set("To", "charlie@example.com");
        assert_eq!(headers.get_all("To").len(), 1);
        assert_eq!(headers.get("To"), Some("charlie@example.com"));
    }

    #[test]
    fn test_headers_remove_and_retain() {
        let mut headers: Headers = [
            ("Subject", "Test"),
            ("Content-Type", "text/plain"),
            ("Content-Id", "<a@b>"),
        ]
        .into_iter()
        .collect();

        headers.remove("Subject");
        assert!(headers.get("Subject").is_none());

        headers.retain(|name| name != "content-id");
        assert_eq!(headers.len(), 1);
        assert!(headers.contains("content-type"));
    }

    #[test]
    fn test_many_distinct_names() {
        let headers: Headers = (0..20_000)
            .map(|i| (format!("X-H{i:07}"), i.to_string()))
            .collect();
        assert_eq!(headers.len(), 20_000);
        assert_eq!(headers.get("x-h0019999"), Some("19999"));
        assert_eq!(headers.get("X-H0000000"), Some("0"));
        assert_eq!(headers.iter().nth(12_345), Some(("x-h0012345", "12345")));
    }

    #[test]
    fn test_index_follows_removal() {
        let mut headers: Headers = [("A", "1"), ("B", "2"), ("C", "3")].into_iter().collect();
        headers.remove("a");
        headers.add("c", "4");
        headers.set("B", "5");
        assert_eq!(headers.get_all("c"), vec!["3", "4"]);
        assert_eq!(headers.get("b"), Some("5"));
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["c", "c", "b"]);
    }

    #[test]
    fn test_split_header_block() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test\r\n",
            "  Message\r\n",
            "Content-Type: text/plain;\r\n",
            "\tcharset=utf-8\r\n",
            "not a header\r\n",
        );

        let fields = split_header_block(text);
        assert_eq!(
            fields,
            vec![
                ("From".to_string(), "sender@example.com".to_string()),
                ("Subject".to_string(), "Test  Message".to_string()),
                ("Content-Type".to_string(), "text/plain;\tcharset=utf-8".to_string()),
            ]
        );
    }

    #[test]
    fn test_headers_display() {
        let mut headers = Headers::new();
        headers.add("from", "sender@example.com");
        headers.add("MESSAGE-ID", "<1@example.com>");

        let s = headers.to_string();
        assert!(s.contains("From: sender@example.com"));
        assert!(s.contains("Message-Id: <1@example.com>"));
    }
}
