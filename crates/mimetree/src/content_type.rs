//! MIME content type handling.

use std::fmt;

use crate::header::{ParameterHeader, parse_parameter_header};

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ContentType {
    /// Main type, lower-cased (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype, lower-cased (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters by lower-cased name, in header order.
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into().to_ascii_lowercase(),
            sub_type: sub_type.into().to_ascii_lowercase(),
            parameters: Vec::new(),
        }
    }

    /// Creates a text/plain content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Adds a parameter, replacing an existing one of the same name.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into().to_ascii_lowercase();
        self.parameters.retain(|(k, _)| *k != key);
        self.parameters.push((key, value.into()));
        self
    }

    /// Returns `type/subtype`.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Looks up a parameter by name (case-insensitive).
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type == "text"
    }

    /// Parses a content type header value.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`, with RFC 2047
    /// and RFC 2231 parameter decoding. This never fails: a value without a
    /// usable `type/subtype` becomes `text/plain`, keeping its parameters.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        Self::from_parameters(parse_parameter_header(s, true, true))
    }

    pub(crate) fn from_parameters(header: ParameterHeader) -> Self {
        let ParameterHeader { value, params } = header;
        let mut content_type = match value.split_once('/') {
            Some((main, sub)) if is_token(main.trim()) && is_token(sub.trim()) => {
                Self::new(main.trim(), sub.trim())
            }
            _ => {
                if !value.is_empty() {
                    tracing::debug!(value = %value, "invalid content type, using text/plain");
                }
                Self::text_plain()
            }
        };
        content_type.parameters = params;
        content_type
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::text_plain()
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            // Quote value if it contains special characters
            if value.is_empty()
                || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
            {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "; {key}=\"{escaped}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
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

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("Text", "PLAIN");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; charset=utf-8");
        assert_eq!(ct.mime_type(), "text/plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert!(ct.is_text());
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"");
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
    }

    #[test]
    fn test_invalid_type_defaults_to_text_plain() {
        for value in ["", "garbage", "text/", "/plain", "a b/c"] {
            assert_eq!(ContentType::parse(value).mime_type(), "text/plain", "{value:?}");
        }
        let ct = ContentType::parse("bogus; charset=iso-8859-1");
        assert_eq!(ct.charset(), Some("iso-8859-1"));
    }

    #[test]
    fn test_rfc2231_name() {
        let ct = ContentType::parse("image/png; name*0=\"te\"; name*1=\"st.png\"");
        assert_eq!(ct.parameter("NAME"), Some("test.png"));
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::text_plain()
            .with_parameter("charset", "utf-8")
            .with_parameter("name", "a b.txt");
        assert_eq!(ct.to_string(), "text/plain; charset=utf-8; name=\"a b.txt\"");
    }

    #[test]
    fn test_with_parameter_replaces() {
        let ct = ContentType::new("text", "plain")
            .with_parameter("charset", "iso-8859-1")
            .with_parameter("Charset", "utf-8");
        assert_eq!(ct.parameters.len(), 1);
        assert_eq!(ct.charset(), Some("utf-8"));
    }
}
