//! Parse configuration.

use crate::charset;
use crate::error::{Error, Result};
use crate::tokenizer::{BodyFormat, TokenizerOptions};

/// Options for [`extract_mime_msg`](crate::extract_mime_msg) and
/// [`parse_mail`](crate::parse_mail).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Keep attachment records and their bytes.
    pub include_attachments: bool,
    /// Return only the part with this name (`"1"`, `"1.2"`, ...).
    pub mime_part: Option<String>,
    /// Charset for text parts without a `charset` parameter and for header
    /// bytes that aren't UTF-8.
    pub default_charset: Option<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            include_attachments: true,
            mime_part: None,
            default_charset: None,
        }
    }
}

impl ParseOptions {
    /// Creates the default options: attachments included, whole message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an options builder.
    #[must_use]
    pub fn builder() -> ParseOptionsBuilder {
        ParseOptionsBuilder::new()
    }

    /// Checks that the options make sense.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `mime_part` isn't a list of
    /// dot-separated positive integers, and [`Error::UnsupportedCharset`] if
    /// `default_charset` isn't a known charset.
    pub fn validate(&self) -> Result<()> {
        if let Some(part) = self
            .mime_part
            .as_deref()
            .filter(|part| !part.split('.').all(is_positive_integer))
        {
            return Err(Error::InvalidArgument(format!("invalid MIME part name: {part:?}")));
        }
        if let Some(label) = self
            .default_charset
            .as_deref()
            .filter(|label| !charset::is_supported(label))
        {
            return Err(Error::UnsupportedCharset(label.to_string()));
        }
        Ok(())
    }

    /// Tokenizer options for a decoding parse.
    ///
    /// Part names carry a leading `1` for the message itself that tokenizer
    /// identifiers don't have, so `"1.2"` prunes at `"2"`.
    pub(crate) fn tokenizer_options(&self) -> TokenizerOptions {
        TokenizerOptions {
            prune_at: self
                .mime_part
                .as_deref()
                .map(|part| part.split_once('.').map_or("", |(_, rest)| rest).to_string()),
            body_format: BodyFormat::Decode,
            default_charset: self.default_charset.clone(),
        }
    }
}

fn is_positive_integer(n: &str) -> bool {
    !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) && n.bytes().any(|b| b != b'0')
}

/// Builder for [`ParseOptions`].
#[derive(Debug, Clone, Default)]
pub struct ParseOptionsBuilder {
    options: ParseOptions,
}

impl ParseOptionsBuilder {
    /// Creates a builder with the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether attachments are collected.
    #[must_use]
    pub const fn include_attachments(mut self, include: bool) -> Self {
        self.options.include_attachments = include;
        self
    }

    /// Restricts the parse to one part.
    #[must_use]
    pub fn mime_part(mut self, part: impl Into<String>) -> Self {
        self.options.mime_part = Some(part.into());
        self
    }

    /// Sets the fallback charset.
    #[must_use]
    pub fn default_charset(mut self, charset: impl Into<String>) -> Self {
        self.options.default_charset = Some(charset.into());
        self
    }

    /// Builds and validates the options.
    ///
    /// # Errors
    ///
    /// See [`ParseOptions::validate`].
    pub fn build(self) -> Result<ParseOptions> {
        self.options.validate()?;
        Ok(self.options)
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
    fn test_defaults() {
        let options = ParseOptions::new();
        assert!(options.include_attachments);
        assert!(options.mime_part.is_none());
        assert_eq!(options.tokenizer_options().prune_at, None);
        assert_eq!(options.tokenizer_options().body_format, BodyFormat::Decode);
    }

    #[test]
    fn test_builder() {
        let options = ParseOptions::builder()
            .include_attachments(false)
            .mime_part("1.2.1")
            .default_charset("iso-8859-1")
            .build()
            .unwrap();
        assert!(!options.include_attachments);
        assert_eq!(options.tokenizer_options().prune_at.as_deref(), Some("2.1"));
        assert_eq!(options.default_charset.as_deref(), Some("iso-8859-1"));
    }

    #[test]
    fn test_top_part_prunes_at_root() {
        let options = ParseOptions::builder().mime_part("1").build().unwrap();
        assert_eq!(options.tokenizer_options().prune_at.as_deref(), Some(""));
    }

    #[test]
    fn test_invalid_mime_part() {
        for part in ["", "1.", ".1", "1..2", "0", "1.x", "-1", "1.+2"] {
            let err = ParseOptions::builder().mime_part(part).build().unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{part:?}");
        }
    }

    #[test]
    fn test_unknown_default_charset() {
        let err = ParseOptions::builder().default_charset("x-klingon").build().unwrap_err();
        assert!(matches!(err, Error::UnsupportedCharset(_)));
    }
}
