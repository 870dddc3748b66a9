//! Low-level header field decoding driven by a kind and flag set.

use std::fmt;
use std::ops::BitOr;

use super::address::{Mailbox, parse_address_list};
use super::parameter::{ParameterHeader, parse_parameter_header};
use super::rfc2047::decode_rfc2047_words;
use crate::charset;
use crate::error::{Error, Result};

/// Grammar selector and decoding options for [`decode_header_field`].
///
/// The low nibble selects the grammar ([`Self::UNSTRUCTURED`],
/// [`Self::PARAMETER`], [`Self::ADDRESS`]); the high nibble holds option bits
/// that can be combined with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    /// Free text.
    pub const UNSTRUCTURED: Self = Self(0x00);
    /// `value; attr=value; ...`
    pub const PARAMETER: Self = Self(0x02);
    /// Mailbox and group list.
    pub const ADDRESS: Self = Self(0x03);
    /// Join and decode RFC 2231 parameter continuations (parameter lists only).
    pub const DECODE_2231: Self = Self(0x10);
    /// Decode RFC 2047 encoded words.
    pub const DECODE_2047: Self = Self(0x20);
    /// Accept bytes that aren't UTF-8 by converting them with a fallback
    /// charset.
    pub const ALLOW_RAW: Self = Self(0x40);
    /// All of the internationalization options.
    pub const ALL_I18N: Self = Self(0x70);

    const KIND_MASK: u8 = 0x0f;
    const OPTION_MASK: u8 = 0x70;

    /// Builds flags from their numeric form.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Numeric form of the flags.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every option bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 & Self::OPTION_MASK == other.0 & Self::OPTION_MASK
    }

    /// The grammar selected by the low nibble.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unknown kind or unknown
    /// option bits.
    pub fn kind(self) -> Result<HeaderKind> {
        if self.0 & !(Self::KIND_MASK | Self::OPTION_MASK) != 0 {
            return Err(Error::InvalidArgument(format!(
                "unknown header option bits: {:#04x}",
                self.0
            )));
        }
        match self.0 & Self::KIND_MASK {
            0x00 => Ok(HeaderKind::Unstructured),
            0x02 => Ok(HeaderKind::ParameterList),
            0x03 => Ok(HeaderKind::AddressList),
            other => Err(Error::InvalidArgument(format!(
                "unknown header kind: {other:#04x}"
            ))),
        }
    }
}

impl BitOr for HeaderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<HeaderKind> for HeaderFlags {
    fn from(kind: HeaderKind) -> Self {
        match kind {
            HeaderKind::Unstructured => Self::UNSTRUCTURED,
            HeaderKind::ParameterList => Self::PARAMETER,
            HeaderKind::AddressList => Self::ADDRESS,
        }
    }
}

/// The header grammars [`decode_header_field`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    /// Free text.
    Unstructured,
    /// A value followed by `;`-separated parameters.
    ParameterList,
    /// RFC 5322 address list.
    AddressList,
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstructured => write!(f, "unstructured"),
            Self::ParameterList => write!(f, "parameter list"),
            Self::AddressList => write!(f, "address list"),
        }
    }
}

/// Result of [`decode_header_field`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum HeaderValue {
    /// Decoded free text.
    Unstructured(String),
    /// Value and parameters.
    Parameters(ParameterHeader),
    /// Mailboxes, groups flattened.
    Addresses(Vec<Mailbox>),
}

/// Decodes one header field body.
///
/// `raw` is the field body as it appeared on the wire. Bytes that aren't
/// UTF-8 are only accepted with [`HeaderFlags::ALLOW_RAW`], in which case they
/// are converted with `fallback_charset` (or windows-1252 if none is given).
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if `flags` names an unknown kind.
/// - [`Error::InvalidInput`] if `raw` isn't UTF-8 and raw input isn't allowed.
/// - [`Error::UnsupportedCharset`] if the fallback charset is unknown.
pub fn decode_header_field(
    raw: &[u8],
    flags: HeaderFlags,
    fallback_charset: Option<&str>,
) -> Result<HeaderValue> {
    let kind = flags.kind()?;
    let decode_2047 = flags.contains(HeaderFlags::DECODE_2047);

    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) if flags.contains(HeaderFlags::ALLOW_RAW) => {
            charset::convert_8bit(raw, fallback_charset)?
        }
        Err(e) => {
            return Err(Error::InvalidInput(format!(
                "header is not valid UTF-8: {e}"
            )));
        }
    };

    Ok(match kind {
        HeaderKind::Unstructured => {
            if decode_2047 {
                HeaderValue::Unstructured(decode_rfc2047_words(&text))
            } else {
                HeaderValue::Unstructured(text)
            }
        }
        HeaderKind::ParameterList => HeaderValue::Parameters(parse_parameter_header(
            &text,
            decode_2047,
            flags.contains(HeaderFlags::DECODE_2231),
        )),
        HeaderKind::AddressList => HeaderValue::Addresses(parse_address_list(&text, decode_2047)),
    })
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
    fn test_unstructured() {
        let raw = b"Hello =?UTF-8?Q?W=C3=B6rld?=";
        assert_eq!(
            decode_header_field(raw, HeaderFlags::UNSTRUCTURED, None).unwrap(),
            HeaderValue::Unstructured("Hello =?UTF-8?Q?W=C3=B6rld?=".to_string())
        );
        assert_eq!(
            decode_header_field(raw, HeaderFlags::UNSTRUCTURED | HeaderFlags::DECODE_2047, None)
                .unwrap(),
            HeaderValue::Unstructured("Hello Wörld".to_string())
        );
    }

    #[test]
    fn test_parameter_list() {
        let value = decode_header_field(
            b"; name*=utf-8''%E2%82%AC.txt; size=10",
            HeaderFlags::PARAMETER | HeaderFlags::ALL_I18N,
            None,
        )
        .unwrap();
        let HeaderValue::Parameters(params) = value else {
            panic!("expected parameters");
        };
        assert_eq!(params.get("name"), Some("\u{20ac}.txt"));
        assert_eq!(params.get("size"), Some("10"));
    }

    #[test]
    fn test_address_list() {
        let value =
            decode_header_field(b"A <a@x.test>, b@y.test", HeaderFlags::ADDRESS, None).unwrap();
        assert_eq!(
            value,
            HeaderValue::Addresses(vec![Mailbox::new("A", "a@x.test"), Mailbox::new("", "b@y.test")])
        );
    }

    #[test]
    fn test_unknown_kind() {
        let err = decode_header_field(b"x", HeaderFlags::from_bits(0x01), None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = decode_header_field(b"x", HeaderFlags::from_bits(0x80), None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_raw_bytes() {
        let raw = b"Caf\xe9";
        assert!(matches!(
            decode_header_field(raw, HeaderFlags::UNSTRUCTURED, None),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(
            decode_header_field(raw, HeaderFlags::ALLOW_RAW, Some("iso-8859-1")).unwrap(),
            HeaderValue::Unstructured("Café".to_string())
        );
        assert_eq!(
            decode_header_field(raw, HeaderFlags::ALLOW_RAW, None).unwrap(),
            HeaderValue::Unstructured("Café".to_string())
        );
        assert!(matches!(
            decode_header_field(raw, HeaderFlags::ALLOW_RAW, Some("x-no-such")),
            Err(Error::UnsupportedCharset(_))
        ));
    }

    #[test]
    fn test_flags_contains() {
        let flags = HeaderFlags::ADDRESS | HeaderFlags::DECODE_2047;
        assert!(flags.contains(HeaderFlags::DECODE_2047));
        assert!(!flags.contains(HeaderFlags::ALLOW_RAW));
        assert_eq!(flags.kind().unwrap(), HeaderKind::AddressList);
        assert_eq!(HeaderFlags::from(HeaderKind::ParameterList), HeaderFlags::PARAMETER);
    }
}
