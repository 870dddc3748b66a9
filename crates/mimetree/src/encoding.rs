//! Content-Transfer-Encoding decoding.
//!
//! Body decoders are fed line by line as the tokenizer walks a part and keep
//! whatever they can't decode yet (a partial base64 quantum, a dangling `=`)
//! for the next call. Nothing here fails: bad input is skipped or passed
//! through literally.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::fmt;

/// Lenient base64: padding optional, stray trailing bits ignored.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from a header value.
    ///
    /// Unknown mechanisms are treated as identity encodings.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Incremental decoder for one part's body.
#[derive(Debug, Clone)]
pub enum BodyDecoder {
    /// 7bit, 8bit, binary: bytes pass through.
    Identity,
    /// Base64 with the characters of an incomplete quantum.
    Base64(Vec<u8>),
    /// Quoted-printable with bytes held back after a trailing `=`.
    QuotedPrintable(Vec<u8>),
}

impl BodyDecoder {
    /// Creates a decoder for a transfer encoding.
    #[must_use]
    pub const fn new(encoding: TransferEncoding) -> Self {
        match encoding {
            TransferEncoding::Base64 => Self::Base64(Vec::new()),
            TransferEncoding::QuotedPrintable => Self::QuotedPrintable(Vec::new()),
            TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
                Self::Identity
            }
        }
    }

    /// Decodes the next piece of encoded input.
    pub fn feed(&mut self, input: &[u8]) -> Vec<u8> {
        match self {
            Self::Identity => input.to_vec(),
            Self::Base64(carry) => {
                carry.extend(input.iter().copied().filter(|&b| is_base64_char(b)));
                let whole = carry.len() / 4 * 4;
                let out = decode_base64_lenient(&carry[..whole]);
                carry.drain(..whole);
                out
            }
            Self::QuotedPrintable(carry) => {
                carry.extend_from_slice(input);
                let (out, consumed) = decode_qp_prefix(carry, false);
                carry.drain(..consumed);
                out
            }
        }
    }

    /// Decodes whatever is still held back at the end of the part.
    pub fn finish(&mut self) -> Vec<u8> {
        match self {
            Self::Identity => Vec::new(),
            Self::Base64(carry) => {
                let out = decode_base64_lenient(carry);
                carry.clear();
                out
            }
            Self::QuotedPrintable(carry) => {
                let (out, _) = decode_qp_prefix(carry, true);
                carry.clear();
                out
            }
        }
    }
}

const fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes base64, skipping whitespace and any quantum that doesn't decode.
#[must_use]
pub fn decode_base64_lenient(data: &[u8]) -> Vec<u8> {
    let cleaned: Vec<u8> = data.iter().copied().filter(|&b| is_base64_char(b)).collect();
    if let Ok(bytes) = LENIENT.decode(&cleaned) {
        return bytes;
    }

    // Padding in the middle (concatenated blobs) or a broken quantum: go
    // quantum by quantum and drop what can't be read.
    let mut out = Vec::with_capacity(cleaned.len() / 4 * 3);
    for quantum in cleaned.chunks(4) {
        let quantum: Vec<u8> = quantum.iter().copied().filter(|&b| b != b'=').collect();
        if quantum.len() < 2 {
            continue;
        }
        match LENIENT.decode(&quantum) {
            Ok(bytes) => out.extend_from_slice(&bytes),
            Err(e) => tracing::warn!(error = %e, "skipping undecodable base64 quantum"),
        }
    }
    out
}

/// Decodes complete quoted-printable input (RFC 2045).
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    decode_qp_prefix(data, true).0
}

/// Decodes as much of `data` as is unambiguous.
///
/// Returns the output and the number of input bytes consumed. Unless `last`
/// is set, a `=` too close to the end to tell a soft break from an escape is
/// left unconsumed.
fn decode_qp_prefix(data: &[u8], last: bool) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        let rest = &data[i + 1..];
        match rest {
            // Soft line breaks
            [b'\r', b'\n', ..] => i += 3,
            [b'\n', ..] => i += 2,
            [b'\r', _, ..] => i += 2,
            [hi, lo, ..] if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                out.push((hex_value(*hi) << 4) | hex_value(*lo));
                i += 3;
            }
            [] | [_] if !last => break,
            // "=" at the very end is a soft break with the newline lost
            [] => i += 1,
            [b'\r'] => i += 2,
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    (out, i)
}

const fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Decodes the payload of an RFC 2047 `Q` encoded word.
///
/// Like quoted-printable, except `_` stands for a space.
#[must_use]
pub fn decode_q(payload: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = payload
        .iter()
        .map(|&b| if b == b'_' { b' ' } else { b })
        .collect();
    decode_quoted_printable(&spaced)
}

/// Encodes a header value using RFC 2047 encoding.
///
/// Text that is plain ASCII without `=?` is returned unchanged; anything else
/// becomes a single UTF-8 `B` encoded word.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.is_ascii() && !text.contains("=?") {
        return text.to_string();
    }
    format!("=?UTF-8?B?{}?=", encode_base64(text.as_bytes()))
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
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_base64_streaming_across_lines() {
        let mut decoder = BodyDecoder::new(TransferEncoding::Base64);
        let mut out = decoder.feed(b"SGVsbG8s");
        out.extend(decoder.feed(b"IFdvcmx\r\n"));
        out.extend(decoder.feed(b"kIQ==\r\n"));
        out.extend(decoder.finish());
        assert_eq!(out, b"Hello, World!");
    }

    #[test]
    fn test_base64_missing_padding() {
        let mut decoder = BodyDecoder::new(TransferEncoding::Base64);
        let mut out = decoder.feed(b"AQID\nBA");
        out.extend(decoder.finish());
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_base64_concatenated_blobs() {
        assert_eq!(decode_base64_lenient(b"YQ==Yg=="), b"ab");
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo"), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable(b"a=3db"), b"a=b");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld"), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_invalid_escape_is_literal() {
        assert_eq!(decode_quoted_printable(b"50=% off =ZZ"), b"50=% off =ZZ");
    }

    #[test]
    fn test_quoted_printable_streaming_soft_break() {
        let mut decoder = BodyDecoder::new(TransferEncoding::QuotedPrintable);
        let mut out = decoder.feed(b"Hello =");
        out.extend(decoder.feed(b"\r\n"));
        out.extend(decoder.feed(b"W=C3"));
        out.extend(decoder.feed(b"=A9rld"));
        out.extend(decoder.finish());
        assert_eq!(out, "Hello Wérld".as_bytes());
    }

    #[test]
    fn test_decode_q() {
        assert_eq!(decode_q(b"Caf=C3=A9_au_lait"), "Café au lait".as_bytes());
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello"), "Hello");
        let encoded = encode_rfc2047("Héllo");
        assert_eq!(encoded, "=?UTF-8?B?SMOpbGxv?=");
    }
}
