//! Charset decoding for body text and header words.
//!
//! Standard charsets go through `encoding_rs`. UTF-7 and its IMAP variant are
//! not context-free byte mappings, so their decoders buffer everything and
//! only produce text on the final call.

mod utf7;

pub use utf7::{decode_utf7, decode_utf7_imap};

use std::fmt;

use encoding_rs::{CoderResult, Encoding};

use crate::error::{Error, Result};

/// Vendor labels that `encoding_rs` doesn't know, mapped to a label it does.
const CHARSET_ALIASES: &[(&str, &str)] = &[
    ("cp932", "shift_jis"),
    ("shift_jisx0213", "shift_jis"),
    ("x-sjis-cp932", "shift_jis"),
    ("unicode-1-1-utf-7", "utf-7"),
    ("x-imap4-modified-utf7", "utf-7-imap"),
];

/// A stateful charset decoder.
///
/// Call [`decode`](Self::decode) with `final_chunk = false` for every chunk
/// but the last, then exactly once with `final_chunk = true` (the chunk may
/// be empty) to flush.
///
/// The [`Utf7`](Self::Utf7) and [`Utf7Imap`](Self::Utf7Imap) variants don't
/// stream: they return an empty string for every intermediate chunk and the
/// whole decoded text on the final call.
pub enum CharsetDecoder {
    /// Any charset `encoding_rs` recognizes.
    Standard(encoding_rs::Decoder),
    /// RFC 2152 UTF-7, holding the input collected so far.
    Utf7(String),
    /// RFC 3501 modified UTF-7, holding the input collected so far.
    Utf7Imap(String),
}

impl CharsetDecoder {
    /// Decodes the next chunk.
    pub fn decode(&mut self, chunk: &[u8], final_chunk: bool) -> String {
        match self {
            Self::Standard(decoder) => decode_standard(decoder, chunk, final_chunk),
            Self::Utf7(collected) => collect_then(collected, chunk, final_chunk, decode_utf7),
            Self::Utf7Imap(collected) => {
                collect_then(collected, chunk, final_chunk, decode_utf7_imap)
            }
        }
    }
}

impl fmt::Debug for CharsetDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(decoder) => f
                .debug_tuple("Standard")
                .field(&decoder.encoding().name())
                .finish(),
            Self::Utf7(collected) => f.debug_tuple("Utf7").field(&collected.len()).finish(),
            Self::Utf7Imap(collected) => f.debug_tuple("Utf7Imap").field(&collected.len()).finish(),
        }
    }
}

/// Creates a decoder for a charset label.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCharset`] if the label is not recognized.
pub fn make_decoder(charset: &str) -> Result<CharsetDecoder> {
    let label = resolve_alias(charset);
    match label.as_str() {
        "utf-7" => Ok(CharsetDecoder::Utf7(String::new())),
        "utf-7-imap" => Ok(CharsetDecoder::Utf7Imap(String::new())),
        _ => Encoding::for_label(label.as_bytes())
            .map(|encoding| CharsetDecoder::Standard(encoding.new_decoder_without_bom_handling()))
            .ok_or_else(|| Error::UnsupportedCharset(charset.to_string())),
    }
}

/// Returns `true` if [`make_decoder`] accepts the label.
#[must_use]
pub fn is_supported(charset: &str) -> bool {
    let label = resolve_alias(charset);
    label == "utf-7" || label == "utf-7-imap" || Encoding::for_label(label.as_bytes()).is_some()
}

/// Decodes a complete byte string in one call.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCharset`] if the label is not recognized.
pub fn decode_bytes(bytes: &[u8], charset: &str) -> Result<String> {
    Ok(make_decoder(charset)?.decode(bytes, true))
}

/// Converts raw header bytes to text.
///
/// Valid UTF-8 is taken as-is. Anything else is decoded with `fallback`, or
/// with windows-1252 when no fallback is given, since it accepts every byte.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCharset`] if the fallback label is needed and
/// not recognized.
pub fn convert_8bit(bytes: &[u8], fallback: Option<&str>) -> Result<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }
    match fallback {
        Some(charset) => decode_bytes(bytes, charset),
        None => Ok(encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()),
    }
}

fn resolve_alias(charset: &str) -> String {
    let label = charset.trim().to_ascii_lowercase();
    CHARSET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == label)
        .map_or(label, |(_, target)| (*target).to_string())
}

fn decode_standard(decoder: &mut encoding_rs::Decoder, chunk: &[u8], last: bool) -> String {
    let mut out = String::new();
    let mut src = chunk;
    loop {
        let needed = decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 16);
        out.reserve(needed);
        let (result, read, _) = decoder.decode_to_string(src, &mut out, last);
        src = &src[read..];
        if result == CoderResult::InputEmpty {
            return out;
        }
    }
}

fn collect_then(
    collected: &mut String,
    chunk: &[u8],
    final_chunk: bool,
    transform: fn(&str) -> String,
) -> String {
    // UTF-7 is 7-bit; a stray 8-bit byte maps to its Latin-1 code point.
    collected.extend(chunk.iter().map(|&b| char::from(b)));
    if final_chunk {
        transform(&std::mem::take(collected))
    } else {
        String::new()
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
    fn test_standard_decoder_streams() {
        let mut decoder = make_decoder("UTF-8").unwrap();
        // "é" split across chunks
        let mut out = decoder.decode(b"caf\xC3", false);
        out.push_str(&decoder.decode(b"\xA9!", false));
        out.push_str(&decoder.decode(b"", true));
        assert_eq!(out, "café!");
    }

    #[test]
    fn test_latin1() {
        assert_eq!(decode_bytes(b"caf\xE9", "iso-8859-1").unwrap(), "café");
    }

    #[test]
    fn test_shift_jis_alias() {
        // "日本" in Shift_JIS
        let bytes = b"\x93\xfa\x96\x7b";
        assert_eq!(decode_bytes(bytes, "cp932").unwrap(), "日本");
        assert_eq!(decode_bytes(bytes, "Shift_JIS").unwrap(), "日本");
    }

    #[test]
    fn test_utf7_buffers_until_final() {
        let mut decoder = make_decoder("utf-7").unwrap();
        assert_eq!(decoder.decode(b"Hi +Jj", false), "");
        assert_eq!(decoder.decode(b"o-!", false), "");
        assert_eq!(decoder.decode(b"", true), "Hi \u{263A}!");
    }

    #[test]
    fn test_utf7_imap_alias() {
        let mut decoder = make_decoder("X-IMAP4-Modified-UTF7").unwrap();
        assert!(matches!(decoder, CharsetDecoder::Utf7Imap(_)));
        assert_eq!(decoder.decode(b"&ZeVnLIqe-", true), "日本語");
    }

    #[test]
    fn test_unknown_charset() {
        assert!(matches!(
            make_decoder("x-no-such-charset"),
            Err(Error::UnsupportedCharset(name)) if name == "x-no-such-charset"
        ));
        assert!(!is_supported("x-no-such-charset"));
        assert!(is_supported("utf-7"));
    }

    #[test]
    fn test_convert_8bit() {
        assert_eq!(convert_8bit("héllo".as_bytes(), None).unwrap(), "héllo");
        assert_eq!(convert_8bit(b"h\xE9llo", None).unwrap(), "héllo");
        assert_eq!(convert_8bit(b"h\xE9llo", Some("iso-8859-1")).unwrap(), "héllo");
        assert!(convert_8bit(b"h\xE9llo", Some("bogus")).is_err());
    }
}
