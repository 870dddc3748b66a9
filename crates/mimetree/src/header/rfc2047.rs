//! RFC 2047 encoded words (`=?charset?B|Q?text?=`).

use crate::charset;
use crate::encoding::{decode_base64_lenient, decode_q};

/// One parsed encoded word.
struct EncodedWord<'a> {
    charset: &'a str,
    bytes: Vec<u8>,
    /// Length of the whole `=?...?=` token.
    len: usize,
}

/// Decodes every encoded word in `text`, keeping the surrounding literal text.
///
/// Whitespace between two adjacent encoded words is dropped. Adjacent words in
/// the same charset are decoded together, so a multi-byte character split
/// across words survives. Words that don't parse, or name a charset we can't
/// decode, are left as literal text.
#[must_use]
pub fn decode_rfc2047_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Undecoded bytes of the previous word(s) and their charset.
    let mut pending: Option<(String, Vec<u8>)> = None;
    // Set right after a decoded word.
    let mut gap_start: Option<usize> = None;
    let mut pos = 0;

    while pos < text.len() {
        let Some(offset) = text[pos..].find("=?") else {
            break;
        };
        let start = pos + offset;
        let Some(word) = parse_word(&text[start..]) else {
            flush(&mut out, &mut pending);
            out.push_str(&text[pos..start + 2]);
            pos = start + 2;
            gap_start = None;
            continue;
        };

        let literal = &text[pos..start];
        let decodable = charset::is_supported(word.charset);
        // Only whitespace between two decoded words is dropped
        let adjacent = decodable && gap_start.is_some() && literal.chars().all(char::is_whitespace);
        if !adjacent {
            flush(&mut out, &mut pending);
            out.push_str(literal);
        }

        let same_charset = pending
            .as_ref()
            .is_some_and(|(cs, _)| cs.eq_ignore_ascii_case(word.charset));
        pos = start + word.len;
        if adjacent && same_charset {
            if let Some((_, bytes)) = pending.as_mut() {
                bytes.extend_from_slice(&word.bytes);
            }
            gap_start = Some(pos);
        } else if decodable {
            flush(&mut out, &mut pending);
            pending = Some((word.charset.to_string(), word.bytes));
            gap_start = Some(pos);
        } else {
            tracing::trace!(charset = word.charset, "leaving encoded word with unknown charset");
            flush(&mut out, &mut pending);
            out.push_str(&text[start..pos]);
            // literal text, so the following whitespace is kept
            gap_start = None;
        }
    }

    flush(&mut out, &mut pending);
    out.push_str(&text[pos..]);
    out
}

fn flush(out: &mut String, pending: &mut Option<(String, Vec<u8>)>) {
    if let Some((cs, bytes)) = pending.take() {
        match charset::decode_bytes(&bytes, &cs) {
            Ok(text) => out.push_str(&text),
            Err(_) => out.push_str(&String::from_utf8_lossy(&bytes)),
        }
    }
}

fn parse_word(s: &str) -> Option<EncodedWord<'_>> {
    let inner = s.strip_prefix("=?")?;
    let (charset, rest) = inner.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let payload = &rest[..end];

    if charset.is_empty() || payload.contains([' ', '\t', '\r', '\n']) {
        return None;
    }
    // RFC 2231 section 5 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding {
        "B" | "b" => decode_base64_lenient(payload.as_bytes()),
        "Q" | "q" => decode_q(payload.as_bytes()),
        _ => return None,
    };

    Some(EncodedWord {
        charset,
        bytes,
        len: 2 + (inner.len() - rest.len()) + end + 2,
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
    fn test_plain_text_unchanged() {
        assert_eq!(decode_rfc2047_words("Hello, World"), "Hello, World");
    }

    #[test]
    fn test_base64_word() {
        assert_eq!(decode_rfc2047_words("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_q_word_with_literal_text() {
        assert_eq!(
            decode_rfc2047_words("Re: =?ISO-8859-1?Q?Caf=E9?= tonight"),
            "Re: Café tonight"
        );
    }

    #[test]
    fn test_emoji() {
        assert_eq!(
            decode_rfc2047_words("=?UTF-8?B?8J+YgyBzbWlsZQ==?="),
            "\u{1F603} smile"
        );
    }

    #[test]
    fn test_adjacent_words_drop_whitespace() {
        assert_eq!(
            decode_rfc2047_words("=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="),
            "Hola mundo"
        );
    }

    #[test]
    fn test_split_multibyte_character() {
        // "é" = C3 A9, split over two words
        assert_eq!(decode_rfc2047_words("=?utf-8?Q?caf=C3?=\r\n =?utf-8?Q?=A9?="), "café");
    }

    #[test]
    fn test_malformed_words_are_literal() {
        assert_eq!(decode_rfc2047_words("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_rfc2047_words("a =? b"), "a =? b");
        assert_eq!(
            decode_rfc2047_words("=?x-unknown?Q?abc?= ok"),
            "=?x-unknown?Q?abc?= ok"
        );
    }

    #[test]
    fn test_unknown_charset_word_keeps_surrounding_space() {
        assert_eq!(
            decode_rfc2047_words("=?x-unknown?Q?abc?= =?utf-8?Q?d?="),
            "=?x-unknown?Q?abc?= d"
        );
        assert_eq!(
            decode_rfc2047_words("=?utf-8?Q?d?= =?x-unknown?Q?abc?= =?utf-8?Q?e?="),
            "d =?x-unknown?Q?abc?= e"
        );
    }

    #[test]
    fn test_language_suffix() {
        assert_eq!(decode_rfc2047_words("=?US-ASCII*EN?Q?Keith_Moore?="), "Keith Moore");
    }
}
