//! UTF-7 (RFC 2152) and modified UTF-7 for IMAP (RFC 3501).
//!
//! Both forms shift into a base64 run of UTF-16BE code units. A run can span
//! any number of input chunks, so these functions only work on complete text;
//! see [`CharsetDecoder`](super::CharsetDecoder) for the buffering wrapper.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

const RUN_CONFIG: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const UTF7_ENGINE: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, RUN_CONFIG);
const IMAP_ENGINE: GeneralPurpose = GeneralPurpose::new(&alphabet::IMAP_MUTF7, RUN_CONFIG);

/// Decodes RFC 2152 UTF-7 (`+...-` shift sequences).
#[must_use]
pub fn decode_utf7(input: &str) -> String {
    decode_shifted(input, '+', &UTF7_ENGINE, |c| {
        c.is_ascii_alphanumeric() || c == '+' || c == '/'
    })
}

/// Decodes RFC 3501 modified UTF-7 (`&...-` shift sequences, `,` for `/`).
#[must_use]
pub fn decode_utf7_imap(input: &str) -> String {
    decode_shifted(input, '&', &IMAP_ENGINE, |c| {
        c.is_ascii_alphanumeric() || c == '+' || c == ','
    })
}

fn decode_shifted(
    input: &str,
    shift: char,
    engine: &GeneralPurpose,
    in_run: impl Fn(char) -> bool,
) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != shift {
            out.push(c);
            continue;
        }

        let mut run = String::new();
        while let Some(&next) = chars.peek() {
            if !in_run(next) {
                break;
            }
            run.push(next);
            chars.next();
        }

        // An explicit '-' ends the run and is absorbed; anything else ends it
        // implicitly and is kept as literal text.
        if chars.peek() == Some(&'-') {
            chars.next();
        }

        if run.is_empty() {
            // "+-" / "&-"
            out.push(shift);
        } else {
            push_utf16_run(&mut out, &run, engine);
        }
    }

    out
}

fn push_utf16_run(out: &mut String, run: &str, engine: &GeneralPurpose) {
    let mut run = run.as_bytes();
    // A single leftover sextet can't hold a byte.
    if run.len() % 4 == 1 {
        run = &run[..run.len() - 1];
    }

    let bytes = match engine.decode(run) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::trace!(error = %e, "undecodable UTF-7 shift sequence");
            out.push(char::REPLACEMENT_CHARACTER);
            return;
        }
    };

    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    out.extend(char::decode_utf16(units).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)));
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
    use proptest::prelude::*;

    #[test]
    fn test_rfc2152_examples() {
        assert_eq!(decode_utf7("A+ImIDkQ."), "A\u{2262}\u{391}.");
        assert_eq!(decode_utf7("Hi Mom -+Jjo--!"), "Hi Mom -\u{263A}-!");
        assert_eq!(decode_utf7("+ZeVnLIqe-"), "日本語");
    }

    #[test]
    fn test_utf7_literal_plus() {
        assert_eq!(decode_utf7("1 +- 1 = 2"), "1 + 1 = 2");
    }

    #[test]
    fn test_utf7_implicit_termination() {
        assert_eq!(decode_utf7("+AGEAYgBj rest"), "abc rest");
    }

    #[test]
    fn test_rfc3501_examples() {
        assert_eq!(
            decode_utf7_imap("~peter/mail/&U,BTFw-/&ZeVnLIqe-"),
            "~peter/mail/台北/日本語"
        );
        assert_eq!(decode_utf7_imap("&Jjo-!"), "\u{263A}!");
    }

    #[test]
    fn test_imap_literal_ampersand() {
        assert_eq!(decode_utf7_imap("Tom &- Jerry"), "Tom & Jerry");
    }

    proptest! {
        #[test]
        fn plain_ascii_is_unchanged(s in "[a-zA-Z0-9 .,:;!?()/=_-]{0,64}") {
            prop_assert_eq!(decode_utf7(&s), s.clone());
            prop_assert_eq!(decode_utf7_imap(&s), s);
        }
    }
}
