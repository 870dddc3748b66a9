//! The tokenizer must report the same structure and data however the input
//! is split into chunks.

use mimetree::tokenizer::{CollectingHandler, MimeTokenizer, PartEvent, TokenizerOptions, parse};
use proptest::prelude::*;

const MESSAGE: &[u8] = b"From: sender@example.com\r\n\
Subject: =?UTF-8?Q?chunk=C3=A9d?=\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
preamble\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=E9 au lait, tr=\r\n\
=E8s bien\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-7\r\n\
\r\n\
Hi Mom -+Jjo--!\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAECAwQFBgcICQoLDA0O\r\n\
DxAREhMU\r\n\
--outer\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
\xe6\x97\xa5\xe6\x9c\xac\xe8\xaa\x9e\r\n\
--outer--\r\n\
epilogue\r\n";

/// What a handler saw, with data chunks merged per part.
#[derive(Debug, PartialEq, Eq)]
struct Summary {
    ids: Vec<String>,
    bytes: Vec<Vec<u8>>,
    text: Vec<String>,
    ends: Vec<String>,
}

fn summarize(handler: &CollectingHandler) -> Summary {
    let ids: Vec<String> = handler.part_ids().into_iter().map(str::to_string).collect();
    Summary {
        bytes: ids.iter().map(|id| handler.bytes(id)).collect(),
        text: ids.iter().map(|id| handler.text(id)).collect(),
        ends: handler
            .events
            .iter()
            .filter_map(|e| match e {
                PartEvent::EndPart(part) => Some(part.clone()),
                _ => None,
            })
            .collect(),
        ids,
    }
}

fn chunked(input: &[u8], mut cuts: Vec<usize>) -> CollectingHandler {
    cuts.sort_unstable();
    cuts.dedup();
    let mut tokenizer = MimeTokenizer::new(CollectingHandler::new(), TokenizerOptions::default());
    let mut start = 0;
    for cut in cuts {
        let cut = cut.min(input.len());
        tokenizer.feed(&input[start..cut]);
        start = cut;
    }
    tokenizer.feed(&input[start..]);
    tokenizer.finish()
}

#[test]
fn test_whole_message_reference() {
    let handler = parse(MESSAGE, CollectingHandler::new(), TokenizerOptions::default());
    let summary = summarize(&handler);
    assert_eq!(summary.ids, ["", "1", "1.1", "1.2", "2", "3"]);
    assert_eq!(handler.text("1.1"), "café au lait, très bien");
    assert_eq!(handler.text("1.2"), "Hi Mom -\u{263A}-!");
    assert_eq!(handler.bytes("2"), (0u8..=20).collect::<Vec<u8>>());
    assert_eq!(handler.text("3"), "日本語");
    assert_eq!(summary.ends, ["1.1", "1.2", "1", "2", "3", ""]);
}

#[test]
fn test_byte_at_a_time() {
    let reference = summarize(&parse(MESSAGE, CollectingHandler::new(), TokenizerOptions::default()));
    let cuts: Vec<usize> = (1..MESSAGE.len()).collect();
    assert_eq!(summarize(&chunked(MESSAGE, cuts)), reference);
}

proptest! {
    #[test]
    fn prop_chunking_does_not_change_events(cuts in prop::collection::vec(0..MESSAGE.len(), 0..24)) {
        let reference = summarize(&parse(MESSAGE, CollectingHandler::new(), TokenizerOptions::default()));
        prop_assert_eq!(summarize(&chunked(MESSAGE, cuts)), reference);
    }

    #[test]
    fn prop_arbitrary_input_never_panics(input in prop::collection::vec(any::<u8>(), 0..512), cut in 0usize..512) {
        let cut = cut.min(input.len());
        let mut tokenizer = MimeTokenizer::new(CollectingHandler::new(), TokenizerOptions::default());
        tokenizer.feed(&input[..cut]);
        tokenizer.feed(&input[cut..]);
        let handler = tokenizer.finish();
        prop_assert_eq!(handler.events.last(), Some(&PartEvent::EndMessage));
    }
}
