//! Integration tests for message extraction and the `Mail` summary.
//!
//! Each test feeds a small inline message through the public entry points.

use mimetree::header::{HeaderRegistry, StructuredValue};
use mimetree::{Error, Extraction, MimeTree, Part, PartKind, ParseOptions, extract_mime_msg, parse_mail};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tree(input: &str) -> MimeTree {
    init_tracing();
    match extract_mime_msg(input, &ParseOptions::default()).unwrap() {
        Some(Extraction::Tree(tree)) => tree,
        other => panic!("expected a tree, got {other:?}"),
    }
}

const MIXED_BODIES: &str = "From: sender@example.com\r\n\
To: recipient@example.com\r\n\
Subject: bodies\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XXXX\"\r\n\
\r\n\
This is a multi-part message in MIME format.\r\n\
--XXXX\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Hello</p>\r\n\
--XXXX\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
first plain\r\n\
--XXXX\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
second plain\r\n\
--XXXX--\r\n";

const WITH_ATTACHMENT: &str = "From: sender@example.com\r\n\
Subject: picture\r\n\
Content-Type: multipart/mixed; boundary=\"sep\"\r\n\
\r\n\
--sep\r\n\
Content-Type: text/plain\r\n\
\r\n\
See the picture.\r\n\
--sep\r\n\
Content-Type: image/png\r\n\
Content-Disposition: attachment; filename=\"test.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-ID: <part1@example.com>\r\n\
\r\n\
AQID\r\n\
--sep--\r\n";

const NESTED: &str = "Subject: nested\r\n\
Content-Type: multipart/mixed; boundary=outer\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain\r\n\
\r\n\
plain version\r\n\
--inner\r\n\
Content-Type: text/html\r\n\
\r\n\
<b>html version</b>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: text/enriched\r\n\
\r\n\
<bold>enriched</bold>\r\n\
--outer\r\n\
Content-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAEC\r\n\
AwQ=\r\n\
--outer--\r\n";

#[test]
fn test_html_and_two_plain_parts() {
    let mail = parse_mail(MIXED_BODIES);
    assert_eq!(mail.body.html, "<p>Hello</p>");
    assert_eq!(mail.body.text, "first plain\nsecond plain");
    assert!(mail.attachments.is_empty());
    assert_eq!(mail.subject.as_deref(), Some("bodies"));
}

#[test]
fn test_png_attachment() {
    let mail = parse_mail(WITH_ATTACHMENT);
    assert_eq!(mail.attachments.len(), 1);

    let attachment = &mail.attachments[0];
    assert_eq!(attachment.file_name, "test.png");
    assert_eq!(attachment.content_type, "image/png");
    assert_eq!(attachment.content_disposition.as_deref(), Some("attachment"));
    assert_eq!(attachment.content_id.as_deref(), Some("<part1@example.com>"));
    assert_eq!(attachment.content, [1, 2, 3]);
    assert_eq!(attachment.size, 3);

    assert_eq!(mail.body.text, "See the picture.");
    assert!(!mail.body.text.contains("AQID"));
}

#[test]
fn test_missing_content_type() {
    let mail = parse_mail("From: a@example.com\r\nSubject: plain\r\n\r\nJust text.\r\n");
    assert_eq!(mail.body.text, "Just text.\n");
    assert!(mail.attachments.is_empty());

    let tree = tree("Subject: plain\r\n\r\nJust text.\r\n");
    let top = &tree.root.parts[0];
    assert_eq!(top.content_type, "text/plain");
    assert_eq!(top.kind, PartKind::BodyText);
}

#[test]
fn test_empty_attachment() {
    let input = "Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=empty.bin\r\n\
\r\n\
--b--\r\n";
    let mail = parse_mail(input);
    assert_eq!(mail.attachments.len(), 1);
    assert_eq!(mail.attachments[0].file_name, "empty.bin");
    assert!(mail.attachments[0].content.is_empty());
    assert_eq!(mail.attachments[0].size, 0);
}

#[test]
fn test_encoded_word_subject() {
    let mail = parse_mail("Subject: =?UTF-8?B?8J+YgyBzbWlsZQ==?=\r\n\r\n");
    assert_eq!(mail.subject.as_deref(), Some("\u{1F603} smile"));
    // headers keep the raw value
    assert_eq!(mail.headers.get("subject"), Some("=?UTF-8?B?8J+YgyBzbWlsZQ==?="));
}

#[test]
fn test_custom_structured_decoder() {
    let mut registry = HeaderRegistry::new();
    registry
        .add_decoder("X-Count", |values| {
            let total: usize = values.iter().filter_map(|v| v.trim().parse::<usize>().ok()).sum();
            Ok(StructuredValue::Text(total.to_string()))
        })
        .unwrap();

    let headers = mimetree::extract_headers("X-Count: 2\r\nX-Count: 3\r\n\r\n");
    let values = headers.values("x-count").unwrap();
    assert_eq!(
        registry.decode("x-count", values).unwrap(),
        StructuredValue::Text("5".to_string())
    );

    let err = registry.add_decoder("From", |_| Ok(StructuredValue::Text(String::new())));
    assert!(matches!(err, Err(Error::InvalidArgument(_))));
}

/// Containers carry no data of their own, so their size is their children's.
fn check_sizes(part: &Part) {
    if part.kind == PartKind::Container {
        let children: usize = part.parts.iter().map(|p| p.size).sum();
        assert_eq!(part.size, children, "part {}", part.name);
    } else {
        assert!(part.parts.is_empty(), "leaf {} has children", part.name);
    }
    part.parts.iter().for_each(check_sizes);
}

#[test]
fn test_sizes_accumulate() {
    let tree = tree(NESTED);
    check_sizes(&tree.root);

    let leaves: usize = tree
        .root
        .walk()
        .filter(|p| p.parts.is_empty() && p.kind != PartKind::Container)
        .map(|p| p.size)
        .sum();
    assert_eq!(tree.root.size, leaves);
    assert_eq!(tree.root.find("1.3").unwrap().size, 5);
    assert_eq!(tree.root.find("1.1").unwrap().size, "plain version".len() + "<b>html version</b>".len());
}

#[test]
fn test_each_leaf_has_one_kind() {
    let tree = tree(NESTED);
    let kinds: Vec<(&str, PartKind)> = tree.root.walk().map(|p| (p.name.as_str(), p.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("", PartKind::Container),
            ("1", PartKind::Container),
            ("1.1", PartKind::Container),
            ("1.1.1", PartKind::BodyText),
            ("1.1.2", PartKind::BodyHtml),
            ("1.2", PartKind::Discarded),
            ("1.3", PartKind::Attachment),
        ]
    );
    assert_eq!(tree.body_parts.text, ["plain version"]);
    assert_eq!(tree.body_parts.html, ["<b>html version</b>"]);
    assert_eq!(tree.attachments[0].content, [0, 1, 2, 3, 4]);
    assert_eq!(tree.attachments[0].file_name, "");
}

#[test]
fn test_missing_close_delimiters() {
    let input = "Content-Type: multipart/mixed; boundary=a\r\n\
\r\n\
--a\r\n\
Content-Type: multipart/alternative; boundary=b\r\n\
\r\n\
--b\r\n\
\r\n\
inner text\r\n\
--a\r\n\
Content-Type: text/html\r\n\
\r\n\
<i>tail</i>\r\n";
    let tree = tree(input);
    let names: Vec<&str> = tree.root.walk().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["", "1", "1.1", "1.1.1", "1.2"]);
    assert_eq!(tree.body_parts.text, ["inner text"]);
    assert_eq!(tree.body_parts.html, ["<i>tail</i>\r\n"]);
}

#[test]
fn test_html_parts_joined_with_break() {
    let input = "Content-Type: multipart/mixed; boundary=z\n\n--z\nContent-Type: text/html\n\n<p>a</p>\r\n<p>b</p>\n--z\nContent-Type: text/html\n\n<p>c</p>\n--z--\n";
    let mail = parse_mail(input);
    assert_eq!(mail.body.html, "<p>a</p>\n<p>b</p><br>\n<p>c</p>");
}

#[test]
fn test_shift_jis_body() {
    let mut input = b"Content-Type: text/plain; charset=cp932\r\nContent-Transfer-Encoding: 8bit\r\n\r\n".to_vec();
    input.extend_from_slice(b"\x93\xfa\x96\x7b\r\n");
    let mail = parse_mail(&input);
    assert_eq!(mail.body.text, "\u{65E5}\u{672C}\n");
}

#[test]
fn test_quoted_printable_latin1_body() {
    let input = "Content-Type: text/plain; charset=ISO-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Gr=FC=DFe aus K=F6ln, und ein sehr langer Satz der umbrochen werden mu=\r\n\
=DF.\r\n";
    let mail = parse_mail(input);
    assert_eq!(
        mail.body.text,
        "Grüße aus Köln, und ein sehr langer Satz der umbrochen werden muß.\n"
    );
}

#[test]
fn test_rfc2231_attachment_name() {
    let input = "Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment;\r\n\
 filename*0*=utf-8''R%C3%A9sum;\r\n\
 filename*1*=%C3%A9.pdf\r\n\
\r\n\
%PDF\r\n\
--b--\r\n";
    let mail = parse_mail(input);
    assert_eq!(mail.attachments[0].file_name, "Résumé.pdf");
}

#[test]
fn test_exclude_attachments() {
    let options = ParseOptions::builder().include_attachments(false).build().unwrap();
    let Some(Extraction::Tree(tree)) = extract_mime_msg(WITH_ATTACHMENT, &options).unwrap() else {
        panic!("expected tree");
    };
    assert!(tree.attachments.is_empty());
    assert_eq!(tree.body_parts.text, ["See the picture."]);
}

#[test]
fn test_get_single_part() {
    let options = ParseOptions::builder().mime_part("1.2").build().unwrap();
    let Some(Extraction::Part(part)) = extract_mime_msg(WITH_ATTACHMENT, &options).unwrap() else {
        panic!("expected part");
    };
    assert_eq!(part.name, "1.2");
    assert_eq!(part.content_type, "image/png");
    assert_eq!(part.bytes, [1, 2, 3]);
    assert_eq!(part.file_name.as_deref(), Some("test.png"));
}

#[test]
fn test_addresses_and_reply_to() {
    let input = "From: =?ISO-8859-1?Q?Andr=E9?= <andre@example.com>\r\n\
Reply-To: list@example.com\r\n\
To: \"Doe, Jane\" <jane@example.com>, team: a@example.com, b@example.com;\r\n\
Cc: c@example.com\r\n\
In-Reply-To: <parent@example.com>\r\n\
\r\n";
    let mail = parse_mail(input);
    let from = mail.from.unwrap();
    assert_eq!(from.name, "André");
    assert_eq!(from.email, "andre@example.com");
    assert_eq!(mail.reply_to.unwrap().email, "list@example.com");
    let to: Vec<&str> = mail.to.iter().map(|m| m.email.as_str()).collect();
    assert_eq!(to, ["jane@example.com", "a@example.com", "b@example.com"]);
    assert_eq!(mail.to[0].name, "Doe, Jane");
    assert_eq!(mail.cc.len(), 1);
    assert!(mail.bcc.is_empty());
    assert_eq!(mail.in_reply_to.as_deref(), Some("<parent@example.com>"));
}

#[test]
fn test_large_header_block() {
    let mut input: String = (0..20_000).map(|i| format!("X-H{i:07}: v{i}\r\n")).collect();
    input.push_str("Subject: last\r\n\r\nbody\r\n");
    let mail = parse_mail(&input);
    assert_eq!(mail.headers.len(), 20_001);
    assert_eq!(mail.headers.get("x-h0015000"), Some("v15000"));
    assert_eq!(mail.subject.as_deref(), Some("last"));
    assert_eq!(mail.body.text, "body\n");
}
