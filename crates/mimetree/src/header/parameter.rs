//! Parameter headers: `value; attr=value; attr="quoted value"`.
//!
//! Covers Content-Type, Content-Disposition, and friends, including RFC 2231
//! continuations (`attr*0=`, `attr*1=`) and charset-tagged values
//! (`attr*=utf-8'en'%E2%82%AC`).

use std::collections::{HashMap, HashSet};

use percent_encoding::percent_decode_str;

use super::rfc2047::decode_rfc2047_words;
use crate::charset;

/// A parsed parameter header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParameterHeader {
    /// Text before the first `;` (e.g. `text/plain`, `attachment`).
    pub value: String,
    /// Parameters by lower-cased name, in order of first appearance.
    pub params: Vec<(String, String)>,
}

impl ParameterHeader {
    /// Looks up a parameter by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// One `attr=value` pair as written.
struct RawParam {
    name: String,
    value: String,
}

/// One RFC 2231 section of a split parameter.
struct Section {
    index: u32,
    value: String,
    encoded: bool,
}

/// Parses a parameter header.
///
/// Parameters without `=` are skipped. When `decode_2231` is off, names such
/// as `filename*0` are kept verbatim.
#[must_use]
pub fn parse_parameter_header(text: &str, decode_2047: bool, decode_2231: bool) -> ParameterHeader {
    let (value, rest) = text.split_once(';').unwrap_or((text, ""));
    let raw = split_params(rest);

    let params = if decode_2231 {
        combine_2231(raw, decode_2047)
    } else {
        let mut seen = HashSet::new();
        let mut params: Vec<(String, String)> = Vec::new();
        for RawParam { name, value } in raw {
            if !seen.insert(name.clone()) {
                continue;
            }
            let value = if decode_2047 { decode_rfc2047_words(&value) } else { value };
            params.push((name, value));
        }
        params
    };

    ParameterHeader {
        value: value.trim().to_string(),
        params,
    }
}

/// Returns one parameter of a header value, or an empty string.
///
/// The value is unfolded and parsed with both RFC 2047 and RFC 2231 decoding.
/// Anything before the first `;` is not a parameter.
#[must_use]
pub fn get_parameter(header_value: &str, name: &str) -> String {
    let unfolded = unfold(header_value);
    let parsed = parse_parameter_header(&format!(";{unfolded}"), true, true);
    parsed.get(name).unwrap_or_default().to_string()
}

fn unfold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' || c == '\n' {
            while chars.peek().is_some_and(|&n| n == '\r' || n == '\n') {
                chars.next();
            }
            if chars.peek().is_some_and(|&n| n == ' ' || n == '\t') {
                while chars.peek().is_some_and(|&n| n == ' ' || n == '\t') {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn split_params(text: &str) -> Vec<RawParam> {
    let mut params = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.peek().is_some_and(|&c| c == ';' || c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            name.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            // no '=' before ';' or end: not a parameter
            continue;
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    _ => value.push(c),
                }
            }
            // junk between the closing quote and the next ';'
            while chars.peek().is_some_and(|&c| c != ';') {
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ';' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim_end().to_string();
        }

        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        params.push(RawParam { name, value });
    }

    params
}

/// Everything seen for one base parameter name.
struct Group {
    name: String,
    /// First value given without a section number.
    plain: Option<String>,
    sections: Vec<Section>,
}

fn combine_2231(raw: Vec<RawParam>, decode_2047: bool) -> Vec<(String, String)> {
    // Groups in first-seen order, indexed by base name
    let mut groups: Vec<Group> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for RawParam { name, value } in raw {
        let (base, section) = split_section(&name);
        let i = *by_name.entry(base.to_string()).or_insert_with(|| {
            groups.push(Group {
                name: base.to_string(),
                plain: None,
                sections: Vec::new(),
            });
            groups.len() - 1
        });
        let Some(group) = groups.get_mut(i) else {
            continue;
        };
        match section {
            None => {
                group.plain.get_or_insert(value);
            }
            Some((index, encoded)) => group.sections.push(Section { index, value, encoded }),
        }
    }

    groups
        .into_iter()
        .filter_map(|Group { name, plain, sections }| {
            let value = join_sections(sections).or_else(|| {
                plain.map(|v| if decode_2047 { decode_rfc2047_words(&v) } else { v })
            })?;
            Some((name, value))
        })
        .collect()
}

/// Splits `name*N*` into `("name", Some((N, true)))`; `name*` is section 0.
fn split_section(name: &str) -> (&str, Option<(u32, bool)>) {
    let (name, encoded) = match name.strip_suffix('*') {
        Some(stripped) => (stripped, true),
        None => (name, false),
    };

    if let Some((base, index)) = name
        .rsplit_once('*')
        .and_then(|(base, index)| Some((base, index.parse::<u32>().ok()?)))
    {
        return (base, Some((index, encoded)));
    }

    if encoded {
        (name, Some((0, true)))
    } else {
        (name, None)
    }
}

fn join_sections(mut sections: Vec<Section>) -> Option<String> {
    // Stable sort, so the first declaration of a repeated section wins
    sections.sort_by_key(|s| s.index);
    sections.dedup_by_key(|s| s.index);
    if sections.first()?.index != 0 {
        return None;
    }

    let mut charset_label = String::new();
    let mut bytes = Vec::new();
    for (expected, section) in (0..).zip(sections.iter()) {
        // sections must be contiguous from 0
        if section.index != expected {
            break;
        }
        let mut value = section.value.as_str();
        if section.encoded && section.index == 0 {
            // charset'language'value
            let mut pieces = value.splitn(3, '\'');
            if let (Some(cs), Some(_lang), Some(rest)) = (pieces.next(), pieces.next(), pieces.next())
            {
                charset_label = cs.to_string();
                value = rest;
            }
        }
        if section.encoded {
            bytes.extend(percent_decode_str(value));
        } else {
            bytes.extend_from_slice(value.as_bytes());
        }
    }

    let text = if charset_label.is_empty() {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        charset::decode_bytes(&bytes, &charset_label)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned())
    };
    Some(text)
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
    fn test_simple_parameters() {
        let parsed = parse_parameter_header("text/plain; charset=UTF-8; format=flowed", false, false);
        assert_eq!(parsed.value, "text/plain");
        assert_eq!(parsed.get("charset"), Some("UTF-8"));
        assert_eq!(parsed.get("FORMAT"), Some("flowed"));
    }

    #[test]
    fn test_quoted_values() {
        let parsed = parse_parameter_header(
            r#"attachment; filename="semi;colon \"quoted\".txt"; size=12"#,
            false,
            false,
        );
        assert_eq!(parsed.value, "attachment");
        assert_eq!(parsed.get("filename"), Some(r#"semi;colon "quoted".txt"#));
        assert_eq!(parsed.get("size"), Some("12"));
    }

    #[test]
    fn test_malformed_parameters_skipped() {
        let parsed = parse_parameter_header("text/plain; junk; charset=us-ascii;; =x", false, false);
        assert_eq!(parsed.params, vec![("charset".to_string(), "us-ascii".to_string())]);
    }

    #[test]
    fn test_rfc2231_charset_and_language() {
        let parsed = parse_parameter_header(
            "attachment; filename*=iso-8859-1'en'%A3%20rates.txt",
            false,
            true,
        );
        assert_eq!(parsed.get("filename"), Some("£ rates.txt"));
    }

    #[test]
    fn test_rfc2231_continuations() {
        let parsed = parse_parameter_header(
            concat!(
                "message/external-body; access-type=URL;",
                " URL*0=\"ftp://\"; URL*1=\"cs.utk.edu/pub/moore/bulk-mailer/bulk-mailer.tar\""
            ),
            false,
            true,
        );
        assert_eq!(
            parsed.get("url"),
            Some("ftp://cs.utk.edu/pub/moore/bulk-mailer/bulk-mailer.tar")
        );
        assert_eq!(parsed.get("access-type"), Some("URL"));
    }

    #[test]
    fn test_rfc2231_mixed_encoded_sections() {
        let parsed = parse_parameter_header(
            "; title*0*=us-ascii'en'This%20is%20even%20more%20; title*1*=%2A%2A%2Afun%2A%2A%2A%20; title*2=\"isn't it!\"",
            false,
            true,
        );
        assert_eq!(parsed.get("title"), Some("This is even more ***fun*** isn't it!"));
    }

    #[test]
    fn test_rfc2231_beats_plain_value() {
        let parsed = parse_parameter_header(
            "attachment; filename=fallback.txt; filename*=utf-8''%E2%82%AC.txt",
            false,
            true,
        );
        assert_eq!(parsed.get("filename"), Some("€.txt"));
        assert_eq!(parsed.params.len(), 1);
    }

    #[test]
    fn test_rfc2231_disabled_keeps_names() {
        let parsed = parse_parameter_header("x; name*0=a; name*1=b", false, false);
        assert_eq!(parsed.get("name*0"), Some("a"));
        assert_eq!(parsed.get("name"), None);
    }

    #[test]
    fn test_rfc2047_in_parameter() {
        let parsed = parse_parameter_header(
            "attachment; filename=\"=?UTF-8?B?0J/RgNC40LLQtdGCLnR4dA==?=\"",
            true,
            true,
        );
        assert_eq!(parsed.get("filename"), Some("Привет.txt"));
    }

    #[test]
    fn test_get_parameter() {
        assert_eq!(
            get_parameter("attachment;\r\n filename=\"test.png\"", "FileName"),
            "test.png"
        );
        assert_eq!(get_parameter("multipart/signed; protocol=\"xyz\"", "protocol"), "xyz");
        assert_eq!(get_parameter("inline", "filename"), "");
    }

    #[test]
    fn test_many_distinct_parameters() {
        let text: String = std::iter::once("text/plain".to_string())
            .chain((0..20_000).map(|i| format!("; p{i}={i}")))
            .collect();
        for decode_2231 in [false, true] {
            let parsed = parse_parameter_header(&text, false, decode_2231);
            assert_eq!(parsed.params.len(), 20_000);
            assert_eq!(parsed.params[7_777], ("p7777".to_string(), "7777".to_string()));
            assert_eq!(parsed.get("p19999"), Some("19999"));
        }
    }

    #[test]
    fn test_many_sections_in_reverse() {
        let text: String = std::iter::once("attachment".to_string())
            .chain((0..10_000u32).rev().map(|i| format!("; name*{i}={}", i % 10)))
            .collect();
        let parsed = parse_parameter_header(&text, false, true);
        let expected: String = (0..10_000u32).filter_map(|i| char::from_digit(i % 10, 10)).collect();
        assert_eq!(parsed.get("name"), Some(expected.as_str()));
    }

    #[test]
    fn test_repeated_section_keeps_first() {
        let parsed = parse_parameter_header("a; n*0=x; n*1=y; n*1=z; n=plain", false, true);
        assert_eq!(parsed.get("n"), Some("xy"));
    }

    proptest! {
        #[test]
        fn continuations_join_in_numeric_order(
            (pieces, order) in proptest::collection::vec("[a-z]{1,6}", 1..8).prop_flat_map(|pieces| {
                let order: Vec<usize> = (0..pieces.len()).collect();
                (Just(pieces), Just(order).prop_shuffle())
            }),
        ) {
            let header: String = order
                .iter()
                .map(|&i| format!("; name*{i}=\"{}\"", pieces[i]))
                .collect();
            let parsed = parse_parameter_header(&format!("attachment{header}"), false, true);
            let expected = pieces.concat();
            prop_assert_eq!(parsed.get("name"), Some(expected.as_str()));
        }
    }
}
