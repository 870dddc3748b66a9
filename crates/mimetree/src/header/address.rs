//! RFC 5322 section 3.4 address lists (From, To, Cc, ...).
//!
//! The parser is forgiving: missing angle brackets, old-style
//! `addr (Name)` comments, and unterminated quotes are accepted. Groups are
//! flattened into their member mailboxes.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use super::rfc2047::decode_rfc2047_words;

/// A single mailbox: display name and address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Mailbox {
    /// Display name, empty if none was given.
    pub name: String,
    /// Address as written (`local@domain`), case preserved.
    pub email: String,
}

impl Mailbox {
    /// Creates a mailbox.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.email)
        } else {
            write!(f, "\"{}\" <{}>", self.name.replace('"', "\\\""), self.email)
        }
    }
}

/// Text collected for the mailbox currently being parsed.
#[derive(Default)]
struct Pending {
    /// Display phrase with runs of whitespace collapsed to one space.
    display: String,
    /// Same text with whitespace removed, for bare `local@domain` addresses.
    bare: String,
    space: bool,
    angle: Option<String>,
    comment: Option<String>,
}

impl Pending {
    fn push_str(&mut self, s: &str, quoted: bool) {
        if self.space && !self.display.is_empty() {
            self.display.push(' ');
        }
        self.space = false;
        self.display.push_str(s);
        if quoted {
            self.bare.push('"');
            self.bare.push_str(s);
            self.bare.push('"');
        } else {
            self.bare.push_str(s);
        }
    }

    fn take(&mut self, decode_2047: bool) -> Option<Mailbox> {
        let Self {
            display,
            bare,
            angle,
            comment,
            ..
        } = std::mem::take(self);
        let display = display.trim().to_string();

        let (name, email) = if let Some(addr) = angle {
            let name = if display.is_empty() { comment.unwrap_or_default() } else { display };
            (name, strip_route(addr.trim()).to_string())
        } else if bare.is_empty() {
            return None;
        } else {
            match display.rsplit_once(' ') {
                // "Name addr@example.com" without brackets
                Some((name, addr)) if addr.contains('@') => (name.to_string(), addr.to_string()),
                _ => (comment.unwrap_or_default(), bare),
            }
        };

        let name = if decode_2047 { decode_rfc2047_words(&name) } else { name };
        Some(Mailbox { name, email })
    }
}

/// Parses an address list header value.
///
/// Each mailbox yields a display name (RFC 2047-decoded if `decode_2047`) and
/// an address. Empty entries are skipped.
#[must_use]
pub fn parse_address_list(text: &str, decode_2047: bool) -> Vec<Mailbox> {
    let mut out = Vec::new();
    let mut pending = Pending::default();
    let mut in_group = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let quoted = read_quoted(&mut chars);
                pending.push_str(&quoted, true);
            }
            '(' => {
                let comment = read_comment(&mut chars);
                pending.space = true;
                if pending.comment.is_none() && !comment.trim().is_empty() {
                    pending.comment = Some(comment.trim().to_string());
                }
            }
            '<' => {
                let addr = read_until(&mut chars, '>');
                pending.angle = Some(addr);
            }
            ',' => out.extend(pending.take(decode_2047)),
            ':' if !in_group && pending.angle.is_none() => {
                // group name; members follow
                pending = Pending::default();
                in_group = true;
            }
            ';' if in_group => {
                out.extend(pending.take(decode_2047));
                in_group = false;
            }
            c if c.is_whitespace() => pending.space = true,
            _ => pending.push_str(c.encode_utf8(&mut [0; 4]), false),
        }
    }

    out.extend(pending.take(decode_2047));
    out
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn read_comment(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut out = String::new();
    let mut depth = 1;
    while let Some(c) = chars.next() {
        match c {
            '(' => {
                depth += 1;
                out.push(c);
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                out.push(c);
            }
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn read_until(chars: &mut Peekable<Chars<'_>>, end: char) -> String {
    let mut out = String::new();
    for c in chars.by_ref() {
        if c == end {
            break;
        }
        out.push(c);
    }
    out
}

/// Drops an obsolete source route: `@a.example,@b.example:joe@c.example`.
fn strip_route(addr: &str) -> &str {
    if addr.starts_with('@') {
        addr.rsplit_once(':').map_or(addr, |(_, rest)| rest)
    } else {
        addr
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
    fn test_bare_address() {
        assert_eq!(
            parse_address_list("joe@example.com", false),
            vec![Mailbox::new("", "joe@example.com")]
        );
    }

    #[test]
    fn test_name_and_angle_address() {
        assert_eq!(
            parse_address_list("Joe Q. Public <john.q.public@example.com>", false),
            vec![Mailbox::new("Joe Q. Public", "john.q.public@example.com")]
        );
    }

    #[test]
    fn test_list_with_quoted_comma() {
        let list = parse_address_list(
            "\"Doe, John\" <john@example.com>, Mary Smith <mary@x.test>,  , jdoe@one.test",
            false,
        );
        assert_eq!(
            list,
            vec![
                Mailbox::new("Doe, John", "john@example.com"),
                Mailbox::new("Mary Smith", "mary@x.test"),
                Mailbox::new("", "jdoe@one.test"),
            ]
        );
    }

    #[test]
    fn test_groups_are_flattened() {
        let list = parse_address_list(
            "A Group:Ed Jones <c@a.test>,joe@where.test,John <jdoe@one.test>;, Mary <mary@x.test>",
            false,
        );
        let emails: Vec<&str> = list.iter().map(|m| m.email.as_str()).collect();
        assert_eq!(emails, vec!["c@a.test", "joe@where.test", "jdoe@one.test", "mary@x.test"]);
        assert_eq!(list[0].name, "Ed Jones");
    }

    #[test]
    fn test_empty_group() {
        assert!(parse_address_list("undisclosed-recipients:;", false).is_empty());
    }

    #[test]
    fn test_comment_as_name() {
        assert_eq!(
            parse_address_list("joe@example.com (Joe Bloggs)", false),
            vec![Mailbox::new("Joe Bloggs", "joe@example.com")]
        );
    }

    #[test]
    fn test_missing_angle_brackets() {
        assert_eq!(
            parse_address_list("Joe Bloggs joe@example.com", false),
            vec![Mailbox::new("Joe Bloggs", "joe@example.com")]
        );
    }

    #[test]
    fn test_case_preserved() {
        assert_eq!(parse_address_list("<Joe@Example.COM>", false)[0].email, "Joe@Example.COM");
    }

    #[test]
    fn test_encoded_display_name() {
        let list = parse_address_list("=?UTF-8?Q?Andr=C3=A9?= <andre@example.com>", true);
        assert_eq!(list, vec![Mailbox::new("André", "andre@example.com")]);

        let raw = parse_address_list("=?UTF-8?Q?Andr=C3=A9?= <andre@example.com>", false);
        assert_eq!(raw[0].name, "=?UTF-8?Q?Andr=C3=A9?=");
    }

    #[test]
    fn test_source_route() {
        assert_eq!(
            parse_address_list("<@a.test,@b.test:joe@c.test>", false)[0].email,
            "joe@c.test"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Mailbox::new("", "a@b.c").to_string(), "a@b.c");
        assert_eq!(Mailbox::new("A \"B\"", "a@b.c").to_string(), "\"A \\\"B\\\"\" <a@b.c>");
    }
}
