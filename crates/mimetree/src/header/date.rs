//! RFC 5322 date-time values (section 3.3).

use chrono::{DateTime, FixedOffset};

/// Parses a `Date:`-style header value.
///
/// Strict RFC 2822 syntax is tried first. After that the obsolete forms are
/// accepted: trailing comments such as `(PST)`, two-digit years, missing
/// seconds, and named zones (`GMT`, `EST`, ...). Returns `None` if nothing
/// matches.
#[must_use]
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .or_else(|| parse_obsolete(value))
}

fn parse_obsolete(value: &str) -> Option<DateTime<FixedOffset>> {
    let without_comments = strip_comments(value);
    // Day of week is optional and carries no information
    let rest = without_comments
        .split_once(',')
        .map_or(without_comments.as_str(), |(_, rest)| rest);

    let mut tokens: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    if tokens.len() < 4 {
        return None;
    }

    match tokens.last().and_then(|z| zone_offset(z)) {
        Some(offset) => {
            if let Some(last) = tokens.last_mut() {
                *last = offset;
            }
        }
        // No zone at all: RFC 5322 treats "-0000" as unknown local time
        None => tokens.push("-0000".to_string()),
    }

    if let Some(year) = tokens.get_mut(2) {
        *year = expand_year(year);
    }

    let normalized = tokens.join(" ");
    ["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z"]
        .iter()
        .find_map(|format| DateTime::parse_from_str(&normalized, format).ok())
}

fn strip_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    for c in value.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Maps a zone token to a numeric offset, `None` if it isn't a zone.
fn zone_offset(token: &str) -> Option<String> {
    if token.len() == 5 && token.starts_with(['+', '-']) {
        return Some(token.to_string());
    }
    let offset = match token.to_ascii_uppercase().as_str() {
        "GMT" | "UT" | "UTC" | "Z" => "+0000",
        "EST" => "-0500",
        "EDT" => "-0400",
        "CST" => "-0600",
        "CDT" => "-0500",
        "MST" => "-0700",
        "MDT" => "-0600",
        "PST" => "-0800",
        "PDT" => "-0700",
        // Military zones other than Z are ambiguous
        t if t.len() == 1 && t.chars().all(|c| c.is_ascii_alphabetic()) => "-0000",
        _ => return None,
    };
    Some(offset.to_string())
}

/// RFC 5322 section 4.3: 00-49 is 2000-2049, 50-999 is 1900-2899.
fn expand_year(year: &str) -> String {
    match year.parse::<u32>() {
        Ok(y) if year.len() == 2 && y < 50 => (2000 + y).to_string(),
        Ok(y) if year.len() <= 3 => (1900 + y).to_string(),
        _ => year.to_string(),
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
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_rfc2822_date() {
        let dt = parse_date("Fri, 21 Nov 1997 09:55:06 -0600").unwrap();
        assert_eq!(dt.year(), 1997);
        assert_eq!(dt.offset().local_minus_utc(), -6 * 3600);
    }

    #[test]
    fn test_without_day_of_week() {
        assert!(parse_date("21 Nov 1997 09:55:06 -0600").is_some());
    }

    #[test]
    fn test_trailing_comment() {
        let dt = parse_date("Thu, 13 Feb 1969 23:32:54 -0330 (Newfoundland Time)").unwrap();
        assert_eq!(dt.minute(), 32);
    }

    #[test]
    fn test_two_digit_year_and_named_zone() {
        let dt = parse_date("Fri, 21 Nov 97 09:55:06 GMT").unwrap();
        assert_eq!(dt.year(), 1997);
        assert_eq!(dt.offset().local_minus_utc(), 0);

        let dt = parse_date("21 Nov 03 09:55 EST").unwrap();
        assert_eq!(dt.year(), 2003);
        assert_eq!(dt.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_missing_seconds() {
        let dt = parse_date("Fri, 21 Nov 1997 09:55 +0100").unwrap();
        assert_eq!(dt.second(), 0);
    }

    #[test]
    fn test_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("yesterday").is_none());
        assert!(parse_date("32 Foo 2020 99:99:99 +0000").is_none());
    }
}
