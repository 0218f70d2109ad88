//! Header sanitization and emission.
//!
//! Every header value written by this crate passes through
//! [`sanitize_header_value`], so caller-controlled strings cannot start a new
//! header line or terminate the header block.

use crate::encoding::{encode_rfc2047, needs_rfc2047};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Preferred maximum header line length (RFC 5322 §2.1.1).
const FOLD_WIDTH: usize = 78;

/// Replaces each line break (`\r\n`, lone `\n`, lone `\r`) with one space.
///
/// This is the minimum guarantee against header injection. Other control
/// characters pass through unchanged.
#[must_use]
pub fn sanitize_header_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\r', '\n']) {
        return Cow::Borrowed(value);
    }

    let mut sanitized = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                sanitized.push(' ');
            }
            '\n' => sanitized.push(' '),
            _ => sanitized.push(c),
        }
    }
    Cow::Owned(sanitized)
}

/// Strips everything RFC 5322 does not allow in a field name
/// (controls, whitespace, `:` and non-ASCII).
#[must_use]
pub fn sanitize_header_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_graphic() && *c != ':')
        .collect()
}

/// Formats a mailbox as `"Display Name" <addr>`, or the bare address when
/// no display name is set.
///
/// Non-ASCII display names become RFC 2047 encoded-words instead of a
/// quoted string.
#[must_use]
pub fn format_mailbox(name: &str, address: &str) -> String {
    let address = sanitize_header_value(address);
    let name = sanitize_header_value(name);
    let name = name.trim();

    if name.is_empty() {
        return address.into_owned();
    }

    if needs_rfc2047(name) {
        return format!("{} <{address}>", encode_rfc2047(name, "utf-8"));
    }

    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    format!("{quoted} <{address}>")
}

/// Formats `Name: value`, folding before a space wherever the line would
/// pass [`FOLD_WIDTH`] columns.
///
/// Unfolding (removing each CRLF) gives back the unfolded field exactly.
/// A single word longer than the width stays on one line. `value` must not
/// contain line breaks.
pub(crate) fn fold_header(name: &str, value: &str) -> String {
    let mut folded = String::with_capacity(name.len() + value.len() + 8);
    folded.push_str(name);
    folded.push(':');

    let mut line_len = folded.len();
    let mut has_word = false;
    for word in value.split(' ') {
        if has_word && !word.is_empty() && line_len + 1 + word.len() > FOLD_WIDTH {
            folded.push_str("\r\n");
            line_len = 0;
        }
        folded.push(' ');
        folded.push_str(word);
        line_len += 1 + word.len();
        has_word |= !word.is_empty();
    }
    folded
}

/// Writes `Name: value` followed by CRLF, sanitized and folded.
pub(crate) fn write_header(out: &mut impl Write, name: &str, value: &str) -> io::Result<()> {
    let value = sanitize_header_value(value);
    write!(out, "{}\r\n", fold_header(name, &value))
}

/// Writes a header whose value may need RFC 2047 encoding.
///
/// Encoded values are folded between encoded-words; plain ASCII is folded
/// at spaces.
pub(crate) fn write_encoded_header(
    out: &mut impl Write,
    name: &str,
    value: &str,
) -> io::Result<()> {
    let value = sanitize_header_value(value);
    if needs_rfc2047(&value) {
        write!(out, "{name}: {}\r\n", encode_rfc2047(&value, "utf-8"))
    } else {
        write!(out, "{}\r\n", fold_header(name, &value))
    }
}

/// Caller-supplied headers, kept sorted by name so repeated serialization
/// emits them in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: BTreeMap<String, String>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any previous value under the same name.
    ///
    /// The name is stripped of characters a field name cannot contain; a
    /// name that ends up empty is ignored.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = sanitize_header_name(name.as_ref());
        if name.is_empty() {
            return;
        }
        self.headers.insert(name, value.into());
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if no headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterates over headers in emission order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
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
    fn test_sanitize_passthrough_borrows() {
        assert!(matches!(sanitize_header_value("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_sanitize_line_breaks() {
        assert_eq!(
            sanitize_header_value("Hello\r\nBcc: attacker@evil.example"),
            "Hello Bcc: attacker@evil.example"
        );
        assert_eq!(sanitize_header_value("a\nb\rc"), "a b c");
        assert_eq!(sanitize_header_value("a\r\n\r\nb"), "a  b");
    }

    #[test]
    fn test_sanitize_keeps_other_controls() {
        assert_eq!(sanitize_header_value("tab\there"), "tab\there");
    }

    #[test]
    fn test_sanitize_header_name() {
        assert_eq!(sanitize_header_name("X-Tag"), "X-Tag");
        assert_eq!(sanitize_header_name("X-Evil:\r\nBcc"), "X-EvilBcc");
        assert_eq!(sanitize_header_name(" \r\n"), "");
    }

    #[test]
    fn test_format_mailbox_bare() {
        assert_eq!(format_mailbox("", "user@example.com"), "user@example.com");
    }

    #[test]
    fn test_format_mailbox_quoted() {
        assert_eq!(
            format_mailbox("John Doe", "john@example.com"),
            "\"John Doe\" <john@example.com>"
        );
        assert_eq!(
            format_mailbox("Say \"hi\"", "a@example.com"),
            "\"Say \\\"hi\\\"\" <a@example.com>"
        );
    }

    #[test]
    fn test_format_mailbox_encoded() {
        assert_eq!(
            format_mailbox("Héllo", "h@example.com"),
            "=?utf-8?B?SMOpbGxv?= <h@example.com>"
        );
    }

    #[test]
    fn test_format_mailbox_sanitizes() {
        assert_eq!(
            format_mailbox("Eve\r\nBcc: x@y", "eve@example.com\r\nX: y"),
            "\"Eve Bcc: x@y\" <eve@example.com X: y>"
        );
    }

    #[test]
    fn test_write_header_sanitizes() {
        let mut out = Vec::new();
        write_header(&mut out, "Subject", "Hi\nthere").unwrap();
        assert_eq!(out, b"Subject: Hi there\r\n");
    }

    #[test]
    fn test_headers_sorted_emission() {
        let mut headers = Headers::new();
        headers.set("X-Zeta", "last");
        headers.set("X-Alpha", "first");
        headers.set("X-Alpha", "replaced");
        assert_eq!(headers.len(), 2);

        let pairs: Vec<(&str, &str)> = headers.iter().collect();
        assert_eq!(pairs, vec![("X-Alpha", "replaced"), ("X-Zeta", "last")]);
    }

    #[test]
    fn test_headers_ignore_empty_name() {
        let mut headers = Headers::new();
        headers.set("\r\n", "value");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_short_header_not_folded() {
        assert_eq!(fold_header("To", "a@example.com, b@example.com"), "To: a@example.com, b@example.com");
        assert_eq!(fold_header("X-Empty", ""), "X-Empty: ");
    }

    #[test]
    fn test_long_address_list_folds_between_addresses() {
        let addrs: Vec<String> = (0..60).map(|i| format!("user{i:02}@example.com")).collect();
        let value = addrs.join(", ");
        let folded = fold_header("To", &value);

        for line in folded.split("\r\n") {
            assert!(line.len() <= FOLD_WIDTH, "line too long: {line:?}");
            assert!(!line.trim().is_empty());
        }
        for line in folded.split("\r\n").skip(1) {
            assert!(line.starts_with(" user"), "bad continuation: {line:?}");
        }
        assert_eq!(folded.replace("\r\n", ""), format!("To: {value}"));
    }

    #[test]
    fn test_long_word_kept_whole() {
        let word = "x".repeat(120);
        let folded = fold_header("Subject", &format!("short {word} tail"));
        assert_eq!(folded, format!("Subject: short\r\n {word}\r\n tail"));
    }

    #[test]
    fn test_repeated_spaces_survive_folding() {
        let value = format!("{}  {}", "a".repeat(70), "b".repeat(10));
        let folded = fold_header("Subject", &value);
        assert_eq!(folded.replace("\r\n", ""), format!("Subject: {value}"));
    }

    #[test]
    fn test_write_encoded_header_folds_ascii() {
        let subject = "word ".repeat(40);
        let mut out = Vec::new();
        write_encoded_header(&mut out, "Subject", subject.trim_end()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("\r\n"));
        for line in text.trim_end_matches("\r\n").split("\r\n") {
            assert!(line.len() <= FOLD_WIDTH);
        }
    }
}
