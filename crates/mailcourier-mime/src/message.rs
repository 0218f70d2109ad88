//! Email composition and MIME serialization.

use crate::attachment::Attachment;
use crate::body::BodyPart;
use crate::content_type::ContentType;
use crate::encoding::encode_quoted_printable;
use crate::error::Result;
use crate::header::{
    Headers, format_mailbox, sanitize_header_value, write_encoded_header, write_header,
};
use std::fmt;
use std::io::{Read, Write};
use uuid::Uuid;

/// RFC 1123 date with numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Header names produced by the builder itself. Custom headers with these
/// names are not emitted.
const GENERATED_HEADERS: &[&str] = &[
    "Date",
    "From",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "Subject",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-Disposition",
];

/// Transfer encoding types used by generated parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
        }
    }
}

/// Which text bodies are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Text {
    None,
    Plain,
    Html,
    Both,
}

/// MIME structure of the body, decided once per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyShape {
    /// No text and no attachments.
    Empty,
    /// Exactly one of plain or HTML.
    Single(Text),
    /// Plain and HTML as `multipart/alternative`.
    Alternative,
    /// Attachments present: `multipart/mixed` around the text and files.
    Mixed(Text),
}

/// An email under composition.
///
/// Setters mutate the message; [`build`](Self::build) serializes the current
/// state into a complete RFC 5322 message with a MIME body. Building can be
/// repeated; attachment sources are read on the first build only.
#[derive(Debug)]
pub struct Email {
    from: String,
    from_name: String,
    reply_to: String,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: String,
    date: String,
    headers: Headers,
    html: BodyPart,
    plain: BodyPart,
    attachments: Vec<Attachment>,
    write_bcc_header: bool,
}

impl Default for Email {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns line breaks into spaces and trims surrounding whitespace.
///
/// An address with an interior break keeps a space there and so fails
/// envelope validation instead of merging with the text after the break.
fn clean_address(addr: &str) -> String {
    sanitize_header_value(addr).trim().to_string()
}

fn clean_addresses<I, S>(addrs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    addrs
        .into_iter()
        .map(|a| clean_address(a.as_ref()))
        .filter(|a| !a.is_empty())
        .collect()
}

impl Email {
    /// Creates an empty email dated now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            from: String::new(),
            from_name: String::new(),
            reply_to: String::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            date: chrono::Local::now().format(DATE_FORMAT).to_string(),
            headers: Headers::new(),
            html: BodyPart::new(),
            plain: BodyPart::new(),
            attachments: Vec::new(),
            write_bcc_header: false,
        }
    }

    /// Sets the sender address.
    pub fn set_from(&mut self, addr: impl AsRef<str>) {
        self.from = clean_address(addr.as_ref());
    }

    /// Sets the sender display name.
    pub fn set_from_name(&mut self, name: impl Into<String>) {
        self.from_name = name.into();
    }

    /// Sets the Reply-To address.
    pub fn set_reply_to(&mut self, addr: impl AsRef<str>) {
        self.reply_to = clean_address(addr.as_ref());
    }

    /// Replaces the To recipients. Empty entries are dropped; duplicates are kept.
    pub fn set_to<I, S>(&mut self, addrs: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.to = clean_addresses(addrs);
    }

    /// Appends a To recipient.
    pub fn add_to(&mut self, addr: impl AsRef<str>) {
        self.to.extend(clean_addresses([addr]));
    }

    /// Replaces the Cc recipients.
    pub fn set_cc<I, S>(&mut self, addrs: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cc = clean_addresses(addrs);
    }

    /// Appends a Cc recipient.
    pub fn add_cc(&mut self, addr: impl AsRef<str>) {
        self.cc.extend(clean_addresses([addr]));
    }

    /// Replaces the Bcc recipients.
    ///
    /// Bcc recipients are always part of the envelope but only named in the
    /// headers when [`set_write_bcc_header`](Self::set_write_bcc_header) is on.
    pub fn set_bcc<I, S>(&mut self, addrs: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.bcc = clean_addresses(addrs);
    }

    /// Appends a Bcc recipient.
    pub fn add_bcc(&mut self, addr: impl AsRef<str>) {
        self.bcc.extend(clean_addresses([addr]));
    }

    /// Controls whether a `Bcc` header is written.
    pub const fn set_write_bcc_header(&mut self, write: bool) {
        self.write_bcc_header = write;
    }

    /// Sets the subject.
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = subject.into();
    }

    /// Overrides the date captured at construction.
    pub fn set_date(&mut self, date: impl Into<String>) {
        self.date = date.into();
    }

    /// Sets a custom header, replacing any previous value.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Returns the HTML body part.
    #[must_use]
    pub const fn html(&self) -> &BodyPart {
        &self.html
    }

    /// Returns the HTML body part for editing.
    pub const fn html_mut(&mut self) -> &mut BodyPart {
        &mut self.html
    }

    /// Returns the plain-text body part.
    #[must_use]
    pub const fn plain(&self) -> &BodyPart {
        &self.plain
    }

    /// Returns the plain-text body part for editing.
    pub const fn plain_mut(&mut self) -> &mut BodyPart {
        &mut self.plain
    }

    /// Attaches content read from `reader` when the message is built.
    pub fn attach(&mut self, filename: impl Into<String>, reader: impl Read + Send + 'static) {
        self.attachments.push(Attachment::new(filename, reader));
    }

    /// Attaches in-memory content.
    pub fn attach_bytes(&mut self, filename: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.attachments.push(Attachment::from_bytes(filename, data));
    }

    /// Removes all attachments.
    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }

    /// Returns the sender address.
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Returns the sender display name.
    #[must_use]
    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    /// Returns the Reply-To address.
    #[must_use]
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// Returns the To recipients.
    #[must_use]
    pub fn to(&self) -> &[String] {
        &self.to
    }

    /// Returns the Cc recipients.
    #[must_use]
    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    /// Returns the Bcc recipients.
    #[must_use]
    pub fn bcc(&self) -> &[String] {
        &self.bcc
    }

    /// Returns the subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the date header value.
    #[must_use]
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Returns the custom headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the attachments in emission order.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Returns whether a `Bcc` header is written.
    #[must_use]
    pub const fn write_bcc_header(&self) -> bool {
        self.write_bcc_header
    }

    /// Serializes the message into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`](crate::Error::Attachment) if an
    /// attachment source cannot be read. No partial buffer is returned.
    pub fn build(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.estimated_size());
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Returns the raw MIME buffer, for handing the message to another transport.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn mime_buf(&mut self) -> Result<Vec<u8>> {
        self.build()
    }

    /// Serializes the message into `out`, streaming attachment content.
    ///
    /// # Errors
    ///
    /// Returns an error if an attachment cannot be read or `out` fails.
    /// `out` may hold a partial message afterwards.
    pub fn write_to(&mut self, out: &mut impl Write) -> Result<()> {
        self.write_headers(out)?;

        match self.body_shape() {
            BodyShape::Empty => {
                out.write_all(b"\r\n")?;
                return Ok(());
            }
            BodyShape::Single(text) => self.write_text(out, text)?,
            BodyShape::Alternative => self.write_alternative(out)?,
            BodyShape::Mixed(text) => self.write_mixed(out, text)?,
        }

        out.write_all(b"\r\n")?;
        Ok(())
    }

    fn text(&self) -> Text {
        match (self.plain.is_empty(), self.html.is_empty()) {
            (true, true) => Text::None,
            (false, true) => Text::Plain,
            (true, false) => Text::Html,
            (false, false) => Text::Both,
        }
    }

    fn body_shape(&self) -> BodyShape {
        let text = self.text();
        if !self.attachments.is_empty() {
            return BodyShape::Mixed(text);
        }
        match text {
            Text::None => BodyShape::Empty,
            Text::Both => BodyShape::Alternative,
            single => BodyShape::Single(single),
        }
    }

    fn estimated_size(&self) -> usize {
        // Quoted-printable and base64 both grow the content.
        1024 + (self.plain.len() + self.html.len()) * 4 / 3
    }

    fn write_headers(&self, out: &mut impl Write) -> Result<()> {
        write_header(out, "Date", &self.date)?;
        write_header(out, "From", &format_mailbox(&self.from_name, &self.from))?;
        if !self.reply_to.is_empty() {
            write_header(out, "Reply-To", &self.reply_to)?;
        }
        if !self.to.is_empty() {
            write_header(out, "To", &self.to.join(", "))?;
        }
        if !self.cc.is_empty() {
            write_header(out, "Cc", &self.cc.join(", "))?;
        }
        if self.write_bcc_header && !self.bcc.is_empty() {
            write_header(out, "Bcc", &self.bcc.join(", "))?;
        }
        write_encoded_header(out, "Subject", &self.subject)?;

        for (name, value) in self.headers.iter() {
            if GENERATED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                tracing::warn!(header = name, "Skipping custom header that the builder generates");
                continue;
            }
            write_header(out, name, value)?;
        }

        write_header(out, "MIME-Version", "1.0")?;
        Ok(())
    }

    /// Writes a single text entity: headers, blank line, encoded body.
    fn write_text(&self, out: &mut impl Write, text: Text) -> Result<()> {
        let (content_type, body) = match text {
            Text::Html => (ContentType::text_html(), &self.html),
            _ => (ContentType::text_plain(), &self.plain),
        };
        write_header(out, "Content-Type", &content_type.to_string())?;
        write_header(
            out,
            "Content-Transfer-Encoding",
            &TransferEncoding::QuotedPrintable.to_string(),
        )?;
        out.write_all(b"\r\n")?;
        out.write_all(encode_quoted_printable(body.as_str()).as_bytes())?;
        Ok(())
    }

    /// Writes a `multipart/alternative` entity: plain first, then HTML.
    fn write_alternative(&self, out: &mut impl Write) -> Result<()> {
        let boundary = new_boundary();
        let content_type = ContentType::multipart_alternative(boundary.as_str());
        write_header(out, "Content-Type", &content_type.to_string())?;
        out.write_all(b"\r\n")?;

        write!(out, "--{boundary}\r\n")?;
        self.write_text(out, Text::Plain)?;
        write!(out, "\r\n--{boundary}\r\n")?;
        self.write_text(out, Text::Html)?;
        write!(out, "\r\n--{boundary}--")?;
        Ok(())
    }

    /// Writes a `multipart/mixed` entity: the text body (if any), then one
    /// part per attachment.
    fn write_mixed(&mut self, out: &mut impl Write, text: Text) -> Result<()> {
        let boundary = new_boundary();
        let content_type = ContentType::multipart_mixed(boundary.as_str());
        write_header(out, "Content-Type", &content_type.to_string())?;
        out.write_all(b"\r\n")?;

        let mut first = true;
        let mut delimiter = |out: &mut dyn Write| {
            let prefix = if first { "" } else { "\r\n" };
            first = false;
            write!(out, "{prefix}--{boundary}\r\n")
        };

        match text {
            Text::None => {}
            Text::Both => {
                delimiter(out)?;
                self.write_alternative(out)?;
            }
            single => {
                delimiter(out)?;
                self.write_text(out, single)?;
            }
        }

        for attachment in &mut self.attachments {
            delimiter(out)?;
            write_header(out, "Content-Type", &ContentType::octet_stream().to_string())?;
            write_header(
                out,
                "Content-Transfer-Encoding",
                &TransferEncoding::Base64.to_string(),
            )?;
            write_header(
                out,
                "Content-Disposition",
                &format!("attachment; filename=\"{}\"", attachment.quoted_filename()),
            )?;
            out.write_all(b"\r\n")?;
            attachment.write_base64(out)?;
        }

        write!(out, "\r\n--{boundary}--")?;
        Ok(())
    }
}

/// A fresh boundary token. The `=_` prefix never occurs in base64 or
/// quoted-printable output, so encoded content cannot contain it.
fn new_boundary() -> String {
    format!("=_{}", Uuid::new_v4().simple())
}

impl fmt::Display for Email {
    /// A summary for logs: addresses, subject, sizes and attachment names,
    /// never body content.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attachments: Vec<&str> = self.attachments.iter().map(Attachment::filename).collect();
        let headers: Vec<String> = self
            .headers
            .iter()
            .map(|(name, value)| format!("{name}: {value:?}"))
            .collect();

        write!(
            f,
            "Email {{ date: {:?}, from: {:?}, from_name: {:?}, html: {} bytes, plain: {} bytes, \
             to: {:?}, cc: {:?}, bcc: {:?}, subject: {:?}, headers: [{}], attachments ({}): {:?} }}",
            self.date,
            self.from,
            self.from_name,
            self.html.len(),
            self.plain.len(),
            self.to,
            self.cc,
            self.bcc,
            self.subject,
            headers.join(", "),
            attachments.len(),
            attachments,
        )
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
    use crate::encoding::{decode_base64, decode_quoted_printable};
    use std::io::{self, Cursor};

    fn sample() -> Email {
        let mut email = Email::new();
        email.set_date("Mon, 02 Jan 2006 15:04:05 -0700");
        email.set_from("sender@example.com");
        email.set_to(["rcpt@example.com"]);
        email.set_subject("Test");
        email
    }

    fn build_string(email: &mut Email) -> String {
        String::from_utf8(email.build().unwrap()).unwrap()
    }

    /// Splits a built message at the first blank line.
    fn split_head(message: &str) -> (&str, &str) {
        message.split_once("\r\n\r\n").unwrap()
    }

    fn boundary_of(head: &str) -> String {
        let start = head.find("boundary=\"").unwrap() + "boundary=\"".len();
        let end = head[start..].find('"').unwrap();
        head[start..start + end].to_string()
    }

    #[test]
    fn test_header_order() {
        let mut email = sample();
        email.set_from_name("Sender Name");
        email.set_reply_to("reply@example.com");
        email.set_cc(["cc1@example.com", "cc2@example.com"]);
        email.set_header("X-Mailer", "mailcourier");
        email.plain_mut().set("hi");

        let message = build_string(&mut email);
        let (head, _) = split_head(&message);
        let names: Vec<&str> = head
            .split("\r\n")
            .map(|line| line.split_once(':').unwrap().0)
            .collect();
        assert_eq!(
            names,
            vec![
                "Date",
                "From",
                "Reply-To",
                "To",
                "Cc",
                "Subject",
                "X-Mailer",
                "MIME-Version",
                "Content-Type",
                "Content-Transfer-Encoding",
            ]
        );
        assert!(head.contains("From: \"Sender Name\" <sender@example.com>\r\n"));
        assert!(head.contains("Cc: cc1@example.com, cc2@example.com\r\n"));
    }

    #[test]
    fn test_empty_body() {
        let mut email = sample();
        let message = build_string(&mut email);
        assert!(message.ends_with("MIME-Version: 1.0\r\n\r\n"));
        assert!(!message.contains("Content-Type"));
    }

    #[test]
    fn test_single_plain_part() {
        let mut email = sample();
        email.plain_mut().set("Hello,\nWorld");
        let message = build_string(&mut email);
        let (head, body) = split_head(&message);

        assert!(head.contains("Content-Type: text/plain; charset=UTF-8"));
        assert!(head.contains("Content-Transfer-Encoding: quoted-printable"));
        assert_eq!(body, "Hello,\r\nWorld\r\n");
    }

    #[test]
    fn test_single_html_part() {
        let mut email = sample();
        email.html_mut().set("<p>caf\u{e9}</p>");
        let message = build_string(&mut email);
        let (head, body) = split_head(&message);

        assert!(head.contains("Content-Type: text/html; charset=UTF-8"));
        assert_eq!(
            decode_quoted_printable(body.trim_end()).unwrap(),
            "<p>caf\u{e9}</p>"
        );
    }

    #[test]
    fn test_alternative_plain_before_html() {
        let mut email = sample();
        email.plain_mut().set("plain version");
        email.html_mut().set("<b>html version</b>");
        let message = build_string(&mut email);
        let (head, body) = split_head(&message);

        assert!(head.contains("Content-Type: multipart/alternative; boundary="));
        let boundary = boundary_of(head);
        let parts: Vec<&str> = body.split(&format!("--{boundary}")).collect();
        // preamble, plain, html, closing "--" epilogue
        assert_eq!(parts.len(), 4);
        assert!(parts[1].contains("text/plain"));
        assert!(parts[1].contains("plain version"));
        assert!(parts[2].contains("text/html"));
        assert!(parts[2].contains("<b>html version</b>"));
        assert_eq!(parts[3], "--\r\n");
        assert!(body.find("plain version").unwrap() < body.find("html version").unwrap());
    }

    #[test]
    fn test_mixed_with_html_and_attachment() {
        let mut email = sample();
        email.html_mut().set("Invoice in attachment");
        email.attach("invoice.html", Cursor::new(b"test".to_vec()));
        let message = build_string(&mut email);
        let (head, body) = split_head(&message);

        assert!(head.contains("Content-Type: multipart/mixed; boundary="));
        let boundary = boundary_of(head);
        let parts: Vec<&str> = body.split(&format!("--{boundary}")).collect();
        assert_eq!(parts.len(), 4);
        assert!(parts[1].contains("Content-Type: text/html; charset=UTF-8"));

        let attachment = parts[2];
        assert!(attachment.contains("Content-Type: application/octet-stream\r\n"));
        assert!(attachment.contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(
            attachment.contains("Content-Disposition: attachment; filename=\"invoice.html\"\r\n")
        );
        assert!(attachment.ends_with("\r\n\r\ndGVzdA==\r\n"));
    }

    #[test]
    fn test_mixed_nests_alternative() {
        let mut email = sample();
        email.plain_mut().set("plain");
        email.html_mut().set("<i>html</i>");
        email.attach_bytes("a.bin", vec![1, 2, 3]);
        let message = build_string(&mut email);
        let (head, body) = split_head(&message);

        let outer = boundary_of(head);
        let parts: Vec<&str> = body.split(&format!("--{outer}")).collect();
        assert_eq!(parts.len(), 4);
        assert!(parts[1].contains("Content-Type: multipart/alternative; boundary="));
        let inner = boundary_of(parts[1]);
        assert_ne!(inner, outer);
        assert_eq!(parts[1].matches(&format!("--{inner}")).count(), 3);
        assert!(parts[2].contains("filename=\"a.bin\""));
    }

    #[test]
    fn test_mixed_without_text() {
        let mut email = sample();
        email.attach_bytes("only.bin", b"test".to_vec());
        let message = build_string(&mut email);
        let (head, body) = split_head(&message);
        let boundary = boundary_of(head);
        let parts: Vec<&str> = body.split(&format!("--{boundary}")).collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].contains("filename=\"only.bin\""));
    }

    #[test]
    fn test_attachment_lines_are_folded() {
        let data: Vec<u8> = (0..209u16).map(|i| (i % 251) as u8).collect();
        let mut email = sample();
        email.attach_bytes("data.bin", data.clone());
        let message = build_string(&mut email);
        let (head, body) = split_head(&message);
        let boundary = boundary_of(head);

        let part = body.split(&format!("--{boundary}")).nth(1).unwrap();
        let (_, encoded) = split_head(part);
        let lines: Vec<&str> = encoded.trim_end().split("\r\n").collect();
        assert_eq!(lines.iter().map(|l| l.len()).collect::<Vec<_>>(), vec![76, 76, 76, 52]);
        assert_eq!(decode_base64(&lines.concat()).unwrap(), data);
    }

    #[test]
    fn test_subject_injection_is_neutralized() {
        let mut email = sample();
        email.set_subject("Hello\r\nBcc: attacker@evil.example");
        email.plain_mut().set("body");
        let message = build_string(&mut email);
        let (head, _) = split_head(&message);

        let subjects: Vec<&str> = head.split("\r\n").filter(|l| l.starts_with("Subject:")).collect();
        assert_eq!(subjects, vec!["Subject: Hello Bcc: attacker@evil.example"]);
        assert!(!head.split("\r\n").any(|l| l.starts_with("Bcc:")));
    }

    #[test]
    fn test_custom_header_injection_is_neutralized() {
        let mut email = sample();
        email.set_header("X-Note", "a\nTo: victim@example.com");
        let message = build_string(&mut email);
        let (head, _) = split_head(&message);
        assert_eq!(head.split("\r\n").filter(|l| l.starts_with("To:")).count(), 1);
        assert!(head.contains("X-Note: a To: victim@example.com\r\n"));
    }

    #[test]
    fn test_generated_header_names_are_not_duplicated() {
        let mut email = sample();
        email.set_header("subject", "shadow");
        let message = build_string(&mut email);
        assert!(!message.contains("shadow"));
    }

    #[test]
    fn test_address_line_breaks_become_spaces() {
        let mut email = sample();
        email.set_to(["a@example.com\r\nBcc: evil@example.com", "", "  "]);
        assert_eq!(email.to(), ["a@example.com Bcc: evil@example.com"]);

        email.set_cc([" alice@example.com\nbob@example.com\r\n"]);
        assert_eq!(email.cc(), ["alice@example.com bob@example.com"]);
    }

    #[test]
    fn test_long_recipient_list_is_folded() {
        let mut email = sample();
        let addrs: Vec<String> = (0..60).map(|i| format!("user{i:02}@example.com")).collect();
        email.set_to(&addrs);
        email.set_subject("status ".repeat(30).trim_end());
        let message = build_string(&mut email);
        let head = message.split("\r\n\r\n").next().unwrap();

        for line in head.split("\r\n") {
            assert!(line.len() <= 78, "header line too long: {line:?}");
        }
        let unfolded = head.replace("\r\n ", " ");
        assert!(unfolded.contains(&format!("To: {}\r\n", addrs.join(", "))));
        assert!(unfolded.contains(&format!("Subject: {}\r\n", "status ".repeat(30).trim_end())));
    }

    #[test]
    fn test_bcc_header_only_when_enabled() {
        let mut email = sample();
        email.set_bcc(["hidden@example.com"]);
        let message = build_string(&mut email);
        assert!(!message.contains("hidden@example.com"));

        email.set_write_bcc_header(true);
        let message = build_string(&mut email);
        assert!(message.contains("Bcc: hidden@example.com\r\n"));
    }

    #[test]
    fn test_duplicates_pass_through() {
        let mut email = sample();
        email.add_to("rcpt@example.com");
        assert_eq!(email.to().len(), 2);
        let message = build_string(&mut email);
        assert!(message.contains("To: rcpt@example.com, rcpt@example.com\r\n"));
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let mut email = sample();
        email.set_subject("Счёт №1");
        let message = build_string(&mut email);
        assert!(message.contains("Subject: =?utf-8?B?"));
        assert!(message.is_ascii());
    }

    #[test]
    fn test_date_fixed_at_construction() {
        let mut email = Email::new();
        let date = email.date().to_string();
        assert!(chrono::DateTime::parse_from_str(&date, DATE_FORMAT).is_ok());
        let first = build_string(&mut email);
        let second = build_string(&mut email);
        assert_eq!(email.date(), date);
        assert!(first.starts_with(&format!("Date: {date}\r\n")));
        assert_eq!(first, second);
    }

    #[test]
    fn test_repeated_builds_match_except_boundaries() {
        let mut email = sample();
        email.plain_mut().set("plain");
        email.html_mut().set("html");
        email.attach("x.txt", Cursor::new(b"payload".to_vec()));

        let first = build_string(&mut email);
        let second = build_string(&mut email);
        assert_ne!(first, second);

        let strip = |m: &str| {
            let (head, _) = split_head(m);
            let outer = boundary_of(head);
            let (_, body) = split_head(m);
            let inner = boundary_of(body);
            m.replace(&outer, "OUTER").replace(&inner, "INNER")
        };
        assert_eq!(strip(&first), strip(&second));
        assert!(second.contains("cGF5bG9hZA=="));
    }

    #[test]
    fn test_unreadable_attachment_fails_build() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk gone"))
            }
        }

        let mut email = sample();
        email.attach("broken.bin", Broken);
        let err = email.build().unwrap_err();
        assert!(err.to_string().contains("broken.bin"));
    }

    #[test]
    fn test_display_summary() {
        let mut email = sample();
        email.plain_mut().set("secret body text");
        email.attach_bytes("report.pdf", vec![0; 10]);
        let summary = email.to_string();

        assert!(summary.contains("sender@example.com"));
        assert!(summary.contains("plain: 16 bytes"));
        assert!(summary.contains("attachments (1): [\"report.pdf\"]"));
        assert!(!summary.contains("secret body text"));
    }
}
