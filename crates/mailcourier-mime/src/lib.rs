//! # mailcourier-mime
//!
//! MIME message composition for outgoing email.
//!
//! ## Features
//!
//! - **Composition**: addresses, subject, custom headers, plain and HTML bodies
//! - **Body shapes**: single part, `multipart/alternative`, `multipart/mixed`
//! - **Attachments**: read lazily at build time, base64 folded at 76 columns
//! - **Header safety**: every header value is stripped of line breaks
//! - **Encoding**: Base64, Quoted-Printable, RFC 2047 encoded-words
//!
//! ## Quick Start
//!
//! ```
//! use mailcourier_mime::Email;
//!
//! let mut email = Email::new();
//! email.set_from("sender@example.com");
//! email.set_from_name("Sender");
//! email.set_to(["recipient@example.com"]);
//! email.set_subject("Test Message");
//! email.plain_mut().set("Plain text version");
//! email.html_mut().set("<h1>HTML version</h1>");
//! email.attach_bytes("notes.txt", b"attached".to_vec());
//!
//! let raw = email.build()?;
//! assert!(raw.starts_with(b"Date: "));
//! # Ok::<(), mailcourier_mime::Error>(())
//! ```
//!
//! ### Line folding
//!
//! [`LineSplitter`] wraps any writer and inserts CRLF every `n` bytes, which
//! keeps base64 output within the SMTP line limit:
//!
//! ```
//! use base64::engine::general_purpose::STANDARD;
//! use base64::write::EncoderWriter;
//! use mailcourier_mime::LineSplitter;
//! use std::io::Write;
//!
//! let mut out = Vec::new();
//! let mut encoder = EncoderWriter::new(LineSplitter::new(&mut out, 4), &STANDARD);
//! encoder.write_all(b"test")?;
//! encoder.finish()?;
//! drop(encoder);
//! assert_eq!(out, b"dGVz\r\ndA==");
//! # Ok::<(), std::io::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod attachment;
mod body;
mod content_type;
mod error;
mod header;
mod message;
mod splitter;

pub mod encoding;

pub use attachment::Attachment;
pub use body::BodyPart;
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::{Headers, format_mailbox, sanitize_header_name, sanitize_header_value};
pub use message::{DATE_FORMAT, Email, TransferEncoding};
pub use splitter::{LineSplitter, MAX_LINE_LENGTH};
