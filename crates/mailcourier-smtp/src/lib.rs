//! # mailcourier-smtp
//!
//! An SMTP client implementing the submission side of RFC 5321.
//!
//! ## Features
//!
//! - **Type-state connection management**: compile-time enforcement of valid
//!   SMTP state transitions
//! - **Protocol**: EHLO, STARTTLS, AUTH, MAIL FROM, RCPT TO, DATA, QUIT
//! - **TLS**: implicit TLS (port 465) and STARTTLS, verified with rustls
//! - **Authentication**: PLAIN, LOGIN, CRAM-MD5
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailcourier_smtp::{Address, AuthMechanism, Client};
//! use mailcourier_smtp::connection::connect;
//!
//! # async fn run() -> mailcourier_smtp::Result<()> {
//! let stream = connect("smtp.example.com:587").await?;
//! let client = Client::from_stream(stream).await?;
//! let client = client.ehlo("client.example.com").await?;
//! let client = client.starttls("smtp.example.com").await?;
//! let client = client
//!     .auth(AuthMechanism::Plain, "user@example.com", "password")
//!     .await?;
//!
//! let client = client.mail_from(Address::new("sender@example.com")?).await?;
//! let client = client.rcpt_to(Address::new("recipient@example.com")?).await?;
//! let client = client.data().await?;
//! let client = client
//!     .send_message(b"Subject: Test\r\n\r\nHello, World!\r\n")
//!     .await?;
//!
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Connected ── auth() ──→ Authenticated ── mail_from() ──→ MailTransaction
//!     │                        ↑                               │ rcpt_to()
//!     └── mail_from() ─────────┼──────────────────────────→ RecipientAdded
//!                              │                               │ data()
//!                              └──────── send_message() ───── Data
//! ```
//!
//! A completed transaction returns the client to `Authenticated`, ready for
//! the next message on the same connection.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, ServerInfo,
    SmtpConnection, dot_stuff,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
