//! # mailcourier-core
//!
//! Composition and delivery of notification email.
//!
//! This crate ties the MIME builder and the SMTP client together:
//! - **Configuration** - per-sender SMTP settings loaded from YAML
//! - **Delivery** - one connection per message with opportunistic STARTTLS,
//!   or one implicit-TLS session reused across messages
//! - **Messages** - an [`Email`] bound to its delivery, with `send` and
//!   `mime_buf`
//! - **Dispatch** - property-bag entry point sending one message per
//!   recipient

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod delivery;
pub mod dispatch;
mod error;
mod message;

pub use config::{AuthMode, Config, SmtpSettings};
pub use delivery::{Deliver, Delivery, Envelope, OneShot, Session};
pub use dispatch::send_mail;
pub use error::{Error, Result};
pub use mailcourier_mime::Email;
pub use message::Message;
