//! A composed email bound to a delivery mode.

use crate::config::{AuthMode, SmtpSettings};
use crate::delivery::{Deliver, Delivery, Envelope};
use crate::error::Result;
use mailcourier_mime::Email;
use std::fmt;

/// An [`Email`] together with the delivery that sends it.
///
/// ```no_run
/// use mailcourier_core::{Message, SmtpSettings};
///
/// # async fn run(settings: SmtpSettings) -> mailcourier_core::Result<()> {
/// let mut message = Message::connect(&settings).await?;
/// let email = message.email_mut();
/// email.set_from("notify@example.com");
/// email.add_to("ops@example.com");
/// email.set_subject("Nightly report");
/// email.plain_mut().set("All jobs finished.");
///
/// message.send().await?;
/// message.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Message {
    email: Email,
    delivery: Delivery,
    host: String,
    auth_mode: AuthMode,
}

impl Message {
    /// Creates an empty message and prepares delivery for `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or, in session mode, if
    /// the session cannot be established.
    pub async fn connect(settings: &SmtpSettings) -> Result<Self> {
        let delivery = Delivery::connect(settings).await?;
        Self::with_delivery(settings, delivery)
    }

    /// Creates an empty message that sends through an existing delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the authentication mode is unknown.
    pub fn with_delivery(settings: &SmtpSettings, delivery: Delivery) -> Result<Self> {
        Ok(Self {
            email: Email::new(),
            delivery,
            host: settings.host().to_string(),
            auth_mode: settings.auth_mode()?,
        })
    }

    /// Returns the email.
    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.email
    }

    /// Returns the email for editing.
    pub const fn email_mut(&mut self) -> &mut Email {
        &mut self.email
    }

    /// Returns the delivery.
    #[must_use]
    pub const fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Builds the email and delivers it.
    ///
    /// The message is fully built before any network traffic, so a build
    /// failure never results in a partial send.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope is invalid, building fails or the
    /// server rejects the message.
    pub async fn send(&mut self) -> Result<()> {
        let envelope = Envelope::from_email(&self.email)?;
        let buf = self.email.build()?;
        tracing::debug!(
            mode = self.delivery.mode(),
            recipients = envelope.len(),
            bytes = buf.len(),
            "Sending message"
        );
        self.delivery.deliver(&envelope, &buf).await
    }

    /// Builds the email without sending it.
    ///
    /// # Errors
    ///
    /// Returns an error if an attachment cannot be read.
    pub fn mime_buf(&mut self) -> Result<Vec<u8>> {
        Ok(self.email.mime_buf()?)
    }

    /// Closes any held session. Safe to call more than once.
    pub async fn close(&mut self) {
        self.delivery.close().await;
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} ({}, auth: {})",
            self.email,
            self.host,
            self.delivery,
            if self.auth_mode == AuthMode::None {
                "none"
            } else {
                "set"
            }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::delivery::OneShot;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            address: "smtp.example.com".into(),
            port: 587,
            authentication: "plain".into(),
            user_login: "notify@example.com".into(),
            password: "hunter2".into(),
            ..SmtpSettings::default()
        }
    }

    fn message() -> Message {
        let settings = settings();
        let delivery = Delivery::OneShot(OneShot::new(&settings).unwrap());
        Message::with_delivery(&settings, delivery).unwrap()
    }

    #[test]
    fn test_summary_is_redacted() {
        let mut message = message();
        message.email_mut().set_from("notify@example.com");
        message.email_mut().add_to("ops@example.com");
        message.email_mut().set_subject("Report");

        let summary = message.to_string();
        assert!(summary.contains("smtp.example.com"));
        assert!(summary.contains("one-shot"));
        assert!(summary.contains("auth: set"));
        assert!(!summary.contains("hunter2"));
    }

    #[test]
    fn test_mime_buf_without_sending() {
        let mut message = message();
        message.email_mut().set_from("notify@example.com");
        message.email_mut().add_to("ops@example.com");
        message.email_mut().plain_mut().set("hello");

        let buf = String::from_utf8(message.mime_buf().unwrap()).unwrap();
        assert!(buf.contains("To: ops@example.com\r\n"));
        assert!(buf.contains("hello"));
    }

    #[tokio::test]
    async fn test_send_without_recipients_fails_before_connecting() {
        let mut message = message();
        message.email_mut().set_from("notify@example.com");
        assert!(matches!(
            message.send().await,
            Err(crate::Error::NoRecipients)
        ));
    }
}
