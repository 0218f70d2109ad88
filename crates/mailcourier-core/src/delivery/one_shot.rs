//! Connection-per-message delivery.

use super::{Deliver, Envelope, authenticate};
use crate::config::SmtpSettings;
use crate::error::{Error, Result};
use mailcourier_smtp::connection::connect;
use mailcourier_smtp::{Client, SmtpConnection};

/// Opens a fresh connection for every message.
///
/// The connection starts in cleartext and is upgraded with STARTTLS when
/// the server offers it. Every envelope recipient (To, Cc and Bcc) is added
/// to a single transaction, so one rejected recipient fails the message.
#[derive(Debug, Clone)]
pub struct OneShot {
    settings: SmtpSettings,
}

impl OneShot {
    /// Creates a one-shot driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the authentication mode is unknown.
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        settings.auth_mode()?;
        Ok(Self {
            settings: settings.clone(),
        })
    }

    /// Returns the settings used for each connection.
    #[must_use]
    pub const fn settings(&self) -> &SmtpSettings {
        &self.settings
    }
}

impl Deliver for OneShot {
    async fn deliver(&mut self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        let settings = &self.settings;
        let addr = settings.connect_addr();
        tracing::debug!(server = %addr, "Connecting to SMTP server");

        let stream = connect(&addr).await?;
        let client = Client::from_stream(stream)
            .await?
            .ehlo(settings.client_name())
            .await?;

        let client = if client.server_info().supports_starttls() {
            client.starttls(settings.server_name()).await?
        } else {
            tracing::debug!(server = %addr, "STARTTLS not offered, continuing in cleartext");
            client
        };

        let client = authenticate(client, settings).await?;

        let mut recipients = envelope.all_recipients();
        let first = recipients.next().ok_or(Error::NoRecipients)?;
        let mut client = client
            .mail_from(envelope.from.clone())
            .await?
            .rcpt_to(first.clone())
            .await?;
        for recipient in recipients {
            client = client.rcpt_to(recipient.clone()).await?;
        }

        let client = client.data().await?.send_message(message).await?;
        tracing::info!(
            server = %addr,
            recipients = envelope.len(),
            bytes = message.len(),
            "Message sent"
        );

        // The message is already accepted.
        if let Err(e) = client.quit().await {
            tracing::debug!(error = %e, "QUIT failed");
        }
        Ok(())
    }

    async fn close(&mut self) {}
}
