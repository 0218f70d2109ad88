//! Pre-established session delivery.

use super::{Deliver, Envelope, authenticate};
use crate::config::SmtpSettings;
use crate::error::{Error, Result};
use mailcourier_smtp::connection::{SmtpStream, connect_tls};
use mailcourier_smtp::{Authenticated, Client, SmtpConnection};

/// An authenticated connection reused across sends.
///
/// Each send runs `MAIL FROM`, `RCPT TO` for the first To recipient only,
/// then `DATA`. Cc, Bcc and further To recipients are not delivered on
/// this path; they are logged and skipped.
///
/// A failed transaction leaves the session closed. Further sends return
/// [`Error::SessionClosed`] until a new session is connected.
#[derive(Debug)]
pub struct Session {
    client: Option<Client<Authenticated>>,
}

impl Session {
    /// Connects with implicit TLS and authenticates.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, TLS handshake, greeting, EHLO or
    /// authentication fails. No session is produced in that case.
    pub async fn connect(settings: &SmtpSettings) -> Result<Self> {
        let addr = settings.connect_addr();
        tracing::debug!(server = %addr, server_name = settings.server_name(), "Opening SMTP session");
        let stream = connect_tls(&addr, settings.server_name()).await?;
        Self::establish(stream, settings).await
    }

    /// Greets, runs EHLO and authenticates over an already open stream.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the dialog fails.
    pub async fn establish(stream: SmtpStream, settings: &SmtpSettings) -> Result<Self> {
        let client = Client::from_stream(stream)
            .await?
            .ehlo(settings.client_name())
            .await?;
        let client = authenticate(client, settings).await?;
        tracing::info!(
            server = %client.server_info().hostname,
            tls = client.is_tls(),
            "SMTP session established"
        );
        Ok(Self {
            client: Some(client),
        })
    }

    /// Returns true while the session can send.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

impl Deliver for Session {
    async fn deliver(&mut self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        let recipient = envelope.first_to().ok_or(Error::NoRecipients)?;
        let client = self.client.take().ok_or(Error::SessionClosed)?;

        let skipped = envelope.len() - 1;
        if skipped > 0 {
            tracing::warn!(
                skipped,
                "Session delivery only sends to the first To recipient"
            );
        }

        let client = client
            .mail_from(envelope.from.clone())
            .await?
            .rcpt_to(recipient.clone())
            .await?
            .data()
            .await?
            .send_message(message)
            .await?;
        tracing::info!(recipient = %recipient, bytes = message.len(), "Message sent");

        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match client.quit().await {
            Ok(()) => tracing::debug!("SMTP session closed"),
            Err(e) => tracing::debug!(error = %e, "Ignoring error while closing SMTP session"),
        }
    }
}
