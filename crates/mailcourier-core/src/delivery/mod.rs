//! Delivery driver.
//!
//! Two ways of getting a built message to the server:
//!
//! - [`OneShot`]: connect, optionally upgrade with STARTTLS, authenticate,
//!   run one transaction for every envelope recipient, quit.
//! - [`Session`]: a connection opened with implicit TLS and authenticated
//!   once, reused for every send until [`Deliver::close`].
//!
//! [`Delivery::connect`] picks the mode from [`SmtpSettings::enable_tls`].

mod one_shot;
mod session;

pub use one_shot::OneShot;
pub use session::Session;

use crate::config::SmtpSettings;
use crate::error::{Error, Result};
use mailcourier_mime::Email;
use mailcourier_smtp::{Address, Authenticated, Client, Connected, SmtpConnection};
use std::fmt;
use std::future::Future;

/// SMTP envelope: the reverse path and the forward paths of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// MAIL FROM address.
    pub from: Address,
    /// To recipients, in order.
    pub to: Vec<Address>,
    /// Cc recipients, in order.
    pub cc: Vec<Address>,
    /// Bcc recipients, in order.
    pub bcc: Vec<Address>,
}

impl Envelope {
    /// Builds the envelope from a message's sender and recipient lists.
    ///
    /// Bcc recipients are always included, whether or not the message
    /// names them in a header.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is invalid or no recipient is set.
    pub fn from_email(email: &Email) -> Result<Self> {
        let envelope = Self {
            from: Address::new(email.from())?,
            to: parse_all(email.to())?,
            cc: parse_all(email.cc())?,
            bcc: parse_all(email.bcc())?,
        };
        if envelope.is_empty() {
            return Err(Error::NoRecipients);
        }
        Ok(envelope)
    }

    /// Returns To, Cc and Bcc recipients in that order.
    pub fn all_recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Returns the first To recipient.
    #[must_use]
    pub fn first_to(&self) -> Option<&Address> {
        self.to.first()
    }

    /// Returns the total number of recipients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Returns true if there are no recipients.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_all(addrs: &[String]) -> Result<Vec<Address>> {
    addrs
        .iter()
        .map(|addr| Address::new(addr).map_err(Error::from))
        .collect()
}

/// Authenticates per the configured mode, or proceeds anonymously for
/// [`AuthMode::None`](crate::config::AuthMode::None).
///
/// PLAIN and LOGIN are refused on an unencrypted connection unless the
/// server is on loopback.
async fn authenticate(
    client: Client<Connected>,
    settings: &SmtpSettings,
) -> Result<Client<Authenticated>> {
    let mode = settings.auth_mode()?;
    let Some(mechanism) = mode.mechanism() else {
        return Ok(client.anonymous());
    };

    if mode.is_cleartext() && !client.is_tls() && !settings.is_loopback() {
        return Err(Error::InsecureAuth(settings.host().to_string()));
    }

    tracing::debug!(mechanism = mechanism.as_str(), user = %settings.user_login, "Authenticating");
    let client = client
        .auth(mechanism, &settings.user_login, settings.credential(mode))
        .await?;
    Ok(client)
}

/// Transmits built messages.
pub trait Deliver {
    /// Delivers `message` to the envelope recipients.
    fn deliver(
        &mut self,
        envelope: &Envelope,
        message: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Releases any held connection. Never fails and may be called again.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Delivery mode chosen at configuration time.
#[derive(Debug)]
pub enum Delivery {
    /// New connection per message.
    OneShot(OneShot),
    /// Pre-established authenticated session.
    Session(Session),
}

impl Delivery {
    /// Selects and prepares the delivery mode for `settings`.
    ///
    /// With `enable_tls` this opens and authenticates the session, so a
    /// connection or authentication failure is reported here and no
    /// delivery is produced.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings or a failed session setup.
    pub async fn connect(settings: &SmtpSettings) -> Result<Self> {
        if settings.enable_tls {
            Ok(Self::Session(Session::connect(settings).await?))
        } else {
            Ok(Self::OneShot(OneShot::new(settings)?))
        }
    }

    /// Returns true for the pre-established session mode.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Returns the mode name used in summaries.
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::OneShot(_) => "one-shot",
            Self::Session(_) => "session",
        }
    }
}

impl Deliver for Delivery {
    async fn deliver(&mut self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        match self {
            Self::OneShot(one_shot) => one_shot.deliver(envelope, message).await,
            Self::Session(session) => session.deliver(envelope, message).await,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::OneShot(one_shot) => one_shot.close().await,
            Self::Session(session) => session.close().await,
        }
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn email() -> Email {
        let mut email = Email::new();
        email.set_from("sender@example.com");
        email.set_to(["a@example.com", "b@example.com"]);
        email.add_cc("c@example.com");
        email.add_bcc("hidden@example.com");
        email
    }

    #[test]
    fn test_envelope_includes_bcc() {
        let envelope = Envelope::from_email(&email()).unwrap();
        let all: Vec<&str> = envelope.all_recipients().map(Address::as_str).collect();
        assert_eq!(
            all,
            [
                "a@example.com",
                "b@example.com",
                "c@example.com",
                "hidden@example.com"
            ]
        );
        assert_eq!(envelope.first_to().unwrap().as_str(), "a@example.com");
        assert_eq!(envelope.len(), 4);
    }

    #[test]
    fn test_envelope_without_recipients() {
        let mut email = Email::new();
        email.set_from("sender@example.com");
        assert!(matches!(
            Envelope::from_email(&email),
            Err(Error::NoRecipients)
        ));
    }

    #[test]
    fn test_envelope_invalid_sender() {
        let mut email = email();
        email.set_from("not-an-address");
        assert!(matches!(Envelope::from_email(&email), Err(Error::Smtp(_))));
    }

    #[test]
    fn test_envelope_rejects_addresses_joined_by_line_break() {
        let mut email = email();
        email.set_to(["alice@example.com\nbob@example.com"]);
        assert!(matches!(Envelope::from_email(&email), Err(Error::Smtp(_))));

        let mut email = self::email();
        email.add_bcc("carol@example.com\r\nmallory@example.com");
        assert!(matches!(Envelope::from_email(&email), Err(Error::Smtp(_))));
    }

    #[test]
    fn test_envelope_bcc_only() {
        let mut email = Email::new();
        email.set_from("sender@example.com");
        email.add_bcc("hidden@example.com");
        let envelope = Envelope::from_email(&email).unwrap();
        assert!(envelope.first_to().is_none());
        assert_eq!(envelope.len(), 1);
    }

    #[tokio::test]
    async fn test_one_shot_selected_without_tls() {
        let settings = SmtpSettings {
            address: "mx.example.com".into(),
            port: 25,
            ..SmtpSettings::default()
        };
        let delivery = Delivery::connect(&settings).await.unwrap();
        assert!(!delivery.is_session());
        assert_eq!(delivery.to_string(), "one-shot");
    }
}
