//! Delivery configuration and the YAML configuration file.
//!
//! ```yaml
//! smtp_settings:
//!   notify_mail:
//!     enable_tls: true
//!     address: smtp.example.com
//!     port: 465
//!     authentication: plain
//!     user_name: Notifier
//!     user_login: notify@example.com
//!     password: secret
//! ```

use crate::error::{Error, Result};
use mailcourier_smtp::AuthMechanism;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// EHLO name used when `domain` is not configured.
pub const DEFAULT_CLIENT_NAME: &str = "localhost";

/// How the client authenticates after EHLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// No authentication.
    #[default]
    None,
    /// SASL PLAIN with login and password.
    Plain,
    /// CRAM-MD5 challenge-response with login and shared secret.
    CramMd5,
    /// SASL LOGIN with login and password.
    Login,
}

impl AuthMode {
    /// Returns the SASL mechanism, or `None` when no authentication is done.
    #[must_use]
    pub const fn mechanism(self) -> Option<AuthMechanism> {
        match self {
            Self::None => None,
            Self::Plain => Some(AuthMechanism::Plain),
            Self::CramMd5 => Some(AuthMechanism::CramMd5),
            Self::Login => Some(AuthMechanism::Login),
        }
    }

    /// Returns true if the mechanism sends the password itself.
    #[must_use]
    pub const fn is_cleartext(self) -> bool {
        matches!(self, Self::Plain | Self::Login)
    }

    /// Returns the configuration keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Plain => "plain",
            Self::CramMd5 => "md5",
            Self::Login => "login",
        }
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "plain" => Ok(Self::Plain),
            "md5" | "cram-md5" => Ok(Self::CramMd5),
            "login" => Ok(Self::Login),
            other => Err(Error::Config(format!(
                "Unknown authentication mode: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection and sender settings for one SMTP account.
///
/// `enable_tls` selects the delivery mode: implicit TLS with one
/// pre-established session, or a plain connection per message that
/// upgrades with STARTTLS when offered.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// Implicit TLS and a pre-established session.
    #[serde(alias = "enable_starttls")]
    pub enable_tls: bool,
    /// `host:port` connect string; derived from `address` and `port` when empty.
    pub connect: String,
    /// Server host name.
    pub address: String,
    /// Server port.
    pub port: u16,
    /// EHLO client name.
    pub domain: String,
    /// `none`, `plain`, `md5` or `login`.
    pub authentication: String,
    /// Sender display name.
    pub user_name: String,
    /// Sender address and authentication identity.
    pub user_login: String,
    /// Password for `plain` and `login`.
    pub password: String,
    /// Shared secret for `md5`.
    pub secret: String,
    /// Name the server certificate must match; defaults to `address`.
    pub tls_server_name: String,
}

impl SmtpSettings {
    /// Fills derived fields and validates the authentication mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown authentication mode or when
    /// no server can be derived.
    pub fn expand(&mut self) -> Result<()> {
        if self.connect.is_empty() {
            if self.address.is_empty() {
                return Err(Error::Config(
                    "Either 'connect' or 'address' must be set".into(),
                ));
            }
            self.connect = format!("{}:{}", self.address, self.port);
        }
        if self.tls_server_name.is_empty() {
            self.tls_server_name = self.server_name().to_string();
        }
        self.auth_mode()?;
        Ok(())
    }

    /// Returns the `host:port` connect string.
    #[must_use]
    pub fn connect_addr(&self) -> String {
        if self.connect.is_empty() {
            format!("{}:{}", self.address, self.port)
        } else {
            self.connect.clone()
        }
    }

    /// Returns the host part of the connect string.
    #[must_use]
    pub fn host(&self) -> &str {
        if self.connect.is_empty() {
            return &self.address;
        }
        let host = self
            .connect
            .rsplit_once(':')
            .map_or(self.connect.as_str(), |(host, _)| host);
        host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Returns the name used to verify the server certificate.
    #[must_use]
    pub fn server_name(&self) -> &str {
        if !self.tls_server_name.is_empty() {
            &self.tls_server_name
        } else if !self.address.is_empty() {
            &self.address
        } else {
            self.host()
        }
    }

    /// Returns the EHLO client name.
    #[must_use]
    pub fn client_name(&self) -> &str {
        if self.domain.is_empty() {
            DEFAULT_CLIENT_NAME
        } else {
            &self.domain
        }
    }

    /// Parses the configured authentication mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown mode.
    pub fn auth_mode(&self) -> Result<AuthMode> {
        self.authentication.parse()
    }

    /// Returns the secret presented for `mode`: the CRAM secret for
    /// `md5`, otherwise the password.
    #[must_use]
    pub fn credential(&self, mode: AuthMode) -> &str {
        match mode {
            AuthMode::CramMd5 => &self.secret,
            _ => &self.password,
        }
    }

    /// Returns true if the connect host is a loopback name or address.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        matches!(self.host(), "localhost" | "127.0.0.1" | "::1")
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "<redacted>" }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("enable_tls", &self.enable_tls)
            .field("connect", &self.connect)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("domain", &self.domain)
            .field("authentication", &self.authentication)
            .field("user_name", &self.user_name)
            .field("user_login", &self.user_login)
            .field("password", &redact(&self.password))
            .field("secret", &redact(&self.secret))
            .field("tls_server_name", &self.tls_server_name)
            .finish()
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the configuration; defaults to the file's directory.
    pub config_path: Option<PathBuf>,
    /// SMTP settings by sender name.
    pub smtp_settings: HashMap<String, SmtpSettings>,
}

impl Config {
    /// Reads, parses and expands a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any
    /// settings entry is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&data)?;

        if config.config_path.is_none() {
            config.config_path = path.parent().map(Path::to_path_buf);
        }

        tracing::info!(
            path = %path.display(),
            senders = config.smtp_settings.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and expands configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML for this shape or a
    /// settings entry is invalid.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(text)?;
        for (name, settings) in &mut config.smtp_settings {
            settings
                .expand()
                .map_err(|e| Error::Config(format!("smtp_settings.{name}: {e}")))?;
        }
        Ok(config)
    }

    /// Returns the settings for a sender name.
    #[must_use]
    pub fn settings(&self, name: &str) -> Option<&SmtpSettings> {
        self.smtp_settings.get(name)
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
    use std::io::Write;

    const SAMPLE: &str = r#"
smtp_settings:
  notify_mail:
    enable_starttls: true
    address: smtp.example.com
    port: 465
    domain: example.com
    authentication: plain
    user_name: "Notifier"
    user_login: notify@example.com
    password: hunter2
  relay:
    connect: "10.0.0.5:2525"
    authentication: md5
    user_login: relay@example.com
    secret: cram-secret
bpmn:
  connect: "ignored:3000"
"#;

    #[test]
    fn test_parse_and_expand() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.smtp_settings.len(), 2);

        let notify = config.settings("notify_mail").unwrap();
        assert!(notify.enable_tls);
        assert_eq!(notify.connect, "smtp.example.com:465");
        assert_eq!(notify.tls_server_name, "smtp.example.com");
        assert_eq!(notify.client_name(), "example.com");
        assert_eq!(notify.auth_mode().unwrap(), AuthMode::Plain);
        assert_eq!(notify.credential(AuthMode::Plain), "hunter2");

        let relay = config.settings("relay").unwrap();
        assert!(!relay.enable_tls);
        assert_eq!(relay.connect_addr(), "10.0.0.5:2525");
        assert_eq!(relay.host(), "10.0.0.5");
        assert_eq!(relay.server_name(), "10.0.0.5");
        assert_eq!(relay.client_name(), DEFAULT_CLIENT_NAME);
        assert_eq!(relay.auth_mode().unwrap(), AuthMode::CramMd5);
        assert_eq!(relay.credential(AuthMode::CramMd5), "cram-secret");
    }

    #[test]
    fn test_unknown_auth_mode_rejected() {
        let err = Config::from_yaml(
            "smtp_settings:\n  bad:\n    address: mx.example.com\n    authentication: kerberos\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("smtp_settings.bad"));
        assert!(err.to_string().contains("kerberos"));
    }

    #[test]
    fn test_missing_server_rejected() {
        let mut settings = SmtpSettings::default();
        assert!(matches!(settings.expand(), Err(Error::Config(_))));
    }

    #[test]
    fn test_auth_mode_keywords() {
        assert_eq!("".parse::<AuthMode>().unwrap(), AuthMode::None);
        assert_eq!("NONE".parse::<AuthMode>().unwrap(), AuthMode::None);
        assert_eq!("login".parse::<AuthMode>().unwrap(), AuthMode::Login);
        assert_eq!(AuthMode::CramMd5.to_string(), "md5");
        assert_eq!(AuthMode::None.mechanism(), None);
        assert_eq!(AuthMode::Login.mechanism(), Some(AuthMechanism::Login));
        assert!(AuthMode::Plain.is_cleartext());
        assert!(!AuthMode::CramMd5.is_cleartext());
    }

    #[test]
    fn test_bracketed_ipv6_host() {
        let settings = SmtpSettings {
            connect: "[::1]:25".into(),
            ..SmtpSettings::default()
        };
        assert_eq!(settings.host(), "::1");
        assert!(settings.is_loopback());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let debug = format!("{:?}", config.settings("relay").unwrap());
        assert!(debug.contains("relay@example.com"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("cram-secret"));
    }

    #[test]
    fn test_load_fills_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(SAMPLE.as_bytes())
            .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(dir.path()));
        assert!(config.settings("notify_mail").is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(dir.path().join("absent.yaml")),
            Err(Error::Io(_))
        ));
    }
}
