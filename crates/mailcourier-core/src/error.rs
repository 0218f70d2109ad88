//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file is not valid YAML for the expected shape.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Building the MIME message failed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailcourier_mime::Error),

    /// SMTP dialog failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailcourier_smtp::Error),

    /// The message has no envelope recipient.
    #[error("No recipients specified")]
    NoRecipients,

    /// The delivery session was closed or broken by an earlier failure.
    #[error("SMTP session is closed")]
    SessionClosed,

    /// Refusing to send cleartext credentials over an unencrypted connection.
    #[error("Refusing cleartext authentication over unencrypted connection to {0}")]
    InsecureAuth(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
