//! Error types for MIME operations.

use std::io;
use std::string::FromUtf8Error;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An attachment's content source could not be read.
    #[error("Failed to read attachment {filename:?}: {source}")]
    Attachment {
        /// Display filename of the attachment.
        filename: String,
        /// Underlying read error.
        #[source]
        source: io::Error,
    },

    /// Writing the serialized message failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decode error.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] FromUtf8Error),
}

impl Error {
    /// Wraps a read failure of the named attachment.
    #[must_use]
    pub fn attachment(filename: impl Into<String>, source: io::Error) -> Self {
        Self::Attachment {
            filename: filename.into(),
            source,
        }
    }
}
