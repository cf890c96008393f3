//! Error types shared by the selection and reload layers

use thiserror::Error;

/// Core errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Fatal at startup: the registry or selector cannot be built
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single source could not be read or parsed during refresh
    #[error("Source `{name}` unreadable ({path}): {message}")]
    SourceUnreadable {
        name: String,
        path: String,
        message: String,
    },

    /// Requested group or response key is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request lacks a field needed to serve it
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

impl Error {
    pub fn source_unreadable(
        name: impl Into<String>,
        path: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Error::SourceUnreadable {
            name: name.into(),
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error should abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
