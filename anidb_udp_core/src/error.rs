//! Error types for the AniDB UDP Connection Core
//!
//! Protocol failures live in [`crate::protocol::error`]; this module wraps
//! them together with configuration validation errors into the crate-level
//! [`Error`].

use thiserror::Error;

pub use crate::protocol::error::ProtocolError;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol related errors
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Validation related errors
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Protocol(ProtocolError::Io(source))
    }
}

/// Settings and input validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A configuration value is missing or out of range
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Username or password is empty
    #[error("AniDB credentials are missing: {field} is empty")]
    MissingCredentials { field: String },
}

impl ValidationError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a missing credentials error
    pub fn missing_credentials(field: &str) -> Self {
        Self::MissingCredentials {
            field: field.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_protocol_error_is_wrapped_transparently() {
        let error: Error = ProtocolError::Timeout(Duration::from_secs(30)).into();
        assert!(matches!(error, Error::Protocol(ProtocolError::Timeout(_))));
        assert!(error.to_string().contains("30s"));
    }

    #[test]
    fn test_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Protocol(ProtocolError::Io(_))));
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError::invalid_configuration("client_port", "must not be 0");
        assert_eq!(
            error.to_string(),
            "Invalid configuration: client_port - must not be 0"
        );

        let error = ValidationError::missing_credentials("password");
        assert!(error.to_string().contains("password is empty"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
