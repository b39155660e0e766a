//! Protocol-specific error types
//!
//! This module defines error types for the AniDB UDP connection core.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol-specific error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket could not be bound or the server could not be resolved
    #[error("AniDB is unreachable: {message}")]
    Connectivity { message: String },

    /// No reply arrived within the receive timeout
    #[error("AniDB did not respond within {0:?}")]
    Timeout(Duration),

    /// The client is banned; no request is sent until the ban expires
    #[error("Banned from AniDB UDP API until {expires_at}")]
    Banned { expires_at: DateTime<Utc> },

    /// The session is believed dead and must be re-established
    #[error("AniDB session is invalid; login required")]
    InvalidSession,

    /// The reply did not have the expected shape
    #[error("Unexpected AniDB response: {response:?}")]
    UnexpectedResponse { response: String },

    /// The reply bytes could not be decoded
    #[error("Decoding error: {message}")]
    Decoding { message: String },
}

impl ProtocolError {
    /// Create a connectivity error
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Create an unexpected response error carrying the raw text
    pub fn unexpected_response(response: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            response: response.into(),
        }
    }

    /// Create a decoding error
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    /// Create a ban error
    pub fn banned(expires_at: DateTime<Utc>) -> Self {
        Self::Banned { expires_at }
    }

    /// Check if this error is transient and the unit of work can be retried later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Connectivity { .. } | Self::Timeout(_)
        )
    }

    /// Check if this error indicates a need to re-authenticate
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::InvalidSession)
    }

    /// Check if protocol work must be suspended until a ban lifts
    pub fn is_ban(&self) -> bool {
        matches!(self, Self::Banned { .. })
    }

    /// Expiry of the ban this error reports, if any
    pub fn ban_expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Banned { expires_at } => Some(*expires_at),
            _ => None,
        }
    }
}
