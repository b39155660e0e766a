//! Connection state notifications
//!
//! The handler publishes every observable transition on a broadcast channel.
//! Subscribers that fall behind lose the oldest events; the handler never
//! waits for them.

use chrono::{DateTime, Utc};

/// Capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A change in the handler's ban, session or pause state
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The server banned this client
    Banned {
        banned_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// A ban expired or was reset
    BanLifted,
    /// The invalid-session flag changed
    InvalidSession(bool),
    /// A login attempt failed or could not be made
    LoginFailed,
    /// A session was established
    LoggedIn,
    /// The session was discarded
    LoggedOut,
    /// Requests should back off until `until`
    Paused {
        until: DateTime<Utc>,
        reason: String,
    },
    /// A soft pause elapsed
    PauseCleared,
}
