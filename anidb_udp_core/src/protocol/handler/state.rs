//! Connection state management
//!
//! This module holds the handler's mutable state: socket/session progress, the
//! invalid-session flag, the ban, the soft pause and the activity clocks. All
//! mutations return the events they cause so the handler can publish them
//! after releasing its lock.

use crate::protocol::events::ConnectionEvent;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Observable state of the AniDB connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket
    Disconnected,
    /// Socket bound, no session
    Bound,
    /// Session established
    LoggedIn { session_id: String },
    /// The session is believed dead and must not be used
    InvalidSession,
    /// Server-enforced lockout
    Banned {
        banned_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
}

impl ConnectionState {
    /// Get the session id if logged in
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ConnectionState::LoggedIn { session_id } => Some(session_id),
            _ => None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, ConnectionState::LoggedIn { .. })
    }

    pub fn is_banned(&self) -> bool {
        matches!(self, ConnectionState::Banned { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Bound => write!(f, "Bound (no session)"),
            ConnectionState::LoggedIn { .. } => write!(f, "Logged in"),
            ConnectionState::InvalidSession => write!(f, "Invalid session"),
            ConnectionState::Banned { expires_at, .. } => {
                write!(f, "Banned until {expires_at}")
            }
        }
    }
}

/// Socket and session progress; the session id only exists while logged in
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionState {
    Disconnected,
    Bound,
    LoggedIn { session_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ban {
    pub banned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pause {
    /// Monotonic deadline used for scheduling
    pub until: Instant,
    /// Wall-clock deadline reported to observers
    pub until_utc: DateTime<Utc>,
    pub reason: String,
}

/// Mutable handler state, guarded by the handler's `RwLock`
#[derive(Debug)]
pub(crate) struct HandlerState {
    pub session: SessionState,
    pub invalid_session: bool,
    pub ban: Option<Ban>,
    pub pause: Option<Pause>,
    pub last_ping_at: Option<Instant>,
    pub last_non_ping_at: Option<Instant>,
    pub last_message_at: Option<Instant>,
    pub username: String,
    pub password: String,
}

impl HandlerState {
    pub fn new(username: String, password: String) -> Self {
        Self {
            session: SessionState::Disconnected,
            invalid_session: false,
            ban: None,
            pause: None,
            last_ping_at: None,
            last_non_ping_at: None,
            last_message_at: None,
            username,
            password,
        }
    }

    /// Project the internal flags onto the public state enum
    pub fn connection_state(&self, now: DateTime<Utc>) -> ConnectionState {
        if let Some(ban) = self.active_ban(now) {
            return ConnectionState::Banned {
                banned_at: ban.banned_at,
                expires_at: ban.expires_at,
            };
        }
        if self.invalid_session {
            return ConnectionState::InvalidSession;
        }
        match &self.session {
            SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Bound => ConnectionState::Bound,
            SessionState::LoggedIn { session_id } => ConnectionState::LoggedIn {
                session_id: session_id.clone(),
            },
        }
    }

    /// The ban, if one is recorded and has not expired at `now`
    pub fn active_ban(&self, now: DateTime<Utc>) -> Option<Ban> {
        self.ban.filter(|ban| now < ban.expires_at)
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.session {
            SessionState::LoggedIn { session_id } => Some(session_id),
            _ => None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.session, SessionState::LoggedIn { .. })
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self.session, SessionState::Disconnected)
    }

    /// Socket bound; an existing session is kept
    pub fn mark_bound(&mut self) {
        if self.session == SessionState::Disconnected {
            self.session = SessionState::Bound;
        }
    }

    /// Socket closed; any session is gone with it
    pub fn mark_disconnected(&mut self) -> Vec<ConnectionEvent> {
        let was_logged_in = self.is_logged_in();
        self.session = SessionState::Disconnected;
        if was_logged_in {
            vec![ConnectionEvent::LoggedOut]
        } else {
            Vec::new()
        }
    }

    pub fn set_logged_in(&mut self, session_id: String) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        self.session = SessionState::LoggedIn { session_id };
        if self.invalid_session {
            self.invalid_session = false;
            events.push(ConnectionEvent::InvalidSession(false));
        }
        if self.ban.take().is_some() {
            events.push(ConnectionEvent::BanLifted);
        }
        events.push(ConnectionEvent::LoggedIn);
        events
    }

    /// Drop the session id, keeping the socket
    pub fn clear_session(&mut self) -> Vec<ConnectionEvent> {
        if self.is_logged_in() {
            self.session = SessionState::Bound;
            vec![ConnectionEvent::LoggedOut]
        } else {
            Vec::new()
        }
    }

    pub fn set_invalid_session(&mut self, invalid: bool) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        if invalid {
            events.extend(self.clear_session());
        }
        if self.invalid_session != invalid {
            self.invalid_session = invalid;
            events.push(ConnectionEvent::InvalidSession(invalid));
        }
        events
    }

    /// Record a ban starting at `now`; a repeated ban restamps the expiry
    pub fn set_banned(
        &mut self,
        now: DateTime<Utc>,
        length: chrono::Duration,
    ) -> Vec<ConnectionEvent> {
        let mut events = self.clear_session();
        if self.invalid_session {
            self.invalid_session = false;
            events.push(ConnectionEvent::InvalidSession(false));
        }
        let ban = Ban {
            banned_at: now,
            expires_at: now + length,
        };
        self.ban = Some(ban);
        events.push(ConnectionEvent::Banned {
            banned_at: ban.banned_at,
            expires_at: ban.expires_at,
        });
        events
    }

    /// Remove the ban if it has expired at `now`
    pub fn clear_expired_ban(&mut self, now: DateTime<Utc>) -> Option<ConnectionEvent> {
        match self.ban {
            Some(ban) if now >= ban.expires_at => {
                self.ban = None;
                Some(ConnectionEvent::BanLifted)
            }
            _ => None,
        }
    }

    pub fn reset_ban(&mut self) -> Option<ConnectionEvent> {
        self.ban.take().map(|_| ConnectionEvent::BanLifted)
    }

    /// Push the soft pause out to `now + length`; never shortens an existing one
    pub fn extend_pause(
        &mut self,
        now: Instant,
        now_utc: DateTime<Utc>,
        length: Duration,
        reason: &str,
    ) -> ConnectionEvent {
        let until = now + length;
        let until_utc = now_utc
            + chrono::Duration::from_std(length).unwrap_or_else(|_| chrono::Duration::zero());
        if let Some(pause) = self.pause.as_ref().filter(|p| p.until >= until) {
            return ConnectionEvent::Paused {
                until: pause.until_utc,
                reason: pause.reason.clone(),
            };
        }

        self.pause = Some(Pause {
            until,
            until_utc,
            reason: reason.to_string(),
        });
        ConnectionEvent::Paused {
            until: until_utc,
            reason: reason.to_string(),
        }
    }

    pub fn is_paused(&self, now: Instant) -> bool {
        self.pause.as_ref().is_some_and(|p| now < p.until)
    }

    pub fn clear_elapsed_pause(&mut self, now: Instant) -> Option<ConnectionEvent> {
        match &self.pause {
            Some(pause) if now >= pause.until => {
                self.pause = None;
                Some(ConnectionEvent::PauseCleared)
            }
            _ => None,
        }
    }

    /// Record traffic at `now`
    pub fn stamp(&mut self, now: Instant, is_ping: bool) {
        self.last_message_at = Some(now);
        if is_ping {
            self.last_ping_at = Some(now);
        } else {
            self.last_non_ping_at = Some(now);
        }
    }
}

/// Time since `at`, or `None` if it never happened
pub(crate) fn elapsed_since(now: Instant, at: Option<Instant>) -> Option<Duration> {
    at.map(|at| now.saturating_duration_since(at))
}
