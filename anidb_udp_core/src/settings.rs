//! Connection settings for the AniDB UDP client

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default AniDB UDP server host
pub const DEFAULT_SERVER_HOST: &str = "api.anidb.net";

/// Default AniDB UDP server port
pub const DEFAULT_SERVER_PORT: u16 = 9000;

/// Default local port the client binds to
pub const DEFAULT_CLIENT_PORT: u16 = 4556;

/// Longest accepted ban length, one year
pub const MAX_BAN_RESET_HOURS: f64 = 24.0 * 365.0;

/// Settings consumed by the connection handler and transport
///
/// All durations are stored as plain numbers so the struct can be layered
/// from TOML files and environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UdpSettings {
    /// AniDB server hostname
    pub server_host: String,
    /// AniDB server port
    pub server_port: u16,
    /// Fixed local port. AniDB tracks clients by source port, so this must
    /// stay the same across restarts.
    pub client_port: u16,
    pub username: String,
    pub password: String,
    /// Registered client name sent with AUTH
    pub client_name: String,
    /// Registered client version sent with AUTH
    pub client_version: u32,
    /// Requests allowed per rate window
    pub requests_per_window: u32,
    /// Rate window length in seconds
    pub window_secs: f64,
    /// How long to wait for a reply datagram
    pub receive_timeout_secs: u64,
    /// Length of a UDP ban in hours
    pub ban_reset_hours: f64,
    /// Idle time after which a keepalive ping is sent
    pub ping_interval_secs: u64,
    /// Idle time (non-ping traffic) after which the session is logged out
    pub force_logout_secs: u64,
    /// Soft pause applied after a transient server error
    pub pause_secs: u64,
    /// Period of the idle monitor
    pub idle_check_interval_secs: u64,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            username: String::new(),
            password: String::new(),
            client_name: "animelibrary".to_string(),
            client_version: 1,
            requests_per_window: 1,
            window_secs: 2.0,
            receive_timeout_secs: 30,
            ban_reset_hours: 12.0,
            ping_interval_secs: 45,
            force_logout_secs: 600,
            pause_secs: 300,
            idle_check_interval_secs: 5,
        }
    }
}

impl UdpSettings {
    /// Check that the settings describe a usable connection
    ///
    /// Credentials are not checked here; an empty username or password is a
    /// login-time failure, not a configuration error.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.server_host.trim().is_empty() {
            return Err(ValidationError::invalid_configuration(
                "server_host",
                "must not be empty",
            ));
        }
        if self.server_port == 0 {
            return Err(ValidationError::invalid_configuration(
                "server_port",
                "must not be 0",
            ));
        }
        if self.client_port == 0 {
            return Err(ValidationError::invalid_configuration(
                "client_port",
                "must not be 0",
            ));
        }
        if self.requests_per_window == 0 {
            return Err(ValidationError::invalid_configuration(
                "requests_per_window",
                "must be at least 1",
            ));
        }
        if !(self.window_secs.is_finite() && self.window_secs >= 0.0) {
            return Err(ValidationError::invalid_configuration(
                "window_secs",
                "must be a non-negative number",
            ));
        }
        if !(self.ban_reset_hours.is_finite() && self.ban_reset_hours >= 0.0) {
            return Err(ValidationError::invalid_configuration(
                "ban_reset_hours",
                "must be a non-negative number",
            ));
        }
        if self.ban_reset_hours > MAX_BAN_RESET_HOURS {
            return Err(ValidationError::invalid_configuration(
                "ban_reset_hours",
                format!("must be at most {MAX_BAN_RESET_HOURS}"),
            ));
        }
        if self.idle_check_interval_secs == 0 {
            return Err(ValidationError::invalid_configuration(
                "idle_check_interval_secs",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Check that both credentials are present
    pub fn validate_credentials(&self) -> Result<(), ValidationError> {
        if self.username.is_empty() {
            return Err(ValidationError::missing_credentials("username"));
        }
        if self.password.is_empty() {
            return Err(ValidationError::missing_credentials("password"));
        }
        Ok(())
    }

    /// Minimum spacing between two outgoing requests
    pub fn min_request_interval(&self) -> Duration {
        let requests = self.requests_per_window.max(1) as f64;
        Duration::from_secs_f64((self.window_secs / requests).max(0.0))
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn force_logout_after(&self) -> Duration {
        Duration::from_secs(self.force_logout_secs)
    }

    pub fn pause_duration(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_secs.max(1))
    }

    /// Ban length as a chrono duration for wall-clock expiry math
    ///
    /// Clamped to `0..=MAX_BAN_RESET_HOURS` for settings that skipped validation.
    pub fn ban_reset(&self) -> chrono::Duration {
        let hours = self.ban_reset_hours.clamp(0.0, MAX_BAN_RESET_HOURS);
        chrono::Duration::milliseconds((hours * 3_600_000.0) as i64)
    }
}
