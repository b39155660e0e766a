//! Canned AniDB replies and handler construction helpers

use crate::mocks::MockTransport;
use anidb_udp_core::{AniDbSessionCommands, RateLimiter, UdpConnectionHandler, UdpSettings};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Settings with credentials and an idle monitor that never fires on its own
pub fn test_settings() -> UdpSettings {
    UdpSettings {
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        idle_check_interval_secs: 24 * 60 * 60,
        ..Default::default()
    }
}

/// Handler over `mock` with no rate limiting
pub fn handler_with(mock: &MockTransport, settings: UdpSettings) -> Arc<UdpConnectionHandler> {
    handler_with_limiter(mock, settings, Arc::new(RateLimiter::new(Duration::ZERO)))
}

pub fn handler_with_limiter(
    mock: &MockTransport,
    settings: UdpSettings,
    rate_limiter: Arc<RateLimiter>,
) -> Arc<UdpConnectionHandler> {
    let commands = Box::new(AniDbSessionCommands::from_settings(&settings));
    UdpConnectionHandler::new(settings, Box::new(mock.clone()), commands, rate_limiter)
}

/// Zero-prefixed raw deflate datagram, as the server sends large replies
pub fn compressed(text: &str) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .expect("writing to a Vec cannot fail");
    let mut datagram = vec![0, 0];
    datagram.extend(encoder.finish().expect("writing to a Vec cannot fail"));
    datagram
}

/// Server replies in wire format
pub mod replies {
    pub fn login_accepted(session_id: &str) -> String {
        format!("200 LOGIN_ACCEPTED\n{session_id} LOGIN ACCEPTED\n")
    }

    pub fn login_accepted_new_version(session_id: &str) -> String {
        format!("201 LOGIN_ACCEPTED_NEW_VERSION\n{session_id} LOGIN ACCEPTED - NEW VERSION AVAILABLE\n")
    }

    pub const LOGIN_FAILED: &str = "500 LOGIN_FAILED\nLOGIN FAILED\n";
    pub const LOGGED_OUT: &str = "203 LOGGED_OUT\nLOGGED OUT\n";
    pub const PONG: &str = "300 PONG\n\n";
    pub const BANNED: &str = "555 BANNED\nflooding\n";
    pub const INVALID_SESSION: &str = "506 INVALID_SESSION\nINVALID SESSION\n";
    pub const UNKNOWN_COMMAND: &str = "598 UNKNOWN_COMMAND\nUNKNOWN COMMAND\n";
    pub const SERVER_BUSY: &str = "602 SERVER_BUSY\nSERVER BUSY - TRY AGAIN LATER\n";
    pub const NO_SUCH_FILE: &str = "320 NO_SUCH_FILE\nNO SUCH FILE\n";

    /// Reply with an extra line, flagged as truncated by the parser
    pub fn four_segments(code: u16, name: &str) -> String {
        format!("{code} {name}\nfirst|line\nsecond|line\n")
    }
}
