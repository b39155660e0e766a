//! Session commands issued by the connection handler itself
//!
//! Everything else (FILE, ANIME, MYLISTADD, ...) is built by callers and handed
//! to the handler as a finished [`Request`]. Only the commands that manage the
//! session live here, behind a trait so another builder can be injected.

use crate::protocol::PROTOCOL_VERSION;
use crate::protocol::codec::Response;
use crate::protocol::request::Request;
use crate::settings::UdpSettings;

/// Builder for the login, logout and ping commands
pub trait SessionCommands: Send + Sync {
    /// AUTH command for the given credentials
    fn login(&self, username: &str, password: &str) -> Request;

    /// LOGOUT command; the handler attaches the session id
    fn logout(&self) -> Request;

    /// Keepalive command
    fn ping(&self) -> Request;

    /// Session id from an accepted login reply: the first word of the payload
    fn parse_session(&self, response: &Response) -> Option<String> {
        response
            .payload
            .split_whitespace()
            .next()
            .map(str::to_string)
    }

    /// Add the session id to a command
    fn attach_session(&self, request: &Request, session_id: &str) -> Request {
        request.with_session(session_id)
    }
}

/// The AniDB UDP API session commands
#[derive(Debug, Clone)]
pub struct AniDbSessionCommands {
    client_name: String,
    client_version: u32,
}

impl AniDbSessionCommands {
    pub fn new(client_name: impl Into<String>, client_version: u32) -> Self {
        Self {
            client_name: client_name.into(),
            client_version,
        }
    }

    pub fn from_settings(settings: &UdpSettings) -> Self {
        Self::new(settings.client_name.clone(), settings.client_version)
    }
}

/// Escape a parameter value; AniDB expects `&` as `&amp;`
fn encode_value(value: &str) -> String {
    value.replace('&', "&amp;").replace('\n', "<br />").replace('\r', "")
}

impl SessionCommands for AniDbSessionCommands {
    fn login(&self, username: &str, password: &str) -> Request {
        Request::new(format!(
            "AUTH user={}&pass={}&protover={PROTOCOL_VERSION}&client={}&clientver={}",
            encode_value(username),
            encode_value(password),
            encode_value(&self.client_name),
            self.client_version
        ))
    }

    fn logout(&self) -> Request {
        Request::new("LOGOUT")
    }

    fn ping(&self) -> Request {
        Request::ping("PING")
    }
}
