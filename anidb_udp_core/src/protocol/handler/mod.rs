//! AniDB UDP connection handler
//!
//! One handler per process, shared through an `Arc`. Every background job
//! sends its commands through [`UdpConnectionHandler::send`], which refuses to
//! touch the network while banned or with a dead session, logs in on demand,
//! spaces requests through the shared [`RateLimiter`] and reacts to the
//! server's ban, session and back-off codes.
//!
//! Lock order: transport, then rate limiter. The state lock is never held
//! across an await.

mod monitor;
mod state;

pub use state::ConnectionState;

use crate::error::ValidationError;
use crate::protocol::codec::{Response, encode_request};
use crate::protocol::codes::ReturnCode;
use crate::protocol::commands::{AniDbSessionCommands, SessionCommands};
use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::events::{ConnectionEvent, EVENT_CHANNEL_CAPACITY};
use crate::protocol::rate_limit::RateLimiter;
use crate::protocol::request::{Request, mask_command};
use crate::protocol::transport::{Transport, UdpTransport};
use crate::settings::UdpSettings;
use chrono::{DateTime, Utc};
use log::{debug, error, trace, warn};
use state::HandlerState;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Connection, session and ban state machine for the AniDB UDP API
pub struct UdpConnectionHandler {
    settings: UdpSettings,
    /// Half-duplex channel; one request in flight at a time
    transport: Mutex<Box<dyn Transport>>,
    rate_limiter: Arc<RateLimiter>,
    commands: Box<dyn SessionCommands>,
    state: RwLock<HandlerState>,
    events: broadcast::Sender<ConnectionEvent>,
    /// Serialises login attempts from concurrent senders
    login_lock: Mutex<()>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    this: Weak<UdpConnectionHandler>,
}

impl UdpConnectionHandler {
    /// Create a handler around an explicit transport, command builder and limiter
    ///
    /// The socket is not bound until [`init`](Self::init) or the first request.
    pub fn new(
        settings: UdpSettings,
        transport: Box<dyn Transport>,
        commands: Box<dyn SessionCommands>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = HandlerState::new(settings.username.clone(), settings.password.clone());
        Arc::new_cyclic(|this| Self {
            settings,
            transport: Mutex::new(transport),
            rate_limiter,
            commands,
            state: RwLock::new(state),
            events,
            login_lock: Mutex::new(()),
            monitor: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Create a handler talking to the real AniDB server described by `settings`
    pub fn from_settings(settings: UdpSettings) -> std::result::Result<Arc<Self>, ValidationError> {
        settings.validate()?;
        let transport = Box::new(UdpTransport::new(&settings));
        let commands = Box::new(AniDbSessionCommands::from_settings(&settings));
        let rate_limiter = Arc::new(RateLimiter::new(settings.min_request_interval()));
        Ok(Self::new(settings, transport, commands, rate_limiter))
    }

    pub fn settings(&self) -> &UdpSettings {
        &self.settings
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, events: impl IntoIterator<Item = ConnectionEvent>) {
        for event in events {
            trace!("Connection event: {event:?}");
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    /// Bind the socket and start the idle monitor
    pub async fn init(&self) -> Result<()> {
        let connected = {
            let mut transport = self.transport.lock().await;
            transport.is_connected() || transport.try_connect().await
        };
        if !connected {
            return Err(ProtocolError::connectivity(format!(
                "could not bind UDP port {} or resolve {}:{}",
                self.settings.client_port, self.settings.server_host, self.settings.server_port
            )));
        }

        self.state.write().await.mark_bound();
        self.start_monitor().await;
        Ok(())
    }

    /// Stop the idle monitor and close the socket
    pub async fn close(&self) {
        self.stop_monitor().await;
        self.transport.lock().await.close().await;
        let events = self.state.write().await.mark_disconnected();
        self.emit(events);
        debug!("AniDB UDP connection closed");
    }

    /// Ensure a session exists, logging in with the stored credentials if needed
    pub async fn login(&self) -> bool {
        let (username, password) = {
            let state = self.state.read().await;
            (state.username.clone(), state.password.clone())
        };
        self.login_with(&username, &password).await
    }

    async fn login_with(&self, username: &str, password: &str) -> bool {
        let _guard = self.login_lock.lock().await;
        if self.state.read().await.is_logged_in() {
            return true;
        }

        if username.is_empty() || password.is_empty() {
            warn!("AniDB credentials are not set; not logging in");
            self.emit([ConnectionEvent::LoginFailed]);
            return false;
        }

        if !self.state.read().await.is_bound() {
            if let Err(e) = self.init().await {
                error!("Unable to login to AniDB: {e}");
                self.emit([ConnectionEvent::LoginFailed]);
                return false;
            }
        }

        debug!("Logging in to AniDB as {username}");
        let request = self.commands.login(username, password);
        let result = match self.round_trip(&request).await {
            Err(ProtocolError::Timeout(_)) => {
                warn!("AniDB login timed out; restarting socket and retrying once");
                self.force_reconnection().await;
                self.round_trip(&request).await
            }
            Err(ProtocolError::UnexpectedResponse { .. }) => {
                // Usually a stale reply after an unclean shutdown
                warn!("Unexpected reply to AniDB login; retrying with Unicode");
                self.round_trip(&request.clone().unicode(true)).await
            }
            other => other,
        };

        match result {
            Ok(response) if response.code.is_login_accepted() => {
                if let Some(session_id) = self.commands.parse_session(&response) {
                    let events = self.state.write().await.set_logged_in(session_id);
                    self.emit(events);
                    debug!("Logged in to AniDB ({})", response.code);
                    return true;
                }
                error!("AniDB accepted the login but sent no session id");
            }
            Ok(response) if response.code == ReturnCode::LOGIN_FAILED => {
                error!("AniDB login failed: invalid credentials");
            }
            Ok(response) => {
                error!("AniDB login failed with {}", response.code);
            }
            Err(e) if e.is_ban() => {
                error!("AniDB login failed: {e}");
                self.emit([ConnectionEvent::LoginFailed]);
                return false;
            }
            Err(e) => {
                error!("Unable to login to AniDB: {e}");
            }
        }

        let events = self.state.write().await.set_invalid_session(true);
        self.emit(events);
        self.emit([ConnectionEvent::LoginFailed]);
        false
    }

    /// Send a command through the ban/session gate, logging in if needed
    ///
    /// The session id is attached to the command before it is sent.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        if let Some(expires_at) = self.current_ban().await {
            debug!("Refusing {} while banned", request.name());
            return Err(ProtocolError::banned(expires_at));
        }
        if self.is_invalid_session().await {
            debug!("Refusing {} with an invalid session", request.name());
            return Err(ProtocolError::InvalidSession);
        }

        if !self.state.read().await.is_bound() {
            self.init().await?;
        }

        if !self.login().await {
            return Err(match self.current_ban().await {
                Some(expires_at) => ProtocolError::banned(expires_at),
                None => ProtocolError::InvalidSession,
            });
        }

        let session_id = self
            .session_id()
            .await
            .ok_or(ProtocolError::InvalidSession)?;
        let request = self.commands.attach_session(request, &session_id);
        self.send_directly(&request).await
    }

    /// Send a command without the ban/session gate
    ///
    /// Still rate limited. Session-invalidating replies are returned to the
    /// caller after the connection has been rebuilt.
    pub async fn send_directly(&self, request: &Request) -> Result<Response> {
        let session_id = self.session_id().await;
        let response = self.round_trip(request).await?;
        if response.code.invalidates_session() {
            debug!("Forcing reconnection after {}", response.code);
            // The server may still hold the session we just dropped
            self.reconnect(session_id).await;
        }
        Ok(response)
    }

    /// Rate limit, exchange one datagram pair, decode and classify the reply
    async fn round_trip(&self, request: &Request) -> Result<Response> {
        let payload = encode_request(&request.command, request.needs_unicode);
        let (reply, started) = {
            // Slot claimed under the transport lock: spacing holds on the wire
            let mut transport = self.transport.lock().await;
            self.rate_limiter.ensure_rate().await;
            self.state
                .write()
                .await
                .stamp(Instant::now(), request.is_ping);

            if !request.disable_logging {
                debug!(
                    "AniDB UDP call (using {}): {}",
                    if request.needs_unicode {
                        "Unicode"
                    } else {
                        "ASCII"
                    },
                    mask_command(&request.command)
                );
            }

            let started = Instant::now();
            (transport.send(&payload).await?, started)
        };
        self.state
            .write()
            .await
            .stamp(Instant::now(), request.is_ping);

        if reply.iter().all(|&b| b == 0) {
            warn!("Empty reply from AniDB; the socket is closed or the network is down");
            return Err(ProtocolError::connectivity(
                "no data received from AniDB (socket closed?)",
            ));
        }

        let response = Response::from_bytes(&reply)?;
        if !request.disable_logging {
            trace!(
                "AniDB reply in {:?}: {}",
                started.elapsed(),
                mask_command(&response.raw)
            );
        }

        self.classify(&response).await?;
        Ok(response)
    }

    /// Apply the state changes a return code demands
    async fn classify(&self, response: &Response) -> Result<()> {
        let code = response.code;
        if code.is_ban() {
            let now = Utc::now();
            let expires_at = now + self.settings.ban_reset();
            let events = self
                .state
                .write()
                .await
                .set_banned(now, self.settings.ban_reset());
            self.emit(events);
            error!("Banned from AniDB UDP API until {expires_at}");
            return Err(ProtocolError::banned(expires_at));
        }

        if code.invalidates_session() {
            warn!("AniDB reported {code}; marking session invalid");
            let events = self.state.write().await.set_invalid_session(true);
            self.emit(events);
        } else if code.is_transient_server_error() {
            let event = self.state.write().await.extend_pause(
                Instant::now(),
                Utc::now(),
                self.settings.pause_duration(),
                &code.to_string(),
            );
            warn!(
                "AniDB reported {code}; pausing for {:?}",
                self.settings.pause_duration()
            );
            self.emit([event]);
        }
        Ok(())
    }

    /// Log out if logged in and drop the session
    ///
    /// The LOGOUT command is skipped while banned and its errors are ignored;
    /// the session is cleared either way.
    pub async fn force_logout(&self) {
        let Some(session_id) = self.session_id().await else {
            return;
        };
        self.logout_session(&session_id).await;

        let events = self.state.write().await.clear_session();
        self.emit(events);
    }

    /// Best-effort LOGOUT for `session_id`; skipped while banned
    async fn logout_session(&self, session_id: &str) {
        if self.is_banned().await {
            debug!("Banned; dropping AniDB session without LOGOUT");
            return;
        }

        debug!("Logging out of AniDB");
        let request = self
            .commands
            .attach_session(&self.commands.logout(), session_id);
        if let Err(e) = self.round_trip(&request).await {
            debug!("AniDB logout failed: {e}");
        }
    }

    /// Log out, close the socket and monitor, then bind a fresh socket
    pub async fn force_reconnection(&self) {
        let session_id = self.session_id().await;
        self.reconnect(session_id).await;
    }

    /// Rebuild the connection, logging out `stale_session` first
    ///
    /// Every step runs whatever the previous one did, so the sequence always
    /// completes.
    async fn reconnect(&self, stale_session: Option<String>) {
        debug!("Forcing AniDB UDP reconnection");
        if let Some(session_id) = stale_session {
            self.logout_session(&session_id).await;
            let events = self.state.write().await.clear_session();
            self.emit(events);
        }
        self.close().await;
        if let Err(e) = self.init().await {
            error!("Failed to reinitialize AniDB socket: {e}");
        }
    }

    /// Replace the stored credentials
    ///
    /// Clears a previous invalid-session verdict so the next request logs in
    /// with the new credentials.
    pub async fn set_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<(), ValidationError> {
        if username.is_empty() {
            return Err(ValidationError::missing_credentials("username"));
        }
        if password.is_empty() {
            return Err(ValidationError::missing_credentials("password"));
        }

        let events = {
            let mut state = self.state.write().await;
            state.username = username.to_string();
            state.password = password.to_string();
            state.set_invalid_session(false)
        };
        self.emit(events);
        Ok(())
    }

    /// Check credentials by logging in and straight back out
    ///
    /// An existing session counts as success and is logged out as well.
    pub async fn test_login(&self, username: &str, password: &str) -> bool {
        if username.is_empty() || password.is_empty() {
            return false;
        }
        let result = self.login_with(username, password).await;
        if result {
            self.force_logout().await;
        }
        result
    }

    /// Forget the session and the invalid-session verdict without any I/O
    pub async fn clear_session(&self) {
        let events = {
            let mut state = self.state.write().await;
            let mut events = state.clear_session();
            events.extend(state.set_invalid_session(false));
            events
        };
        self.emit(events);
    }

    /// Lift a ban before it expires
    pub async fn reset_ban(&self) {
        let event = self.state.write().await.reset_ban();
        if event.is_some() {
            debug!("AniDB UDP ban reset");
        }
        self.emit(event);
    }

    /// Active ban expiry; an expired ban is cleared on the way
    async fn current_ban(&self) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        let event = {
            let mut state = self.state.write().await;
            if let Some(ban) = state.active_ban(now) {
                return Some(ban.expires_at);
            }
            state.clear_expired_ban(now)
        };
        if event.is_some() {
            debug!("AniDB UDP ban expired");
        }
        self.emit(event);
        None
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.connection_state(Utc::now())
    }

    pub async fn is_banned(&self) -> bool {
        self.state.read().await.active_ban(Utc::now()).is_some()
    }

    /// When the current ban started
    pub async fn ban_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.ban.map(|ban| ban.banned_at)
    }

    pub async fn ban_expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.ban.map(|ban| ban.expires_at)
    }

    pub fn ban_reset_hours(&self) -> f64 {
        self.settings.ban_reset_hours
    }

    pub async fn is_invalid_session(&self) -> bool {
        self.state.read().await.invalid_session
    }

    pub async fn is_logged_in(&self) -> bool {
        self.state.read().await.is_logged_in()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.state.read().await.session_id().map(str::to_string)
    }

    /// End of the current soft pause, if any
    pub async fn pause_until(&self) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .await
            .pause
            .as_ref()
            .map(|pause| pause.until_utc)
    }

    pub async fn pause_reason(&self) -> Option<String> {
        self.state
            .read()
            .await
            .pause
            .as_ref()
            .map(|pause| pause.reason.clone())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.lock().await.local_addr()
    }

    pub async fn remote_addr(&self) -> Option<SocketAddr> {
        self.transport.lock().await.remote_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::transport::DISCONNECTED_REPLY;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replies from a queue; records every payload
    struct QueueTransport {
        replies: Arc<StdMutex<VecDeque<Vec<u8>>>>,
        sent: Arc<StdMutex<Vec<Vec<u8>>>>,
        connected: bool,
    }

    #[async_trait]
    impl Transport for QueueTransport {
        async fn try_connect(&mut self) -> bool {
            self.connected = true;
            true
        }

        async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
            if !self.connected {
                return Ok(DISCONNECTED_REPLY.to_vec());
            }
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn close(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn handler(replies: &[&str]) -> (Arc<UdpConnectionHandler>, Arc<StdMutex<Vec<Vec<u8>>>>) {
        let settings = UdpSettings {
            username: "user".to_string(),
            password: "pass".to_string(),
            idle_check_interval_secs: 3600,
            ..Default::default()
        };
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport = QueueTransport {
            replies: Arc::new(StdMutex::new(
                replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
            )),
            sent: sent.clone(),
            connected: false,
        };
        let handler = UdpConnectionHandler::new(
            settings.clone(),
            Box::new(transport),
            Box::new(AniDbSessionCommands::from_settings(&settings)),
            Arc::new(RateLimiter::new(std::time::Duration::ZERO)),
        );
        (handler, sent)
    }

    fn sent_text(sent: &Arc<StdMutex<Vec<Vec<u8>>>>, index: usize) -> String {
        String::from_utf8(sent.lock().unwrap()[index].clone()).unwrap()
    }

    #[tokio::test]
    async fn test_send_logs_in_and_attaches_session() {
        let (handler, sent) = handler(&[
            "200 LOGIN_ACCEPTED\nabc12 LOGIN ACCEPTED\n",
            "208 UPTIME\n12345\n",
        ]);

        let response = handler.send(&Request::new("UPTIME")).await.unwrap();
        assert_eq!(response.code, ReturnCode::UPTIME);
        assert_eq!(response.payload, "12345");
        assert_eq!(handler.session_id().await.as_deref(), Some("abc12"));
        assert!(sent_text(&sent, 0).starts_with("AUTH user=user&pass=pass"));
        assert_eq!(sent_text(&sent, 1), "UPTIME s=abc12");
        assert!(handler.state().await.is_logged_in());
        handler.close().await;
    }

    #[tokio::test]
    async fn test_login_without_credentials_makes_no_call() {
        let (handler, sent) = handler(&[]);
        let mut events = handler.subscribe();
        handler.set_credentials("x", "y").await.unwrap();
        assert!(handler.set_credentials("", "y").await.is_err());

        {
            let mut state = handler.state.write().await;
            state.username.clear();
        }
        assert!(!handler.login().await);
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::LoginFailed);
        assert!(!handler.is_invalid_session().await);
    }

    #[tokio::test]
    async fn test_all_zero_reply_is_connectivity_error() {
        let (handler, _sent) = handler(&[]);
        let result = handler.send_directly(&Request::new("PING")).await;
        assert!(matches!(result, Err(ProtocolError::Connectivity { .. })));
        assert!(!handler.is_banned().await);
    }

    #[tokio::test]
    async fn test_invalid_session_reply_forces_reconnection() {
        let (handler, sent) = handler(&[
            "200 LOGIN_ACCEPTED\nabc12 LOGIN ACCEPTED\n",
            "506 INVALID_SESSION\n\n",
        ]);

        let response = handler.send(&Request::new("FILE fid=1")).await.unwrap();
        assert_eq!(response.code, ReturnCode::INVALID_SESSION);
        assert!(handler.is_invalid_session().await);
        assert_eq!(handler.session_id().await, None);
        // The dropped session is still logged out on the server
        assert_eq!(sent.lock().unwrap().len(), 3);
        assert_eq!(sent_text(&sent, 2), "LOGOUT s=abc12");
        assert_eq!(handler.state().await, ConnectionState::InvalidSession);

        let result = handler.send(&Request::new("FILE fid=1")).await;
        assert!(matches!(result, Err(ProtocolError::InvalidSession)));
        assert_eq!(sent.lock().unwrap().len(), 3);

        handler.clear_session().await;
        assert!(!handler.is_invalid_session().await);
        handler.close().await;
    }

    #[tokio::test]
    async fn test_reset_ban() {
        let (handler, _sent) = handler(&["555 BANNED\nflooding\n"]);
        handler.init().await.unwrap();
        let result = handler.send_directly(&Request::new("PING")).await;
        assert!(matches!(result, Err(ProtocolError::Banned { .. })));
        assert!(handler.is_banned().await);
        assert!(handler.ban_time().await.is_some());

        let mut events = handler.subscribe();
        handler.reset_ban().await;
        assert!(!handler.is_banned().await);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::BanLifted);
        assert_eq!(handler.ban_reset_hours(), 12.0);
    }
}
