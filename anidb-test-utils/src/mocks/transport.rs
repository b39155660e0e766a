//! Scripted transport for driving the connection handler in tests

use anidb_udp_core::protocol::transport::DISCONNECTED_REPLY;
use anidb_udp_core::{ProtocolError, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock answers to the next request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Reply datagram, already inflated
    Bytes(Vec<u8>),
    /// No reply within the receive timeout
    Timeout,
}

/// Mock implementation of [`Transport`] for testing
///
/// Clones share their state, so a test keeps one clone to script replies and
/// inspect what was sent while the handler owns another.
///
/// # Examples
///
/// ```rust,no_run
/// use anidb_test_utils::{MockTransport, handler_with, replies, test_settings};
/// use anidb_udp_core::Request;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mock = MockTransport::new();
/// mock.push_reply(&replies::login_accepted("abc12"));
/// mock.push_reply("208 UPTIME\n1234\n");
///
/// let handler = handler_with(&mock, test_settings());
/// let response = handler.send(&Request::new("UPTIME")).await?;
/// assert_eq!(response.payload, "1234");
/// assert_eq!(mock.sent_commands()[1], "UPTIME s=abc12");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    behavior: Arc<Mutex<MockBehavior>>,
}

#[derive(Debug, Default)]
struct MockBehavior {
    replies: VecDeque<MockReply>,
    sent: Vec<Vec<u8>>,
    connected: bool,
    fail_connect: bool,
    connect_attempts: usize,
    close_count: usize,
}

impl MockTransport {
    /// Create a mock with no scripted replies
    pub fn new() -> Self {
        Self::default()
    }

    fn behavior(&self) -> std::sync::MutexGuard<'_, MockBehavior> {
        self.behavior.lock().unwrap()
    }

    /// Queue a text reply
    pub fn push_reply(&self, text: &str) {
        self.push_bytes(text.as_bytes().to_vec());
    }

    /// Queue a raw reply
    pub fn push_bytes(&self, bytes: Vec<u8>) {
        self.behavior().replies.push_back(MockReply::Bytes(bytes));
    }

    /// Queue a receive timeout
    pub fn push_timeout(&self) {
        self.behavior().replies.push_back(MockReply::Timeout);
    }

    /// Make `try_connect` fail
    pub fn fail_connect(&self, fail: bool) {
        self.behavior().fail_connect = fail;
    }

    /// Every payload the handler sent, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.behavior().sent.clone()
    }

    /// Sent payloads decoded as text (UTF-16BE or ASCII)
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent().iter().map(|payload| decode_sent(payload)).collect()
    }

    pub fn send_count(&self) -> usize {
        self.behavior().sent.len()
    }

    pub fn connect_attempts(&self) -> usize {
        self.behavior().connect_attempts
    }

    pub fn close_count(&self) -> usize {
        self.behavior().close_count
    }

    pub fn pending_replies(&self) -> usize {
        self.behavior().replies.len()
    }
}

/// Decode a request payload; UTF-16BE requests have a zero high byte for ASCII text
fn decode_sent(payload: &[u8]) -> String {
    let looks_utf16 = payload.len() >= 2 && payload.len() % 2 == 0 && payload[0] == 0;
    if looks_utf16 {
        let units: Vec<u16> = payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(payload).into_owned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn try_connect(&mut self) -> bool {
        let mut behavior = self.behavior();
        behavior.connect_attempts += 1;
        behavior.connected = !behavior.fail_connect;
        behavior.connected
    }

    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut behavior = self.behavior();
        if !behavior.connected {
            return Ok(DISCONNECTED_REPLY.to_vec());
        }

        behavior.sent.push(payload.to_vec());
        match behavior.replies.pop_front() {
            Some(MockReply::Bytes(bytes)) => Ok(bytes),
            Some(MockReply::Timeout) | None => Err(ProtocolError::Timeout(Duration::from_secs(30))),
        }
    }

    async fn close(&mut self) {
        let mut behavior = self.behavior();
        behavior.connected = false;
        behavior.close_count += 1;
    }

    fn is_connected(&self) -> bool {
        self.behavior().connected
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.is_connected()
            .then(|| SocketAddr::from(([0, 0, 0, 0], 4556)))
    }
}
