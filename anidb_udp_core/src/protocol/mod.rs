//! AniDB UDP Protocol Implementation
//!
//! This module implements the AniDB UDP API connection core:
//! - `transport`: UDP socket ownership, compression and stray datagram handling
//! - `rate_limit`: process-wide request spacing
//! - `codec`: encoding detection, request encoding and response parsing
//! - `codes`: the protocol's return code table
//! - `handler`: session, ban, pause and keepalive state machine
//! - `events`: broadcast of state transitions to observers
//! - `commands`: the session commands (AUTH, LOGOUT, PING) the handler issues itself

pub mod codec;
pub mod codes;
pub mod commands;
pub mod error;
pub mod events;
pub mod handler;
pub mod rate_limit;
pub mod request;
pub mod transport;

// Re-export main types
pub use codec::{Response, TextEncoding};
pub use codes::ReturnCode;
pub use commands::{AniDbSessionCommands, SessionCommands};
pub use error::{ProtocolError, Result};
pub use events::ConnectionEvent;
pub use handler::{ConnectionState, UdpConnectionHandler};
pub use rate_limit::RateLimiter;
pub use request::Request;
pub use transport::{Transport, UdpTransport};

/// Protocol version supported by this implementation
pub const PROTOCOL_VERSION: &str = "3";

/// Largest datagram AniDB sends (considering PPPoE)
pub const MAX_PACKET_SIZE: usize = 1400;

/// Receive buffer size; larger than any datagram the server produces
pub const RECEIVE_BUFFER_SIZE: usize = 2000;

/// Upper bound for an inflated compressed reply
pub const MAX_INFLATED_SIZE: usize = 65536;
