//! AniDB UDP Connection Core
//!
//! This is the core library for talking to the AniDB UDP API from an anime
//! library server. It owns the socket, the session, the ban and pause state,
//! the shared rate limiter and the keepalive scheduling that every background
//! job routes its requests through.

pub mod error;
pub mod protocol;
pub mod settings;

// Re-export main types
pub use error::{Error, Result, ValidationError};
pub use protocol::{
    AniDbSessionCommands, ConnectionEvent, ConnectionState, ProtocolError, RateLimiter, Request,
    Response, ReturnCode, SessionCommands, Transport, UdpConnectionHandler, UdpTransport,
};
pub use settings::UdpSettings;
