//! Transport layer for UDP communication
//!
//! The connection handler talks to AniDB through the [`Transport`] trait: one
//! request datagram out, one reply datagram back. [`UdpTransport`] is the real
//! socket; tests drive the handler with a scripted implementation.

mod socket;

pub use socket::{UdpTransport, inflate_reply};

use crate::protocol::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;

/// Reply returned by [`Transport::send`] when no socket is bound
pub const DISCONNECTED_REPLY: [u8; 1] = [0];

/// Half-duplex request/reply channel to the AniDB UDP server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bind the local socket and resolve the server endpoint
    ///
    /// Returns `false` on failure (already logged); never retries.
    async fn try_connect(&mut self) -> bool;

    /// Send one request and wait for its reply
    ///
    /// When not connected this returns [`DISCONNECTED_REPLY`] without any I/O.
    /// Compressed replies come back already inflated.
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Drop the socket
    async fn close(&mut self);

    fn is_connected(&self) -> bool;

    /// Local endpoint, when bound
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Resolved server endpoint, when bound
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}
