//! Low-level UDP socket operations
//!
//! This module provides a wrapper around Tokio's UdpSocket with the
//! AniDB-specific handling of compressed replies and stray datagrams.

use super::{DISCONNECTED_REPLY, Transport};
use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::{MAX_INFLATED_SIZE, RECEIVE_BUFFER_SIZE};
use crate::settings::UdpSettings;
use async_trait::async_trait;
use flate2::read::DeflateDecoder;
use log::{debug, error, trace, warn};
use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;

/// UDP transport bound to a fixed local port
pub struct UdpTransport {
    server_host: String,
    server_port: u16,
    client_port: u16,
    receive_timeout: Duration,
    /// Bound socket, present while connected
    socket: Option<UdpSocket>,
    /// Server endpoint, resolved once per connect
    remote: Option<SocketAddr>,
}

impl UdpTransport {
    /// Create an unbound transport from the connection settings
    pub fn new(settings: &UdpSettings) -> Self {
        Self {
            server_host: settings.server_host.clone(),
            server_port: settings.server_port,
            client_port: settings.client_port,
            receive_timeout: settings.receive_timeout(),
            socket: None,
            remote: None,
        }
    }

    async fn bind_and_resolve(&self) -> Result<(UdpSocket, SocketAddr)> {
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.client_port));
        debug!("Binding AniDB UDP socket to {bind_addr}");
        let socket = UdpSocket::bind(bind_addr).await?;

        debug!(
            "Resolving AniDB server address: {}:{}",
            self.server_host, self.server_port
        );
        let remote = lookup_host((self.server_host.as_str(), self.server_port))
            .await?
            .next()
            .ok_or_else(|| {
                ProtocolError::connectivity(format!(
                    "No addresses found for {}:{}",
                    self.server_host, self.server_port
                ))
            })?;

        Ok((socket, remote))
    }

    /// Discard datagrams queued on the socket that belong to no request
    fn drain_stray(socket: &UdpSocket) {
        let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];
        loop {
            match socket.try_recv_from(&mut buffer) {
                Ok((size, from)) => {
                    warn!("Discarding stray {size} byte datagram from {from}");
                    trace!(
                        "Stray datagram: {:?}",
                        String::from_utf8_lossy(&buffer[..size])
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Error while draining socket: {e}");
                    break;
                }
            }
        }
    }
}

/// Inflate a zero-prefixed raw deflate reply; other replies pass through
pub fn inflate_reply(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() <= 2 || data[0] != 0 || data[1] != 0 {
        return Ok(data.to_vec());
    }

    let mut inflated = Vec::new();
    DeflateDecoder::new(&data[2..])
        .take(MAX_INFLATED_SIZE as u64)
        .read_to_end(&mut inflated)
        .map_err(|e| ProtocolError::decoding(format!("Failed to inflate reply: {e}")))?;
    debug!(
        "Inflated compressed reply from {} to {} bytes",
        data.len(),
        inflated.len()
    );
    Ok(inflated)
}

#[async_trait]
impl Transport for UdpTransport {
    async fn try_connect(&mut self) -> bool {
        match self.bind_and_resolve().await {
            Ok((socket, remote)) => {
                debug!(
                    "AniDB UDP socket bound to {:?}, server at {remote}",
                    socket.local_addr().ok()
                );
                self.socket = Some(socket);
                self.remote = Some(remote);
                true
            }
            Err(e) => {
                error!(
                    "Could not open AniDB UDP socket on port {}: {e}",
                    self.client_port
                );
                self.socket = None;
                self.remote = None;
                false
            }
        }
    }

    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let (Some(socket), Some(remote)) = (self.socket.as_ref(), self.remote) else {
            debug!("Send requested on a closed AniDB socket");
            return Ok(DISCONNECTED_REPLY.to_vec());
        };

        Self::drain_stray(socket);

        trace!("Sending {} bytes to {remote}", payload.len());
        socket.send_to(payload, remote).await?;

        let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
        let (size, from) = timeout(self.receive_timeout, socket.recv_from(&mut buffer))
            .await
            .map_err(|_| {
                warn!("No reply from AniDB within {:?}", self.receive_timeout);
                ProtocolError::Timeout(self.receive_timeout)
            })??;
        trace!("Received {size} bytes from {from}");

        let reply = inflate_reply(&buffer[..size])?;

        Self::drain_stray(socket);
        Ok(reply)
    }

    async fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Closed AniDB UDP socket");
        }
        self.remote = None;
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    fn compressed(text: &str) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        let mut data = vec![0, 0];
        data.extend(encoder.finish().unwrap());
        data
    }

    #[test]
    fn test_inflate_compressed_reply() {
        let data = compressed("230 ANIME\n1|Cowboy Bebop\n");
        assert_eq!(inflate_reply(&data).unwrap(), b"230 ANIME\n1|Cowboy Bebop\n");
    }

    #[test]
    fn test_plain_reply_passes_through() {
        assert_eq!(inflate_reply(b"300 PONG\n\n").unwrap(), b"300 PONG\n\n");
        // Two zero bytes alone are not a compressed reply
        assert_eq!(inflate_reply(&[0, 0]).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_inflate_is_bounded() {
        let big = "x".repeat(MAX_INFLATED_SIZE * 2);
        let inflated = inflate_reply(&compressed(&big)).unwrap();
        assert_eq!(inflated.len(), MAX_INFLATED_SIZE);
    }

    #[test]
    fn test_corrupt_deflate_is_decoding_error() {
        let result = inflate_reply(&[0, 0, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(ProtocolError::Decoding { .. })));
    }

    #[tokio::test]
    async fn test_send_when_not_connected() {
        let mut transport = UdpTransport::new(&UdpSettings::default());
        assert!(!transport.is_connected());
        assert_eq!(transport.send(b"PING").await.unwrap(), vec![0]);
        assert_eq!(transport.local_addr(), None);
        assert_eq!(transport.remote_addr(), None);
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails_connect() {
        let settings = UdpSettings {
            server_host: "host.invalid".to_string(),
            client_port: 45590,
            ..Default::default()
        };
        let mut transport = UdpTransport::new(&settings);
        assert!(!transport.try_connect().await);
        assert!(!transport.is_connected());
    }
}
