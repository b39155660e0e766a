//! Real UDP exchanges against a loopback server
//!
//! These tests bind fixed local ports, so they run serially. They are skipped
//! when the environment does not allow binding sockets.

use anidb_test_utils::compressed;
use anidb_udp_core::{
    ProtocolError, Request, ReturnCode, Transport, UdpConnectionHandler, UdpSettings,
    UdpTransport,
};
use serial_test::serial;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Loopback server answering each request with the next scripted reply
async fn spawn_server(replies: Vec<Vec<u8>>) -> Option<(SocketAddr, JoinHandle<Vec<String>>)> {
    let socket = match UdpSocket::bind("127.0.0.1:0").await {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("Skipping UDP test, cannot bind loopback socket: {e}");
            return None;
        }
    };
    let addr = socket.local_addr().ok()?;

    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        let mut buffer = [0u8; 2048];
        for reply in replies {
            let Ok((size, from)) = socket.recv_from(&mut buffer).await else {
                break;
            };
            received.push(String::from_utf8_lossy(&buffer[..size]).into_owned());
            if socket.send_to(&reply, from).await.is_err() {
                break;
            }
        }
        received
    });
    Some((addr, handle))
}

fn loopback_settings(server: SocketAddr, client_port: u16) -> UdpSettings {
    UdpSettings {
        server_host: "127.0.0.1".to_string(),
        server_port: server.port(),
        client_port,
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        window_secs: 0.0,
        receive_timeout_secs: 2,
        idle_check_interval_secs: 3600,
        ..Default::default()
    }
}

async fn connect(settings: &UdpSettings) -> Option<UdpTransport> {
    let mut transport = UdpTransport::new(settings);
    if !transport.try_connect().await {
        eprintln!(
            "Skipping UDP test, cannot bind client port {}",
            settings.client_port
        );
        return None;
    }
    Some(transport)
}

#[tokio::test]
#[serial]
async fn test_compressed_reply_is_inflated() {
    let text = "230 ANIME\n1|Cowboy Bebop|Cowboy Bebop|Cowboy Bebop\n";
    let Some((server, handle)) = spawn_server(vec![compressed(text)]).await else {
        return;
    };
    let settings = loopback_settings(server, 45561);
    let Some(mut transport) = connect(&settings).await else {
        return;
    };

    assert_eq!(transport.remote_addr(), Some(server));
    assert_eq!(
        transport.local_addr().map(|addr| addr.port()),
        Some(45561)
    );

    let reply = transport.send(b"ANIME aid=1").await.unwrap();
    assert_eq!(reply, text.as_bytes());
    assert_eq!(handle.await.unwrap(), vec!["ANIME aid=1"]);
    transport.close().await;
    assert!(!transport.is_connected());
}

#[tokio::test]
#[serial]
async fn test_stray_datagram_is_discarded() {
    let Some((server, handle)) = spawn_server(vec![b"300 PONG\n\n".to_vec()]).await else {
        return;
    };
    let settings = loopback_settings(server, 45562);
    let Some(mut transport) = connect(&settings).await else {
        return;
    };

    // A late reply to some earlier request, already queued on the socket
    let Ok(stray) = UdpSocket::bind("127.0.0.1:0").await else {
        return;
    };
    stray
        .send_to(b"220 FILE\nlate|reply\n", ("127.0.0.1", 45562))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = transport.send(b"PING").await.unwrap();
    assert_eq!(reply, b"300 PONG\n\n");
    assert_eq!(handle.await.unwrap(), vec!["PING"]);
    transport.close().await;
}

#[tokio::test]
#[serial]
async fn test_missing_reply_times_out() {
    // Bound but never answers
    let Ok(silent) = UdpSocket::bind("127.0.0.1:0").await else {
        eprintln!("Skipping UDP test, cannot bind loopback socket");
        return;
    };
    let server = silent.local_addr().unwrap();
    let settings = UdpSettings {
        receive_timeout_secs: 1,
        ..loopback_settings(server, 45563)
    };
    let Some(mut transport) = connect(&settings).await else {
        return;
    };

    let result = transport.send(b"PING").await;
    match result {
        Err(ProtocolError::Timeout(waited)) => assert_eq!(waited, Duration::from_secs(1)),
        other => panic!("expected timeout, got {other:?}"),
    }
    transport.close().await;
}

#[tokio::test]
#[serial]
async fn test_handler_over_loopback() {
    let replies = vec![
        b"200 LOGIN_ACCEPTED\nlb123 LOGIN ACCEPTED\n".to_vec(),
        b"208 UPTIME\n5000\n".to_vec(),
        b"203 LOGGED_OUT\nLOGGED OUT\n".to_vec(),
    ];
    let Some((server, handle)) = spawn_server(replies).await else {
        return;
    };
    let handler = UdpConnectionHandler::from_settings(loopback_settings(server, 45564)).unwrap();
    if handler.init().await.is_err() {
        eprintln!("Skipping UDP test, cannot bind client port 45564");
        return;
    }

    let response = handler.send(&Request::new("UPTIME")).await.unwrap();
    assert_eq!(response.code, ReturnCode::UPTIME);
    assert_eq!(response.payload, "5000");
    assert_eq!(handler.session_id().await.as_deref(), Some("lb123"));

    handler.force_logout().await;
    handler.close().await;

    let received = handle.await.unwrap();
    assert!(received[0].starts_with("AUTH user=testuser&pass=testpass&protover=3"));
    assert_eq!(received[1], "UPTIME s=lb123");
    assert_eq!(received[2], "LOGOUT s=lb123");
}
