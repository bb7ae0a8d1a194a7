//! Integration tests for the framed TCP transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it with
//! both a framed client and a raw socket, so the on-the-wire bytes can be
//! checked directly.

use keystone_transport::{
    Connection, TcpConnection, TcpTransport, Transport, TransportError,
    WireFormat,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn bind(wire: WireFormat) -> (TcpTransport, String) {
    let transport = TcpTransport::bind("127.0.0.1:0", wire)
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("bound address").to_string();
    (transport, addr)
}

#[tokio::test]
async fn test_length_prefixed_round_trip_between_client_and_server() {
    let (mut transport, addr) = bind(WireFormat::LengthPrefixed).await;
    let server = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });

    let client = TcpConnection::connect(&addr, WireFormat::LengthPrefixed)
        .await
        .expect("client should connect");
    let server_conn = server.await.expect("task should complete");
    assert!(server_conn.id().into_inner() > 0);

    client
        .send(br#"{"action":"login","data":{"nested":true}}"#)
        .await
        .unwrap();
    let received = server_conn.recv().await.unwrap().unwrap();
    assert_eq!(received, br#"{"action":"login","data":{"nested":true}}"#);

    server_conn.send(b"{\"success\":true}").await.unwrap();
    let reply = client.recv().await.unwrap().unwrap();
    assert_eq!(reply, b"{\"success\":true}");
}

#[tokio::test]
async fn test_legacy_server_splits_coalesced_requests() {
    let (mut transport, addr) = bind(WireFormat::Legacy).await;
    let server = tokio::spawn(async move { transport.accept().await.unwrap() });

    let mut raw = TcpStream::connect(&addr).await.unwrap();
    let server_conn = server.await.unwrap();

    raw.write_all(br#"{"action":"a"}{"action":"b"}"#)
        .await
        .unwrap();

    assert_eq!(server_conn.recv().await.unwrap().unwrap(), br#"{"action":"a"}"#);
    assert_eq!(server_conn.recv().await.unwrap().unwrap(), br#"{"action":"b"}"#);
}

#[tokio::test]
async fn test_legacy_server_writes_raw_json() {
    let (mut transport, addr) = bind(WireFormat::Legacy).await;
    let server = tokio::spawn(async move { transport.accept().await.unwrap() });

    let mut raw = TcpStream::connect(&addr).await.unwrap();
    let server_conn = server.await.unwrap();

    server_conn.send(b"{\"ok\":1}").await.unwrap();
    let mut buf = [0u8; 8];
    raw.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"{\"ok\":1}");
}

#[tokio::test]
async fn test_clean_close_between_frames_returns_none() {
    let (mut transport, addr) = bind(WireFormat::Legacy).await;
    let server = tokio::spawn(async move { transport.accept().await.unwrap() });

    let raw = TcpStream::connect(&addr).await.unwrap();
    let server_conn = server.await.unwrap();
    drop(raw);

    assert!(server_conn.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_close_mid_frame_is_peer_closed() {
    let (mut transport, addr) = bind(WireFormat::Legacy).await;
    let server = tokio::spawn(async move { transport.accept().await.unwrap() });

    let mut raw = TcpStream::connect(&addr).await.unwrap();
    let server_conn = server.await.unwrap();
    raw.write_all(br#"{"action":"log"#).await.unwrap();
    drop(raw);

    let result = server_conn.recv().await;
    assert!(matches!(result, Err(TransportError::PeerClosed)));
}

#[tokio::test]
async fn test_connect_to_closed_port_is_unreachable() {
    let (transport, addr) = bind(WireFormat::LengthPrefixed).await;
    drop(transport);

    let result = TcpConnection::connect(&addr, WireFormat::LengthPrefixed).await;
    assert!(matches!(result, Err(TransportError::Unreachable(_))));
}
