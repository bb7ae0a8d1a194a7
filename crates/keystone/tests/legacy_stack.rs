//! Both services running in legacy mode: raw JSON framing and
//! prefix tokens, the way unmodified old clients talk.

use std::time::Duration;

use keystone::prelude::*;
use keystone::protocol::{Codec, JsonCodec};
use keystone::transport::{Connection, TcpConnection};
use tokio::sync::oneshot;

async fn call(conn: &TcpConnection, req: Request) -> Response {
    conn.send(&JsonCodec.encode(&req).unwrap()).await.unwrap();
    let bytes = conn.recv().await.unwrap().expect("server replied");
    JsonCodec.decode(&bytes).unwrap()
}

#[tokio::test]
async fn test_legacy_client_logs_in_and_adventures() {
    let tokens = TokenConfig::default().with_scheme(TokenScheme::LegacyPrefix);

    let identity = IdentityServer::builder()
        .config(
            IdentityConfig::default()
                .bind("127.0.0.1:0")
                .data_file(None)
                .hash_cost(4)
                .wire(WireFormat::Legacy)
                .tokens(tokens.clone())
                .drain_timeout(Duration::from_millis(200)),
        )
        .build()
        .await
        .unwrap();
    let identity_addr = identity.local_addr().unwrap().to_string();
    let (stop_identity, identity_stopped) = oneshot::channel::<()>();
    let identity_task = tokio::spawn(identity.run_until(async {
        let _ = identity_stopped.await;
    }));

    let session = SessionServer::builder()
        .config(
            SessionConfig::default()
                .bind("127.0.0.1:0")
                .identity_addr(&identity_addr)
                .data_file(None)
                .wire(WireFormat::Legacy)
                .tokens(tokens)
                .drain_timeout(Duration::from_millis(200)),
        )
        .build()
        .await
        .unwrap();
    let session_addr = session.local_addr().unwrap().to_string();
    let (stop_session, session_stopped) = oneshot::channel::<()>();
    let session_task = tokio::spawn(session.run_until(async {
        let _ = session_stopped.await;
    }));

    let auth = TcpConnection::connect(&identity_addr, WireFormat::Legacy).await.unwrap();
    let resp = call(&auth, Request::new("register", "dave").with_password("Valid123!")).await;
    assert_eq!(resp.message, "User registered successfully");
    let resp = call(&auth, Request::new("login", "dave").with_password("Valid123!")).await;
    let token = resp.token.expect("token issued");
    assert!(token.starts_with("AUTH_dave_"));

    let game = TcpConnection::connect(&session_addr, WireFormat::Legacy).await.unwrap();
    let resp = call(&game, Request::new("adventure", "dave").with_token(&token)).await;
    assert!(resp.success, "{}", resp.message);
    assert!(resp.message.starts_with("Adventure complete! Found "));

    let resp = call(&game, Request::new("space", "dave").with_token(&token)).await;
    assert_eq!(resp.message, "Space: 0/20");

    stop_session.send(()).unwrap();
    session_task.await.unwrap().unwrap();
    stop_identity.send(()).unwrap();
    identity_task.await.unwrap().unwrap();
}
