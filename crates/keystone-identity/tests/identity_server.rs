//! End-to-end tests for the Identity Service over real TCP.

use std::path::PathBuf;
use std::time::Duration;

use keystone_identity::{Account, IdentityConfig, IdentityServer};
use keystone_protocol::{
    AccountInfo, Codec, JsonCodec, RecordFile, Request, Response, TokenConfig,
};
use keystone_transport::{Connection, TcpConnection, WireFormat};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    addr: String,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

async fn start(config: IdentityConfig) -> Running {
    let server = IdentityServer::builder()
        .config(config)
        .build()
        .await
        .expect("server should build");
    let addr = server.local_addr().unwrap().to_string();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = stopped.await;
            })
            .await
            .expect("server should shut down cleanly");
    });
    Running { addr, stop, handle }
}

fn config(data_file: Option<PathBuf>) -> IdentityConfig {
    IdentityConfig::default()
        .bind("127.0.0.1:0")
        .data_file(data_file)
        .hash_cost(4)
        .tokens(TokenConfig::default().with_secret("integration"))
        .drain_timeout(Duration::from_millis(200))
}

async fn call(conn: &TcpConnection, req: Request) -> Response {
    conn.send(&JsonCodec.encode(&req).unwrap()).await.unwrap();
    let bytes = conn.recv().await.unwrap().expect("server replied");
    JsonCodec.decode(&bytes).unwrap()
}

#[tokio::test]
async fn test_alice_registers_logs_in_and_burns_energy() {
    let server = start(config(None)).await;
    let conn = TcpConnection::connect(&server.addr, WireFormat::LengthPrefixed)
        .await
        .unwrap();

    let resp = call(&conn, Request::new("register", "alice").with_password("Valid123!")).await;
    assert!(resp.success, "{}", resp.message);

    let resp = call(&conn, Request::new("login", "alice").with_password("Valid123!")).await;
    assert!(resp.success);
    let token = resp.token.expect("token issued");

    let resp = call(&conn, Request::new("get_user_info", "alice").with_token(&token)).await;
    let info: AccountInfo = resp.data_as().expect("info payload");
    assert_eq!(info.tier.to_string(), "Freemium");
    assert_eq!(info.energy, 100);

    let mut last = 100u64;
    let mut exhausted = false;
    for _ in 0..150 {
        let resp = call(&conn, Request::new("check_energy", "alice").with_token(&token)).await;
        let data = resp.data.clone().expect("energy responses carry data");
        if resp.success {
            let remaining = data["remaining_energy"].as_u64().unwrap();
            assert!(remaining < last);
            last = remaining;
        } else {
            assert_eq!(resp.message, "Insufficient energy");
            assert_eq!(data["current_energy"].as_u64(), Some(last));
            exhausted = true;
            break;
        }
    }
    assert!(exhausted, "energy should run out within 100 debits");

    server.stop.send(()).unwrap();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_and_unknown_action() {
    let server = start(config(None)).await;
    let conn = TcpConnection::connect(&server.addr, WireFormat::LengthPrefixed)
        .await
        .unwrap();

    call(&conn, Request::new("register", "bob").with_password("Valid123!")).await;
    let resp = call(&conn, Request::new("login", "bob").with_password("Wrong123!")).await;
    assert!(!resp.success);
    assert_eq!(resp.message, "Invalid password");

    let resp = call(&conn, Request::new("teleport", "bob")).await;
    assert_eq!(resp.message, "Unknown action: teleport");

    server.stop.send(()).unwrap();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn test_legacy_client_speaks_raw_json() {
    let server = start(config(None).wire(WireFormat::Legacy)).await;
    let conn = TcpConnection::connect(&server.addr, WireFormat::Legacy)
        .await
        .unwrap();

    let resp = call(&conn, Request::new("login", "admin").with_password("Admin123!")).await;
    assert!(resp.success);
    // The login payload is a nested object; the legacy client reader must
    // still find the end of the response.
    assert!(resp.data.is_some());

    server.stop.send(()).unwrap();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_persists_accounts_and_restart_restores_them() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");

    let server = start(config(Some(path.clone()))).await;
    let conn = TcpConnection::connect(&server.addr, WireFormat::LengthPrefixed)
        .await
        .unwrap();
    call(&conn, Request::new("register", "carol").with_password("Valid123!")).await;

    // Connection stays open: shutdown has to drain it before saving.
    server.stop.send(()).unwrap();
    server.handle.await.unwrap();

    let saved: Vec<Account> = RecordFile::new(&path).load().unwrap();
    let names: Vec<_> = saved.iter().map(|a| a.username.as_str()).collect();
    assert_eq!(names, ["admin", "carol"]);
    assert!(saved[0].is_admin);

    let server = start(config(Some(path))).await;
    let conn = TcpConnection::connect(&server.addr, WireFormat::LengthPrefixed)
        .await
        .unwrap();
    let resp = call(&conn, Request::new("login", "carol").with_password("Valid123!")).await;
    assert!(resp.success, "restored account should log in");

    server.stop.send(()).unwrap();
    server.handle.await.unwrap();
}
