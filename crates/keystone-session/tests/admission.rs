//! Admission control against an in-memory identity directory.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use keystone_protocol::{
    AccountInfo, AccountRemoval, EnergyReceipt, QuotaError, ServiceError,
    Tier, TierChange, TokenAuthority, TokenConfig,
};
use keystone_session::{
    AdmissionController, ConnectionSession, ConnectionState, DirectoryError,
    IdentityDirectory, SessionRegistry,
};
use keystone_transport::ConnectionId;
use tokio::sync::Mutex;

/// Reports every account with the same connection limit; admins are
/// named `admin`.
struct StubDirectory {
    limit: u32,
    down: AtomicBool,
}

impl StubDirectory {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            down: AtomicBool::new(false),
        }
    }
}

impl IdentityDirectory for StubDirectory {
    async fn account_info(
        &self,
        username: &str,
        _token: &str,
    ) -> Result<AccountInfo, DirectoryError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unreachable);
        }
        Ok(AccountInfo {
            username: username.to_string(),
            tier: Tier::Freemium,
            energy: 100,
            is_admin: username == "admin",
            connection_limit: self.limit,
        })
    }

    async fn debit_energy(
        &self,
        _username: &str,
        _token: &str,
    ) -> Result<EnergyReceipt, DirectoryError> {
        Err(DirectoryError::Unreachable)
    }

    async fn change_tier(
        &self,
        _acting: &str,
        _token: &str,
        _target: &str,
        _new_tier: &str,
    ) -> Result<TierChange, DirectoryError> {
        Err(DirectoryError::Unreachable)
    }

    async fn remove_account(
        &self,
        _acting: &str,
        _token: &str,
        _target: &str,
    ) -> Result<AccountRemoval, DirectoryError> {
        Err(DirectoryError::Unreachable)
    }
}

struct Harness {
    controller: AdmissionController<StubDirectory>,
    directory: Arc<StubDirectory>,
    registry: Arc<Mutex<SessionRegistry>>,
    tokens: TokenAuthority,
    next_id: u64,
}

impl Harness {
    fn new(limit: u32, admin_bypass: bool) -> Self {
        let directory = Arc::new(StubDirectory::new(limit));
        let registry = Arc::new(Mutex::new(SessionRegistry::new()));
        let tokens = TokenConfig::default().with_secret("admission").build();
        let controller = AdmissionController::new(
            Arc::clone(&directory),
            tokens.clone(),
            Arc::clone(&registry),
            admin_bypass,
        );
        Self {
            controller,
            directory,
            registry,
            tokens,
            next_id: 0,
        }
    }

    fn session(&mut self) -> ConnectionSession {
        self.next_id += 1;
        ConnectionSession::new(ConnectionId::new(self.next_id))
    }

    async fn connect(
        &mut self,
        username: &str,
    ) -> (ConnectionSession, Result<AccountInfo, ServiceError>) {
        let mut session = self.session();
        let token = self.tokens.issue(username);
        let result = self.controller.admit(&mut session, username, &token).await;
        (session, result)
    }
}

#[tokio::test]
async fn test_admit_one_past_limit_is_rejected() {
    let mut h = Harness::new(3, false);
    let mut admitted = Vec::new();
    for name in ["a", "b", "c"] {
        let (session, result) = h.connect(name).await;
        assert!(result.is_ok());
        admitted.push(session);
    }

    let (session, result) = h.connect("d").await;
    assert_eq!(
        result.unwrap_err(),
        ServiceError::Quota(QuotaError::CapacityExceeded { current: 3, limit: 3 })
    );
    assert_eq!(session.state, ConnectionState::Rejected);
    assert_eq!(h.controller.connection_count().await, 3);
    assert!(!h.registry.lock().await.is_online("d"));
}

#[tokio::test]
async fn test_close_frees_exactly_one_slot() {
    let mut h = Harness::new(2, false);
    let (mut first, _) = h.connect("a").await;
    let (_second, _) = h.connect("b").await;

    h.controller.close(&mut first).await;
    assert_eq!(first.state, ConnectionState::Closed);
    assert_eq!(h.controller.connection_count().await, 1);
    assert!(!h.registry.lock().await.is_online("a"));

    let (_, result) = h.connect("c").await;
    assert!(result.is_ok());
    let (_, result) = h.connect("d").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_close_unadmitted_session_leaves_counter() {
    let mut h = Harness::new(2, false);
    let (_kept, _) = h.connect("a").await;
    let mut never = h.session();

    h.controller.close(&mut never).await;
    assert_eq!(h.controller.connection_count().await, 1);
}

#[tokio::test]
async fn test_bad_token_leaves_session_unauthenticated() {
    let mut h = Harness::new(2, false);
    let mut session = h.session();
    let foreign = h.tokens.issue("someone-else");

    let err = h
        .controller
        .admit(&mut session, "alice", &foreign)
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::Unauthenticated);
    assert_eq!(session.state, ConnectionState::Unauthenticated);

    let token = h.tokens.issue("alice");
    h.controller.admit(&mut session, "alice", &token).await.unwrap();
    assert!(session.is_admitted());
}

#[tokio::test]
async fn test_identity_unreachable_rejects_connection() {
    let mut h = Harness::new(5, false);
    h.directory.down.store(true, Ordering::SeqCst);

    let (session, result) = h.connect("alice").await;
    assert_eq!(result.unwrap_err(), ServiceError::Unreachable);
    assert_eq!(session.state, ConnectionState::Rejected);
    assert_eq!(h.controller.connection_count().await, 0);
}

#[tokio::test]
async fn test_admin_bypass_enabled_admits_admin_at_capacity() {
    let mut h = Harness::new(1, true);
    let (_, result) = h.connect("alice").await;
    assert!(result.is_ok());

    let (session, result) = h.connect("admin").await;
    assert!(result.is_ok());
    assert!(session.is_admin());
    assert_eq!(h.controller.connection_count().await, 2);

    let (_, result) = h.connect("bob").await;
    assert!(result.is_err(), "bypass applies to admins only");
}

#[tokio::test]
async fn test_admin_bypass_disabled_rejects_admin_at_capacity() {
    let mut h = Harness::new(1, false);
    h.connect("alice").await.1.unwrap();

    let (session, result) = h.connect("admin").await;
    assert!(matches!(
        result,
        Err(ServiceError::Quota(QuotaError::CapacityExceeded { .. }))
    ));
    assert_eq!(session.state, ConnectionState::Rejected);
}

#[tokio::test]
async fn test_racing_admissions_never_exceed_limit() {
    let h = Arc::new(Harness::new(5, false));
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..20u64 {
        let h = Arc::clone(&h);
        tasks.spawn(async move {
            let name = format!("user{i}");
            let mut session = ConnectionSession::new(ConnectionId::new(1000 + i));
            let token = h.tokens.issue(&name);
            h.controller.admit(&mut session, &name, &token).await.is_ok()
        });
    }

    let mut admitted = 0;
    while let Some(joined) = tasks.join_next().await {
        if joined.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);
    assert_eq!(h.controller.connection_count().await, 5);
}
