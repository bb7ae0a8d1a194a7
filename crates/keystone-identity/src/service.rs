//! Request dispatch for the Identity Service.

use keystone_protocol::{
    CredentialError, LoginGrant, Request, Response, ServiceError,
};
use tokio::sync::Mutex;

use crate::account::hash_for_registration;
use crate::{Account, AccountStore, BcryptHasher, CredentialHasher};

/// Shared state behind every identity connection.
///
/// Holds the one lock that serializes access to the account store. Password
/// hashing never runs under that lock: `register` and `login` copy what
/// they need out, hash on the blocking pool, then lock again to commit.
pub struct IdentityService<H = BcryptHasher> {
    store: Mutex<AccountStore<H>>,
    hasher: H,
}

impl<H: CredentialHasher> IdentityService<H> {
    pub fn new(store: AccountStore<H>) -> Self {
        Self {
            hasher: store.hasher().clone(),
            store: Mutex::new(store),
        }
    }

    /// Handles one request and produces the response to send back.
    ///
    /// Never fails: every domain error becomes a failure response.
    pub async fn dispatch(&self, req: Request) -> Response {
        tracing::debug!(action = %req.action, username = %req.username, "identity request");
        self.try_dispatch(req)
            .await
            .unwrap_or_else(ServiceError::into_response)
    }

    async fn try_dispatch(&self, req: Request) -> Result<Response, ServiceError> {
        let username = req.username.as_str();
        let token = req.token_str();
        let target = req.target_user.as_deref().unwrap_or_default();

        match req.action.as_str() {
            "register" => {
                let password = req.password.as_deref().unwrap_or_default();
                self.register(username, password).await?;
                Ok(Response::ok("User registered successfully"))
            }
            "login" => {
                let password = req.password.as_deref().unwrap_or_default();
                let (token, grant) = self.login(username, password).await?;
                Ok(Response::ok("Login successful")
                    .with_token(token)
                    .with_payload(&grant))
            }
            "check_energy" => {
                let mut store = self.store.lock().await;
                let receipt =
                    store.debit_energy(username, token, &mut rand::rng())?;
                drop(store);
                Ok(Response::ok("Energy deducted successfully")
                    .with_token(token)
                    .with_payload(&receipt))
            }
            "get_user_info" => {
                let info = self.store.lock().await.query_info(username, token)?;
                Ok(Response::ok("User info retrieved")
                    .with_token(token)
                    .with_payload(&info))
            }
            "remove_user" => {
                let removal = self
                    .store
                    .lock()
                    .await
                    .remove_account(username, token, target)?;
                Ok(Response::ok(format!("User removed successfully: {target}"))
                    .with_token(token)
                    .with_payload(&removal))
            }
            "modify_type" => {
                let new_type = req.new_type.as_deref().unwrap_or_default();
                let change = self
                    .store
                    .lock()
                    .await
                    .change_tier(username, token, target, new_type)?;
                Ok(Response::ok(format!(
                    "User type modified successfully: {target} -> {}",
                    change.new_type
                ))
                .with_token(token)
                .with_payload(&change))
            }
            other => Err(ServiceError::UnknownAction(other.to_string())),
        }
    }

    async fn register(&self, username: &str, password: &str) -> Result<(), ServiceError> {
        self.store.lock().await.check_registration(username, password)?;

        let hasher = self.hasher.clone();
        let (user, pass) = (username.to_string(), password.to_string());
        let password_hash = tokio::task::spawn_blocking(move || {
            hash_for_registration(&hasher, &user, &pass)
        })
        .await
        .map_err(|e| {
            tracing::error!(%username, error = %e, "password hashing task failed");
            ServiceError::from(CredentialError::WeakPassword)
        })??;

        self.store
            .lock()
            .await
            .insert_registered(username, password_hash)
    }

    async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, LoginGrant), ServiceError> {
        let stored = self.store.lock().await.stored_hash(username)?;

        let hasher = self.hasher.clone();
        let pass = password.to_string();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&pass, &stored))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(%username, error = %e, "password check task failed");
                false
            });
        if !matches {
            return Err(CredentialError::InvalidCredential.into());
        }

        self.store.lock().await.grant_login(username)
    }

    /// Snapshot of every account, for persistence.
    pub async fn records(&self) -> Vec<Account> {
        self.store.lock().await.records()
    }

    pub async fn account_count(&self) -> usize {
        self.store.lock().await.len()
    }
}
