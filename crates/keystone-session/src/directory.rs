//! The seam between the Session Service and the Identity Service.
//!
//! Everything the Session Service needs to know about an account goes
//! through the [`IdentityDirectory`] trait. In production that is an
//! [`IdentityRpcClient`](crate::IdentityRpcClient) talking TCP; in tests it
//! is whatever in-memory stand-in the test needs, which lets admission and
//! gameplay be exercised without a second process.

use std::future::Future;

use keystone_protocol::{
    AccountInfo, AccountRemoval, EnergyReceipt, ServiceError, TierChange,
};

/// Why an identity lookup failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DirectoryError {
    /// No response even after the single reconnect-and-retry.
    #[error("identity service unreachable")]
    Unreachable,

    /// The Identity Service answered with `success: false`.
    #[error("{message}")]
    Rejected {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The Identity Service answered, but not with the expected payload.
    #[error("Failed to parse auth server response")]
    Malformed,
}

impl DirectoryError {
    /// Converts to a client-facing error, prefixing rejection messages
    /// with `context` (e.g. `"Failed to remove user from auth server"`).
    pub fn into_service_error(self, context: Option<&str>) -> ServiceError {
        match self {
            DirectoryError::Unreachable => ServiceError::Unreachable,
            DirectoryError::Rejected { message, data } => ServiceError::Upstream {
                message: match context {
                    Some(context) => format!("{context}: {message}"),
                    None => message,
                },
                data,
            },
            DirectoryError::Malformed => ServiceError::Upstream {
                message: DirectoryError::Malformed.to_string(),
                data: None,
            },
        }
    }
}

impl From<DirectoryError> for ServiceError {
    fn from(err: DirectoryError) -> Self {
        err.into_service_error(None)
    }
}

/// Account lookups and mutations the Session Service delegates.
///
/// Every method takes the *caller's* credentials; the Identity Service
/// does its own authorization.
pub trait IdentityDirectory: Send + Sync + 'static {
    /// Tier, energy, admin flag, and connection limit for `username`.
    fn account_info(
        &self,
        username: &str,
        token: &str,
    ) -> impl Future<Output = Result<AccountInfo, DirectoryError>> + Send;

    /// Debits one costed action from `username`'s energy budget.
    fn debit_energy(
        &self,
        username: &str,
        token: &str,
    ) -> impl Future<Output = Result<EnergyReceipt, DirectoryError>> + Send;

    /// Admin-only: moves `target` to `new_tier`.
    fn change_tier(
        &self,
        acting: &str,
        token: &str,
        target: &str,
        new_tier: &str,
    ) -> impl Future<Output = Result<TierChange, DirectoryError>> + Send;

    /// Admin-only: deletes `target`.
    fn remove_account(
        &self,
        acting: &str,
        token: &str,
        target: &str,
    ) -> impl Future<Output = Result<AccountRemoval, DirectoryError>> + Send;
}
