//! Error types shared by both services.
//!
//! [`ProtocolError`] covers encoding and decoding. Everything else here is a
//! *domain* error: a request that was well-formed but could not be honoured.
//! Domain errors never tear down a connection. They render into a failure
//! [`Response`] via [`ServiceError::into_response`], and the `Display`
//! text of each variant is the exact `message` clients see.

use serde_json::json;

use crate::Response;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (malformed JSON or wrong shape).
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but makes no sense at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

// ---------------------------------------------------------------------------
// Domain error categories
// ---------------------------------------------------------------------------

/// Who-are-you failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("User already exists")]
    AlreadyExists,

    #[error(
        "Password must be 8-20 chars with upper, lower, digit, and special char"
    )]
    WeakPassword,

    /// The named subject (`"User"`, `"Target user"`, `"Player"`) is missing.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid password")]
    InvalidCredential,

    #[error("Invalid authentication token")]
    InvalidToken,
}

/// You-may-not failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("Insufficient permissions. Admin access required")]
    AdminRequired,

    /// An admin tried to act on their own account. Carries the verb
    /// phrase, e.g. `"remove yourself"`.
    #[error("You may not {0}")]
    SelfModification(&'static str),

    #[error("Admin accounts have no inventory")]
    AdminHasNoInventory,

    #[error("Admin accounts cannot go on adventures")]
    AdminCannotAdventure,
}

/// Not-enough-room failures. These carry numbers the client can show.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    #[error("Server is at capacity for your user type. Please try again later")]
    CapacityExceeded { current: u32, limit: u32 },

    #[error("Insufficient energy")]
    InsufficientEnergy { current: u32, required: u32 },

    #[error("Not enough inventory space to store item")]
    InsufficientSpace {
        used: u32,
        max: u32,
        item_weight: u32,
        item_name: String,
        item_type: String,
    },
}

/// Inventory and balance failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EconomyError {
    #[error("No item to store")]
    NoPendingReward,

    #[error("Item not found in inventory")]
    ItemNotFound,

    #[error("You must go on an adventure first")]
    NoPlayerState,
}

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Any reason a request failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error(transparent)]
    Economy(#[from] EconomyError),

    #[error(
        "Invalid player type. Valid types: Freemium, Bronze, Silver, Gold, Platinum"
    )]
    InvalidTier,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// A request arrived on a connection that has not been admitted.
    #[error("Please authenticate first")]
    Unauthenticated,

    /// An admitted connection sent a request in someone else's name.
    #[error("Request username does not match the authenticated connection")]
    UsernameMismatch,

    /// The Identity Service refused a forwarded request. Its message and
    /// data are relayed unchanged.
    #[error("{message}")]
    Upstream {
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Failed to communicate with the authentication server")]
    Unreachable,
}

impl ServiceError {
    /// Renders this error as the failure response sent to the client.
    pub fn into_response(self) -> Response {
        let response = Response::failure(self.to_string());
        let data = match self {
            ServiceError::Quota(QuotaError::CapacityExceeded {
                current,
                limit,
            }) => Some(json!({
                "current_connections": current,
                "connection_limit": limit,
            })),
            ServiceError::Quota(QuotaError::InsufficientEnergy {
                current,
                required,
            }) => Some(json!({
                "current_energy": current,
                "required_energy": required,
            })),
            ServiceError::Quota(QuotaError::InsufficientSpace {
                used,
                max,
                item_weight,
                item_name,
                item_type,
            }) => Some(json!({
                "used_space": used,
                "max_space": max,
                "item_space": item_weight,
                "item_name": item_name,
                "item_type": item_type,
            })),
            ServiceError::Upstream { data, .. } => data,
            _ => None,
        };
        match data {
            Some(data) => response.with_data(data),
            None => response,
        }
    }
}
