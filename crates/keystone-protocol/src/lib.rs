//! Wire protocol for Keystone.
//!
//! This crate defines the "language" both services speak:
//!
//! - **Types** ([`Request`], [`Response`], [`Tier`], [`TierTable`]): the
//!   flat request envelope, the `{success, message, token?, data?}`
//!   response envelope, and the tier model every quota hangs off.
//! - **Payloads** ([`AccountInfo`], [`EnergyReceipt`], ...): typed views
//!   of the `data` object for the responses the services exchange.
//! - **Tokens** ([`TokenAuthority`]): minting and checking the credential
//!   token handed out at login.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, structs out.
//! - **Errors** ([`ServiceError`] and its categories): every domain
//!   failure, each of which renders into a failure [`Response`].
//! - **Records** ([`RecordFile`]): the JSON array-of-records documents
//!   each service persists its state to.
//!
//! ```text
//! Transport (frames) → Protocol (Request/Response) → Service (accounts, players)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod payload;
mod records;
mod token;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, JsonCodec};
pub use error::{
    CredentialError, EconomyError, PermissionError, ProtocolError,
    QuotaError, ServiceError,
};
pub use payload::{
    AccountInfo, AccountRemoval, EnergyReceipt, EnergyShortfall, LoginGrant,
    TierChange,
};
pub use records::{PersistenceError, RecordFile};
pub use token::{
    DEFAULT_TOKEN_SECRET, TokenAuthority, TokenConfig, TokenScheme,
};
pub use types::{Request, Response, Tier, TierTable};
