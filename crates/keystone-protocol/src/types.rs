//! Core protocol types: tiers, tier tables, and the request/response
//! envelopes.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Ordered account classification.
///
/// The tier is the single input to every quota in the system: the Identity
/// Service derives a connection limit from it, the Session Service derives
/// an inventory capacity from it. Each service keeps its own [`TierTable`]
/// for that mapping.
///
/// The derived `Ord` follows declaration order, so
/// `Tier::Freemium < Tier::Platinum`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
pub enum Tier {
    #[default]
    Freemium,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Every tier, lowest first.
    pub const ALL: [Tier; 5] = [
        Tier::Freemium,
        Tier::Bronze,
        Tier::Silver,
        Tier::Gold,
        Tier::Platinum,
    ];

    /// The wire name of this tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Freemium => "Freemium",
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    /// Parses a tier from its exact wire name (`"Gold"`, not `"gold"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| format!("unknown tier '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// TierTable
// ---------------------------------------------------------------------------

/// A quota per tier.
///
/// Connection limits and inventory capacities used to be the same numbers
/// read off an enum's discriminants; here they are two explicit tables so
/// each service can tune its own quota without touching the other's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTable {
    values: [u32; 5],
}

impl TierTable {
    /// Builds a table from values listed lowest tier first.
    pub const fn new(values: [u32; 5]) -> Self {
        Self { values }
    }

    /// Default per-tier cap on concurrent session connections.
    pub const fn connection_limits_default() -> Self {
        Self::new([50, 70, 90, 120, 150])
    }

    /// Default per-tier inventory capacity, in weight units.
    pub const fn inventory_capacity_default() -> Self {
        Self::new([20, 40, 60, 80, 120])
    }

    /// Looks up the quota for a tier.
    pub fn get(&self, tier: Tier) -> u32 {
        self.values[tier.index()]
    }

    /// Overrides the quota for one tier.
    pub fn set(&mut self, tier: Tier, value: u32) {
        self.values[tier.index()] = value;
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, tier: Tier, value: u32) -> Self {
        self.set(tier, value);
        self
    }
}

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// A client request.
///
/// Requests are deliberately flat: the legacy framing ends a request at the
/// first `}` byte, so a nested object would be cut in half.
///
/// Field names follow the Identity Service's spelling (`target_user`,
/// `new_type`); the Session Service's camel-case spellings (`targetUser`,
/// `newType`) are accepted as aliases. `itemId` is the other way round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(
        default,
        alias = "targetUser",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_user: Option<String>,

    #[serde(default, alias = "newType", skip_serializing_if = "Option::is_none")]
    pub new_type: Option<String>,

    #[serde(
        default,
        rename = "itemId",
        alias = "item_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub item_id: Option<String>,
}

impl Request {
    /// Starts a request for `action` on behalf of `username`.
    pub fn new(action: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_user = Some(target.into());
        self
    }

    pub fn with_new_type(mut self, new_type: impl Into<String>) -> Self {
        self.new_type = Some(new_type.into());
        self
    }

    pub fn with_item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    /// The presented token, or `""` if none was sent.
    pub fn token_str(&self) -> &str {
        self.token.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// A service response: `{success, message, token?, data?}`.
///
/// `data` is free-form JSON. The typed views in [`crate::payload`] describe
/// the shapes the two services rely on; [`Response::data_as`] converts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            token: None,
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(message)
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serializes a typed payload into `data`.
    ///
    /// Payload types are plain structs of strings and integers, which
    /// always serialize; a failure here leaves `data` empty.
    pub fn with_payload<T: Serialize>(self, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => self.with_data(value),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize response payload");
                self
            }
        }
    }

    /// Interprets `data` as a typed payload.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}
