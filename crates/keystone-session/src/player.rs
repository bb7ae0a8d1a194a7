use keystone_protocol::Tier;
use serde::{Deserialize, Serialize};

use crate::{Inventory, Money};

/// One player's economic state, as persisted in `game_data.json`.
///
/// `tier` mirrors the Identity Service's value at the last refresh and
/// may lag behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub username: String,
    #[serde(rename = "type", default)]
    pub tier: Tier,
    #[serde(default)]
    pub balance: Money,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub inventory: Inventory,
}

impl PlayerState {
    pub fn new(username: &str, tier: Tier) -> Self {
        Self {
            username: username.to_string(),
            tier,
            balance: Money::ZERO,
            is_admin: false,
            inventory: Inventory::new(),
        }
    }
}
