//! Typed `data` payloads carried inside a [`Response`](crate::Response).
//!
//! The key names here are part of the wire contract between the two
//! services, so they are spelled out explicitly.

use serde::{Deserialize, Serialize};

use crate::Tier;

/// `get_user_info` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub username: String,
    #[serde(rename = "type")]
    pub tier: Tier,
    pub energy: u32,
    #[serde(default)]
    pub is_admin: bool,
    pub connection_limit: u32,
}

/// `login` result, next to the token in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginGrant {
    #[serde(rename = "type")]
    pub tier: Tier,
    pub connection_limit: u32,
}

/// Successful `check_energy` debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyReceipt {
    pub username: String,
    pub energy_cost: u32,
    pub remaining_energy: u32,
}

/// Failed `check_energy` debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyShortfall {
    pub current_energy: u32,
    pub required_energy: u32,
}

/// `modify_type` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    pub target_user: String,
    pub new_type: Tier,
}

/// `remove_user` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRemoval {
    pub removed_user: String,
    pub remaining_users: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_info_uses_type_key() {
        let info = AccountInfo {
            username: "alice".into(),
            tier: Tier::Bronze,
            energy: 42,
            is_admin: false,
            connection_limit: 70,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], json!("Bronze"));
        assert_eq!(value["connection_limit"], json!(70));
    }

    #[test]
    fn test_account_info_without_admin_flag_defaults_false() {
        let raw = json!({
            "username": "bob", "type": "Gold", "energy": 3, "connection_limit": 120
        });
        let info: AccountInfo = serde_json::from_value(raw).unwrap();
        assert!(!info.is_admin);
        assert_eq!(info.tier, Tier::Gold);
    }
}
