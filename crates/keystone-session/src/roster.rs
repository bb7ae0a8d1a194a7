//! Every player's state plus the per-user pending adventure reward.
//!
//! The roster is plain synchronous data; [`SessionService`](crate::SessionService)
//! wraps it in one async mutex. Pending rewards are never persisted: a
//! found item that is not stored before a restart is gone.

use std::collections::{BTreeMap, HashMap};

use keystone_protocol::{CredentialError, EconomyError, ServiceError, Tier, TierTable};
use rand::Rng;
use uuid::Uuid;

use crate::{Catalog, ItemInstance, Money, PlayerState};

/// Smallest and largest cash reward, in cents.
const CASH_REWARD_CENTS: std::ops::RangeInclusive<u64> = 1_500..=7_500;

/// What an adventure turned up.
#[derive(Debug, Clone, PartialEq)]
pub enum AdventureOutcome {
    /// An item now waiting in the pending slot.
    Item(ItemInstance),
    /// Cash, already credited.
    Cash { amount: Money, total_balance: Money },
}

/// Inventory usage for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceReport {
    pub used: u32,
    pub max: u32,
    /// `max - used`, floored at zero for over-capacity inventories.
    pub available: u32,
    pub tier: Tier,
}

/// Players keyed by username, with their pending rewards.
#[derive(Debug)]
pub struct Roster {
    players: BTreeMap<String, PlayerState>,
    pending: HashMap<String, ItemInstance>,
    capacities: TierTable,
    catalog: Catalog,
}

impl Roster {
    pub fn new(capacities: TierTable, catalog: Catalog) -> Self {
        Self {
            players: BTreeMap::new(),
            pending: HashMap::new(),
            capacities,
            catalog,
        }
    }

    /// Loads persisted players. Later duplicates replace earlier ones.
    pub fn restore(&mut self, records: Vec<PlayerState>) {
        for player in records {
            self.players.insert(player.username.clone(), player);
        }
    }

    /// Snapshot of every player, for persistence.
    pub fn records(&self) -> Vec<PlayerState> {
        self.players.values().cloned().collect()
    }

    /// Makes sure `username` exists as an admin with an empty inventory
    /// and zero balance.
    pub fn ensure_admin(&mut self, username: &str) {
        let admin = self
            .players
            .entry(username.to_string())
            .or_insert_with(|| PlayerState::new(username, Tier::Freemium));
        admin.is_admin = true;
        admin.balance = Money::ZERO;
        admin.inventory = Default::default();
        self.pending.remove(username);
    }

    pub fn get(&self, username: &str) -> Option<&PlayerState> {
        self.players.get(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.players.contains_key(username)
    }

    /// Creates a player at `tier` if none exists. Returns `true` if one
    /// was created.
    pub fn ensure_player(&mut self, username: &str, tier: Tier) -> bool {
        if self.players.contains_key(username) {
            return false;
        }
        self.players
            .insert(username.to_string(), PlayerState::new(username, tier));
        tracing::info!(%username, %tier, "player created");
        true
    }

    /// Updates the mirrored tier of an existing player. Returns `false` if
    /// there is no such player. Items are never evicted by a downgrade.
    pub fn set_tier(&mut self, username: &str, tier: Tier) -> bool {
        match self.players.get_mut(username) {
            Some(player) => {
                player.tier = tier;
                true
            }
            None => false,
        }
    }

    /// Deletes a player and any pending reward.
    pub fn remove(&mut self, username: &str) -> Option<PlayerState> {
        self.pending.remove(username);
        self.players.remove(username)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Every known username, sorted.
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.players.keys().map(String::as_str)
    }

    /// The item waiting to be stored, if any.
    pub fn pending(&self, username: &str) -> Option<&ItemInstance> {
        self.pending.get(username)
    }

    /// Capacity for a tier.
    pub fn capacity(&self, tier: Tier) -> u32 {
        self.capacities.get(tier)
    }

    // -----------------------------------------------------------------------
    // Gameplay
    // -----------------------------------------------------------------------

    /// Rolls one adventure: a coin flip between a catalog item (placed in
    /// the pending slot, replacing whatever was there) and a cash reward
    /// (credited immediately).
    pub fn roll_adventure<R: Rng + ?Sized>(
        &mut self,
        username: &str,
        rng: &mut R,
    ) -> Result<AdventureOutcome, ServiceError> {
        let player = self
            .players
            .get_mut(username)
            .ok_or(CredentialError::NotFound("Player"))?;

        if rng.random_bool(0.5) {
            let item = self.catalog.draw(rng);
            if let Some(previous) = self.pending.insert(username.to_string(), item.clone()) {
                tracing::debug!(%username, discarded = %previous.definition.name, "pending reward replaced");
            }
            tracing::info!(%username, item = %item.definition.name, "adventure found item");
            Ok(AdventureOutcome::Item(item))
        } else {
            let amount = Money::from_cents(rng.random_range(CASH_REWARD_CENTS));
            player.balance += amount;
            tracing::info!(%username, %amount, "adventure found money");
            Ok(AdventureOutcome::Cash {
                amount,
                total_balance: player.balance,
            })
        }
    }

    /// Moves the pending item into the inventory.
    ///
    /// # Errors
    /// - [`EconomyError::NoPendingReward`]: nothing to store
    /// - [`EconomyError::NoPlayerState`]: the player has never adventured
    /// - `QuotaError::InsufficientSpace`: it doesn't fit; the item stays
    ///   pending
    pub fn commit_pending(
        &mut self,
        username: &str,
    ) -> Result<(ItemInstance, SpaceReport), ServiceError> {
        let item = self
            .pending
            .get(username)
            .ok_or(EconomyError::NoPendingReward)?;
        let player = self
            .players
            .get_mut(username)
            .ok_or(EconomyError::NoPlayerState)?;
        let capacity = self.capacities.get(player.tier);

        player.inventory.insert(item.clone(), capacity)?;
        let item = self
            .pending
            .remove(username)
            .expect("pending item checked above");
        tracing::info!(%username, item = %item.definition.name, id = %item.id, "item stored");
        let report = self.space(username)?;
        Ok((item, report))
    }

    /// Discards an item.
    pub fn drop_item(
        &mut self,
        username: &str,
        id: Uuid,
    ) -> Result<(ItemInstance, SpaceReport), ServiceError> {
        let player = self
            .players
            .get_mut(username)
            .ok_or(CredentialError::NotFound("Player"))?;
        let item = player
            .inventory
            .take(id)
            .ok_or(EconomyError::ItemNotFound)?;
        tracing::info!(%username, item = %item.definition.name, "item removed");
        Ok((item, self.space(username)?))
    }

    /// Sells an item for its catalog value. Returns the item, the new
    /// balance, and the updated usage.
    pub fn sell_item(
        &mut self,
        username: &str,
        id: Uuid,
    ) -> Result<(ItemInstance, Money, SpaceReport), ServiceError> {
        let player = self
            .players
            .get_mut(username)
            .ok_or(CredentialError::NotFound("Player"))?;
        let item = player
            .inventory
            .take(id)
            .ok_or(EconomyError::ItemNotFound)?;
        player.balance += item.definition.value;
        let balance = player.balance;
        tracing::info!(%username, item = %item.definition.name, value = %item.definition.value, "item sold");
        Ok((item, balance, self.space(username)?))
    }

    /// Current inventory usage.
    pub fn space(&self, username: &str) -> Result<SpaceReport, ServiceError> {
        let player = self
            .players
            .get(username)
            .ok_or(CredentialError::NotFound("Player"))?;
        let used = player.inventory.used();
        let max = self.capacities.get(player.tier);
        Ok(SpaceReport {
            used,
            max,
            available: max.saturating_sub(used),
            tier: player.tier,
        })
    }

    /// Items in insertion order.
    pub fn list(&self, username: &str) -> Result<&[ItemInstance], ServiceError> {
        self.players
            .get(username)
            .map(|player| player.inventory.items())
            .ok_or_else(|| CredentialError::NotFound("Player").into())
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new(TierTable::inventory_capacity_default(), Catalog::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemDefinition;
    use keystone_protocol::QuotaError;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn heavy_catalog(weight: u32) -> Catalog {
        Catalog::new(vec![ItemDefinition::new(
            "treasure",
            "Anvil",
            weight,
            Money::from_cents(900),
        )])
        .unwrap()
    }

    /// Rolls until an item lands in the pending slot.
    fn roll_item(roster: &mut Roster, username: &str, rng: &mut StdRng) -> ItemInstance {
        loop {
            if let AdventureOutcome::Item(item) = roster.roll_adventure(username, rng).unwrap() {
                return item;
            }
        }
    }

    #[test]
    fn test_roll_adventure_unknown_player_fails() {
        let mut roster = Roster::default();
        let err = roster
            .roll_adventure("ghost", &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert_eq!(err.to_string(), "Player not found");
    }

    #[test]
    fn test_roll_adventure_cash_is_in_range_and_credited() {
        let mut roster = Roster::default();
        roster.ensure_player("alice", Tier::Freemium);
        let mut rng = StdRng::seed_from_u64(7);

        let mut expected = Money::ZERO;
        for _ in 0..50 {
            if let AdventureOutcome::Cash { amount, total_balance } =
                roster.roll_adventure("alice", &mut rng).unwrap()
            {
                assert!(CASH_REWARD_CENTS.contains(&amount.cents()));
                expected += amount;
                assert_eq!(total_balance, expected);
            }
        }
        assert_eq!(roster.get("alice").unwrap().balance, expected);
    }

    #[test]
    fn test_roll_adventure_last_roll_wins_pending_slot() {
        let mut roster = Roster::default();
        roster.ensure_player("alice", Tier::Freemium);
        let mut rng = StdRng::seed_from_u64(11);

        let first = roll_item(&mut roster, "alice", &mut rng);
        let second = roll_item(&mut roster, "alice", &mut rng);

        assert_ne!(first.id, second.id);
        assert_eq!(roster.pending("alice").unwrap().id, second.id);
        let (stored, _) = roster.commit_pending("alice").unwrap();
        assert_eq!(stored.id, second.id);
        assert!(roster.pending("alice").is_none());
    }

    #[test]
    fn test_commit_pending_without_reward_fails() {
        let mut roster = Roster::default();
        roster.ensure_player("alice", Tier::Freemium);
        assert_eq!(
            roster.commit_pending("alice").unwrap_err(),
            ServiceError::from(EconomyError::NoPendingReward)
        );
    }

    #[test]
    fn test_commit_pending_over_capacity_keeps_item_pending() {
        let mut roster = Roster::new(TierTable::inventory_capacity_default(), heavy_catalog(15));
        roster.ensure_player("alice", Tier::Freemium);
        let mut rng = StdRng::seed_from_u64(5);

        roll_item(&mut roster, "alice", &mut rng);
        roster.commit_pending("alice").unwrap();
        roll_item(&mut roster, "alice", &mut rng);

        let err = roster.commit_pending("alice").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Quota(QuotaError::InsufficientSpace { used: 15, max: 20, item_weight: 15, .. })
        ));
        assert!(roster.pending("alice").is_some());
        assert_eq!(roster.space("alice").unwrap().used, 15);
    }

    #[test]
    fn test_sell_item_credits_value_once() {
        let mut roster = Roster::new(TierTable::inventory_capacity_default(), heavy_catalog(2));
        roster.ensure_player("alice", Tier::Freemium);
        let mut rng = StdRng::seed_from_u64(9);
        let item = roll_item(&mut roster, "alice", &mut rng);
        roster.commit_pending("alice").unwrap();
        let before = roster.get("alice").unwrap().balance;

        let (sold, balance, space) = roster.sell_item("alice", item.id).unwrap();
        assert_eq!(sold.id, item.id);
        assert_eq!(balance, before + Money::from_cents(900));
        assert_eq!(space.used, 0);
        assert_eq!(
            roster.sell_item("alice", item.id).unwrap_err(),
            ServiceError::from(EconomyError::ItemNotFound)
        );
    }

    #[test]
    fn test_drop_item_frees_space() {
        let mut roster = Roster::new(TierTable::inventory_capacity_default(), heavy_catalog(4));
        roster.ensure_player("alice", Tier::Bronze);
        let mut rng = StdRng::seed_from_u64(2);
        let item = roll_item(&mut roster, "alice", &mut rng);
        roster.commit_pending("alice").unwrap();

        let (_, space) = roster.drop_item("alice", item.id).unwrap();
        assert_eq!(space, SpaceReport { used: 0, max: 40, available: 40, tier: Tier::Bronze });
    }

    #[test]
    fn test_space_after_downgrade_floors_available() {
        let mut roster = Roster::new(TierTable::inventory_capacity_default(), heavy_catalog(30));
        roster.ensure_player("alice", Tier::Silver);
        let mut rng = StdRng::seed_from_u64(4);
        roll_item(&mut roster, "alice", &mut rng);
        roster.commit_pending("alice").unwrap();

        roster.set_tier("alice", Tier::Freemium);
        let space = roster.space("alice").unwrap();
        assert_eq!((space.used, space.max, space.available), (30, 20, 0));
        assert_eq!(roster.list("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_ensure_admin_resets_existing_player() {
        let mut roster = Roster::default();
        roster.ensure_player("admin", Tier::Gold);
        roster.roll_adventure("admin", &mut StdRng::seed_from_u64(1)).unwrap();

        roster.ensure_admin("admin");
        let admin = roster.get("admin").unwrap();
        assert!(admin.is_admin);
        assert_eq!(admin.balance, Money::ZERO);
        assert!(roster.pending("admin").is_none());
    }

    #[test]
    fn test_remove_clears_pending() {
        let mut roster = Roster::default();
        roster.ensure_player("alice", Tier::Freemium);
        roll_item(&mut roster, "alice", &mut StdRng::seed_from_u64(6));

        assert!(roster.remove("alice").is_some());
        assert!(roster.pending("alice").is_none());
        assert!(!roster.contains("alice"));
    }
}
