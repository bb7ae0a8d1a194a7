//! A capacity-bounded bag of items.
//!
//! The inventory doesn't know its own capacity: that comes from the
//! owner's tier, which can change underneath it. Every operation that adds
//! weight takes the current capacity as an argument. A tier downgrade can
//! leave an inventory over capacity; it then accepts nothing new until
//! enough is dropped or sold.

use keystone_protocol::QuotaError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ItemInstance;

/// Items in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    items: Vec<ItemInstance>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the weights of every held item.
    pub fn used(&self) -> u32 {
        self.items.iter().map(ItemInstance::weight).sum()
    }

    /// Would `item` fit under `capacity`?
    pub fn can_accept(&self, item: &ItemInstance, capacity: u32) -> bool {
        self.used().saturating_add(item.weight()) <= capacity
    }

    /// Adds `item` if it fits.
    ///
    /// # Errors
    /// [`QuotaError::InsufficientSpace`]; the item is handed back untouched
    /// inside the caller's copy.
    pub fn insert(&mut self, item: ItemInstance, capacity: u32) -> Result<(), QuotaError> {
        if !self.can_accept(&item, capacity) {
            return Err(QuotaError::InsufficientSpace {
                used: self.used(),
                max: capacity,
                item_weight: item.weight(),
                item_name: item.definition.name,
                item_type: item.definition.kind,
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Removes and returns the item with `id`.
    pub fn take(&mut self, id: Uuid) -> Option<ItemInstance> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn items(&self) -> &[ItemInstance] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ItemDefinition, Money};

    fn item(name: &str, weight: u32) -> ItemInstance {
        ItemInstance::new(ItemDefinition::new("misc", name, weight, Money::from_cents(100)))
    }

    #[test]
    fn test_can_accept_predicts_insert() {
        let mut inventory = Inventory::new();
        let capacity = 5;
        for weight in [2, 2, 1, 1, 3] {
            let candidate = item("x", weight);
            let predicted = inventory.can_accept(&candidate, capacity);
            let actual = inventory.insert(candidate, capacity).is_ok();
            assert_eq!(predicted, actual);
            assert!(inventory.used() <= capacity);
        }
        assert_eq!(inventory.used(), 5);
    }

    #[test]
    fn test_insert_over_capacity_reports_space() {
        let mut inventory = Inventory::new();
        inventory.insert(item("a", 18), 20).unwrap();

        let err = inventory.insert(item("Leather Armour", 5), 20).unwrap_err();
        assert_eq!(
            err,
            QuotaError::InsufficientSpace {
                used: 18,
                max: 20,
                item_weight: 5,
                item_name: "Leather Armour".into(),
                item_type: "misc".into(),
            }
        );
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn test_take_removes_by_id_and_keeps_order() {
        let mut inventory = Inventory::new();
        let (a, b, c) = (item("a", 1), item("b", 1), item("c", 1));
        let b_id = b.id;
        for i in [a, b, c] {
            inventory.insert(i, 10).unwrap();
        }

        assert_eq!(inventory.take(b_id).unwrap().definition.name, "b");
        assert!(inventory.take(b_id).is_none());
        let names: Vec<_> = inventory.items().iter().map(|i| i.definition.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn test_over_capacity_after_downgrade_accepts_nothing() {
        let mut inventory = Inventory::new();
        inventory.insert(item("heavy", 30), 40).unwrap();
        assert!(!inventory.can_accept(&item("feather", 0), 20));
    }
}
