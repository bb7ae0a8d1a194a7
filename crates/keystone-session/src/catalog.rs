//! Item definitions, item instances, and money.

use std::fmt;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// A non-negative currency amount, stored in cents.
///
/// On the wire and on disk it is a decimal number (`150.0`, `37.25`), which
/// is what existing clients and save files use. Internally it is an
/// integer so balances never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Converts a decimal amount, rounding to the nearest cent. Negative
    /// and non-finite amounts become zero.
    pub fn from_decimal(amount: f64) -> Self {
        if amount.is_finite() && amount > 0.0 {
            Self((amount * 100.0).round() as u64)
        } else {
            Self::ZERO
        }
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

/// Formats as `12.50`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Money::from_decimal)
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A kind of item: what it is, how heavy it is, what it sells for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub weight: u32,
    pub value: Money,
}

impl ItemDefinition {
    pub fn new(kind: &str, name: &str, weight: u32, value: Money) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            weight,
            value,
        }
    }
}

/// One concrete item. The id is assigned at creation and never changes.
///
/// Serializes flat: `{"id", "type", "name", "weight", "value"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: Uuid,
    #[serde(flatten)]
    pub definition: ItemDefinition,
}

impl ItemInstance {
    /// Mints a fresh instance with a random v4 id.
    pub fn new(definition: ItemDefinition) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition,
        }
    }

    pub fn weight(&self) -> u32 {
        self.definition.weight
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The fixed set of items an adventure can turn up.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<ItemDefinition>,
}

impl Catalog {
    /// Builds a catalog. Returns `None` if `items` is empty.
    pub fn new(items: Vec<ItemDefinition>) -> Option<Self> {
        (!items.is_empty()).then_some(Self { items })
    }

    pub fn items(&self) -> &[ItemDefinition] {
        &self.items
    }

    /// Picks a definition uniformly at random and mints an instance of it.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> ItemInstance {
        let definition = self
            .items
            .choose(rng)
            .expect("catalog is never empty")
            .clone();
        ItemInstance::new(definition)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let m = Money::from_cents;
        Self {
            items: vec![
                ItemDefinition::new("weapon", "Iron Dagger", 3, m(15_000)),
                ItemDefinition::new("consumable", "Health Potion", 1, m(2_500)),
                ItemDefinition::new("armor", "Leather Armour", 5, m(20_000)),
                ItemDefinition::new("treasure", "Amethyst", 1, m(30_000)),
                ItemDefinition::new("equipment", "Wooden Shield", 2, m(7_500)),
                ItemDefinition::new("weapon", "Compound Bow", 4, m(18_000)),
                ItemDefinition::new("accessory", "Silver Ring", 1, m(12_000)),
            ],
        }
    }
}
