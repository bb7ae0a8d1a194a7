//! The energy budget: a per-account counter that throttles costed actions.
//!
//! Every account starts with [`MAX_ENERGY`]. Each costed action debits a
//! pseudo-random amount drawn from an [`EnergyCost`] range. Energy never
//! regenerates and never goes negative: a debit larger than the balance is
//! refused outright rather than clamped.

use rand::Rng;

/// Starting (and maximum) energy for a new account.
pub const MAX_ENERGY: u32 = 100;

/// Inclusive range an energy debit is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyCost {
    min: u32,
    max: u32,
}

impl EnergyCost {
    /// Creates a cost range. The bounds may be given in either order.
    ///
    /// Both bounds are raised to at least 1, so an empty balance can never
    /// cover a roll.
    pub fn new(a: u32, b: u32) -> Self {
        Self {
            min: a.min(b).max(1),
            max: a.max(b).max(1),
        }
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Draws one cost from the range.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.random_range(self.min..=self.max)
    }
}

impl Default for EnergyCost {
    fn default() -> Self {
        Self::new(1, 2)
    }
}
