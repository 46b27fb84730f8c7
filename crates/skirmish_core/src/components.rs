//! Shared component data.
//!
//! Plain data carried by entities and snapshots: identifiers, resource
//! pools and the one-shot presentation flags.

use serde::{Deserialize, Serialize};

/// Unique identifier for entities.
pub type EntityId = u64;

/// Identifier of a player slot.
pub type PlayerId = u32;

/// Identifier of a team.
pub type TeamId = u32;

/// Identifier of a capture point.
pub type CapturePointId = u32;

/// Broad classification that decides mobility and weapon handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityKind {
    /// Mobile unit with a single equipped weapon.
    #[default]
    Unit,
    /// Stationary structure; every installed weapon is active.
    Structure,
}

/// A bounded integer pool (health or shield).
///
/// `current` never exceeds `max`; arithmetic saturates at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pool {
    /// Current value.
    pub current: u32,
    /// Maximum value.
    pub max: u32,
}

impl Pool {
    /// Create a full pool.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if the pool is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.current == 0
    }

    /// Check if the pool is full.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Remove up to `amount`, returning the amount actually drained.
    pub fn drain(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current -= actual;
        actual
    }

    /// Add up to `amount`, returning the amount actually restored.
    pub fn restore(&mut self, amount: u32) -> u32 {
        let headroom = self.max.saturating_sub(self.current);
        let actual = amount.min(headroom);
        self.current += actual;
        actual
    }

    /// Raise the maximum (and current value) by `bonus`.
    pub fn grow(&mut self, bonus: u32) {
        self.max = self.max.saturating_add(bonus);
        self.current = self.current.saturating_add(bonus).min(self.max);
    }
}

/// One-shot presentation triggers.
///
/// Raised by the simulation during a tick, copied into exactly one
/// snapshot and then cleared on the sending side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EffectFlags {
    /// A weapon entered its in-range attacking phase.
    pub attack_started: bool,
    /// A weapon began its attack telegraph.
    pub attack_effect: bool,
    /// A weapon stopped attacking.
    pub attack_stopped: bool,
    /// The entity took damage.
    pub damaged: bool,
}

impl EffectFlags {
    /// Return the current flags and reset them.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Check if any flag is raised.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.attack_started || self.attack_effect || self.attack_stopped || self.damaged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_saturates() {
        let mut pool = Pool::new(10);
        assert_eq!(pool.drain(25), 10);
        assert!(pool.is_empty());
        assert_eq!(pool.restore(4), 4);
        assert_eq!(pool.restore(40), 6);
        assert!(pool.is_full());
    }

    #[test]
    fn test_pool_grow_keeps_bound() {
        let mut pool = Pool { current: 5, max: 10 };
        pool.grow(20);
        assert_eq!(pool.max, 30);
        assert_eq!(pool.current, 25);
    }

    #[test]
    fn test_effect_flags_take_clears() {
        let mut flags = EffectFlags {
            damaged: true,
            ..Default::default()
        };
        let taken = flags.take();
        assert!(taken.damaged);
        assert!(!flags.any());
    }
}
