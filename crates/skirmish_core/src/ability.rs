//! Activated abilities and the damage-modification hook they feed.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed};

/// Ability effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityKind {
    /// Nullifies every incoming hit while active.
    Barrier {
        /// Active duration in seconds.
        #[serde(with = "fixed_serde")]
        duration: Fixed,
    },
}

/// An ability installed on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ability {
    /// Template id, matched against `Command::ability_id`.
    pub id: String,
    /// Effect.
    pub kind: AbilityKind,
    /// Seconds before the ability can be reused.
    #[serde(with = "fixed_serde")]
    pub cooldown: Fixed,
    #[serde(with = "fixed_serde")]
    cooldown_remaining: Fixed,
    #[serde(with = "fixed_serde")]
    active_remaining: Fixed,
}

impl Ability {
    /// Create a ready ability.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: AbilityKind, cooldown: Fixed) -> Self {
        Self {
            id: id.into(),
            kind,
            cooldown,
            cooldown_remaining: Fixed::ZERO,
            active_remaining: Fixed::ZERO,
        }
    }

    /// Check if the ability is off cooldown.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cooldown_remaining <= Fixed::ZERO
    }

    /// Check if the effect is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_remaining > Fixed::ZERO
    }

    /// Start the effect. Returns false while on cooldown.
    pub fn activate(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.active_remaining = match self.kind {
            AbilityKind::Barrier { duration } => duration,
        };
        self.cooldown_remaining = self.cooldown;
        true
    }

    /// Count down the effect and cooldown timers.
    pub fn tick(&mut self, dt: Fixed) {
        self.active_remaining = (self.active_remaining - dt).max(Fixed::ZERO);
        self.cooldown_remaining = (self.cooldown_remaining - dt).max(Fixed::ZERO);
    }

    /// Offer an incoming hit to the ability.
    #[must_use]
    pub fn modify_damage(&self, amount: u32) -> u32 {
        match self.kind {
            AbilityKind::Barrier { .. } if self.is_active() => 0,
            AbilityKind::Barrier { .. } => amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrier_blocks_while_active() {
        let mut barrier = Ability::new(
            "barrier",
            AbilityKind::Barrier {
                duration: Fixed::from_num(2),
            },
            Fixed::from_num(10),
        );
        assert_eq!(barrier.modify_damage(30), 30);
        assert!(barrier.activate());
        assert_eq!(barrier.modify_damage(30), 0);
        assert!(!barrier.activate());

        barrier.tick(Fixed::from_num(2));
        assert_eq!(barrier.modify_damage(30), 30);
        assert!(!barrier.is_ready());
        barrier.tick(Fixed::from_num(8));
        assert!(barrier.is_ready());
    }
}
