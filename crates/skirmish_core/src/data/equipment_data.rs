//! Equipment and ability templates.

use serde::{Deserialize, Serialize};

use crate::ability::{Ability, AbilityKind};
use crate::math::{decimal_serde, Fixed};

/// Additive stat bonuses applied once at spawn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentData {
    /// Unique identifier.
    pub id: String,

    /// Added to max health.
    #[serde(default)]
    pub max_health: u32,

    /// Added to max shield.
    #[serde(default)]
    pub max_shield: u32,

    /// Added to move speed.
    #[serde(default, with = "decimal_serde")]
    pub move_speed: Fixed,

    /// Added to sight radius.
    #[serde(default, with = "decimal_serde")]
    pub vision_range: Fixed,

    /// Added to every installed weapon's damage.
    #[serde(default)]
    pub weapon_damage: u32,

    /// Added to every installed weapon's range.
    #[serde(default, with = "decimal_serde")]
    pub weapon_range: Fixed,
}

/// Ability effect data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AbilityKindData {
    /// Nullify incoming damage.
    Barrier {
        /// Seconds active.
        #[serde(with = "decimal_serde")]
        duration: Fixed,
    },
}

/// Data-driven ability definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityData {
    /// Unique identifier.
    pub id: String,

    /// Effect.
    pub kind: AbilityKindData,

    /// Seconds before reuse.
    #[serde(with = "decimal_serde")]
    pub cooldown: Fixed,
}

impl AbilityData {
    /// Build a ready ability from this template.
    #[must_use]
    pub fn build(&self) -> Ability {
        let kind = match self.kind {
            AbilityKindData::Barrier { duration } => AbilityKind::Barrier { duration },
        };
        Ability::new(self.id.clone(), kind, self.cooldown)
    }
}
