//! Unit and structure templates.

use serde::{Deserialize, Serialize};

use crate::components::EntityKind;
use crate::entity::StanceMode;
use crate::math::{decimal_serde, Fixed};
use crate::vision::VisionStats;

/// Toggle-mode profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StanceData {
    /// Mode at spawn.
    #[serde(default)]
    pub initial: StanceMode,

    /// Seconds a switch takes.
    #[serde(with = "decimal_serde")]
    pub toggle_duration: Fixed,
}

/// Data-driven entity definition.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     id: "trooper",
///     name: "Trooper",
///     health: 80,
///     shield: 20,
///     shield_recharge_rate: 2.0,
///     speed: 4.5,
///     vision: VisionStats(view_radius: 12.0, view_angle: 120.0),
///     weapons: ["rifle"],
///     equipment: ["plating"],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unique string identifier for this type.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Unit or structure.
    #[serde(default)]
    pub kind: EntityKind,

    /// Maximum health points.
    pub health: u32,

    /// Maximum shield points.
    #[serde(default)]
    pub shield: u32,

    /// Shield points restored per second.
    #[serde(default, with = "decimal_serde")]
    pub shield_recharge_rate: Fixed,

    /// Movement speed.
    #[serde(default, with = "decimal_serde")]
    pub speed: Fixed,

    /// Body radius.
    #[serde(default = "default_radius", with = "decimal_serde")]
    pub radius: Fixed,

    /// Flies.
    #[serde(default)]
    pub airborne: bool,

    /// Sight.
    pub vision: VisionStats,

    /// Weapon template ids; units equip the first.
    #[serde(default)]
    pub weapons: Vec<String>,

    /// Equipment template ids applied at spawn.
    #[serde(default)]
    pub equipment: Vec<String>,

    /// Ability template ids.
    #[serde(default)]
    pub abilities: Vec<String>,

    /// Toggle-mode profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stance: Option<StanceData>,
}

fn default_radius() -> Fixed {
    Fixed::from_num(0.5)
}

impl UnitData {
    /// Check if this template is a structure.
    #[must_use]
    pub fn is_structure(&self) -> bool {
        self.kind == EntityKind::Structure
    }

    /// Check if this template can engage in combat.
    #[must_use]
    pub fn is_combatant(&self) -> bool {
        !self.weapons.is_empty()
    }
}
