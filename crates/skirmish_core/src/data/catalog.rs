//! Template catalog and entity factory.

use serde::{Deserialize, Serialize};

use super::{AbilityData, EquipmentData, UnitData, WeaponData};
use crate::components::{EntityId, PlayerId, Pool, TeamId};
use crate::entity::{Entity, Stance};
use crate::error::{GameError, Result};
use crate::math::Vec2Fixed;

/// Every template a match can spawn from.
///
/// # Example RON
///
/// ```ron
/// UnitCatalog(
///     weapons: [WeaponData(id: "rifle", kind: Targeted(damage: 10), range: 8.0, attack_rate: 1.0)],
///     equipment: [],
///     abilities: [],
///     units: [UnitData(
///         id: "trooper",
///         name: "Trooper",
///         health: 80,
///         speed: 4.0,
///         vision: VisionStats(view_radius: 12.0),
///         weapons: ["rifle"],
///     )],
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitCatalog {
    /// Weapon templates.
    #[serde(default)]
    pub weapons: Vec<WeaponData>,
    /// Equipment templates.
    #[serde(default)]
    pub equipment: Vec<EquipmentData>,
    /// Ability templates.
    #[serde(default)]
    pub abilities: Vec<AbilityData>,
    /// Unit and structure templates.
    #[serde(default)]
    pub units: Vec<UnitData>,
}

impl UnitCatalog {
    /// Parse and validate a catalog. `source` names the input in errors.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the text is not a valid
    /// catalog or a template references something that does not exist.
    pub fn from_ron_str(source: &str, contents: &str) -> Result<Self> {
        let catalog: Self = ron::from_str(contents).map_err(|e| GameError::DataParseError {
            path: source.to_string(),
            message: e.to_string(),
        })?;

        let errors = catalog.validate();
        if !errors.is_empty() {
            return Err(GameError::DataParseError {
                path: source.to_string(),
                message: errors.join("; "),
            });
        }

        tracing::info!(
            "Loaded catalog '{}' with {} units, {} weapons, {} equipment, {} abilities",
            source,
            catalog.units.len(),
            catalog.weapons.len(),
            catalog.equipment.len(),
            catalog.abilities.len()
        );
        Ok(catalog)
    }

    /// Get a unit template by id.
    #[must_use]
    pub fn get_unit(&self, id: &str) -> Option<&UnitData> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Get a weapon template by id.
    #[must_use]
    pub fn get_weapon(&self, id: &str) -> Option<&WeaponData> {
        self.weapons.iter().find(|w| w.id == id)
    }

    /// Get an equipment template by id.
    #[must_use]
    pub fn get_equipment(&self, id: &str) -> Option<&EquipmentData> {
        self.equipment.iter().find(|e| e.id == id)
    }

    /// Get an ability template by id.
    #[must_use]
    pub fn get_ability(&self, id: &str) -> Option<&AbilityData> {
        self.abilities.iter().find(|a| a.id == id)
    }

    /// Validate cross references and template sanity.
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for weapon in &self.weapons {
            errors.extend(weapon.validate());
        }

        for unit in &self.units {
            if unit.health == 0 {
                errors.push(format!("Unit '{}' has zero health", unit.id));
            }
            for weapon_id in &unit.weapons {
                if self.get_weapon(weapon_id).is_none() {
                    errors.push(format!(
                        "Unit '{}' references unknown weapon '{}'",
                        unit.id, weapon_id
                    ));
                }
            }
            for equipment_id in &unit.equipment {
                if self.get_equipment(equipment_id).is_none() {
                    errors.push(format!(
                        "Unit '{}' references unknown equipment '{}'",
                        unit.id, equipment_id
                    ));
                }
            }
            for ability_id in &unit.abilities {
                if self.get_ability(ability_id).is_none() {
                    errors.push(format!(
                        "Unit '{}' references unknown ability '{}'",
                        unit.id, ability_id
                    ));
                }
            }
            if unit.stance.is_some() && unit.is_structure() {
                errors.push(format!("Structure '{}' cannot have a stance", unit.id));
            }
        }

        errors
    }

    /// Build a live entity from a template, applying its equipment.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownUnitType`] if `type_id` is not in the
    /// catalog.
    pub fn spawn(
        &self,
        id: EntityId,
        type_id: &str,
        player: PlayerId,
        team: TeamId,
        position: Vec2Fixed,
    ) -> Result<Entity> {
        let data = self
            .get_unit(type_id)
            .ok_or_else(|| GameError::UnknownUnitType(type_id.to_string()))?;

        let mut entity = Entity::new(id, data.id.clone(), data.kind, player, team, position)
            .with_vision(data.vision);
        entity.health = Pool::new(data.health);
        entity.shield = Pool::new(data.shield);
        entity.shield_recharge_rate = data.shield_recharge_rate;
        entity.move_speed = data.speed;
        entity.radius = data.radius;
        entity.airborne = data.airborne;
        entity.can_move = !data.is_structure() && data.speed > crate::math::Fixed::ZERO;
        entity.weapons = data
            .weapons
            .iter()
            .filter_map(|w| self.get_weapon(w))
            .map(WeaponData::build)
            .collect();
        entity.abilities = data
            .abilities
            .iter()
            .filter_map(|a| self.get_ability(a))
            .map(AbilityData::build)
            .collect();
        entity.stance = data
            .stance
            .map(|s| Stance::new(s.initial, s.toggle_duration));

        let equipment: Vec<&EquipmentData> = data
            .equipment
            .iter()
            .filter_map(|e| self.get_equipment(e))
            .collect();
        entity.apply_equipment(&equipment);

        Ok(entity)
    }
}
