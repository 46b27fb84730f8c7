//! Weapon templates.

use serde::{Deserialize, Serialize};

use crate::math::{decimal_serde, Fixed};
use crate::weapon::{DamageRamp, Weapon, WeaponKind};

/// Variant-specific weapon data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeaponKindData {
    /// Entity-targeted weapon with optional splash.
    Targeted {
        /// Damage per strike.
        damage: u32,
    },
    /// Ground-targeted area weapon.
    Location {
        /// Damage per strike.
        damage: u32,
    },
    /// Beam whose damage ramps during sustained contact.
    Continuous {
        /// Starting damage.
        damage: u32,
        /// Damage ceiling.
        max_damage: u32,
        /// Seconds to climb from `damage` to `max_damage`.
        #[serde(with = "decimal_serde")]
        damage_increase_time: Fixed,
    },
}

/// Data-driven weapon definition.
///
/// # Example RON
///
/// ```ron
/// WeaponData(
///     id: "rifle",
///     kind: Targeted(damage: 12),
///     range: 8.0,
///     attack_rate: 1.0,
///     attack_effect_time: 0.2,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponData {
    /// Unique identifier.
    pub id: String,

    /// Variant data.
    pub kind: WeaponKindData,

    /// Engagement range.
    #[serde(with = "decimal_serde")]
    pub range: Fixed,

    /// Seconds between strikes.
    #[serde(with = "decimal_serde")]
    pub attack_rate: Fixed,

    /// Telegraph before damage lands.
    #[serde(default, with = "decimal_serde")]
    pub attack_effect_time: Fixed,

    /// Area damage radius.
    #[serde(default, with = "decimal_serde")]
    pub splash_radius: Fixed,

    /// Can hit ground targets.
    #[serde(default = "default_true")]
    pub can_attack_ground: bool,

    /// Can hit air targets.
    #[serde(default)]
    pub can_attack_air: bool,
}

const fn default_true() -> bool {
    true
}

impl WeaponData {
    /// Build an idle weapon from this template.
    #[must_use]
    pub fn build(&self) -> Weapon {
        let kind = match self.kind {
            WeaponKindData::Targeted { damage } => WeaponKind::Targeted { damage },
            WeaponKindData::Location { damage } => WeaponKind::Location { damage },
            WeaponKindData::Continuous {
                damage,
                max_damage,
                damage_increase_time,
            } => WeaponKind::Continuous(DamageRamp::new(damage, max_damage, damage_increase_time)),
        };
        Weapon::new(self.id.clone(), kind, self.range, self.attack_rate)
            .with_attack_effect_time(self.attack_effect_time)
            .with_splash_radius(self.splash_radius)
            .with_capability(self.can_attack_ground, self.can_attack_air)
    }

    /// Template problems, if any.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.range <= Fixed::ZERO {
            errors.push(format!("Weapon '{}' has non-positive range", self.id));
        }
        if self.attack_effect_time > self.attack_rate {
            errors.push(format!(
                "Weapon '{}' attack effect time exceeds attack rate",
                self.id
            ));
        }
        if !self.can_attack_ground && !self.can_attack_air {
            errors.push(format!("Weapon '{}' cannot hit anything", self.id));
        }
        if let WeaponKindData::Continuous {
            damage, max_damage, ..
        } = self.kind
        {
            if max_damage < damage {
                errors.push(format!("Weapon '{}' max damage below base damage", self.id));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_build_continuous() {
        let data: WeaponData = ron::from_str(
            r#"WeaponData(
                id: "beam",
                kind: Continuous(damage: 2, max_damage: 8, damage_increase_time: 3.0),
                range: 6.5,
                attack_rate: 0.5,
                can_attack_air: true,
            )"#,
        )
        .unwrap();
        assert!(data.validate().is_empty());
        let weapon = data.build();
        assert_eq!(weapon.current_damage(), 2);
        assert_eq!(weapon.range, Fixed::from_num(6.5));
        assert!(weapon.can_attack_ground && weapon.can_attack_air);
    }

    #[test]
    fn test_validate_rejects_bad_timing() {
        let data = WeaponData {
            id: "slow".to_string(),
            kind: WeaponKindData::Targeted { damage: 1 },
            range: Fixed::ONE,
            attack_rate: Fixed::ONE,
            attack_effect_time: Fixed::from_num(2),
            splash_radius: Fixed::ZERO,
            can_attack_ground: true,
            can_attack_air: false,
        };
        assert_eq!(data.validate().len(), 1);
    }
}
