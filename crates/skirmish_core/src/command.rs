//! Client-to-server commands.

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::Vec2Fixed;

/// Command verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Move to `point`.
    Move,
    /// Retreat to `point` and leave the field on arrival.
    Retreat,
    /// Cancel everything.
    Stop,
    /// Attack `target_entity_id`.
    Attack,
    /// Attack the ground at `point`.
    AttackLocation,
    /// Activate `ability_id`.
    Ability,
    /// Switch stance.
    ToggleMode,
}

/// An immutable order from a client, consumed once by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    /// Verb.
    pub kind: CommandKind,
    /// Entities the command applies to.
    pub acting_entity_ids: Vec<EntityId>,
    /// Entity target for attacks.
    pub target_entity_id: Option<EntityId>,
    /// Ground target for moves and location attacks.
    pub point: Vec2Fixed,
    /// Ability to activate.
    pub ability_id: Option<String>,
}

impl Command {
    fn base(kind: CommandKind, acting: impl Into<Vec<EntityId>>) -> Self {
        Self {
            kind,
            acting_entity_ids: acting.into(),
            target_entity_id: None,
            point: Vec2Fixed::ZERO,
            ability_id: None,
        }
    }

    /// Move order.
    #[must_use]
    pub fn move_to(acting: impl Into<Vec<EntityId>>, point: Vec2Fixed) -> Self {
        Self {
            point,
            ..Self::base(CommandKind::Move, acting)
        }
    }

    /// Retreat order.
    #[must_use]
    pub fn retreat(acting: impl Into<Vec<EntityId>>, point: Vec2Fixed) -> Self {
        Self {
            point,
            ..Self::base(CommandKind::Retreat, acting)
        }
    }

    /// Stop order.
    #[must_use]
    pub fn stop(acting: impl Into<Vec<EntityId>>) -> Self {
        Self::base(CommandKind::Stop, acting)
    }

    /// Attack an entity.
    #[must_use]
    pub fn attack(acting: impl Into<Vec<EntityId>>, target: EntityId) -> Self {
        Self {
            target_entity_id: Some(target),
            ..Self::base(CommandKind::Attack, acting)
        }
    }

    /// Attack a ground point.
    #[must_use]
    pub fn attack_location(acting: impl Into<Vec<EntityId>>, point: Vec2Fixed) -> Self {
        Self {
            point,
            ..Self::base(CommandKind::AttackLocation, acting)
        }
    }

    /// Activate an ability.
    #[must_use]
    pub fn ability(acting: impl Into<Vec<EntityId>>, ability_id: impl Into<String>) -> Self {
        Self {
            ability_id: Some(ability_id.into()),
            ..Self::base(CommandKind::Ability, acting)
        }
    }

    /// Switch stance.
    #[must_use]
    pub fn toggle_mode(acting: impl Into<Vec<EntityId>>) -> Self {
        Self::base(CommandKind::ToggleMode, acting)
    }
}
