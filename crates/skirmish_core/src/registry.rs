//! Entity registry: the only mutator of the entity collection.
//!
//! Owns entity lifetime, resolves command targets by id and keeps the
//! [`UnitLedger`] of persisted per-unit records.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{Command, CommandKind};
use crate::components::{EntityId, PlayerId, TeamId};
use crate::data::UnitCatalog;
use crate::entity::{DamageOutcome, Entity};
use crate::error::Result;
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::NavigationService;
use crate::spatial::Collider;
use crate::weapon::{TargetIndex, TargetInfo};

/// Group moves keep each unit at most this many body radii from the
/// shared destination.
pub const FORMATION_SPREAD: i32 = 4;

/// Persisted record of one unit for end-of-match accounting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Owning player.
    pub player: PlayerId,
    /// Template id.
    pub type_id: String,
    /// Last known health; zero after death.
    pub health: u32,
}

/// Persisted unit records keyed by entity id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitLedger {
    records: BTreeMap<EntityId, UnitRecord>,
}

impl UnitLedger {
    /// Look up a record.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&UnitRecord> {
        self.records.get(&id)
    }

    /// Records in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &UnitRecord)> {
        self.records.iter()
    }

    fn record(&mut self, entity: &Entity) {
        self.records.insert(
            entity.id,
            UnitRecord {
                player: entity.player_id,
                type_id: entity.type_id.clone(),
                health: entity.health.current,
            },
        );
    }

    fn set_health(&mut self, id: EntityId, health: u32) {
        if let Some(record) = self.records.get_mut(&id) {
            record.health = health;
        }
    }
}

/// Who was affected by a death.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeathReport {
    /// Dead entity.
    pub entity: EntityId,
    /// Its owner.
    pub player: PlayerId,
    /// Its team.
    pub team: TeamId,
    /// The owner still has living entities.
    pub player_has_units: bool,
    /// The team still has living entities.
    pub team_has_units: bool,
}

/// Storage for every live (and not yet removed dead) entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRegistry {
    /// Map of entity ID to entity data.
    entities: HashMap<EntityId, Entity>,
    /// Next entity ID to assign.
    next_id: EntityId,
    ledger: UnitLedger,
}

impl EntityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
            ledger: UnitLedger::default(),
        }
    }

    /// Insert a new entity and return its assigned ID.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        entity.id = id;
        self.ledger.record(&entity);
        self.entities.insert(id, entity);
        id
    }

    /// Spawn an entity from a catalog template.
    ///
    /// # Errors
    ///
    /// Returns an error if `type_id` is not in the catalog.
    pub fn spawn(
        &mut self,
        catalog: &UnitCatalog,
        type_id: &str,
        player: PlayerId,
        team: TeamId,
        position: Vec2Fixed,
    ) -> Result<EntityId> {
        let entity = catalog.spawn(self.next_id, type_id, player, team, position)?;
        Ok(self.insert(entity))
    }

    /// Remove an entity by ID.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Get a living entity by ID.
    #[must_use]
    pub fn get_alive(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id).filter(|e| e.is_alive())
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get sorted entity IDs for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over all entities (not in deterministic order).
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity)> {
        self.entities.iter()
    }

    /// Persisted unit records.
    #[must_use]
    pub const fn ledger(&self) -> &UnitLedger {
        &self.ledger
    }

    /// Target facts for every entity, for one tick of weapon logic.
    #[must_use]
    pub fn target_index(&self) -> TargetIndex {
        TargetIndex::new(self.entities.values().map(Entity::target_info))
    }

    /// Bodies of every living entity.
    #[must_use]
    pub fn colliders(&self) -> Vec<Collider> {
        self.entities
            .values()
            .filter(|e| e.is_alive())
            .map(|e| Collider {
                entity: e.id,
                team: e.team_id,
                position: e.position,
                radius: e.radius,
                airborne: e.airborne,
            })
            .collect()
    }

    /// Count living entities owned by `player`.
    #[must_use]
    pub fn living_count_for_player(&self, player: PlayerId) -> usize {
        self.entities
            .values()
            .filter(|e| e.is_alive() && e.player_id == player)
            .count()
    }

    /// Count living entities on `team`.
    #[must_use]
    pub fn living_count_for_team(&self, team: TeamId) -> usize {
        self.entities
            .values()
            .filter(|e| e.is_alive() && e.team_id == team)
            .count()
    }

    /// Apply a command on behalf of `sender`.
    ///
    /// Unknown or dead acting ids are skipped, entities not owned by the
    /// sender are skipped individually, and a missing attack target drops
    /// the whole command. Returns the number of entities that accepted.
    pub fn handle_command(
        &mut self,
        sender: PlayerId,
        command: &Command,
        nav: &dyn NavigationService,
    ) -> usize {
        let mut acting: Vec<EntityId> = Vec::with_capacity(command.acting_entity_ids.len());
        for &id in &command.acting_entity_ids {
            if self.get_alive(id).is_none() {
                debug!("Dropping unknown or dead acting entity {id} from {:?}", command.kind);
                continue;
            }
            if !acting.contains(&id) {
                acting.push(id);
            }
        }
        if acting.is_empty() {
            return 0;
        }

        let target = match command.kind {
            CommandKind::Attack => {
                let found = command
                    .target_entity_id
                    .and_then(|t| self.get_alive(t))
                    .map(Entity::target_info);
                if found.is_none() {
                    debug!(
                        "Dropping attack from player {sender}: target {:?} not found",
                        command.target_entity_id
                    );
                    return 0;
                }
                found
            }
            _ => None,
        };

        let centroid = if command.kind == CommandKind::Move && acting.len() > 1 {
            let positions: Vec<Vec2Fixed> = acting
                .iter()
                .filter_map(|id| self.get(*id))
                .map(|e| e.position)
                .collect();
            Vec2Fixed::centroid(&positions)
        } else {
            None
        };

        let mut accepted = 0;
        for id in acting {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            if entity.player_id != sender {
                debug!(
                    "Ignoring {:?} for entity {id}: owned by player {}, sent by {sender}",
                    command.kind, entity.player_id
                );
                continue;
            }
            if apply_to_entity(entity, command, target.as_ref(), centroid, nav) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Damage a living entity.
    pub fn apply_damage(&mut self, id: EntityId, amount: u32) -> Option<DamageOutcome> {
        let entity = self.entities.get_mut(&id)?;
        if !entity.is_alive() {
            return None;
        }
        Some(entity.take_damage(amount))
    }

    /// Record a death and report whether its owner and team are wiped out.
    ///
    /// The corpse stays in the registry until removed.
    pub fn on_death(&mut self, id: EntityId) -> Option<DeathReport> {
        let entity = self.entities.get(&id)?;
        let (player, team) = (entity.player_id, entity.team_id);
        self.ledger.set_health(id, 0);
        Some(DeathReport {
            entity: id,
            player,
            team,
            player_has_units: self.living_count_for_player(player) > 0,
            team_has_units: self.living_count_for_team(team) > 0,
        })
    }

    /// Remove an entity that left the field alive, keeping its last health
    /// in the ledger.
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.ledger.set_health(id, entity.health.current);
        Some(entity)
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_to_entity(
    entity: &mut Entity,
    command: &Command,
    target: Option<&TargetInfo>,
    centroid: Option<Vec2Fixed>,
    nav: &dyn NavigationService,
) -> bool {
    // Client points are untrusted; keep them on the navigation surface.
    let point = nav.nearest_valid_point(command.point);
    match command.kind {
        CommandKind::Move => {
            let destination = match centroid {
                Some(center) => {
                    let spread = entity.radius * Fixed::from_num(FORMATION_SPREAD);
                    let offset = (entity.position - center).clamp_length(spread);
                    nav.nearest_valid_point(point + offset)
                }
                None => point,
            };
            entity.order_move(destination, nav)
        }
        CommandKind::Retreat => entity.order_retreat(point, nav),
        CommandKind::Stop => entity.stop(),
        CommandKind::Attack => target.is_some_and(|t| entity.order_attack(t)),
        CommandKind::AttackLocation => entity.order_attack_location(point),
        CommandKind::Ability => command
            .ability_id
            .as_deref()
            .is_some_and(|ability| entity.activate_ability(ability)),
        CommandKind::ToggleMode => entity.toggle_mode(),
    }
}
