//! Core simulation loop.
//!
//! The authoritative server advances one [`Simulation`] per match. Every
//! state-machine tick, command and capture-point evaluation happens inside
//! [`Simulation::tick`], in a fixed order.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - No system randomness
//! - Consistent iteration order (sorted entity IDs)
//! - Same inputs always produce same outputs
//!
//! # Example
//!
//! ```
//! use skirmish_core::simulation::Simulation;
//! use skirmish_core::game_state::{GameState, Player, Team};
//! use skirmish_core::math::Fixed;
//!
//! let mut sim = Simulation::new(GameState::new([
//!     Team::new(1).with_player(Player::new(1, "alice")),
//!     Team::new(2).with_player(Player::new(2, "bob")),
//! ]));
//! sim.start_match();
//! sim.tick(Fixed::from_num(1) / Fixed::from_num(20));
//! assert_eq!(sim.get_tick(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::{CaptureEvent, CapturePoint, GainKind};
use crate::command::Command;
use crate::components::{EntityId, PlayerId, TeamId};
use crate::data::UnitCatalog;
use crate::entity::{DeferredAttack, Entity, EntitySignal, DEATH_EFFECT_DELAY};
use crate::error::{GameError, Result};
use crate::game_state::{GameState, MatchPhase};
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::{NavigationService, OpenGround};
use crate::protocol::{
    CapturePointSnapshot, EntitySnapshot, GameStateSnapshot, MatchEvent, WorldSnapshot,
};
use crate::registry::{EntityRegistry, UnitLedger};
use crate::scheduler::{Continuation, Scheduler};
use crate::spatial::{LayerMask, SpatialQuery, SpatialWorld};
use crate::weapon::{StrikePlan, TargetIndex, WeaponTarget};

/// Server tick rate in Hz.
pub const TICK_RATE: u32 = 20;

/// Damage dealt by one strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageEvent {
    /// Entity dealing damage.
    pub attacker: EntityId,
    /// Entity receiving damage.
    pub target: EntityId,
    /// Damage after modification.
    pub amount: u32,
    /// This hit was lethal.
    pub killed: bool,
}

/// Events generated during a simulation tick.
///
/// Presentation and tests read these directly; the reliable network
/// events are also queued for [`Simulation::drain_events`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Damage from landed strikes.
    pub damage_events: Vec<DamageEvent>,
    /// Entities that died this tick.
    pub deaths: Vec<EntityId>,
    /// Entities that left the field this tick.
    pub despawns: Vec<EntityId>,
    /// Visibility-gated one-shot events raised this tick.
    pub match_events: Vec<MatchEvent>,
}

/// The authoritative match simulation.
///
/// # System Execution Order
///
/// Each tick, systems run in this order:
/// 1. **Commands** - Drain the inbound queue into the registry
/// 2. **Vision** - Sync colliders, recompute due sensors, merge team sight
/// 3. **Weapons** - Tick weapon state machines, schedule strikes
/// 4. **Continuations** - Land due strikes, remove expired corpses
/// 5. **Entities** - Movement, arrival, stance and shield timers
/// 6. **Capture points** - Presence, ownership and gain ticks
/// 7. **Victory** - Score limit check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    tick: u64,
    registry: EntityRegistry,
    capture_points: Vec<CapturePoint>,
    game: GameState,
    scheduler: Scheduler,
    spatial: SpatialWorld,
    nav: OpenGround,
    team_visible: BTreeMap<TeamId, Vec<EntityId>>,
    #[serde(skip)]
    command_queue: Vec<(PlayerId, Command)>,
    #[serde(skip)]
    outbox: Vec<MatchEvent>,
}

impl Simulation {
    /// Create a simulation waiting for players.
    #[must_use]
    pub fn new(game: GameState) -> Self {
        Self {
            tick: 0,
            registry: EntityRegistry::new(),
            capture_points: Vec::new(),
            game,
            scheduler: Scheduler::new(),
            spatial: SpatialWorld::new(),
            nav: OpenGround::default(),
            team_visible: BTreeMap::new(),
            command_queue: Vec::new(),
            outbox: Vec::new(),
        }
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Entity registry.
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Persisted unit records.
    #[must_use]
    pub const fn ledger(&self) -> &UnitLedger {
        self.registry.ledger()
    }

    /// Look up an entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.registry.get(id)
    }

    /// Match state.
    #[must_use]
    pub const fn game(&self) -> &GameState {
        &self.game
    }

    /// Mutable match state, for configuring score limits.
    pub fn game_mut(&mut self) -> &mut GameState {
        &mut self.game
    }

    /// Capture points in id order.
    #[must_use]
    pub fn capture_points(&self) -> &[CapturePoint] {
        &self.capture_points
    }

    /// Spatial world, for adding obstacles.
    pub fn spatial_mut(&mut self) -> &mut SpatialWorld {
        &mut self.spatial
    }

    /// Replace the navigation surface.
    pub fn set_navigation(&mut self, nav: OpenGround) {
        self.nav = nav;
    }

    /// Enemies currently seen by any sensor of `team`, sorted.
    #[must_use]
    pub fn team_visible(&self, team: TeamId) -> &[EntityId] {
        self.team_visible.get(&team).map_or(&[], Vec::as_slice)
    }

    /// Insert a prepared entity; its id is reassigned.
    pub fn insert_entity(&mut self, entity: Entity) -> EntityId {
        self.registry.insert(entity)
    }

    /// Spawn an entity from a catalog template.
    ///
    /// # Errors
    ///
    /// Returns an error if `type_id` is unknown.
    pub fn spawn_entity(
        &mut self,
        catalog: &UnitCatalog,
        type_id: &str,
        player: PlayerId,
        position: Vec2Fixed,
    ) -> Result<EntityId> {
        let team = self.game.team_of(player).ok_or_else(|| {
            GameError::InvalidState(format!("Player {player} is not on any team"))
        })?;
        self.registry.spawn(catalog, type_id, player, team, position)
    }

    /// Add a capture point.
    pub fn add_capture_point(&mut self, point: CapturePoint) {
        self.capture_points.push(point);
        self.capture_points.sort_by_key(|p| p.id);
    }

    /// Begin the match.
    pub fn start_match(&mut self) {
        if let Some((from, to)) = self.game.start() {
            info!("Match started at tick {}", self.tick);
            self.outbox.push(MatchEvent::GameStateTransition {
                from,
                to,
                winner: None,
            });
        }
    }

    // ========================================================================
    // Commands and events
    // ========================================================================

    /// Queue a command; it applies at the start of the next tick.
    pub fn submit_command(&mut self, sender: PlayerId, command: Command) {
        self.command_queue.push((sender, command));
    }

    /// Take every queued reliable event.
    pub fn drain_events(&mut self) -> Vec<MatchEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, event: MatchEvent, events: &mut TickEvents) {
        events.match_events.push(event);
        self.outbox.push(event);
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the simulation by `dt` seconds using the owned collaborators.
    pub fn tick(&mut self, dt: Fixed) -> TickEvents {
        let mut spatial = std::mem::take(&mut self.spatial);
        let nav = self.nav;
        let events = self.tick_with(dt, &mut spatial, &nav);
        self.spatial = spatial;
        events
    }

    /// Advance the simulation by `dt` seconds using external collaborators.
    pub fn tick_with(
        &mut self,
        dt: Fixed,
        spatial: &mut dyn SpatialQuery,
        nav: &dyn NavigationService,
    ) -> TickEvents {
        let mut events = TickEvents::default();

        // 1. Commands apply wholly before this tick's evaluation
        let commands = std::mem::take(&mut self.command_queue);
        if self.game.accepts_commands() {
            for (sender, command) in &commands {
                self.registry.handle_command(*sender, command, nav);
            }
        } else if !commands.is_empty() {
            debug!("Dropping {} commands outside of a running match", commands.len());
        }

        if self.game.phase() != MatchPhase::GameInProgress {
            self.tick += 1;
            return events;
        }

        self.scheduler.advance(dt);
        let entity_ids = self.registry.sorted_ids();

        // 2. Vision
        spatial.update_colliders(self.registry.colliders());
        self.run_vision_system(&entity_ids, dt, spatial);

        // 3. Weapons
        let targets = self.registry.target_index();
        self.run_weapon_system(&entity_ids, dt, &targets);

        // 4. Continuations
        self.run_continuations(spatial, &mut events);

        // 5. Entities
        self.run_entity_system(&entity_ids, dt, &targets, nav, &mut events);

        // 6. Capture points
        spatial.update_colliders(self.registry.colliders());
        self.run_capture_system(dt, spatial, &mut events);

        // 7. Victory
        if self.game.phase() == MatchPhase::GameInProgress {
            if let Some(winner) = self.game.score_limit_winner() {
                self.complete_match(Some(winner), &mut events);
            }
        }

        self.tick += 1;

        #[cfg(feature = "debug-validation")]
        self.validate_pools();

        #[cfg(debug_assertions)]
        debug!("tick {} state hash {:016x}", self.tick, self.state_hash());

        events
    }

    fn run_vision_system(&mut self, entity_ids: &[EntityId], dt: Fixed, spatial: &dyn SpatialQuery) {
        let mut sight: BTreeMap<TeamId, BTreeSet<EntityId>> = BTreeMap::new();
        for &id in entity_ids {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            if !entity.is_alive() {
                continue;
            }
            if entity.sensor.tick(dt) {
                let pose = entity.sensor_pose();
                entity.sensor.recompute(pose, spatial);
            }
            sight
                .entry(entity.team_id)
                .or_default()
                .extend(entity.sensor.visible().iter().copied());
        }
        self.team_visible = sight
            .into_iter()
            .map(|(team, seen)| (team, seen.into_iter().collect()))
            .collect();
    }

    fn run_weapon_system(&mut self, entity_ids: &[EntityId], dt: Fixed, targets: &TargetIndex) {
        for &id in entity_ids {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            let team_visible = self
                .team_visible
                .get(&entity.team_id)
                .map_or(&[][..], Vec::as_slice);
            let actions = entity.tick_weapons(dt, team_visible, targets);
            for (slot, action) in actions {
                if let Some((token, delay)) = entity.handle_weapon_action(action) {
                    self.scheduler.schedule(
                        delay,
                        Continuation::Strike {
                            attacker: id,
                            weapon: slot,
                            token,
                        },
                    );
                }
            }
        }
    }

    fn run_continuations(&mut self, spatial: &dyn SpatialQuery, events: &mut TickEvents) {
        for continuation in self.scheduler.drain_due() {
            match continuation {
                Continuation::Strike {
                    attacker,
                    weapon,
                    token,
                } => self.land_strike(attacker, weapon, token, spatial, events),
                Continuation::RemoveCorpse { entity } => {
                    if self.registry.get(entity).is_some_and(|e| !e.is_alive()) {
                        self.registry.remove(entity);
                    }
                }
            }
        }
    }

    fn land_strike(
        &mut self,
        attacker: EntityId,
        slot: usize,
        token: u64,
        spatial: &dyn SpatialQuery,
        events: &mut TickEvents,
    ) {
        let Some(entity) = self.registry.get_mut(attacker) else {
            return;
        };
        if !entity.is_alive() {
            return;
        }
        let team = entity.team_id;
        let Some(plan) = entity.weapons.get_mut(slot).and_then(|w| w.resolve_strike(token)) else {
            return;
        };

        for (victim, amount) in self.strike_victims(team, &plan, spatial) {
            self.deal_damage(attacker, victim, amount, events);
        }
    }

    /// Entities a strike hits, primary first then splash in id order.
    fn strike_victims(
        &self,
        team: TeamId,
        plan: &StrikePlan,
        spatial: &dyn SpatialQuery,
    ) -> Vec<(EntityId, u32)> {
        let in_splash = |center: Vec2Fixed, airborne: Option<bool>| -> Vec<EntityId> {
            if plan.splash_radius <= Fixed::ZERO {
                return Vec::new();
            }
            spatial
                .overlap_circle(center, plan.splash_radius, LayerMask::enemies_of(team))
                .into_iter()
                .filter(|c| self.registry.get_alive(c.entity).is_some())
                .filter(|c| airborne.map_or(true, |a| c.airborne == a))
                .filter(|c| {
                    if c.airborne {
                        plan.can_attack_air
                    } else {
                        plan.can_attack_ground
                    }
                })
                .map(|c| c.entity)
                .collect()
        };

        match plan.target {
            WeaponTarget::Entity(primary) => {
                let Some(target) = self.registry.get_alive(primary) else {
                    return Vec::new();
                };
                if target.team_id == team {
                    return Vec::new();
                }
                let mut victims = vec![(primary, plan.damage)];
                victims.extend(
                    in_splash(target.position, Some(target.airborne))
                        .into_iter()
                        .filter(|id| *id != primary)
                        .map(|id| (id, plan.damage)),
                );
                victims
            }
            WeaponTarget::Location(point) => in_splash(point, None)
                .into_iter()
                .map(|id| (id, plan.damage))
                .collect(),
            WeaponTarget::None => Vec::new(),
        }
    }

    fn deal_damage(
        &mut self,
        attacker: EntityId,
        target: EntityId,
        amount: u32,
        events: &mut TickEvents,
    ) {
        let Some(outcome) = self.registry.apply_damage(target, amount) else {
            return;
        };
        events.damage_events.push(DamageEvent {
            attacker,
            target,
            amount: outcome.shield_damage + outcome.health_damage,
            killed: outcome.killed,
        });
        if outcome.killed {
            self.handle_death(target, events);
        }
    }

    fn handle_death(&mut self, id: EntityId, events: &mut TickEvents) {
        let Some(report) = self.registry.on_death(id) else {
            return;
        };
        debug!("Entity {id} died (player {}, team {})", report.player, report.team);
        events.deaths.push(id);
        self.emit(MatchEvent::EntityDeath { entity: id }, events);
        self.scheduler.schedule(
            Fixed::from_num(DEATH_EFFECT_DELAY),
            Continuation::RemoveCorpse { entity: id },
        );
        self.check_elimination(
            report.player,
            report.team,
            report.team_has_units,
            report.player_has_units,
            events,
        );
    }

    fn check_elimination(
        &mut self,
        player: PlayerId,
        team: TeamId,
        team_has_units: bool,
        player_has_units: bool,
        events: &mut TickEvents,
    ) {
        if player_has_units {
            return;
        }
        if self.game.defeat_player(player) {
            info!("Player {player} has no living units left");
        }
        if team_has_units {
            return;
        }
        // Teammates that never fielded a unit fall with the team.
        if self.game.defeat_team(team) {
            info!("Team {team} has no living units left");
        }
        if let Some(winner) = self.game.last_team_standing() {
            self.complete_match(winner, events);
        }
    }

    fn complete_match(&mut self, winner: Option<TeamId>, events: &mut TickEvents) {
        if let Some((from, to)) = self.game.complete(winner) {
            info!("Match completed at tick {}, winner {:?}", self.tick, winner);
            self.emit(MatchEvent::GameStateTransition { from, to, winner }, events);
        }
    }

    fn run_entity_system(
        &mut self,
        entity_ids: &[EntityId],
        dt: Fixed,
        targets: &TargetIndex,
        nav: &dyn NavigationService,
        events: &mut TickEvents,
    ) {
        for &id in entity_ids {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            let look_at = entity
                .look_target()
                .and_then(|t| targets.get(t))
                .map(|t| t.position);
            let signals = entity.update(dt, look_at, nav);

            for signal in signals {
                match signal {
                    EntitySignal::Despawn => self.despawn(id, events),
                    EntitySignal::ResumeAttack(DeferredAttack::Entity(target)) => {
                        let info = self.registry.get_alive(target).map(Entity::target_info);
                        if let (Some(info), Some(entity)) = (info, self.registry.get_mut(id)) {
                            entity.order_attack(&info);
                        }
                    }
                    EntitySignal::ResumeAttack(DeferredAttack::Location(point)) => {
                        if let Some(entity) = self.registry.get_mut(id) {
                            entity.order_attack_location(point);
                        }
                    }
                }
            }
        }
    }

    fn despawn(&mut self, id: EntityId, events: &mut TickEvents) {
        let Some(entity) = self.registry.despawn(id) else {
            return;
        };
        debug!("Entity {id} despawned with {} health", entity.health.current);
        events.despawns.push(id);
        self.emit(MatchEvent::EntityDespawn { entity: id }, events);

        let player_has_units = self.registry.living_count_for_player(entity.player_id) > 0;
        let team_has_units = self.registry.living_count_for_team(entity.team_id) > 0;
        self.check_elimination(
            entity.player_id,
            entity.team_id,
            team_has_units,
            player_has_units,
            events,
        );
    }

    fn run_capture_system(&mut self, dt: Fixed, spatial: &dyn SpatialQuery, events: &mut TickEvents) {
        let mut outcomes = Vec::new();
        for point in &mut self.capture_points {
            let present: BTreeSet<TeamId> = spatial
                .overlap_circle(point.position, point.radius, LayerMask::ALL_TEAMS)
                .into_iter()
                .map(|c| c.team)
                .collect();
            outcomes.extend(point.tick(dt, &present));
        }

        for outcome in outcomes {
            match outcome {
                CaptureEvent::OwnerChanged {
                    point,
                    previous,
                    owner,
                } => {
                    info!("Capture point {point} taken by team {owner}");
                    self.emit(
                        MatchEvent::CapturePointOwnerChanged {
                            point,
                            previous,
                            owner,
                        },
                        events,
                    );
                }
                CaptureEvent::Gain {
                    team, kind, amount, ..
                } => match kind {
                    GainKind::Score => self.game.add_score(team, amount),
                    GainKind::Resources => self.game.add_team_resources(team, amount),
                },
            }
        }
    }

    #[cfg(feature = "debug-validation")]
    fn validate_pools(&self) {
        for (id, entity) in self.registry.iter() {
            assert!(
                entity.health.current <= entity.health.max,
                "entity {id} health above max"
            );
            assert!(
                entity.shield.current <= entity.shield.max,
                "entity {id} shield above max"
            );
            assert!(
                entity.is_alive() || entity.health.is_empty(),
                "entity {id} dead with health left"
            );
        }
    }

    // ========================================================================
    // Replication
    // ========================================================================

    /// Build the full-state snapshot and clear every one-shot effect flag.
    pub fn collect_snapshot(&mut self) -> WorldSnapshot {
        let mut entities = Vec::new();
        for id in self.registry.sorted_ids() {
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            if !entity.is_alive() {
                continue;
            }
            entities.push(EntitySnapshot::from_entity(entity));
            entity.effects.take();
        }

        WorldSnapshot {
            tick: self.tick,
            entities,
            capture_points: self
                .capture_points
                .iter()
                .map(CapturePointSnapshot::from_point)
                .collect(),
            game: GameStateSnapshot::from_state(&self.game),
        }
    }

    // ========================================================================
    // Desync diagnostics
    // ========================================================================

    /// Compute a hash of the current simulation state.
    ///
    /// Used for desync detection between runs.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);

        let ids = self.registry.sorted_ids();
        ids.len().hash(&mut hasher);
        for id in ids {
            let Some(entity) = self.registry.get(id) else {
                continue;
            };
            id.hash(&mut hasher);
            entity.position.hash(&mut hasher);
            entity.facing.hash(&mut hasher);
            entity.health.hash(&mut hasher);
            entity.shield.hash(&mut hasher);
            entity.ai_state().hash(&mut hasher);
            entity.is_alive().hash(&mut hasher);
            for weapon in &entity.weapons {
                weapon.state().hash(&mut hasher);
                weapon.target().hash(&mut hasher);
                weapon.cooldown().hash(&mut hasher);
            }
        }

        for point in &self.capture_points {
            point.id.hash(&mut hasher);
            point.state().hash(&mut hasher);
            point.capture_timer().hash(&mut hasher);
            point.owning_team().hash(&mut hasher);
        }

        self.game.hash(&mut hasher);
        self.scheduler.hash(&mut hasher);

        hasher.finish()
    }

    /// Serialize the simulation state to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize simulation: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::EntityKind;
    use crate::entity::AiState;
    use crate::game_state::{Player, Team};
    use crate::weapon::{Weapon, WeaponKind};

    fn dt() -> Fixed {
        Fixed::ONE / Fixed::from_num(TICK_RATE)
    }

    fn two_team_sim() -> Simulation {
        let mut sim = Simulation::new(GameState::new([
            Team::new(1).with_player(Player::new(1, "alice")),
            Team::new(2).with_player(Player::new(2, "bob")),
        ]));
        sim.start_match();
        sim
    }

    fn soldier(player: PlayerId, x: i32) -> Entity {
        Entity::new(0, "soldier", EntityKind::Unit, player, player, Vec2Fixed::from_ints(x, 0))
            .with_pools(30, 0, Fixed::ZERO)
            .with_weapon(Weapon::new(
                "rifle",
                WeaponKind::Targeted { damage: 10 },
                Fixed::from_num(8),
                Fixed::ONE,
            ))
    }

    #[test]
    fn test_start_match_emits_transition() {
        let mut sim = two_team_sim();
        assert_eq!(
            sim.drain_events(),
            vec![MatchEvent::GameStateTransition {
                from: MatchPhase::WaitingForPlayers,
                to: MatchPhase::GameInProgress,
                winner: None
            }]
        );
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn test_unitless_teammate_does_not_stall_completion() {
        let mut sim = Simulation::new(GameState::new([
            Team::new(1)
                .with_player(Player::new(1, "alice"))
                .with_player(Player::new(3, "carol")),
            Team::new(2).with_player(Player::new(2, "bob")),
        ]));
        sim.start_match();
        sim.insert_entity(soldier(1, 0).with_pools(10, 0, Fixed::ZERO));
        sim.insert_entity(soldier(2, 5));

        for _ in 0..400 {
            sim.tick(dt());
            if sim.game().phase() == MatchPhase::GameCompleted {
                break;
            }
        }
        assert_eq!(sim.game().phase(), MatchPhase::GameCompleted);
        assert_eq!(sim.game().winner(), Some(2));
        assert!(sim.game().player(3).is_some_and(|p| p.defeated));
    }

    #[test]
    fn test_commands_ignored_before_start() {
        let mut sim = Simulation::new(GameState::new([
            Team::new(1).with_player(Player::new(1, "alice")),
        ]));
        let id = sim.insert_entity(soldier(1, 0));
        sim.submit_command(1, Command::move_to(vec![id], Vec2Fixed::from_ints(5, 0)));
        sim.tick(dt());
        assert_eq!(sim.entity(id).unwrap().ai_state(), AiState::Idle);
    }

    #[test]
    fn test_units_auto_engage_and_fight_to_completion() {
        let mut sim = two_team_sim();
        let a = sim.insert_entity(soldier(1, 0));
        let b = sim.insert_entity(soldier(2, 5).with_pools(10, 0, Fixed::ZERO));

        let mut deaths = Vec::new();
        for _ in 0..200 {
            let events = sim.tick(dt());
            deaths.extend(events.deaths);
            if sim.game().phase() == MatchPhase::GameCompleted {
                break;
            }
        }
        assert_eq!(deaths, vec![b]);
        assert_eq!(sim.game().winner(), Some(1));
        assert!(sim.entity(a).unwrap().is_alive());
    }

    #[test]
    fn test_corpse_removed_after_delay() {
        let mut sim = two_team_sim();
        sim.insert_entity(soldier(1, 0));
        let b = sim.insert_entity(soldier(2, 5).with_pools(10, 0, Fixed::ZERO));
        sim.insert_entity(soldier(2, 500));

        let mut died_at = None;
        for tick in 0..400u32 {
            let events = sim.tick(dt());
            if events.deaths.contains(&b) {
                died_at = Some(tick);
            }
            if died_at.is_some() && !sim.registry().contains(b) {
                let elapsed = tick - died_at.unwrap_or(tick);
                assert!(elapsed >= DEATH_EFFECT_DELAY as u32 * TICK_RATE - 1);
                return;
            }
        }
        panic!("corpse was never removed");
    }

    #[test]
    fn test_snapshot_clears_effect_flags() {
        let mut sim = two_team_sim();
        let a = sim.insert_entity(soldier(1, 0));
        sim.registry.get_mut(a).unwrap().effects.damaged = true;

        let first = sim.collect_snapshot();
        assert!(first.entities[0].effects.damaged);
        let second = sim.collect_snapshot();
        assert!(!second.entities[0].effects.damaged);
    }

    #[test]
    fn test_serialize_round_trip_preserves_hash() {
        let mut sim = two_team_sim();
        sim.insert_entity(soldier(1, 0));
        sim.insert_entity(soldier(2, 5));
        for _ in 0..10 {
            sim.tick(dt());
        }
        let bytes = sim.serialize().unwrap();
        let restored = Simulation::deserialize(&bytes).unwrap();
        assert_eq!(restored.state_hash(), sim.state_hash());
    }
}
