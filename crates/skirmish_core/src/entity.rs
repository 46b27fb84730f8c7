//! Entity state machine.
//!
//! An entity is a unit or a structure. Its behaviour is a four-state
//! machine ([`AiState`]) driven by orders from the registry and by
//! requests from its weapons. Orders report acceptance as `bool`; refusal
//! is never an error.
//!
//! Side effects of state entry:
//!
//! - `Moving` / `Retreating`: stop attacking, clear the look target.
//! - `Attacking`: halt movement.
//! - `Idle`: halt movement and attacking, clear the look target.
//!
//! Death is terminal. Once `take_damage` reports a kill every later
//! mutation is ignored.

use serde::{Deserialize, Serialize};

use crate::ability::Ability;
use crate::components::{EffectFlags, EntityId, EntityKind, PlayerId, Pool, TeamId};
use crate::data::EquipmentData;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::navigation::{NavAgent, NavigationService, DEFAULT_STOPPING_DISTANCE};
use crate::vision::{SensorPose, VisionSensor, VisionStats};
use crate::weapon::{OwnerView, TargetIndex, TargetInfo, Weapon, WeaponAction};

/// Seconds after the last shield loss before regeneration starts.
pub const SHIELD_RECHARGE_DELAY: f64 = 3.0;

/// Retreat arrivals closer than this to the retreat destination despawn.
pub const RETREAT_MAX_DISTANCE: f64 = 1.0;

/// Seconds a corpse stays in the registry for the death effect.
pub const DEATH_EFFECT_DELAY: f64 = 2.0;

/// Behaviour state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AiState {
    /// No orders.
    #[default]
    Idle,
    /// Travelling to a destination.
    Moving,
    /// Travelling to a retreat point; leaves the field on arrival.
    Retreating,
    /// Engaging with at least one weapon.
    Attacking,
}

/// Stance of a toggle-mode unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StanceMode {
    /// May move, may not attack.
    #[default]
    Mobile,
    /// May attack, may not move.
    Deployed,
}

impl StanceMode {
    /// The other mode.
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Mobile => Self::Deployed,
            Self::Deployed => Self::Mobile,
        }
    }
}

/// An attack waiting for a stance switch to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeferredAttack {
    /// Attack an entity.
    Entity(EntityId),
    /// Attack a ground point.
    Location(Vec2Fixed),
}

/// Toggle-mode state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stance {
    /// Current mode.
    pub mode: StanceMode,
    /// Seconds a switch takes.
    #[serde(with = "fixed_serde")]
    pub toggle_duration: Fixed,
    toggling: Option<Fixed>,
    deferred: Option<DeferredAttack>,
}

impl Stance {
    /// Create a stance settled in `mode`.
    #[must_use]
    pub const fn new(mode: StanceMode, toggle_duration: Fixed) -> Self {
        Self {
            mode,
            toggle_duration,
            toggling: None,
            deferred: None,
        }
    }

    /// Whether a switch is in progress.
    #[must_use]
    pub const fn is_toggling(&self) -> bool {
        self.toggling.is_some()
    }
}

/// Result of one `take_damage` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageOutcome {
    /// Amount absorbed by the shield.
    pub shield_damage: u32,
    /// Amount taken from health.
    pub health_damage: u32,
    /// This hit killed the entity.
    pub killed: bool,
}

/// Request from an entity update to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySignal {
    /// Retreat finished; remove without a death.
    Despawn,
    /// Stance switch finished with an attack pending.
    ResumeAttack(DeferredAttack),
}

/// A simulated unit or structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique id.
    pub id: EntityId,
    /// Template id.
    pub type_id: String,
    /// Unit or structure.
    pub kind: EntityKind,
    /// Owning player.
    pub player_id: PlayerId,
    /// Owning team.
    pub team_id: TeamId,
    /// Ground position.
    pub position: Vec2Fixed,
    /// Unit facing vector.
    pub facing: Vec2Fixed,
    /// Airborne flag.
    pub airborne: bool,
    /// Body radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Health pool.
    pub health: Pool,
    /// Shield pool.
    pub shield: Pool,
    /// Shield points restored per second.
    #[serde(with = "fixed_serde")]
    pub shield_recharge_rate: Fixed,
    /// Travel speed.
    #[serde(with = "fixed_serde")]
    pub move_speed: Fixed,
    /// Physically able to move.
    pub can_move: bool,
    /// Sight.
    pub sensor: VisionSensor,
    /// Installed weapons; units use only the first.
    pub weapons: Vec<Weapon>,
    /// Equipment ids applied at spawn.
    pub equipment: Vec<String>,
    /// Activated abilities.
    pub abilities: Vec<Ability>,
    /// Toggle-mode state, if the entity has stances.
    pub stance: Option<Stance>,
    /// One-shot presentation flags.
    pub effects: EffectFlags,
    equipment_applied: bool,
    ai_state: AiState,
    look_target: Option<EntityId>,
    nav: NavAgent,
    retreat_destination: Option<Vec2Fixed>,
    #[serde(with = "fixed_serde")]
    shield_delay: Fixed,
    #[serde(with = "fixed_serde")]
    shield_progress: Fixed,
    dead: bool,
}

impl Entity {
    /// Create a full-health entity facing +X.
    #[must_use]
    pub fn new(
        id: EntityId,
        type_id: impl Into<String>,
        kind: EntityKind,
        player_id: PlayerId,
        team_id: TeamId,
        position: Vec2Fixed,
    ) -> Self {
        Self {
            id,
            type_id: type_id.into(),
            kind,
            player_id,
            team_id,
            position,
            facing: Vec2Fixed::UNIT_X,
            airborne: false,
            radius: Fixed::from_num(0.5),
            health: Pool::new(100),
            shield: Pool::new(0),
            shield_recharge_rate: Fixed::ZERO,
            move_speed: Fixed::from_num(5),
            can_move: kind == EntityKind::Unit,
            sensor: VisionSensor::new(VisionStats {
                view_radius: Fixed::from_num(15),
                view_angle: Fixed::from_num(360),
            }),
            weapons: Vec::new(),
            equipment: Vec::new(),
            abilities: Vec::new(),
            stance: None,
            effects: EffectFlags::default(),
            equipment_applied: false,
            ai_state: AiState::Idle,
            look_target: None,
            nav: NavAgent::default(),
            retreat_destination: None,
            shield_delay: Fixed::ZERO,
            shield_progress: Fixed::ZERO,
            dead: false,
        }
    }

    /// Builder method to set health and shield maxima.
    #[must_use]
    pub fn with_pools(mut self, max_health: u32, max_shield: u32, recharge_rate: Fixed) -> Self {
        self.health = Pool::new(max_health);
        self.shield = Pool::new(max_shield);
        self.shield_recharge_rate = recharge_rate;
        self
    }

    /// Builder method to install a weapon.
    #[must_use]
    pub fn with_weapon(mut self, weapon: Weapon) -> Self {
        self.weapons.push(weapon);
        self
    }

    /// Builder method to set sight.
    #[must_use]
    pub fn with_vision(mut self, stats: VisionStats) -> Self {
        self.sensor = VisionSensor::new(stats);
        self
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current behaviour state.
    #[must_use]
    pub const fn ai_state(&self) -> AiState {
        self.ai_state
    }

    /// Check if the entity is alive.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        !self.dead
    }

    /// Entity the entity is turned toward.
    #[must_use]
    pub const fn look_target(&self) -> Option<EntityId> {
        self.look_target
    }

    /// Steering state.
    #[must_use]
    pub const fn nav(&self) -> &NavAgent {
        &self.nav
    }

    /// Retreat point while retreating.
    #[must_use]
    pub const fn retreat_destination(&self) -> Option<Vec2Fixed> {
        self.retreat_destination
    }

    /// Whether equipment bonuses have been applied.
    #[must_use]
    pub const fn equipment_applied(&self) -> bool {
        self.equipment_applied
    }

    /// Whether a stance switch is in progress.
    #[must_use]
    pub fn is_toggling(&self) -> bool {
        self.stance.is_some_and(|s| s.is_toggling())
    }

    fn stance_mode(&self) -> Option<StanceMode> {
        self.stance.map(|s| s.mode)
    }

    /// Able to accept movement right now.
    #[must_use]
    pub fn can_move_now(&self) -> bool {
        self.is_alive()
            && self.can_move
            && !self.is_toggling()
            && self.stance_mode() != Some(StanceMode::Deployed)
    }

    /// Stance allows weapons to fire right now.
    #[must_use]
    pub fn can_attack_now(&self) -> bool {
        self.is_alive() && !self.is_toggling() && self.stance_mode() != Some(StanceMode::Mobile)
    }

    /// Idle and in a stance that lets weapons pick their own targets.
    #[must_use]
    pub fn can_auto_attack(&self) -> bool {
        self.ai_state == AiState::Idle && self.can_attack_now()
    }

    /// Weapon slots currently in use.
    #[must_use]
    pub fn active_weapon_slots(&self) -> std::ops::Range<usize> {
        match self.kind {
            EntityKind::Structure => 0..self.weapons.len(),
            EntityKind::Unit => 0..self.weapons.len().min(1),
        }
    }

    /// The equipped weapon of a unit, or the first weapon of a structure.
    #[must_use]
    pub fn primary_weapon(&self) -> Option<&Weapon> {
        self.weapons.first()
    }

    /// Whether any active weapon is engaged.
    #[must_use]
    pub fn is_attacking(&self) -> bool {
        self.active_weapon_slots().any(|i| self.weapons[i].is_attacking())
    }

    /// Facts other weapons use to target this entity.
    #[must_use]
    pub fn target_info(&self) -> TargetInfo {
        TargetInfo {
            id: self.id,
            team: self.team_id,
            position: self.position,
            airborne: self.airborne,
            alive: self.is_alive(),
        }
    }

    /// Pose for a vision recompute.
    #[must_use]
    pub const fn sensor_pose(&self) -> SensorPose {
        SensorPose {
            team: self.team_id,
            position: self.position,
            facing: self.facing,
        }
    }

    // ========================================================================
    // Equipment
    // ========================================================================

    /// Apply equipment bonuses. Has no effect after the first call.
    pub fn apply_equipment(&mut self, equipment: &[&EquipmentData]) {
        if self.equipment_applied {
            return;
        }
        self.equipment_applied = true;
        for item in equipment {
            self.equipment.push(item.id.clone());
            self.health.grow(item.max_health);
            self.shield.grow(item.max_shield);
            self.move_speed += item.move_speed;
            self.sensor.view_radius += item.vision_range;
            for weapon in &mut self.weapons {
                weapon.add_damage_bonus(item.weapon_damage);
                weapon.range += item.weapon_range;
            }
        }
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Travel to the nearest valid point to `destination`.
    pub fn order_move(&mut self, destination: Vec2Fixed, nav: &dyn NavigationService) -> bool {
        if !self.can_move_now() {
            return false;
        }
        self.begin_travel(AiState::Moving, nav.nearest_valid_point(destination));
        self.retreat_destination = None;
        true
    }

    /// Retreat to `destination` and despawn on arrival.
    pub fn order_retreat(&mut self, destination: Vec2Fixed, nav: &dyn NavigationService) -> bool {
        if !self.can_move_now() {
            return false;
        }
        let resolved = nav.nearest_valid_point(destination);
        self.begin_travel(AiState::Retreating, resolved);
        self.retreat_destination = Some(resolved);
        true
    }

    fn begin_travel(&mut self, state: AiState, destination: Vec2Fixed) {
        self.stop_weapons();
        self.look_target = None;
        self.nav
            .set_destination(destination, Fixed::from_num(DEFAULT_STOPPING_DISTANCE));
        self.ai_state = state;
    }

    /// Attack an entity with every active weapon that accepts it.
    ///
    /// A mobile-stance unit accepts the order by starting a stance switch
    /// and resumes the attack once deployed.
    pub fn order_attack(&mut self, target: &TargetInfo) -> bool {
        if !self.is_alive() || self.is_toggling() {
            return false;
        }
        if self.stance_mode() == Some(StanceMode::Mobile) {
            let hittable = self
                .primary_weapon()
                .is_some_and(|w| !w.is_location_weapon() && w.can_hit_target(self.team_id, Some(target)));
            return hittable && self.begin_toggle(Some(DeferredAttack::Entity(target.id)));
        }

        let team = self.team_id;
        let mut accepted = false;
        for slot in self.active_weapon_slots() {
            accepted |= self.weapons[slot].attack_entity(team, target);
        }
        if accepted {
            self.enter_attacking(Some(target.id));
        }
        accepted
    }

    /// Attack a ground point with every active location weapon.
    pub fn order_attack_location(&mut self, point: Vec2Fixed) -> bool {
        if !self.is_alive() || self.is_toggling() {
            return false;
        }
        if self.stance_mode() == Some(StanceMode::Mobile) {
            let capable = self.primary_weapon().is_some_and(Weapon::is_location_weapon);
            return capable && self.begin_toggle(Some(DeferredAttack::Location(point)));
        }

        let mut accepted = false;
        for slot in self.active_weapon_slots() {
            accepted |= self.weapons[slot].attack_location(point);
        }
        if accepted {
            self.enter_attacking(None);
        }
        accepted
    }

    fn enter_attacking(&mut self, look_target: Option<EntityId>) {
        self.nav.halt();
        self.retreat_destination = None;
        self.look_target = look_target;
        self.ai_state = AiState::Attacking;
    }

    /// Cancel everything and go idle.
    pub fn stop(&mut self) -> bool {
        if !self.is_alive() {
            return false;
        }
        if let Some(stance) = &mut self.stance {
            stance.deferred = None;
        }
        self.enter_idle();
        true
    }

    fn enter_idle(&mut self) {
        self.stop_weapons();
        self.nav.halt();
        self.look_target = None;
        self.retreat_destination = None;
        self.ai_state = AiState::Idle;
    }

    fn stop_weapons(&mut self) {
        let mut stopped = false;
        for weapon in &mut self.weapons {
            stopped |= weapon.stop();
        }
        if stopped {
            self.effects.attack_stopped = true;
        }
    }

    /// Start switching stance.
    pub fn toggle_mode(&mut self) -> bool {
        if !self.is_alive() || self.is_toggling() {
            return false;
        }
        self.begin_toggle(None)
    }

    fn begin_toggle(&mut self, deferred: Option<DeferredAttack>) -> bool {
        if self.stance.is_none() {
            return false;
        }
        self.enter_idle();
        if let Some(stance) = &mut self.stance {
            stance.toggling = Some(stance.toggle_duration);
            stance.deferred = deferred;
        }
        true
    }

    /// Activate an ability by id.
    pub fn activate_ability(&mut self, ability_id: &str) -> bool {
        if !self.is_alive() || self.is_toggling() {
            return false;
        }
        self.abilities
            .iter_mut()
            .find(|a| a.id == ability_id)
            .is_some_and(Ability::activate)
    }

    // ========================================================================
    // Damage
    // ========================================================================

    /// Apply a hit: abilities may modify it, then shield absorbs before
    /// health.
    pub fn take_damage(&mut self, amount: u32) -> DamageOutcome {
        if self.dead {
            return DamageOutcome::default();
        }
        let amount = self
            .abilities
            .iter()
            .fold(amount, |dmg, ability| ability.modify_damage(dmg));
        if amount == 0 {
            return DamageOutcome::default();
        }

        let shield_damage = self.shield.drain(amount);
        let health_damage = self.health.drain(amount - shield_damage);
        if shield_damage > 0 {
            self.shield_delay = Fixed::from_num(SHIELD_RECHARGE_DELAY);
            self.shield_progress = Fixed::ZERO;
        }
        self.effects.damaged = true;

        let killed = self.health.is_empty();
        if killed {
            self.die();
        }
        DamageOutcome {
            shield_damage,
            health_damage,
            killed,
        }
    }

    fn die(&mut self) {
        self.stop_weapons();
        self.nav.halt();
        self.look_target = None;
        self.retreat_destination = None;
        self.ai_state = AiState::Idle;
        self.sensor.clear();
        self.dead = true;
    }

    fn regenerate_shield(&mut self, dt: Fixed) {
        if self.shield.is_full() || self.shield_recharge_rate <= Fixed::ZERO {
            self.shield_progress = Fixed::ZERO;
            return;
        }
        let mut dt = dt;
        if self.shield_delay > Fixed::ZERO {
            if dt < self.shield_delay {
                self.shield_delay -= dt;
                return;
            }
            // Time left over after the delay expires counts toward recharge.
            dt -= self.shield_delay;
            self.shield_delay = Fixed::ZERO;
        }
        let interval = Fixed::ONE / self.shield_recharge_rate;
        self.shield_progress = self.shield_progress.saturating_add(dt);
        while self.shield_progress >= interval && !self.shield.is_full() {
            self.shield_progress -= interval;
            self.shield.restore(1);
        }
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Tick every active weapon against the target snapshot.
    ///
    /// Returns `(slot, action)` pairs for [`Entity::handle_weapon_action`].
    pub fn tick_weapons(
        &mut self,
        dt: Fixed,
        team_visible: &[EntityId],
        targets: &TargetIndex,
    ) -> Vec<(usize, WeaponAction)> {
        if self.dead || !self.can_attack_now() {
            return Vec::new();
        }
        let can_auto_attack = self.can_auto_attack();
        let can_chase = self.can_move_now();
        let active = self.active_weapon_slots();
        let view = OwnerView {
            team: self.team_id,
            position: self.position,
            visible: self.sensor.visible(),
            team_visible,
            can_auto_attack,
            can_chase,
        };

        let mut actions = Vec::new();
        for (slot, weapon) in self.weapons.iter_mut().enumerate() {
            if !active.contains(&slot) {
                continue;
            }
            actions.extend(weapon.tick(dt, &view, targets).into_iter().map(|a| (slot, a)));
        }
        actions
    }

    /// React to a weapon request. Returns the strike to schedule on fire.
    pub fn handle_weapon_action(&mut self, action: WeaponAction) -> Option<(u64, Fixed)> {
        if self.dead {
            return None;
        }
        match action {
            WeaponAction::Acquired(id) => {
                if self.ai_state == AiState::Idle {
                    self.enter_attacking(Some(id));
                }
                None
            }
            WeaponAction::LostTarget => {
                self.effects.attack_stopped = true;
                let done = match self.kind {
                    EntityKind::Unit => true,
                    EntityKind::Structure => !self.is_attacking(),
                };
                if done && self.ai_state == AiState::Attacking {
                    self.enter_idle();
                }
                None
            }
            WeaponAction::MoveIntoRange {
                point,
                stopping_distance,
            } => {
                if self.can_move_now() {
                    self.nav.chase(point, stopping_distance);
                }
                None
            }
            WeaponAction::InRange => {
                self.nav.halt();
                self.effects.attack_started = true;
                None
            }
            WeaponAction::Fire { token, delay } => {
                self.effects.attack_effect = true;
                Some((token, delay))
            }
        }
    }

    /// Advance timers, movement and arrival checks.
    ///
    /// `look_at` is the current position of the look target, if it still
    /// resolves.
    pub fn update(
        &mut self,
        dt: Fixed,
        look_at: Option<Vec2Fixed>,
        nav: &dyn NavigationService,
    ) -> Vec<EntitySignal> {
        let mut signals = Vec::new();
        if self.dead {
            return signals;
        }

        for ability in &mut self.abilities {
            ability.tick(dt);
        }
        self.regenerate_shield(dt);

        if let Some(stance) = &mut self.stance {
            if let Some(remaining) = stance.toggling {
                let remaining = remaining - dt;
                if remaining <= Fixed::ZERO {
                    stance.toggling = None;
                    stance.mode = stance.mode.flipped();
                    if let Some(deferred) = stance.deferred.take() {
                        signals.push(EntitySignal::ResumeAttack(deferred));
                    }
                } else {
                    stance.toggling = Some(remaining);
                }
            }
        }

        if self.can_move {
            self.nav.step(&mut self.position, self.move_speed, dt, nav);
        }
        let velocity = self.nav.velocity();
        if !velocity.is_zero() {
            self.facing = velocity.normalize();
        } else if let Some(point) = look_at {
            let toward = (point - self.position).normalize();
            if !toward.is_zero() {
                self.facing = toward;
            }
        }

        match self.ai_state {
            AiState::Moving if self.nav.has_arrived(self.position) => self.enter_idle(),
            AiState::Retreating if self.nav.has_arrived(self.position) => {
                if let Some(destination) = self.retreat_destination {
                    let tolerance = Fixed::from_num(RETREAT_MAX_DISTANCE);
                    if self.position.distance_squared(destination) <= tolerance * tolerance {
                        signals.push(EntitySignal::Despawn);
                    } else {
                        self.nav
                            .set_destination(destination, Fixed::from_num(DEFAULT_STOPPING_DISTANCE));
                    }
                } else {
                    self.enter_idle();
                }
            }
            _ => {}
        }

        signals
    }
}
