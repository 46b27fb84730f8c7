//! Weapon state machine.
//!
//! A weapon is owned by exactly one entity and cycles through
//! `Idle -> AttackingCommand | AttackingAuto -> Idle`. The variant set is
//! closed ([`WeaponKind`]): targeted, location-targeted and continuous
//! (ramping beam) weapons share the state machine and differ only in how
//! they pick targets and how much damage a strike deals.
//!
//! Weapons never touch other entities directly. Each tick they read a
//! [`TargetIndex`] snapshot and return [`WeaponAction`]s; the simulation
//! applies those to the owner and schedules delayed strikes, which come
//! back through [`Weapon::resolve_strike`] and are re-validated there.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, TeamId};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Weapon engagement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeaponState {
    /// Not engaged.
    #[default]
    Idle,
    /// Engaging a target given by an explicit command.
    AttackingCommand,
    /// Engaging a self-acquired target.
    AttackingAuto,
}

/// What a weapon is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeaponTarget {
    /// Nothing.
    #[default]
    None,
    /// An entity, resolved by id every use.
    Entity(EntityId),
    /// A point on the ground.
    Location(Vec2Fixed),
}

/// Damage ramp of a continuous weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRamp {
    /// Damage when engagement starts.
    pub base: u32,
    /// Damage ceiling.
    pub max: u32,
    /// Seconds of sustained contact to climb from `base` to `max`.
    #[serde(with = "fixed_serde")]
    pub increase_time: Fixed,
    current: u32,
    #[serde(with = "fixed_serde")]
    progress: Fixed,
}

impl DamageRamp {
    /// Create a ramp sitting at its base value.
    #[must_use]
    pub const fn new(base: u32, max: u32, increase_time: Fixed) -> Self {
        Self {
            base,
            max,
            increase_time,
            current: base,
            progress: Fixed::ZERO,
        }
    }

    /// Current damage output.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.current
    }

    /// Seconds per +1 step, `None` when the ramp is flat.
    #[must_use]
    pub fn step_interval(&self) -> Option<Fixed> {
        if self.max <= self.base {
            return None;
        }
        let steps = Fixed::saturating_from_num(self.max - self.base);
        Some(self.increase_time / steps)
    }

    /// Accumulate engaged time, raising damage by 1 per elapsed interval.
    pub fn advance(&mut self, dt: Fixed) {
        let Some(interval) = self.step_interval() else {
            return;
        };
        if self.current >= self.max {
            return;
        }
        if interval <= Fixed::ZERO {
            self.current = self.max;
            self.progress = Fixed::ZERO;
            return;
        }
        self.progress = self.progress.saturating_add(dt);
        while self.progress >= interval && self.current < self.max {
            self.progress -= interval;
            self.current += 1;
        }
    }

    /// Drop back to the base value.
    pub fn reset(&mut self) {
        self.current = self.base;
        self.progress = Fixed::ZERO;
    }

    /// Shift base and ceiling by an equipment bonus.
    pub fn add_bonus(&mut self, bonus: u32) {
        self.base = self.base.saturating_add(bonus);
        self.max = self.max.saturating_add(bonus);
        self.reset();
    }
}

/// Closed set of weapon variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponKind {
    /// Hits an entity; splash hits others around it.
    Targeted {
        /// Damage per strike.
        damage: u32,
    },
    /// Hits everything eligible around a ground point.
    Location {
        /// Damage per strike.
        damage: u32,
    },
    /// Beam on an entity whose damage ramps during sustained contact.
    Continuous(DamageRamp),
}

/// Facts about a potential target, captured once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Entity id.
    pub id: EntityId,
    /// Owning team.
    pub team: TeamId,
    /// Position on the ground plane.
    pub position: Vec2Fixed,
    /// Whether the target is airborne.
    pub airborne: bool,
    /// Whether the target is still alive.
    pub alive: bool,
}

/// Id-indexed lookup of [`TargetInfo`] for one tick.
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    targets: BTreeMap<EntityId, TargetInfo>,
}

impl TargetIndex {
    /// Build from an iterator of target facts.
    pub fn new(targets: impl IntoIterator<Item = TargetInfo>) -> Self {
        Self {
            targets: targets.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    /// Look up a living target.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&TargetInfo> {
        self.targets.get(&id).filter(|t| t.alive)
    }
}

/// What the owner sees while a weapon ticks.
#[derive(Debug, Clone, Copy)]
pub struct OwnerView<'a> {
    /// Owning team.
    pub team: TeamId,
    /// Owner position.
    pub position: Vec2Fixed,
    /// Enemies the owner's own sensor currently sees (sorted).
    pub visible: &'a [EntityId],
    /// Enemies any sensor of the owner's team currently sees (sorted).
    pub team_visible: &'a [EntityId],
    /// Owner is idle and allowed to pick its own targets.
    pub can_auto_attack: bool,
    /// Owner is able to move toward an out-of-range target.
    pub can_chase: bool,
}

/// Request from a weapon to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponAction {
    /// Picked a target by itself; owner should enter its attacking state.
    Acquired(EntityId),
    /// Target died, left vision or became unreachable.
    LostTarget,
    /// Target is out of range; owner should close in.
    MoveIntoRange {
        /// Point to approach.
        point: Vec2Fixed,
        /// Distance at which to stop.
        stopping_distance: Fixed,
    },
    /// Entered the attacking-and-in-range phase.
    InRange,
    /// Strike should land after `delay` seconds, identified by `token`.
    Fire {
        /// Strike identity, checked when it resolves.
        token: u64,
        /// Telegraph duration.
        delay: Fixed,
    },
}

/// A strike that survived validation and should now be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikePlan {
    /// What the strike hits.
    pub target: WeaponTarget,
    /// Damage to the primary target (or every target for location hits).
    pub damage: u32,
    /// Splash radius.
    pub splash_radius: Fixed,
    /// Weapon can hit ground targets.
    pub can_attack_ground: bool,
    /// Weapon can hit air targets.
    pub can_attack_air: bool,
}

/// An installed weapon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    /// Template id.
    pub type_id: String,
    /// Variant data.
    pub kind: WeaponKind,
    /// Maximum engagement distance.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Seconds between strikes.
    #[serde(with = "fixed_serde")]
    pub attack_rate: Fixed,
    /// Telegraph duration between firing and damage.
    #[serde(with = "fixed_serde")]
    pub attack_effect_time: Fixed,
    /// Radius of area damage.
    #[serde(with = "fixed_serde")]
    pub splash_radius: Fixed,
    /// Can hit ground targets.
    pub can_attack_ground: bool,
    /// Can hit air targets.
    pub can_attack_air: bool,
    #[serde(with = "fixed_serde")]
    cooldown: Fixed,
    state: WeaponState,
    target: WeaponTarget,
    in_range: bool,
    pending_strike: Option<u64>,
    next_token: u64,
}

impl Weapon {
    /// Create an idle weapon.
    #[must_use]
    pub fn new(type_id: impl Into<String>, kind: WeaponKind, range: Fixed, attack_rate: Fixed) -> Self {
        Self {
            type_id: type_id.into(),
            kind,
            range,
            attack_rate,
            attack_effect_time: Fixed::ZERO,
            splash_radius: Fixed::ZERO,
            can_attack_ground: true,
            can_attack_air: false,
            cooldown: Fixed::ZERO,
            state: WeaponState::Idle,
            target: WeaponTarget::None,
            in_range: false,
            pending_strike: None,
            next_token: 1,
        }
    }

    /// Builder method to set the telegraph duration.
    #[must_use]
    pub fn with_attack_effect_time(mut self, seconds: Fixed) -> Self {
        self.attack_effect_time = seconds;
        self
    }

    /// Builder method to set splash radius.
    #[must_use]
    pub fn with_splash_radius(mut self, radius: Fixed) -> Self {
        self.splash_radius = radius;
        self
    }

    /// Builder method to set ground/air capability.
    #[must_use]
    pub const fn with_capability(mut self, ground: bool, air: bool) -> Self {
        self.can_attack_ground = ground;
        self.can_attack_air = air;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> WeaponState {
        self.state
    }

    /// Current target.
    #[must_use]
    pub const fn target(&self) -> WeaponTarget {
        self.target
    }

    /// Seconds until the next strike may start.
    #[must_use]
    pub const fn cooldown(&self) -> Fixed {
        self.cooldown
    }

    /// Whether the weapon is engaged.
    #[must_use]
    pub fn is_attacking(&self) -> bool {
        self.state != WeaponState::Idle
    }

    /// Whether a strike is waiting to land.
    #[must_use]
    pub const fn has_pending_strike(&self) -> bool {
        self.pending_strike.is_some()
    }

    /// Damage the next strike would deal.
    #[must_use]
    pub const fn current_damage(&self) -> u32 {
        match self.kind {
            WeaponKind::Targeted { damage } | WeaponKind::Location { damage } => damage,
            WeaponKind::Continuous(ramp) => ramp.current(),
        }
    }

    /// Add a flat damage bonus (equipment).
    pub fn add_damage_bonus(&mut self, bonus: u32) {
        match &mut self.kind {
            WeaponKind::Targeted { damage } | WeaponKind::Location { damage } => {
                *damage = damage.saturating_add(bonus);
            }
            WeaponKind::Continuous(ramp) => ramp.add_bonus(bonus),
        }
    }

    /// Whether the weapon is a location-targeted variant.
    #[must_use]
    pub const fn is_location_weapon(&self) -> bool {
        matches!(self.kind, WeaponKind::Location { .. })
    }

    /// Target is alive, on another team and matches air/ground capability.
    #[must_use]
    pub fn can_hit_target(&self, owner_team: TeamId, target: Option<&TargetInfo>) -> bool {
        let Some(target) = target else {
            return false;
        };
        target.alive && target.team != owner_team && self.can_hit_class(target.airborne)
    }

    /// Air/ground capability check alone.
    #[must_use]
    pub const fn can_hit_class(&self, airborne: bool) -> bool {
        if airborne {
            self.can_attack_air
        } else {
            self.can_attack_ground
        }
    }

    /// Engage an entity by command. Returns false if it cannot be hit.
    pub fn attack_entity(&mut self, owner_team: TeamId, target: &TargetInfo) -> bool {
        if self.is_location_weapon() || !self.can_hit_target(owner_team, Some(target)) {
            return false;
        }
        self.engage(WeaponState::AttackingCommand, WeaponTarget::Entity(target.id));
        true
    }

    /// Engage a ground point by command. Only location weapons accept.
    pub fn attack_location(&mut self, point: Vec2Fixed) -> bool {
        if !self.is_location_weapon() {
            return false;
        }
        self.engage(WeaponState::AttackingCommand, WeaponTarget::Location(point));
        true
    }

    /// Stop engaging. Returns true if the weapon was attacking.
    pub fn stop(&mut self) -> bool {
        let was_attacking = self.is_attacking();
        self.state = WeaponState::Idle;
        self.target = WeaponTarget::None;
        self.pending_strike = None;
        self.pause();
        was_attacking
    }

    fn engage(&mut self, state: WeaponState, target: WeaponTarget) {
        self.state = state;
        self.target = target;
        self.pending_strike = None;
        self.pause();
    }

    fn pause(&mut self) {
        self.in_range = false;
        if let WeaponKind::Continuous(ramp) = &mut self.kind {
            ramp.reset();
        }
    }

    fn lose_target(&mut self, actions: &mut Vec<WeaponAction>) {
        self.stop();
        actions.push(WeaponAction::LostTarget);
    }

    /// Advance one tick.
    pub fn tick(&mut self, dt: Fixed, owner: &OwnerView<'_>, targets: &TargetIndex) -> Vec<WeaponAction> {
        let mut actions = Vec::new();
        self.cooldown = (self.cooldown - dt).max(Fixed::ZERO);

        match (self.state, self.target) {
            (WeaponState::Idle, _) => {
                if let Some(id) = self.acquire(owner, targets) {
                    self.engage(WeaponState::AttackingAuto, WeaponTarget::Entity(id));
                    actions.push(WeaponAction::Acquired(id));
                }
            }
            (_, WeaponTarget::Entity(id)) => {
                let Some(target) = targets.get(id).copied() else {
                    self.lose_target(&mut actions);
                    return actions;
                };
                if owner.team_visible.binary_search(&id).is_err() {
                    self.lose_target(&mut actions);
                    return actions;
                }
                self.engage_point(dt, owner, target.position, &mut actions);
            }
            (_, WeaponTarget::Location(point)) => {
                self.engage_point(dt, owner, point, &mut actions);
            }
            (_, WeaponTarget::None) => {
                self.lose_target(&mut actions);
            }
        }

        actions
    }

    fn engage_point(
        &mut self,
        dt: Fixed,
        owner: &OwnerView<'_>,
        point: Vec2Fixed,
        actions: &mut Vec<WeaponAction>,
    ) {
        let in_range = owner.position.distance_squared(point) <= self.range * self.range;

        if !in_range {
            self.pause();
            if owner.can_chase {
                actions.push(WeaponAction::MoveIntoRange {
                    point,
                    stopping_distance: self.range * Fixed::from_num(9) / Fixed::from_num(10),
                });
            } else {
                self.lose_target(actions);
            }
            return;
        }

        if !self.in_range {
            self.in_range = true;
            actions.push(WeaponAction::InRange);
        }

        if let WeaponKind::Continuous(ramp) = &mut self.kind {
            ramp.advance(dt);
        }

        if self.cooldown <= Fixed::ZERO && self.pending_strike.is_none() {
            let token = self.next_token;
            self.next_token += 1;
            self.pending_strike = Some(token);
            actions.push(WeaponAction::Fire {
                token,
                delay: self.attack_effect_time,
            });
        }
    }

    /// Nearest eligible visible enemy in range.
    ///
    /// `owner.visible` is sorted by id and only a strictly closer
    /// candidate replaces the current best, so equal distances resolve to
    /// the lowest id.
    fn acquire(&self, owner: &OwnerView<'_>, targets: &TargetIndex) -> Option<EntityId> {
        if !owner.can_auto_attack || self.is_location_weapon() {
            return None;
        }
        let range_sq = self.range * self.range;
        let mut best: Option<(Fixed, EntityId)> = None;

        for &id in owner.visible {
            let Some(target) = targets.get(id) else {
                continue;
            };
            if !self.can_hit_target(owner.team, Some(target)) {
                continue;
            }
            let dist_sq = owner.position.distance_squared(target.position);
            if dist_sq > range_sq {
                continue;
            }
            if best.map_or(true, |(best_sq, _)| dist_sq < best_sq) {
                best = Some((dist_sq, id));
            }
        }

        best.map(|(_, id)| id)
    }

    /// Validate a scheduled strike when its delay elapses.
    ///
    /// Returns `None` if the weapon was stopped or re-targeted in the
    /// meantime. On success the cooldown restarts at
    /// `attack_rate - attack_effect_time`.
    pub fn resolve_strike(&mut self, token: u64) -> Option<StrikePlan> {
        if self.pending_strike != Some(token) || !self.is_attacking() {
            return None;
        }
        self.pending_strike = None;
        self.cooldown = (self.attack_rate - self.attack_effect_time).max(Fixed::ZERO);
        Some(StrikePlan {
            target: self.target,
            damage: self.current_damage(),
            splash_radius: self.splash_radius,
            can_attack_ground: self.can_attack_ground,
            can_attack_air: self.can_attack_air,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: EntityId, team: TeamId, x: i32, airborne: bool) -> TargetInfo {
        TargetInfo {
            id,
            team,
            position: Vec2Fixed::from_ints(x, 0),
            airborne,
            alive: true,
        }
    }

    fn rifle() -> Weapon {
        Weapon::new(
            "rifle",
            WeaponKind::Targeted { damage: 10 },
            Fixed::from_num(10),
            Fixed::ONE,
        )
    }

    fn view<'a>(visible: &'a [EntityId]) -> OwnerView<'a> {
        OwnerView {
            team: 1,
            position: Vec2Fixed::ZERO,
            visible,
            team_visible: visible,
            can_auto_attack: true,
            can_chase: true,
        }
    }

    #[test]
    fn test_attack_rejects_friendly_and_air() {
        let mut weapon = rifle();
        assert!(!weapon.attack_entity(1, &target(5, 1, 3, false)));
        assert!(!weapon.attack_entity(1, &target(5, 2, 3, true)));
        assert_eq!(weapon.state(), WeaponState::Idle);
        assert!(weapon.attack_entity(1, &target(5, 2, 3, false)));
        assert_eq!(weapon.state(), WeaponState::AttackingCommand);
    }

    #[test]
    fn test_acquires_nearest_with_id_tiebreak() {
        let mut weapon = rifle();
        let targets = TargetIndex::new([
            target(7, 2, 5, false),
            target(3, 2, 5, false),
            target(9, 2, 8, false),
        ]);
        let visible = [3, 7, 9];
        let actions = weapon.tick(Fixed::from_num(0.1), &view(&visible), &targets);
        assert_eq!(actions, vec![WeaponAction::Acquired(3)]);
        assert_eq!(weapon.state(), WeaponState::AttackingAuto);
    }

    #[test]
    fn test_no_acquire_out_of_range_or_when_not_allowed() {
        let mut weapon = rifle();
        let targets = TargetIndex::new([target(3, 2, 50, false)]);
        let visible = [3];
        assert!(weapon.tick(Fixed::ONE, &view(&visible), &targets).is_empty());

        let targets = TargetIndex::new([target(3, 2, 5, false)]);
        let mut owner = view(&visible);
        owner.can_auto_attack = false;
        assert!(weapon.tick(Fixed::ONE, &owner, &targets).is_empty());
    }

    #[test]
    fn test_in_range_then_fire_once_until_resolved() {
        let mut weapon = rifle().with_attack_effect_time(Fixed::from_num(0.25));
        let t = target(3, 2, 5, false);
        weapon.attack_entity(1, &t);
        let targets = TargetIndex::new([t]);
        let visible = [3];

        let actions = weapon.tick(Fixed::from_num(0.1), &view(&visible), &targets);
        assert_eq!(actions[0], WeaponAction::InRange);
        let WeaponAction::Fire { token, delay } = actions[1] else {
            panic!("expected fire, got {actions:?}");
        };
        assert_eq!(delay, Fixed::from_num(0.25));

        // Pending strike blocks another fire
        let actions = weapon.tick(Fixed::from_num(0.1), &view(&visible), &targets);
        assert!(actions.is_empty());

        let plan = weapon.resolve_strike(token).unwrap();
        assert_eq!(plan.damage, 10);
        assert_eq!(weapon.cooldown(), Fixed::from_num(0.75));
        assert!(weapon.resolve_strike(token).is_none());
    }

    #[test]
    fn test_stop_invalidates_pending_strike() {
        let mut weapon = rifle();
        let t = target(3, 2, 5, false);
        weapon.attack_entity(1, &t);
        let targets = TargetIndex::new([t]);
        let visible = [3];
        let actions = weapon.tick(Fixed::from_num(0.1), &view(&visible), &targets);
        let Some(WeaponAction::Fire { token, .. }) = actions.last().copied() else {
            panic!("expected fire");
        };
        assert!(weapon.stop());
        assert!(weapon.resolve_strike(token).is_none());
    }

    #[test]
    fn test_lost_target_when_dead_or_hidden() {
        let mut weapon = rifle();
        let t = target(3, 2, 5, false);
        weapon.attack_entity(1, &t);
        let dead = TargetIndex::new([TargetInfo { alive: false, ..t }]);
        let visible = [3];
        assert_eq!(
            weapon.tick(Fixed::ONE, &view(&visible), &dead),
            vec![WeaponAction::LostTarget]
        );

        weapon.attack_entity(1, &t);
        let targets = TargetIndex::new([t]);
        assert_eq!(
            weapon.tick(Fixed::ONE, &view(&[]), &targets),
            vec![WeaponAction::LostTarget]
        );
        assert_eq!(weapon.state(), WeaponState::Idle);
    }

    #[test]
    fn test_out_of_range_chases_or_gives_up() {
        let mut weapon = rifle();
        let t = target(3, 2, 40, false);
        weapon.attack_entity(1, &t);
        let targets = TargetIndex::new([t]);
        let visible = [3];

        let actions = weapon.tick(Fixed::ONE, &view(&visible), &targets);
        assert!(matches!(actions[0], WeaponAction::MoveIntoRange { .. }));

        let mut owner = view(&visible);
        owner.can_chase = false;
        let actions = weapon.tick(Fixed::ONE, &owner, &targets);
        assert_eq!(actions, vec![WeaponAction::LostTarget]);
    }

    #[test]
    fn test_location_weapon_only_takes_points() {
        let mut mortar = Weapon::new(
            "mortar",
            WeaponKind::Location { damage: 30 },
            Fixed::from_num(20),
            Fixed::from_num(3),
        );
        assert!(!mortar.attack_entity(1, &target(3, 2, 5, false)));
        assert!(mortar.attack_location(Vec2Fixed::from_ints(10, 0)));
        assert!(!rifle().attack_location(Vec2Fixed::from_ints(10, 0)));
    }

    #[test]
    fn test_ramp_climbs_and_resets() {
        let mut ramp = DamageRamp::new(2, 6, Fixed::from_num(2));
        assert_eq!(ramp.step_interval(), Some(Fixed::from_num(0.5)));
        ramp.advance(Fixed::from_num(1.2));
        assert_eq!(ramp.current(), 4);
        ramp.advance(Fixed::from_num(10));
        assert_eq!(ramp.current(), 6);
        ramp.reset();
        assert_eq!(ramp.current(), 2);
    }

    #[test]
    fn test_ramp_handles_extreme_spans() {
        let wide = DamageRamp::new(0, u32::MAX, Fixed::ONE);
        assert!(wide.step_interval().is_some_and(|i| i > Fixed::ZERO));

        let mut instant = DamageRamp::new(1, 5, Fixed::ZERO);
        assert_eq!(instant.step_interval(), Some(Fixed::ZERO));
        instant.advance(Fixed::from_num(0.05));
        assert_eq!(instant.current(), 5);
    }

    #[test]
    fn test_beam_resets_when_target_leaves_range() {
        let mut beam = Weapon::new(
            "beam",
            WeaponKind::Continuous(DamageRamp::new(1, 5, Fixed::from_num(4))),
            Fixed::from_num(10),
            Fixed::from_num(10),
        );
        let near = target(3, 2, 5, false);
        beam.attack_entity(1, &near);
        let visible = [3];
        beam.tick(Fixed::from_num(3), &view(&visible), &TargetIndex::new([near]));
        assert_eq!(beam.current_damage(), 4);

        let far = target(3, 2, 50, false);
        beam.tick(Fixed::ONE, &view(&visible), &TargetIndex::new([far]));
        assert_eq!(beam.current_damage(), 1);
    }
}
