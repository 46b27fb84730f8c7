//! Vision sensors, visibility aggregation and per-entity visibility gates.
//!
//! Three cadences are kept separate:
//!
//! - each [`VisionSensor`] recomputes its visible set every
//!   [`SENSOR_INTERVAL`] seconds;
//! - the [`VisibilityAggregator`] unions every sensor report it received
//!   and dispatches once per [`DISPATCH_DELAY`] window;
//! - a [`VisibilityGate`] only re-evaluates when dispatch has been
//!   delegated to it and it is configured to update.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, TeamId};
use crate::math::{cos_degrees, decimal_serde, fixed_serde, Fixed, Vec2Fixed};
use crate::spatial::{LayerMask, SpatialQuery};

/// Seconds between sensor recomputes.
pub const SENSOR_INTERVAL: f64 = 0.25;

/// Seconds between aggregated visibility dispatches.
pub const DISPATCH_DELAY: f64 = 0.5;

/// Sensor tuning from a unit template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionStats {
    /// Sight radius.
    #[serde(with = "decimal_serde")]
    pub view_radius: Fixed,
    /// Full cone angle in degrees; 360 or more sees all around.
    #[serde(with = "decimal_serde", default = "full_circle")]
    pub view_angle: Fixed,
}

fn full_circle() -> Fixed {
    Fixed::from_num(360)
}

/// Where a sensor is and which way it looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPose {
    /// Team the sensor belongs to.
    pub team: TeamId,
    /// Sensor origin.
    pub position: Vec2Fixed,
    /// Unit facing vector.
    pub facing: Vec2Fixed,
}

/// Per-entity sight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionSensor {
    /// Sight radius.
    #[serde(with = "fixed_serde")]
    pub view_radius: Fixed,
    /// Full cone angle in degrees.
    #[serde(with = "fixed_serde")]
    pub view_angle: Fixed,
    #[serde(with = "fixed_serde")]
    interval: Fixed,
    #[serde(with = "fixed_serde")]
    timer: Fixed,
    visible: Vec<EntityId>,
}

impl VisionSensor {
    /// Create a sensor whose first recompute is due immediately.
    #[must_use]
    pub fn new(stats: VisionStats) -> Self {
        Self {
            view_radius: stats.view_radius,
            view_angle: stats.view_angle,
            interval: Fixed::from_num(SENSOR_INTERVAL),
            timer: Fixed::ZERO,
            visible: Vec::new(),
        }
    }

    /// Enemies seen at the last recompute, sorted by id.
    #[must_use]
    pub fn visible(&self) -> &[EntityId] {
        &self.visible
    }

    /// Forget everything currently seen.
    pub fn clear(&mut self) {
        self.visible.clear();
    }

    /// Advance the recompute timer. Returns true when a recompute is due.
    pub fn tick(&mut self, dt: Fixed) -> bool {
        self.timer -= dt;
        if self.timer > Fixed::ZERO {
            return false;
        }
        self.timer += self.interval;
        if self.timer < Fixed::ZERO {
            self.timer = self.interval;
        }
        true
    }

    /// Recompute the visible set from the world.
    ///
    /// Candidates are enemy colliders within the radius, inside the cone
    /// around `pose.facing` and not hidden behind obstacle geometry.
    pub fn recompute(&mut self, pose: SensorPose, spatial: &dyn SpatialQuery) {
        let candidates =
            spatial.overlap_circle(pose.position, self.view_radius, LayerMask::enemies_of(pose.team));
        let full_circle = self.view_angle >= Fixed::from_num(360);
        let half_angle_cos = cos_degrees(self.view_angle / Fixed::from_num(2));
        let forward = pose.facing.normalize();

        self.visible.clear();
        for collider in candidates {
            let offset = collider.position - pose.position;
            if !full_circle && !offset.is_zero() {
                // Bearing within half the cone: dot(forward, d) >= |d| * cos(half)
                if forward.dot(offset) < offset.length() * half_angle_cos {
                    continue;
                }
            }
            if spatial.raycast_occluded(pose.position, collider.position, LayerMask::OBSTACLES) {
                continue;
            }
            self.visible.push(collider.entity);
        }
        self.visible.sort_unstable();
        self.visible.dedup();
    }
}

/// One aggregated dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityDispatch {
    /// These entities were seen by at least one sensor in the window.
    Visible(BTreeSet<EntityId>),
    /// Nobody reported any target in the window.
    NoneVisible,
}

impl VisibilityDispatch {
    /// Check if the dispatch marks `id` visible.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        match self {
            Self::Visible(set) => set.contains(&id),
            Self::NoneVisible => false,
        }
    }
}

/// Batches sensor reports and dispatches their union once per window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityAggregator {
    #[serde(with = "fixed_serde")]
    delay: Fixed,
    #[serde(with = "fixed_serde")]
    elapsed: Fixed,
    pending: BTreeSet<EntityId>,
}

impl Default for VisibilityAggregator {
    fn default() -> Self {
        Self::new(Fixed::from_num(DISPATCH_DELAY))
    }
}

impl VisibilityAggregator {
    /// Create an aggregator with the given window length.
    #[must_use]
    pub fn new(delay: Fixed) -> Self {
        Self {
            delay,
            elapsed: Fixed::ZERO,
            pending: BTreeSet::new(),
        }
    }

    /// Add a sensor's visible set to the current window.
    pub fn report(&mut self, visible: &[EntityId]) {
        self.pending.extend(visible.iter().copied());
    }

    /// Advance the window; returns the dispatch when it closes.
    pub fn tick(&mut self, dt: Fixed) -> Option<VisibilityDispatch> {
        self.elapsed += dt;
        if self.elapsed < self.delay {
            return None;
        }
        self.elapsed = Fixed::ZERO;
        let seen = std::mem::take(&mut self.pending);
        if seen.is_empty() {
            Some(VisibilityDispatch::NoneVisible)
        } else {
            Some(VisibilityDispatch::Visible(seen))
        }
    }
}

/// Turns aggregated dispatches into a visible/hidden flag for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityGate {
    update_visibility: bool,
    delegated: bool,
    visible: bool,
}

impl VisibilityGate {
    /// Create a gate.
    ///
    /// Gates that never update (an observer's own team) start and stay
    /// visible; updating gates start hidden until a dispatch says otherwise.
    #[must_use]
    pub const fn new(update_visibility: bool) -> Self {
        Self {
            update_visibility,
            delegated: false,
            visible: !update_visibility,
        }
    }

    /// Start accepting dispatches.
    pub fn delegate(&mut self) {
        self.delegated = true;
    }

    /// Stop accepting dispatches; the flag freezes at its current value.
    pub fn revoke(&mut self) {
        self.delegated = false;
    }

    /// Current flag.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether this gate re-evaluates on dispatch.
    #[must_use]
    pub const fn updates(&self) -> bool {
        self.update_visibility
    }

    /// Evaluate a dispatch; returns the new flag if it changed.
    pub fn apply(&mut self, id: EntityId, dispatch: &VisibilityDispatch) -> Option<bool> {
        if !self.delegated || !self.update_visibility {
            return None;
        }
        let now_visible = dispatch.contains(id);
        if now_visible == self.visible {
            return None;
        }
        self.visible = now_visible;
        Some(now_visible)
    }
}

/// Deliver one dispatch to every gate; returns `(id, visible)` for each
/// flag that changed, in iteration order.
pub fn dispatch_to_gates<'a>(
    gates: impl IntoIterator<Item = (EntityId, &'a mut VisibilityGate)>,
    dispatch: &VisibilityDispatch,
) -> Vec<(EntityId, bool)> {
    gates
        .into_iter()
        .filter_map(|(id, gate)| gate.apply(id, dispatch).map(|v| (id, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Collider, Obstacle, SpatialWorld};

    fn stats(radius: i32, angle: i32) -> VisionStats {
        VisionStats {
            view_radius: Fixed::from_num(radius),
            view_angle: Fixed::from_num(angle),
        }
    }

    fn body(entity: EntityId, team: TeamId, x: i32, y: i32) -> Collider {
        Collider {
            entity,
            team,
            position: Vec2Fixed::from_ints(x, y),
            radius: Fixed::from_num(0.5),
            airborne: false,
        }
    }

    fn pose() -> SensorPose {
        SensorPose {
            team: 1,
            position: Vec2Fixed::ZERO,
            facing: Vec2Fixed::UNIT_X,
        }
    }

    #[test]
    fn test_sensor_timer_cadence() {
        let mut sensor = VisionSensor::new(stats(10, 360));
        assert!(sensor.tick(Fixed::from_num(0.05)));
        assert!(!sensor.tick(Fixed::from_num(0.1)));
        assert!(!sensor.tick(Fixed::from_num(0.05)));
        assert!(sensor.tick(Fixed::from_num(0.1)));
    }

    #[test]
    fn test_recompute_filters_team_radius_and_cone() {
        let mut world = SpatialWorld::new();
        world.update_colliders(vec![
            body(2, 1, 3, 0),  // friendly
            body(3, 2, 5, 0),  // ahead
            body(4, 2, -5, 0), // behind
            body(5, 2, 30, 0), // too far
        ]);
        let mut sensor = VisionSensor::new(stats(10, 90));
        sensor.recompute(pose(), &world);
        assert_eq!(sensor.visible(), &[3]);

        let mut omni = VisionSensor::new(stats(10, 360));
        omni.recompute(pose(), &world);
        assert_eq!(omni.visible(), &[3, 4]);
    }

    #[test]
    fn test_recompute_respects_occlusion() {
        let mut world = SpatialWorld::with_obstacles(vec![Obstacle::Circle {
            center: Vec2Fixed::from_ints(3, 0),
            radius: Fixed::ONE,
        }]);
        world.update_colliders(vec![body(3, 2, 6, 0), body(4, 2, 0, 6)]);
        let mut sensor = VisionSensor::new(stats(10, 360));
        sensor.recompute(pose(), &world);
        assert_eq!(sensor.visible(), &[4]);
    }

    #[test]
    fn test_aggregator_unions_and_clears() {
        let mut agg = VisibilityAggregator::new(Fixed::ONE);
        agg.report(&[3, 5]);
        assert_eq!(agg.tick(Fixed::from_num(0.5)), None);
        agg.report(&[5, 7]);
        let dispatch = agg.tick(Fixed::from_num(0.5)).unwrap();
        assert_eq!(dispatch, VisibilityDispatch::Visible([3, 5, 7].into_iter().collect()));
        assert_eq!(agg.tick(Fixed::ONE), Some(VisibilityDispatch::NoneVisible));
    }

    #[test]
    fn test_gate_only_updates_when_delegated_and_enabled() {
        let dispatch = VisibilityDispatch::Visible([9].into_iter().collect());

        let mut gate = VisibilityGate::new(true);
        assert!(!gate.is_visible());
        assert_eq!(gate.apply(9, &dispatch), None);
        gate.delegate();
        assert_eq!(gate.apply(9, &dispatch), Some(true));
        assert_eq!(gate.apply(9, &dispatch), None);

        let mut teammate = VisibilityGate::new(false);
        teammate.delegate();
        assert!(teammate.is_visible());
        assert_eq!(teammate.apply(9, &VisibilityDispatch::NoneVisible), None);
        assert!(teammate.is_visible());
    }

    #[test]
    fn test_none_visible_hides_every_gate() {
        let mut a = VisibilityGate::new(true);
        let mut b = VisibilityGate::new(true);
        a.delegate();
        b.delegate();
        let shown = VisibilityDispatch::Visible([1, 2].into_iter().collect());
        dispatch_to_gates([(1, &mut a), (2, &mut b)], &shown);

        let changed = dispatch_to_gates([(1, &mut a), (2, &mut b)], &VisibilityDispatch::NoneVisible);
        assert_eq!(changed, vec![(1, false), (2, false)]);
        // Dispatching again is a no-op
        let changed = dispatch_to_gates([(1, &mut a), (2, &mut b)], &VisibilityDispatch::NoneVisible);
        assert!(changed.is_empty());
        assert!(!a.is_visible() && !b.is_visible());
    }
}
