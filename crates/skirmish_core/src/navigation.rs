//! Navigation collaborator and per-entity steering agent.
//!
//! Path planning is external: the simulation only needs the nearest
//! walkable point to a requested destination and the next position along
//! a path. [`NavAgent`] holds the per-entity intent (destination, pending
//! flag, residual velocity) and reports arrival.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Default distance at which a move order counts as arrived.
pub const DEFAULT_STOPPING_DISTANCE: f64 = 0.25;

/// Chase destinations closer than this to the current one are not
/// re-planned.
pub const REPATH_THRESHOLD: i32 = 1;

/// Navigation surface queries.
pub trait NavigationService {
    /// Closest traversable point to `point`.
    fn nearest_valid_point(&self, point: Vec2Fixed) -> Vec2Fixed;

    /// Position reached after travelling at most `max_step` from `from`
    /// toward `to` along the surface.
    fn advance(&self, from: Vec2Fixed, to: Vec2Fixed, max_step: Fixed) -> Vec2Fixed;
}

/// Rectangular, obstacle-free navigation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenGround {
    /// Minimum corner of the walkable area.
    pub min: Vec2Fixed,
    /// Maximum corner of the walkable area.
    pub max: Vec2Fixed,
}

impl OpenGround {
    /// Create a surface covering the given rectangle.
    #[must_use]
    pub const fn new(min: Vec2Fixed, max: Vec2Fixed) -> Self {
        Self { min, max }
    }
}

impl Default for OpenGround {
    fn default() -> Self {
        Self::new(Vec2Fixed::from_ints(-1000, -1000), Vec2Fixed::from_ints(1000, 1000))
    }
}

impl NavigationService for OpenGround {
    fn nearest_valid_point(&self, point: Vec2Fixed) -> Vec2Fixed {
        Vec2Fixed::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
        )
    }

    fn advance(&self, from: Vec2Fixed, to: Vec2Fixed, max_step: Fixed) -> Vec2Fixed {
        let to = self.nearest_valid_point(to);
        let delta = to - from;
        let dist_sq = delta.dot(delta);
        if dist_sq <= max_step * max_step {
            to
        } else {
            from + delta.normalize().scale(max_step)
        }
    }
}

/// Steering state for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavAgent {
    destination: Option<Vec2Fixed>,
    path_pending: bool,
    velocity: Vec2Fixed,
    #[serde(with = "fixed_serde")]
    stopping_distance: Fixed,
}

impl Default for NavAgent {
    fn default() -> Self {
        Self {
            destination: None,
            path_pending: false,
            velocity: Vec2Fixed::ZERO,
            stopping_distance: Fixed::from_num(DEFAULT_STOPPING_DISTANCE),
        }
    }
}

impl NavAgent {
    /// Start travelling to `destination`; the path resolves next step.
    pub fn set_destination(&mut self, destination: Vec2Fixed, stopping_distance: Fixed) {
        self.destination = Some(destination);
        self.stopping_distance = stopping_distance;
        self.path_pending = true;
    }

    /// Head toward a moving point, re-planning only when it drifted.
    pub fn chase(&mut self, point: Vec2Fixed, stopping_distance: Fixed) {
        let threshold = Fixed::from_num(REPATH_THRESHOLD);
        let drifted = self
            .destination
            .map_or(true, |d| d.distance_squared(point) > threshold * threshold);
        if drifted {
            self.set_destination(point, stopping_distance);
        }
    }

    /// Cancel movement.
    pub fn halt(&mut self) {
        self.destination = None;
        self.path_pending = false;
        self.velocity = Vec2Fixed::ZERO;
    }

    /// Current destination, if travelling.
    #[must_use]
    pub const fn destination(&self) -> Option<Vec2Fixed> {
        self.destination
    }

    /// Displacement applied during the last step.
    #[must_use]
    pub const fn velocity(&self) -> Vec2Fixed {
        self.velocity
    }

    /// Whether a path request is still outstanding.
    #[must_use]
    pub const fn is_path_pending(&self) -> bool {
        self.path_pending
    }

    /// Distance left to the destination (zero when idle).
    #[must_use]
    pub fn remaining_distance(&self, position: Vec2Fixed) -> Fixed {
        self.destination
            .map_or(Fixed::ZERO, |d| position.distance(d))
    }

    /// Path resolved, within stopping distance and no residual velocity.
    #[must_use]
    pub fn has_arrived(&self, position: Vec2Fixed) -> bool {
        self.destination.is_some()
            && !self.path_pending
            && self.remaining_distance(position) <= self.stopping_distance
            && self.velocity.is_zero()
    }

    /// Advance one step, moving `position` at most `speed * dt`.
    pub fn step(
        &mut self,
        position: &mut Vec2Fixed,
        speed: Fixed,
        dt: Fixed,
        nav: &dyn NavigationService,
    ) {
        let Some(destination) = self.destination else {
            self.velocity = Vec2Fixed::ZERO;
            return;
        };

        if self.path_pending {
            self.path_pending = false;
            self.velocity = Vec2Fixed::ZERO;
            return;
        }

        if self.remaining_distance(*position) <= self.stopping_distance {
            self.velocity = Vec2Fixed::ZERO;
            return;
        }

        let next = nav.advance(*position, destination, speed * dt);
        self.velocity = next - *position;
        *position = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_valid_point_clamps() {
        let ground = OpenGround::new(Vec2Fixed::ZERO, Vec2Fixed::from_ints(10, 10));
        assert_eq!(
            ground.nearest_valid_point(Vec2Fixed::from_ints(15, -3)),
            Vec2Fixed::from_ints(10, 0)
        );
    }

    #[test]
    fn test_agent_arrives_after_pending_and_settle() {
        let ground = OpenGround::default();
        let mut agent = NavAgent::default();
        let mut pos = Vec2Fixed::ZERO;
        agent.set_destination(Vec2Fixed::from_ints(2, 0), Fixed::from_num(0.25));

        // First step resolves the path without moving
        agent.step(&mut pos, Fixed::from_num(10), Fixed::from_num(0.1), &ground);
        assert_eq!(pos, Vec2Fixed::ZERO);
        assert!(!agent.has_arrived(pos));

        // Second step covers the distance; velocity still non-zero
        agent.step(&mut pos, Fixed::from_num(10), Fixed::from_num(0.5), &ground);
        assert_eq!(pos, Vec2Fixed::from_ints(2, 0));
        assert!(!agent.has_arrived(pos));

        // Third step settles
        agent.step(&mut pos, Fixed::from_num(10), Fixed::from_num(0.5), &ground);
        assert!(agent.has_arrived(pos));
    }

    #[test]
    fn test_chase_does_not_repath_for_small_drift() {
        let mut agent = NavAgent::default();
        agent.chase(Vec2Fixed::from_ints(10, 0), Fixed::ONE);
        let ground = OpenGround::default();
        let mut pos = Vec2Fixed::ZERO;
        agent.step(&mut pos, Fixed::ONE, Fixed::ONE, &ground);
        assert!(!agent.is_path_pending());

        agent.chase(Vec2Fixed::new(Fixed::from_num(10.5), Fixed::ZERO), Fixed::ONE);
        assert!(!agent.is_path_pending());

        agent.chase(Vec2Fixed::from_ints(20, 0), Fixed::ONE);
        assert!(agent.is_path_pending());
    }
}
