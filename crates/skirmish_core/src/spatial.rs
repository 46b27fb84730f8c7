//! Spatial query collaborator.
//!
//! The simulation asks the world two questions: which colliders overlap a
//! circle, and whether a straight line between two points is blocked by
//! obstacle geometry. [`SpatialQuery`] is the seam; [`SpatialWorld`] is a
//! flat-list implementation suitable for tests and small maps.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, TeamId};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Number of team layers; team ids must stay below this.
pub const MAX_TEAMS: TeamId = 32;

/// Bit mask selecting collision layers.
///
/// The low [`MAX_TEAMS`] bits are team layers; bit 63 is static obstacle
/// geometry. Team ids outside that range have no layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LayerMask(pub u64);

impl LayerMask {
    /// Matches nothing.
    pub const NONE: Self = Self(0);
    /// Every team layer.
    pub const ALL_TEAMS: Self = Self(0xFFFF_FFFF);
    /// Static obstacle geometry.
    pub const OBSTACLES: Self = Self(1 << 63);

    /// Layer of a single team.
    #[must_use]
    pub const fn team(team: TeamId) -> Self {
        if team < MAX_TEAMS {
            Self(1 << team)
        } else {
            Self::NONE
        }
    }

    /// Every team layer except `team`.
    #[must_use]
    pub const fn enemies_of(team: TeamId) -> Self {
        Self(Self::ALL_TEAMS.0 & !Self::team(team).0)
    }

    /// Check if any layer of `other` is selected.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// A dynamic body that follows a live entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collider {
    /// Entity this collider belongs to.
    pub entity: EntityId,
    /// Owning team (selects the layer).
    pub team: TeamId,
    /// Center on the ground plane.
    pub position: Vec2Fixed,
    /// Collision radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Whether the body is airborne.
    pub airborne: bool,
}

impl Collider {
    /// Layer this collider lives on.
    #[must_use]
    pub const fn layer(&self) -> LayerMask {
        LayerMask::team(self.team)
    }
}

/// Static geometry that blocks line of sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Obstacle {
    /// A round obstacle.
    Circle {
        /// Center point.
        center: Vec2Fixed,
        /// Radius.
        #[serde(with = "fixed_serde")]
        radius: Fixed,
    },
    /// An axis-aligned box.
    Rect {
        /// Minimum corner.
        min: Vec2Fixed,
        /// Maximum corner.
        max: Vec2Fixed,
    },
}

impl Obstacle {
    /// Check if the segment `from -> to` touches this obstacle.
    #[must_use]
    pub fn blocks(&self, from: Vec2Fixed, to: Vec2Fixed) -> bool {
        match *self {
            Self::Circle { center, radius } => segment_hits_circle(from, to, center, radius),
            Self::Rect { min, max } => segment_hits_rect(from, to, min, max),
        }
    }
}

/// World queries the simulation depends on.
///
/// Implementations hold no simulation state of their own; dynamic
/// colliders are re-synchronised from entity transforms once per tick.
pub trait SpatialQuery {
    /// Replace the dynamic colliders with the current entity bodies.
    fn update_colliders(&mut self, colliders: Vec<Collider>);

    /// Colliders on `mask` layers whose body overlaps the circle, ordered
    /// by entity id.
    fn overlap_circle(&self, center: Vec2Fixed, radius: Fixed, mask: LayerMask) -> Vec<Collider>;

    /// Whether geometry on `mask` layers blocks the straight line between
    /// two points.
    fn raycast_occluded(&self, from: Vec2Fixed, to: Vec2Fixed, mask: LayerMask) -> bool;
}

/// Flat-list spatial world.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialWorld {
    colliders: Vec<Collider>,
    obstacles: Vec<Obstacle>,
}

impl SpatialWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a world with static obstacles.
    #[must_use]
    pub fn with_obstacles(obstacles: Vec<Obstacle>) -> Self {
        Self {
            colliders: Vec::new(),
            obstacles,
        }
    }

    /// Add a static obstacle.
    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }

    /// Remove every static obstacle.
    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
    }

    /// Static obstacles.
    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }
}

impl SpatialQuery for SpatialWorld {
    fn update_colliders(&mut self, mut colliders: Vec<Collider>) {
        colliders.sort_unstable_by_key(|c| c.entity);
        self.colliders = colliders;
    }

    fn overlap_circle(&self, center: Vec2Fixed, radius: Fixed, mask: LayerMask) -> Vec<Collider> {
        self.colliders
            .iter()
            .filter(|c| mask.intersects(c.layer()))
            .filter(|c| {
                let reach = radius + c.radius;
                c.position.distance_squared(center) <= reach * reach
            })
            .copied()
            .collect()
    }

    fn raycast_occluded(&self, from: Vec2Fixed, to: Vec2Fixed, mask: LayerMask) -> bool {
        mask.intersects(LayerMask::OBSTACLES) && self.obstacles.iter().any(|o| o.blocks(from, to))
    }
}

fn segment_hits_circle(from: Vec2Fixed, to: Vec2Fixed, center: Vec2Fixed, radius: Fixed) -> bool {
    let d = to - from;
    let len_sq = d.dot(d);
    let t = if len_sq == Fixed::ZERO {
        Fixed::ZERO
    } else {
        (center - from)
            .dot(d)
            .saturating_div(len_sq)
            .clamp(Fixed::ZERO, Fixed::ONE)
    };
    let closest = from + d.scale(t);
    closest.distance_squared(center) <= radius * radius
}

// Liang-Barsky clip of the segment against the box.
fn segment_hits_rect(from: Vec2Fixed, to: Vec2Fixed, min: Vec2Fixed, max: Vec2Fixed) -> bool {
    let d = to - from;
    let mut t0 = Fixed::ZERO;
    let mut t1 = Fixed::ONE;

    let edges = [
        (-d.x, from.x - min.x),
        (d.x, max.x - from.x),
        (-d.y, from.y - min.y),
        (d.y, max.y - from.y),
    ];

    for (p, q) in edges {
        if p == Fixed::ZERO {
            if q < Fixed::ZERO {
                return false;
            }
            continue;
        }
        let r = q.saturating_div(p);
        if p < Fixed::ZERO {
            if r > t1 {
                return false;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return false;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collider(entity: EntityId, team: TeamId, x: i32, y: i32) -> Collider {
        Collider {
            entity,
            team,
            position: Vec2Fixed::from_ints(x, y),
            radius: Fixed::from_num(0.5),
            airborne: false,
        }
    }

    #[test]
    fn test_layer_masks() {
        assert!(LayerMask::enemies_of(1).intersects(LayerMask::team(2)));
        assert!(!LayerMask::enemies_of(1).intersects(LayerMask::team(1)));
        assert!(!LayerMask::ALL_TEAMS.intersects(LayerMask::OBSTACLES));
    }

    #[test]
    fn test_out_of_range_team_has_no_layer() {
        assert_eq!(LayerMask::team(MAX_TEAMS), LayerMask::NONE);
        assert!(!LayerMask::enemies_of(0).intersects(LayerMask::team(MAX_TEAMS)));
        assert!(LayerMask::enemies_of(MAX_TEAMS).intersects(LayerMask::team(0)));
        assert!(LayerMask::ALL_TEAMS.intersects(LayerMask::team(MAX_TEAMS - 1)));
    }

    #[test]
    fn test_overlap_filters_by_mask_and_distance() {
        let mut world = SpatialWorld::new();
        world.update_colliders(vec![
            collider(3, 2, 5, 0),
            collider(1, 1, 1, 0),
            collider(2, 2, 20, 0),
        ]);

        let hits = world.overlap_circle(Vec2Fixed::ZERO, Fixed::from_num(10), LayerMask::enemies_of(1));
        assert_eq!(hits.iter().map(|c| c.entity).collect::<Vec<_>>(), vec![3]);

        let all = world.overlap_circle(Vec2Fixed::ZERO, Fixed::from_num(10), LayerMask::ALL_TEAMS);
        assert_eq!(all.iter().map(|c| c.entity).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_overlap_counts_body_radius() {
        let mut world = SpatialWorld::new();
        world.update_colliders(vec![collider(1, 1, 10, 0)]);
        // Circle reaches 9.6, body starts at 9.5
        let hits = world.overlap_circle(Vec2Fixed::ZERO, Fixed::from_num(9.6), LayerMask::ALL_TEAMS);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_circle_occlusion() {
        let world = SpatialWorld::with_obstacles(vec![Obstacle::Circle {
            center: Vec2Fixed::from_ints(5, 0),
            radius: Fixed::ONE,
        }]);
        let from = Vec2Fixed::ZERO;
        assert!(world.raycast_occluded(from, Vec2Fixed::from_ints(10, 0), LayerMask::OBSTACLES));
        assert!(!world.raycast_occluded(from, Vec2Fixed::from_ints(0, 10), LayerMask::OBSTACLES));
        // Mask without obstacles ignores geometry
        assert!(!world.raycast_occluded(from, Vec2Fixed::from_ints(10, 0), LayerMask::ALL_TEAMS));
    }

    #[test]
    fn test_rect_occlusion() {
        let world = SpatialWorld::with_obstacles(vec![Obstacle::Rect {
            min: Vec2Fixed::from_ints(4, -1),
            max: Vec2Fixed::from_ints(6, 1),
        }]);
        let from = Vec2Fixed::ZERO;
        assert!(world.raycast_occluded(from, Vec2Fixed::from_ints(10, 0), LayerMask::OBSTACLES));
        assert!(!world.raycast_occluded(from, Vec2Fixed::from_ints(10, 5), LayerMask::OBSTACLES));
        assert!(!world.raycast_occluded(from, Vec2Fixed::from_ints(3, 0), LayerMask::OBSTACLES));
        // Vertical segment through the box
        assert!(world.raycast_occluded(
            Vec2Fixed::from_ints(5, -5),
            Vec2Fixed::from_ints(5, 5),
            LayerMask::OBSTACLES
        ));
    }
}
