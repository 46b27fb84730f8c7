//! Client-side mirror of the replicated world.
//!
//! A [`ClientWorld`] only ever applies what the server sends. Its one piece
//! of local computation is the vision pass that drives the visibility
//! gates of enemy mirrors.

use std::collections::BTreeMap;

use tracing::debug;

use crate::capture::CaptureState;
use crate::components::{CapturePointId, EntityId, TeamId};
use crate::game_state::GameState;
use crate::math::Fixed;
use crate::protocol::{CapturePointSnapshot, EntitySnapshot, MatchEvent, WorldSnapshot};
use crate::spatial::{Collider, SpatialQuery};
use crate::vision::{
    dispatch_to_gates, SensorPose, VisibilityAggregator, VisibilityGate, VisionSensor, VisionStats,
};

/// Local copy of one replicated entity.
#[derive(Debug, Clone)]
pub struct Mirror {
    /// Last received state.
    pub snapshot: EntitySnapshot,
    /// Render visibility.
    pub gate: VisibilityGate,
    sensor: Option<VisionSensor>,
}

impl Mirror {
    fn new(snapshot: EntitySnapshot, observer_team: TeamId) -> Self {
        let friendly = snapshot.team_id == observer_team;
        let mut gate = VisibilityGate::new(!friendly);
        let sensor = if friendly {
            Some(VisionSensor::new(VisionStats {
                view_radius: snapshot.vision_range,
                view_angle: snapshot.view_angle,
            }))
        } else {
            gate.delegate();
            None
        };
        Self {
            snapshot,
            gate,
            sensor,
        }
    }

    fn refresh(&mut self, snapshot: EntitySnapshot) {
        if let Some(sensor) = &mut self.sensor {
            sensor.view_radius = snapshot.vision_range;
            sensor.view_angle = snapshot.view_angle;
        }
        self.snapshot = snapshot;
    }

    /// Whether the entity should be drawn.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.gate.is_visible()
    }
}

/// The world as one observer sees it.
#[derive(Debug, Clone)]
pub struct ClientWorld {
    observer_team: TeamId,
    mirrors: BTreeMap<EntityId, Mirror>,
    capture_points: BTreeMap<CapturePointId, CapturePointSnapshot>,
    game: GameState,
    last_tick: Option<u64>,
    aggregator: VisibilityAggregator,
}

impl ClientWorld {
    /// Create an empty world for an observer on `observer_team`.
    #[must_use]
    pub fn new(observer_team: TeamId) -> Self {
        Self {
            observer_team,
            mirrors: BTreeMap::new(),
            capture_points: BTreeMap::new(),
            game: GameState::default(),
            last_tick: None,
            aggregator: VisibilityAggregator::default(),
        }
    }

    /// Observer's team.
    #[must_use]
    pub const fn observer_team(&self) -> TeamId {
        self.observer_team
    }

    /// Newest applied snapshot tick.
    #[must_use]
    pub const fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Look up a mirror.
    #[must_use]
    pub fn mirror(&self, id: EntityId) -> Option<&Mirror> {
        self.mirrors.get(&id)
    }

    /// All mirrors in id order.
    pub fn mirrors(&self) -> impl Iterator<Item = (&EntityId, &Mirror)> {
        self.mirrors.iter()
    }

    /// Mirrored capture point.
    #[must_use]
    pub fn capture_point(&self, id: CapturePointId) -> Option<&CapturePointSnapshot> {
        self.capture_points.get(&id)
    }

    /// Capture points currently held by `team`.
    #[must_use]
    pub fn points_held_by(&self, team: TeamId) -> usize {
        self.capture_points
            .values()
            .filter(|p| p.state == CaptureState::Captured && p.owning_team == Some(team))
            .count()
    }

    /// Mirrored match state.
    #[must_use]
    pub const fn game(&self) -> &GameState {
        &self.game
    }

    /// Apply a full snapshot. Returns false if it was stale and ignored.
    pub fn apply_snapshot(&mut self, snapshot: WorldSnapshot) -> bool {
        if self.last_tick.is_some_and(|last| snapshot.tick <= last) {
            debug!(
                "Dropping stale snapshot {} (have {:?})",
                snapshot.tick, self.last_tick
            );
            return false;
        }
        self.last_tick = Some(snapshot.tick);

        let mut incoming: BTreeMap<EntityId, EntitySnapshot> = snapshot
            .entities
            .into_iter()
            .map(|e| (e.id, e))
            .collect();
        self.mirrors.retain(|id, _| incoming.contains_key(id));
        for (id, mirror) in &mut self.mirrors {
            if let Some(state) = incoming.remove(id) {
                mirror.refresh(state);
            }
        }
        for (id, state) in incoming {
            self.mirrors.insert(id, Mirror::new(state, self.observer_team));
        }

        self.capture_points = snapshot
            .capture_points
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        self.game = snapshot.game.to_state();
        true
    }

    /// Apply a reliable event.
    pub fn apply_event(&mut self, event: &MatchEvent) {
        match *event {
            MatchEvent::EntityDeath { entity } | MatchEvent::EntityDespawn { entity } => {
                self.mirrors.remove(&entity);
            }
            MatchEvent::CapturePointOwnerChanged { point, owner, .. } => {
                if let Some(p) = self.capture_points.get_mut(&point) {
                    p.owning_team = Some(owner);
                    p.state = CaptureState::Captured;
                }
            }
            MatchEvent::GameStateTransition { to, winner, .. } => {
                let teams = self.game.teams().cloned().collect();
                self.game = GameState::from_parts(to, teams, winner);
            }
        }
    }

    /// Run the local vision pass.
    ///
    /// Recomputes due friendly sensors against `spatial`, feeds their
    /// visible sets to the aggregator, and when its window closes dispatches
    /// to every gate. Returns `(id, visible)` for each flag that changed.
    pub fn update(&mut self, dt: Fixed, spatial: &mut dyn SpatialQuery) -> Vec<(EntityId, bool)> {
        spatial.update_colliders(
            self.mirrors
                .values()
                .map(|m| Collider {
                    entity: m.snapshot.id,
                    team: m.snapshot.team_id,
                    position: m.snapshot.position,
                    radius: m.snapshot.radius,
                    airborne: m.snapshot.airborne,
                })
                .collect(),
        );

        for mirror in self.mirrors.values_mut() {
            let Some(sensor) = &mut mirror.sensor else {
                continue;
            };
            if sensor.tick(dt) {
                let pose = SensorPose {
                    team: mirror.snapshot.team_id,
                    position: mirror.snapshot.position,
                    facing: mirror.snapshot.rotation.facing(),
                };
                sensor.recompute(pose, spatial);
            }
            self.aggregator.report(sensor.visible());
        }

        let Some(dispatch) = self.aggregator.tick(dt) else {
            return Vec::new();
        };
        dispatch_to_gates(
            self.mirrors.iter_mut().map(|(id, m)| (*id, &mut m.gate)),
            &dispatch,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{EffectFlags, Pool};
    use crate::entity::AiState;
    use crate::game_state::MatchPhase;
    use crate::math::{QuatFixed, Vec2Fixed};
    use crate::protocol::GameStateSnapshot;
    use crate::spatial::{Obstacle, SpatialWorld};

    fn snap(id: EntityId, team: TeamId, x: i32) -> EntitySnapshot {
        EntitySnapshot {
            id,
            type_id: "trooper".into(),
            position: Vec2Fixed::from_ints(x, 0),
            rotation: QuatFixed::IDENTITY,
            airborne: false,
            radius: Fixed::from_num(0.5),
            player_id: team,
            team_id: team,
            health: Pool::new(100),
            shield: Pool::new(0),
            shield_recharge_rate: Fixed::ZERO,
            move_speed: Fixed::from_num(4),
            vision_range: Fixed::from_num(10),
            view_angle: Fixed::from_num(360),
            weapon: None,
            equipment: Vec::new(),
            ai_state: AiState::Idle,
            stance: None,
            toggling: false,
            effects: EffectFlags::default(),
        }
    }

    fn world(tick: u64, entities: Vec<EntitySnapshot>) -> WorldSnapshot {
        WorldSnapshot {
            tick,
            entities,
            capture_points: Vec::new(),
            game: GameStateSnapshot {
                phase: MatchPhase::GameInProgress,
                teams: Vec::new(),
                winner: None,
            },
        }
    }

    fn run(client: &mut ClientWorld, spatial: &mut SpatialWorld, seconds: i32) -> Vec<(EntityId, bool)> {
        let dt = Fixed::from_num(0.05);
        let mut changes = Vec::new();
        for _ in 0..seconds * 20 {
            changes.extend(client.update(dt, spatial));
        }
        changes
    }

    #[test]
    fn test_stale_snapshot_dropped() {
        let mut client = ClientWorld::new(1);
        assert!(client.apply_snapshot(world(5, vec![snap(1, 1, 0)])));
        assert!(!client.apply_snapshot(world(4, vec![])));
        assert!(client.mirror(1).is_some());
        assert_eq!(client.last_tick(), Some(5));
    }

    #[test]
    fn test_absent_mirrors_pruned() {
        let mut client = ClientWorld::new(1);
        client.apply_snapshot(world(1, vec![snap(1, 1, 0), snap(2, 2, 5)]));
        client.apply_snapshot(world(2, vec![snap(1, 1, 0)]));
        assert!(client.mirror(2).is_none());
    }

    #[test]
    fn test_death_event_removes_mirror() {
        let mut client = ClientWorld::new(1);
        client.apply_snapshot(world(1, vec![snap(1, 1, 0), snap(2, 2, 5)]));
        client.apply_event(&MatchEvent::EntityDeath { entity: 2 });
        assert!(client.mirror(2).is_none());
    }

    #[test]
    fn test_teammates_always_visible_enemies_gated() {
        let mut client = ClientWorld::new(1);
        let mut spatial = SpatialWorld::new();
        client.apply_snapshot(world(1, vec![snap(1, 1, 0), snap(2, 2, 5), snap(3, 2, 50)]));
        assert!(client.mirror(1).unwrap().is_visible());
        assert!(!client.mirror(2).unwrap().is_visible());

        let changes = run(&mut client, &mut spatial, 1);
        assert_eq!(changes, vec![(2, true)]);
        assert!(client.mirror(1).unwrap().is_visible());
        assert!(!client.mirror(3).unwrap().is_visible());
    }

    #[test]
    fn test_occluded_enemy_hidden_after_window() {
        let mut client = ClientWorld::new(1);
        let mut spatial = SpatialWorld::new();
        client.apply_snapshot(world(1, vec![snap(1, 1, 0), snap(2, 2, 5)]));
        run(&mut client, &mut spatial, 1);
        assert!(client.mirror(2).unwrap().is_visible());

        spatial.add_obstacle(Obstacle::Rect {
            min: Vec2Fixed::from_ints(2, -2),
            max: Vec2Fixed::from_ints(3, 2),
        });
        let changes = run(&mut client, &mut spatial, 2);
        assert_eq!(changes, vec![(2, false)]);
    }

    #[test]
    fn test_transition_event_updates_phase() {
        let mut client = ClientWorld::new(1);
        client.apply_snapshot(world(1, vec![]));
        client.apply_event(&MatchEvent::GameStateTransition {
            from: MatchPhase::GameInProgress,
            to: MatchPhase::GameCompleted,
            winner: Some(1),
        });
        assert_eq!(client.game().phase(), MatchPhase::GameCompleted);
        assert_eq!(client.game().winner(), Some(1));
    }
}
