//! Line-of-sight scenarios: occlusion drives acquisition and target loss.

use skirmish_core::entity::AiState;
use skirmish_core::spatial::Obstacle;
use skirmish_test_utils::fixtures::{duel, point, tick_dt};

fn wall() -> Obstacle {
    Obstacle::Rect {
        min: point(2, -3),
        max: point(3, 3),
    }
}

#[test]
fn test_wall_blocks_engagement_until_removed() {
    let mut sim = duel(6);
    sim.spatial_mut().add_obstacle(wall());

    for _ in 0..60 {
        let events = sim.tick(tick_dt());
        assert!(events.damage_events.is_empty());
    }
    assert!(sim.team_visible(1).is_empty());
    assert!(sim.team_visible(2).is_empty());

    sim.spatial_mut().clear_obstacles();
    let mut damaged = false;
    for _ in 0..20 {
        damaged |= !sim.tick(tick_dt()).damage_events.is_empty();
    }
    assert!(damaged);
    assert_eq!(sim.team_visible(1), &[2]);
}

#[test]
fn test_target_hidden_mid_fight_returns_to_idle() {
    let mut sim = duel(6);
    for _ in 0..25 {
        sim.tick(tick_dt());
    }
    assert_eq!(sim.entity(1).unwrap().ai_state(), AiState::Attacking);

    sim.spatial_mut().add_obstacle(wall());
    for _ in 0..10 {
        sim.tick(tick_dt());
    }
    assert_eq!(sim.entity(1).unwrap().ai_state(), AiState::Idle);
    assert_eq!(sim.entity(2).unwrap().ai_state(), AiState::Idle);

    for _ in 0..60 {
        assert!(sim.tick(tick_dt()).damage_events.is_empty());
    }
}

#[test]
fn test_team_sight_is_shared() {
    use skirmish_test_utils::fixtures::test_catalog;

    let catalog = test_catalog();
    let mut sim = skirmish_test_utils::fixtures::empty_match();
    let spotter = sim.spawn_entity(&catalog, "trooper", 1, point(0, 0)).unwrap();
    let blind = sim.spawn_entity(&catalog, "trooper", 1, point(0, -40)).unwrap();
    let enemy = sim.spawn_entity(&catalog, "trooper", 2, point(10, 0)).unwrap();

    sim.tick(tick_dt());
    assert_eq!(sim.team_visible(1), &[enemy]);
    assert!(sim.entity(spotter).unwrap().sensor.visible().contains(&enemy));
    assert!(sim.entity(blind).unwrap().sensor.visible().is_empty());
}
