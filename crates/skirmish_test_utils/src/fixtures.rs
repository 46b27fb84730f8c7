//! Test fixtures and helpers.
//!
//! Pre-built catalogs, game states and simulations
//! for consistent testing.

use fixed::types::I32F32;
use skirmish_core::capture::{CapturePoint, GainKind};
use skirmish_core::data::UnitCatalog;
use skirmish_core::game_state::{GameState, Player, Team};
use skirmish_core::math::Vec2Fixed;
use skirmish_core::simulation::{Simulation, TICK_RATE};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a point from integer coordinates.
#[must_use]
pub fn point(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// One server tick.
#[must_use]
pub fn tick_dt() -> I32F32 {
    I32F32::ONE / I32F32::from_num(TICK_RATE)
}

/// Small catalog covering every template feature.
pub const TEST_CATALOG: &str = r#"UnitCatalog(
    weapons: [
        WeaponData(id: "rifle", kind: Targeted(damage: 10), range: 8.0, attack_rate: 1.0),
        WeaponData(id: "mortar", kind: Location(damage: 25), range: 14.0, attack_rate: 3.0,
            attack_effect_time: 1.0, splash_radius: 3.0),
        WeaponData(id: "beam", kind: Continuous(damage: 2, max_damage: 8, damage_increase_time: 2.0),
            range: 6.0, attack_rate: 0.25),
    ],
    equipment: [
        EquipmentData(id: "plating", max_health: 20),
    ],
    abilities: [
        AbilityData(id: "barrier", kind: Barrier(duration: 2.0), cooldown: 10.0),
    ],
    units: [
        UnitData(
            id: "trooper",
            name: "Trooper",
            health: 60,
            shield: 20,
            shield_recharge_rate: 5.0,
            speed: 4.0,
            vision: VisionStats(view_radius: 12.0),
            weapons: ["rifle"],
            abilities: ["barrier"],
        ),
        UnitData(
            id: "heavy",
            name: "Heavy",
            health: 120,
            speed: 2.5,
            vision: VisionStats(view_radius: 10.0),
            weapons: ["beam"],
            equipment: ["plating"],
        ),
        UnitData(
            id: "artillery",
            name: "Artillery",
            health: 80,
            speed: 2.0,
            vision: VisionStats(view_radius: 16.0),
            weapons: ["mortar"],
            stance: Some(StanceData(toggle_duration: 1.0)),
        ),
        UnitData(
            id: "turret",
            name: "Turret",
            kind: Structure,
            health: 200,
            vision: VisionStats(view_radius: 10.0),
            weapons: ["rifle", "beam"],
        ),
    ],
)"#;

/// Parse [`TEST_CATALOG`].
///
/// # Panics
///
/// Panics if the built-in catalog is invalid.
#[must_use]
pub fn test_catalog() -> UnitCatalog {
    UnitCatalog::from_ron_str("test_catalog", TEST_CATALOG).expect("test catalog is valid")
}

/// Two teams with one player each: player 1 on team 1, player 2 on team 2.
#[must_use]
pub fn two_team_game() -> GameState {
    GameState::new([
        Team::new(1).with_player(Player::new(1, "red")),
        Team::new(2).with_player(Player::new(2, "blue")),
    ])
}

/// A running match with no entities.
#[must_use]
pub fn empty_match() -> Simulation {
    let mut sim = Simulation::new(two_team_game());
    sim.start_match();
    sim.drain_events();
    sim
}

/// A running match with one trooper per side, `gap` units apart.
///
/// # Panics
///
/// Panics if the test catalog lacks the trooper template.
#[must_use]
pub fn duel(gap: i32) -> Simulation {
    let catalog = test_catalog();
    let mut sim = empty_match();
    sim.spawn_entity(&catalog, "trooper", 1, point(0, 0))
        .expect("trooper exists");
    sim.spawn_entity(&catalog, "trooper", 2, point(gap, 0))
        .expect("trooper exists");
    sim
}

/// A running match with `per_side` mixed units per team facing each
/// other across a capture point.
///
/// # Panics
///
/// Panics if the test catalog lacks a template.
#[must_use]
pub fn skirmish(per_side: i32) -> Simulation {
    let catalog = test_catalog();
    let mut sim = empty_match();
    let kinds = ["trooper", "heavy", "trooper", "artillery"];
    for i in 0..per_side {
        let kind = kinds[usize::try_from(i).unwrap_or(0) % kinds.len()];
        let row = (i % 10) * 2 - 10;
        let col = i / 10;
        sim.spawn_entity(&catalog, kind, 1, point(-12 - col * 2, row))
            .expect("template exists");
        sim.spawn_entity(&catalog, kind, 2, point(12 + col * 2, row))
            .expect("template exists");
    }
    sim.add_capture_point(
        CapturePoint::new(1, Vec2Fixed::ZERO, fixed(4), fixed(3)).with_gain(
            GainKind::Score,
            1,
            fixed(1),
        ),
    );
    sim
}
