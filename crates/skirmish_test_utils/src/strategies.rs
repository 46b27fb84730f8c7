//! Proptest strategies.
//!
//! These strategies generate random but reproducible inputs for
//! property-based testing of the simulation.

use proptest::prelude::*;
use skirmish_core::command::Command;
use skirmish_core::components::EntityId;
use skirmish_core::math::{Fixed, Vec2Fixed};

/// Generate a fixed-point number in a reasonable range for positions.
///
/// Range: -500 to 500 (inside the default map bounds)
pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
    (-500i32..500i32).prop_map(Fixed::from_num)
}

/// Generate a ground-plane point.
pub fn arb_point() -> impl Strategy<Value = Vec2Fixed> {
    (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
}

/// Generate `(max_health, max_shield)` pool sizes.
pub fn arb_pools() -> impl Strategy<Value = (u32, u32)> {
    (1u32..1000, 0u32..500)
}

/// Generate a sequence of incoming hits.
pub fn arb_hits(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::vec(0u32..300, 0..max_len)
}

/// Generate a command issued for a subset of `ids`.
pub fn arb_command(ids: Vec<EntityId>) -> impl Strategy<Value = Command> {
    let pick = proptest::sample::subsequence(ids.clone(), 0..=ids.len());
    let target = proptest::sample::select(ids);
    (0u8..5, pick, target, arb_point()).prop_map(|(kind, acting, target, point)| match kind {
        0 => Command::move_to(acting, point),
        1 => Command::stop(acting),
        2 => Command::attack(acting, target),
        3 => Command::attack_location(acting, point),
        _ => Command::toggle_mode(acting),
    })
}
