//! Property tests for pool bounds, the damage rule and command handling.

use proptest::prelude::*;
use skirmish_core::components::EntityKind;
use skirmish_core::entity::Entity;
use skirmish_core::math::{Fixed, Vec2Fixed};
use skirmish_test_utils::fixtures::{skirmish, tick_dt};
use skirmish_test_utils::strategies::{arb_command, arb_hits, arb_pools};

proptest! {
    #[test]
    fn test_shield_absorbs_before_health((max_health, max_shield) in arb_pools(), hits in arb_hits(40)) {
        let mut entity = Entity::new(1, "dummy", EntityKind::Unit, 1, 1, Vec2Fixed::ZERO)
            .with_pools(max_health, max_shield, Fixed::ZERO);
        let mut deaths = 0;

        for hit in hits {
            let health_before = entity.health.current;
            let shield_before = entity.shield.current;
            let alive_before = entity.is_alive();
            let outcome = entity.take_damage(hit);

            if alive_before {
                prop_assert_eq!(outcome.shield_damage, hit.min(shield_before));
                prop_assert_eq!(outcome.health_damage, (hit - outcome.shield_damage).min(health_before));
            } else {
                prop_assert_eq!(outcome.shield_damage + outcome.health_damage, 0);
            }
            prop_assert!(entity.health.current <= entity.health.max);
            prop_assert!(entity.shield.current <= entity.shield.max);
            prop_assert_eq!(entity.is_alive(), entity.health.current > 0);
            if outcome.killed {
                deaths += 1;
            }
        }
        prop_assert!(deaths <= 1);
    }

    #[test]
    fn test_command_streams_keep_pools_bounded(
        commands in proptest::collection::vec(arb_command((1..=8).collect()), 0..12),
        sender in 1u32..=2,
    ) {
        let mut a = skirmish(4);
        let mut b = skirmish(4);
        for command in commands {
            a.submit_command(sender, command.clone());
            b.submit_command(sender, command);
            a.tick(tick_dt());
            b.tick(tick_dt());
        }
        for _ in 0..40 {
            a.tick(tick_dt());
            b.tick(tick_dt());
        }

        prop_assert_eq!(a.state_hash(), b.state_hash());
        for (_, entity) in a.registry().iter() {
            prop_assert!(entity.health.current <= entity.health.max);
            prop_assert!(entity.shield.current <= entity.shield.max);
        }
    }
}
