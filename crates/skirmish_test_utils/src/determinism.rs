//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! The authoritative simulation must be reproducible so that a recorded
//! command stream replays to the same outcome and desyncs can be bisected.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`skirmish_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   We always iterate in sorted entity ID order.
//!
//! - **Scheduler ties**: Continuations due at the same time run in
//!   scheduling order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use skirmish_core::error::{GameError, Result};
use skirmish_core::math::Fixed;
use skirmish_core::simulation::Simulation;

use crate::fixtures::tick_dt;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Convert into a [`GameError::DesyncDetected`] naming the first
    /// mismatching run.
    ///
    /// # Errors
    ///
    /// Returns an error if the runs diverged.
    pub fn into_result(self) -> Result<()> {
        let Some(&first) = self.hashes.first() else {
            return Ok(());
        };
        match self.hashes.iter().find(|h| **h != first) {
            Some(&other) => Err(GameError::DesyncDetected {
                tick: self.ticks,
                local_hash: first,
                remote_hash: other,
            }),
            None => Ok(()),
        }
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use skirmish_test_utils::determinism::verify_determinism;
/// use skirmish_test_utils::fixtures::{duel, tick_dt};
///
/// let result = verify_determinism(
///     3,
///     100,
///     || duel(6),
///     |sim| { sim.tick(tick_dt()); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run `setup` twice for `num_ticks` server ticks and compare the final
/// state hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick(tick_dt());
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// This is useful for catching non-determinism that only manifests
/// under thread scheduling variations, memory layout differences, etc.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let dt = tick_dt();
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick(dt);
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Errors
///
/// Returns [`GameError::DesyncDetected`] for the first tick whose hashes
/// differ.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64, dt: Fixed) -> Result<()>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    let check = |a: &Simulation, b: &Simulation| {
        let (local_hash, remote_hash) = (a.state_hash(), b.state_hash());
        if local_hash == remote_hash {
            Ok(())
        } else {
            Err(GameError::DesyncDetected {
                tick: a.get_tick(),
                local_hash,
                remote_hash,
            })
        }
    };

    check(&sim1, &sim2)?;
    for _ in 0..num_ticks {
        sim1.tick(dt);
        sim2.tick(dt);
        check(&sim1, &sim2)?;
    }
    Ok(())
}

/// Verify that serialization round-trip preserves simulation state exactly,
/// and that the restored copy keeps evolving identically.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let dt = tick_dt();
    let mut sim = setup_fn();

    for _ in 0..num_ticks {
        sim.tick(dt);
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };

    if sim.state_hash() != restored.state_hash() {
        return false;
    }
    for _ in 0..num_ticks {
        sim.tick(dt);
        restored.tick(dt);
    }
    sim.state_hash() == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel, skirmish};

    #[test]
    fn test_duel_is_deterministic() {
        assert!(verify_simulation_determinism(|| duel(6), 200));
    }

    #[test]
    fn test_skirmish_is_deterministic_across_threads() {
        let result = run_parallel_simulations(|| skirmish(8), 4, 300);
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_no_divergence_tick_by_tick() {
        assert!(find_first_divergence(|| skirmish(4), 200, tick_dt()).is_ok());
    }

    #[test]
    fn test_serialization_round_trip() {
        assert!(verify_serialization_determinism(|| skirmish(4), 100));
    }

    #[test]
    fn test_mismatch_reports_desync() {
        let result = DeterminismResult {
            is_deterministic: false,
            hashes: vec![1, 1, 7],
            ticks: 12,
        };
        assert!(matches!(
            result.into_result(),
            Err(GameError::DesyncDetected {
                tick: 12,
                local_hash: 1,
                remote_hash: 7
            })
        ));
    }
}
