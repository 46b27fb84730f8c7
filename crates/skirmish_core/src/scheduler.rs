//! Delayed continuations keyed by simulation time.
//!
//! Delayed attacks and corpse removal are scheduled here instead of
//! blocking. The scheduler only stores what to resume; every continuation
//! is re-validated against current state by whoever runs it.

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::{fixed_serde, Fixed};

/// Deferred work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Continuation {
    /// Land a weapon strike fired earlier.
    Strike {
        /// Firing entity.
        attacker: EntityId,
        /// Weapon slot on the attacker.
        weapon: usize,
        /// Token returned by the weapon when it fired.
        token: u64,
    },
    /// Remove a dead entity from the registry.
    RemoveCorpse {
        /// Dead entity.
        entity: EntityId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Scheduled {
    #[serde(with = "fixed_serde")]
    due: Fixed,
    seq: u64,
    continuation: Continuation,
}

/// Time-ordered queue of continuations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scheduler {
    #[serde(with = "fixed_serde")]
    now: Fixed,
    seq: u64,
    pending: Vec<Scheduled>,
}

impl Scheduler {
    /// Create an empty scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation time in seconds.
    #[must_use]
    pub const fn now(&self) -> Fixed {
        self.now
    }

    /// Number of continuations waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Advance the clock.
    pub fn advance(&mut self, dt: Fixed) {
        self.now += dt;
    }

    /// Run `continuation` once `delay` seconds have passed.
    pub fn schedule(&mut self, delay: Fixed, continuation: Continuation) {
        let seq = self.seq;
        self.seq += 1;
        self.pending.push(Scheduled {
            due: self.now + delay.max(Fixed::ZERO),
            seq,
            continuation,
        });
    }

    /// Remove and return every due continuation, earliest first; ties keep
    /// scheduling order.
    pub fn drain_due(&mut self) -> Vec<Continuation> {
        let now = self.now;
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|s| s.due <= now);
        self.pending = pending;
        due.sort_by_key(|s| (s.due, s.seq));
        due.into_iter().map(|s| s.continuation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_due_in_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Fixed::from_num(2), Continuation::RemoveCorpse { entity: 1 });
        scheduler.schedule(Fixed::ONE, Continuation::RemoveCorpse { entity: 2 });
        scheduler.schedule(Fixed::ONE, Continuation::RemoveCorpse { entity: 3 });

        scheduler.advance(Fixed::from_num(0.5));
        assert!(scheduler.drain_due().is_empty());

        scheduler.advance(Fixed::from_num(0.5));
        assert_eq!(
            scheduler.drain_due(),
            vec![
                Continuation::RemoveCorpse { entity: 2 },
                Continuation::RemoveCorpse { entity: 3 },
            ]
        );
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_zero_delay_is_due_now() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Fixed::ZERO, Continuation::RemoveCorpse { entity: 1 });
        assert_eq!(scheduler.drain_due().len(), 1);
        assert!(scheduler.is_empty());
    }
}
