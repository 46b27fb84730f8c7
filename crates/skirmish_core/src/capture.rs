//! Capture point state machine.
//!
//! A capture point is re-evaluated every tick from the set of teams that
//! have living entities inside its radius. Ownership only changes when a
//! capture completes; gain ticks only run while captured.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::components::{CapturePointId, TeamId};
use crate::math::{decimal_serde, fixed_serde, Fixed, Vec2Fixed};

/// Capture progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CaptureState {
    /// Never captured.
    #[default]
    Uncaptured,
    /// A single team is accumulating capture time.
    Capturing,
    /// More than one team is present.
    Contested,
    /// Owned; gain ticks are running.
    Captured,
}

/// What an owned point pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GainKind {
    /// Team score.
    Score,
    /// Resources for every player on the team.
    Resources,
}

/// Static definition of a capture point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapturePointConfig {
    /// Point id.
    pub id: CapturePointId,
    /// Center.
    pub position: (f64, f64),
    /// Capture radius.
    #[serde(with = "decimal_serde")]
    pub radius: Fixed,
    /// Seconds of uncontested presence needed to capture.
    #[serde(with = "decimal_serde")]
    pub capture_time: Fixed,
    /// Payout type.
    pub gain: GainKind,
    /// Amount per gain tick.
    pub gain_amount: u32,
    /// Seconds between gain ticks.
    #[serde(with = "decimal_serde")]
    pub gain_interval: Fixed,
}

/// Observable outcome of a capture point tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A capture completed and ownership moved.
    OwnerChanged {
        /// Point id.
        point: CapturePointId,
        /// Previous owner.
        previous: Option<TeamId>,
        /// New owner.
        owner: TeamId,
    },
    /// A gain tick fired for the owning team.
    Gain {
        /// Point id.
        point: CapturePointId,
        /// Receiving team.
        team: TeamId,
        /// Payout type.
        kind: GainKind,
        /// Amount.
        amount: u32,
    },
}

/// A live capture point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePoint {
    /// Point id.
    pub id: CapturePointId,
    /// Center.
    pub position: Vec2Fixed,
    /// Capture radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Seconds needed to capture.
    #[serde(with = "fixed_serde")]
    pub capture_time: Fixed,
    /// Payout type.
    pub gain: GainKind,
    /// Amount per gain tick.
    pub gain_amount: u32,
    /// Seconds between gain ticks.
    #[serde(with = "fixed_serde")]
    pub gain_interval: Fixed,
    state: CaptureState,
    #[serde(with = "fixed_serde")]
    capture_timer: Fixed,
    capturing_team: Option<TeamId>,
    owning_team: Option<TeamId>,
    gain_active: bool,
    #[serde(with = "fixed_serde")]
    gain_timer: Fixed,
}

impl CapturePoint {
    /// Create an uncaptured point.
    #[must_use]
    pub fn new(id: CapturePointId, position: Vec2Fixed, radius: Fixed, capture_time: Fixed) -> Self {
        Self {
            id,
            position,
            radius,
            capture_time,
            gain: GainKind::Score,
            gain_amount: 1,
            gain_interval: Fixed::ONE,
            state: CaptureState::Uncaptured,
            capture_timer: Fixed::ZERO,
            capturing_team: None,
            owning_team: None,
            gain_active: false,
            gain_timer: Fixed::ZERO,
        }
    }

    /// Create a point from its configuration.
    #[must_use]
    pub fn from_config(config: &CapturePointConfig) -> Self {
        let position = Vec2Fixed::new(
            Fixed::saturating_from_num(config.position.0),
            Fixed::saturating_from_num(config.position.1),
        );
        Self::new(config.id, position, config.radius, config.capture_time).with_gain(
            config.gain,
            config.gain_amount,
            config.gain_interval,
        )
    }

    /// Builder method to set the payout.
    #[must_use]
    pub const fn with_gain(mut self, kind: GainKind, amount: u32, interval: Fixed) -> Self {
        self.gain = kind;
        self.gain_amount = amount;
        self.gain_interval = interval;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Seconds accumulated toward the current capture.
    #[must_use]
    pub const fn capture_timer(&self) -> Fixed {
        self.capture_timer
    }

    /// Team currently capturing (or last present alone).
    #[must_use]
    pub const fn capturing_team(&self) -> Option<TeamId> {
        self.capturing_team
    }

    /// Current owner.
    #[must_use]
    pub const fn owning_team(&self) -> Option<TeamId> {
        self.owning_team
    }

    /// Whether gain ticks are running.
    #[must_use]
    pub const fn is_gaining(&self) -> bool {
        self.gain_active
    }

    /// Advance one tick given the teams present inside the radius.
    pub fn tick(&mut self, dt: Fixed, teams_present: &BTreeSet<TeamId>) -> Vec<CaptureEvent> {
        let mut events = Vec::new();

        let mut teams = teams_present.iter().copied();
        match (teams.next(), teams.next()) {
            (None, _) => {
                self.capturing_team = None;
            }
            (Some(team), None) => self.occupy(team),
            (Some(_), Some(_)) => self.contest(),
        }

        if self.state == CaptureState::Capturing {
            // An abandoned capture holds its progress until someone returns.
            if let Some(team) = self.capturing_team {
                self.capture_timer = self.capture_timer.saturating_add(dt);
                if self.capture_timer >= self.capture_time {
                    let previous = self.owning_team;
                    self.state = CaptureState::Captured;
                    self.owning_team = Some(team);
                    self.capture_timer = self.capture_time;
                    self.start_gain();
                    events.push(CaptureEvent::OwnerChanged {
                        point: self.id,
                        previous,
                        owner: team,
                    });
                }
            }
        } else if self.gain_active {
            self.tick_gain(dt, &mut events);
        }

        events
    }

    fn occupy(&mut self, team: TeamId) {
        match self.state {
            CaptureState::Contested if self.owning_team == Some(team) => {
                self.state = CaptureState::Captured;
                self.capturing_team = Some(team);
                self.start_gain();
            }
            CaptureState::Contested if self.capturing_team == Some(team) => {
                self.state = CaptureState::Capturing;
            }
            CaptureState::Captured if self.owning_team == Some(team) => {
                self.capturing_team = Some(team);
            }
            CaptureState::Capturing if self.capturing_team == Some(team) => {}
            _ => self.start_capturing(team),
        }
    }

    fn start_capturing(&mut self, team: TeamId) {
        self.state = CaptureState::Capturing;
        self.capturing_team = Some(team);
        self.capture_timer = Fixed::ZERO;
        self.gain_active = false;
    }

    fn contest(&mut self) {
        if self.state != CaptureState::Contested {
            self.state = CaptureState::Contested;
            self.capture_timer = Fixed::ZERO;
        }
        self.gain_active = false;
    }

    fn start_gain(&mut self) {
        if !self.gain_active {
            self.gain_active = true;
            self.gain_timer = Fixed::ZERO;
        }
    }

    fn tick_gain(&mut self, dt: Fixed, events: &mut Vec<CaptureEvent>) {
        let Some(team) = self.owning_team else {
            return;
        };
        if self.gain_interval <= Fixed::ZERO {
            return;
        }
        self.gain_timer += dt;
        while self.gain_timer >= self.gain_interval {
            self.gain_timer -= self.gain_interval;
            events.push(CaptureEvent::Gain {
                point: self.id,
                team,
                kind: self.gain,
                amount: self.gain_amount,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> CapturePoint {
        CapturePoint::new(1, Vec2Fixed::ZERO, Fixed::from_num(5), Fixed::from_num(3))
    }

    fn teams(ids: &[TeamId]) -> BTreeSet<TeamId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_single_team_captures_after_capture_time() {
        let mut cp = point();
        for _ in 0..2 {
            assert!(cp.tick(Fixed::ONE, &teams(&[1])).is_empty());
        }
        assert_eq!(cp.state(), CaptureState::Capturing);
        let events = cp.tick(Fixed::ONE, &teams(&[1]));
        assert_eq!(
            events,
            vec![CaptureEvent::OwnerChanged {
                point: 1,
                previous: None,
                owner: 1
            }]
        );
        assert_eq!(cp.state(), CaptureState::Captured);
        assert_eq!(cp.owning_team(), Some(1));
        assert!(cp.is_gaining());
    }

    #[test]
    fn test_contested_freezes_progress() {
        let mut cp = point();
        cp.tick(Fixed::from_num(2), &teams(&[1]));
        cp.tick(Fixed::ONE, &teams(&[1, 2]));
        assert_eq!(cp.state(), CaptureState::Contested);
        assert_eq!(cp.capture_timer(), Fixed::ZERO);
        for _ in 0..10 {
            assert!(cp.tick(Fixed::ONE, &teams(&[1, 2])).is_empty());
        }
        assert_eq!(cp.capture_timer(), Fixed::ZERO);
        assert_eq!(cp.owning_team(), None);
    }

    #[test]
    fn test_owner_returning_resumes_captured() {
        let mut cp = point();
        cp.tick(Fixed::from_num(3), &teams(&[1]));
        cp.tick(Fixed::ONE, &teams(&[1, 2]));
        assert!(!cp.is_gaining());
        cp.tick(Fixed::ONE, &teams(&[1]));
        assert_eq!(cp.state(), CaptureState::Captured);
        assert!(cp.is_gaining());
    }

    #[test]
    fn test_empty_point_keeps_owner_and_clears_capturer() {
        let mut cp = point();
        cp.tick(Fixed::from_num(3), &teams(&[1]));
        cp.tick(Fixed::ONE, &teams(&[]));
        assert_eq!(cp.state(), CaptureState::Captured);
        assert_eq!(cp.owning_team(), Some(1));
        assert_eq!(cp.capturing_team(), None);
    }

    #[test]
    fn test_abandoned_capture_timer_stays_frozen() {
        let mut cp = point();
        cp.tick(Fixed::from_num(3), &teams(&[1]));
        cp.tick(Fixed::ONE, &teams(&[2]));
        for _ in 0..20 {
            assert!(cp.tick(Fixed::ONE, &teams(&[])).is_empty());
        }
        assert_eq!(cp.state(), CaptureState::Capturing);
        assert_eq!(cp.capture_timer(), Fixed::ONE);
        assert_eq!(cp.owning_team(), Some(1));

        cp.tick(Fixed::ONE, &teams(&[2]));
        assert_eq!(cp.capture_timer(), Fixed::ONE);
        assert_eq!(cp.owning_team(), Some(1));
    }

    #[test]
    fn test_enemy_capture_keeps_owner_until_complete() {
        let mut cp = point();
        cp.tick(Fixed::from_num(3), &teams(&[1]));
        cp.tick(Fixed::ONE, &teams(&[2]));
        assert_eq!(cp.state(), CaptureState::Capturing);
        assert_eq!(cp.owning_team(), Some(1));
        assert!(!cp.is_gaining());
        cp.tick(Fixed::from_num(2), &teams(&[2]));
        assert_eq!(cp.owning_team(), Some(2));
    }

    #[test]
    fn test_gain_ticks_at_interval() {
        let mut cp = point().with_gain(GainKind::Resources, 5, Fixed::from_num(2));
        cp.tick(Fixed::from_num(3), &teams(&[1]));
        assert!(cp.tick(Fixed::ONE, &teams(&[1])).is_empty());
        let events = cp.tick(Fixed::ONE, &teams(&[1]));
        assert_eq!(
            events,
            vec![CaptureEvent::Gain {
                point: 1,
                team: 1,
                kind: GainKind::Resources,
                amount: 5
            }]
        );
    }
}
