//! Match phase, teams and players.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{PlayerId, TeamId};

/// Overall match phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    /// Lobby open; waiting for every player slot to be claimed.
    #[default]
    WaitingForPlayers,
    /// Simulation is running and accepting commands.
    GameInProgress,
    /// A winner was decided; terminal.
    GameCompleted,
}

/// A player slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Player id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Resources earned.
    pub resources: u32,
    /// No living units remain.
    pub defeated: bool,
}

impl Player {
    /// Create a player with no resources.
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            resources: 0,
            defeated: false,
        }
    }
}

/// A team and its roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team {
    /// Team id.
    pub id: TeamId,
    /// Score earned.
    pub score: u32,
    /// Players in slot order.
    pub players: Vec<Player>,
}

impl Team {
    /// Create an empty team.
    #[must_use]
    pub const fn new(id: TeamId) -> Self {
        Self {
            id,
            score: 0,
            players: Vec::new(),
        }
    }

    /// Builder method to add a player.
    #[must_use]
    pub fn with_player(mut self, player: Player) -> Self {
        self.players.push(player);
        self
    }

    /// Every player on the team is defeated.
    #[must_use]
    pub fn is_defeated(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.defeated)
    }
}

/// Server-owned match state; clients hold a mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GameState {
    phase: MatchPhase,
    teams: BTreeMap<TeamId, Team>,
    winner: Option<TeamId>,
    /// Score at which a team wins outright.
    pub score_limit: Option<u32>,
}

impl GameState {
    /// Create a state waiting for players.
    #[must_use]
    pub fn new(teams: impl IntoIterator<Item = Team>) -> Self {
        Self {
            phase: MatchPhase::WaitingForPlayers,
            teams: teams.into_iter().map(|t| (t.id, t)).collect(),
            winner: None,
            score_limit: None,
        }
    }

    /// Rebuild from replicated fields.
    #[must_use]
    pub fn from_parts(phase: MatchPhase, teams: Vec<Team>, winner: Option<TeamId>) -> Self {
        Self {
            phase,
            teams: teams.into_iter().map(|t| (t.id, t)).collect(),
            winner,
            score_limit: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Commands are only accepted while the game is in progress.
    #[must_use]
    pub fn accepts_commands(&self) -> bool {
        self.phase == MatchPhase::GameInProgress
    }

    /// Winning team once completed.
    #[must_use]
    pub const fn winner(&self) -> Option<TeamId> {
        self.winner
    }

    /// Teams in id order.
    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    /// Look up a team.
    #[must_use]
    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.get(&id)
    }

    /// Team containing `player`.
    #[must_use]
    pub fn team_of(&self, player: PlayerId) -> Option<TeamId> {
        self.teams
            .values()
            .find(|t| t.players.iter().any(|p| p.id == player))
            .map(|t| t.id)
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.teams
            .values()
            .flat_map(|t| t.players.iter())
            .find(|p| p.id == id)
    }

    /// Every configured player id.
    #[must_use]
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.teams
            .values()
            .flat_map(|t| t.players.iter().map(|p| p.id))
            .collect()
    }

    /// Move from waiting to in progress. Returns the transition on change.
    pub fn start(&mut self) -> Option<(MatchPhase, MatchPhase)> {
        if self.phase != MatchPhase::WaitingForPlayers {
            return None;
        }
        self.phase = MatchPhase::GameInProgress;
        Some((MatchPhase::WaitingForPlayers, MatchPhase::GameInProgress))
    }

    /// End the match with `winner`. Returns the transition on change.
    pub fn complete(&mut self, winner: Option<TeamId>) -> Option<(MatchPhase, MatchPhase)> {
        if self.phase == MatchPhase::GameCompleted {
            return None;
        }
        let from = self.phase;
        self.phase = MatchPhase::GameCompleted;
        self.winner = winner;
        Some((from, MatchPhase::GameCompleted))
    }

    /// Add score to a team.
    pub fn add_score(&mut self, team: TeamId, amount: u32) {
        if let Some(t) = self.teams.get_mut(&team) {
            t.score = t.score.saturating_add(amount);
        }
    }

    /// Give `amount` resources to every player on a team.
    pub fn add_team_resources(&mut self, team: TeamId, amount: u32) {
        if let Some(t) = self.teams.get_mut(&team) {
            for player in &mut t.players {
                player.resources = player.resources.saturating_add(amount);
            }
        }
    }

    /// Mark a player defeated. Returns true if the flag changed.
    pub fn defeat_player(&mut self, player: PlayerId) -> bool {
        for team in self.teams.values_mut() {
            if let Some(p) = team.players.iter_mut().find(|p| p.id == player) {
                let changed = !p.defeated;
                p.defeated = true;
                return changed;
            }
        }
        false
    }

    /// Mark every player of a team defeated. Returns true if any flag changed.
    pub fn defeat_team(&mut self, team: TeamId) -> bool {
        let Some(t) = self.teams.get_mut(&team) else {
            return false;
        };
        let mut changed = false;
        for player in &mut t.players {
            changed |= !player.defeated;
            player.defeated = true;
        }
        changed
    }

    /// Team that reached the score limit, lowest id first.
    #[must_use]
    pub fn score_limit_winner(&self) -> Option<TeamId> {
        let limit = self.score_limit?;
        self.teams.values().find(|t| t.score >= limit).map(|t| t.id)
    }

    /// Sole undefeated team, if every other team is defeated.
    #[must_use]
    pub fn last_team_standing(&self) -> Option<Option<TeamId>> {
        let alive: Vec<TeamId> = self
            .teams
            .values()
            .filter(|t| !t.is_defeated())
            .map(|t| t.id)
            .collect();
        match alive.as_slice() {
            [] => Some(None),
            [only] => Some(Some(*only)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GameState {
        GameState::new([
            Team::new(1).with_player(Player::new(10, "a")),
            Team::new(2)
                .with_player(Player::new(20, "b"))
                .with_player(Player::new(21, "c")),
        ])
    }

    #[test]
    fn test_phase_transitions_once() {
        let mut gs = state();
        assert!(!gs.accepts_commands());
        assert!(gs.start().is_some());
        assert!(gs.start().is_none());
        assert!(gs.accepts_commands());
        assert_eq!(
            gs.complete(Some(1)),
            Some((MatchPhase::GameInProgress, MatchPhase::GameCompleted))
        );
        assert!(gs.complete(Some(2)).is_none());
        assert_eq!(gs.winner(), Some(1));
    }

    #[test]
    fn test_team_defeat_needs_every_player() {
        let mut gs = state();
        gs.defeat_player(20);
        assert_eq!(gs.last_team_standing(), None);
        gs.defeat_player(21);
        assert_eq!(gs.last_team_standing(), Some(Some(1)));
    }

    #[test]
    fn test_defeat_team_covers_unitless_teammates() {
        let mut gs = state();
        gs.defeat_player(20);
        assert!(gs.defeat_team(2));
        assert!(gs.player(21).is_some_and(|p| p.defeated));
        assert_eq!(gs.last_team_standing(), Some(Some(1)));
        assert!(!gs.defeat_team(2));
        assert!(!gs.defeat_team(9));
    }

    #[test]
    fn test_resources_go_to_every_teammate() {
        let mut gs = state();
        gs.add_team_resources(2, 7);
        assert_eq!(gs.player(20).map(|p| p.resources), Some(7));
        assert_eq!(gs.player(21).map(|p| p.resources), Some(7));
        assert_eq!(gs.player(10).map(|p| p.resources), Some(0));
    }

    #[test]
    fn test_score_limit() {
        let mut gs = state();
        gs.score_limit = Some(5);
        gs.add_score(2, 4);
        assert_eq!(gs.score_limit_winner(), None);
        gs.add_score(2, 1);
        assert_eq!(gs.score_limit_winner(), Some(2));
    }
}
