//! Player-slot binding.
//!
//! Every configured player slot must be claimed by exactly one connection
//! before the match starts.

use std::collections::BTreeMap;

use skirmish_core::components::{PlayerId, TeamId};
use skirmish_core::game_state::GameState;
use thiserror::Error;
use tracing::info;

/// Why a slot claim was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LobbyError {
    /// No such slot in the match config.
    #[error("Player slot {0} does not exist")]
    UnknownSlot(PlayerId),
    /// Another connection holds the slot.
    #[error("Player slot {0} is already taken")]
    SlotTaken(PlayerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    team: TeamId,
    claimed: bool,
}

/// Tracks which player slots are bound to a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lobby {
    slots: BTreeMap<PlayerId, Slot>,
}

impl Lobby {
    /// One open slot per player in `game`.
    #[must_use]
    pub fn from_game(game: &GameState) -> Self {
        let slots = game
            .teams()
            .flat_map(|team| {
                team.players.iter().map(move |p| {
                    (
                        p.id,
                        Slot {
                            team: team.id,
                            claimed: false,
                        },
                    )
                })
            })
            .collect();
        Self { slots }
    }

    /// Bind a slot. Returns the slot's team.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot does not exist or is already bound.
    pub fn claim(&mut self, player: PlayerId) -> Result<TeamId, LobbyError> {
        let slot = self
            .slots
            .get_mut(&player)
            .ok_or(LobbyError::UnknownSlot(player))?;
        if slot.claimed {
            return Err(LobbyError::SlotTaken(player));
        }
        slot.claimed = true;
        info!("Player {} joined team {}", player, slot.team);
        Ok(slot.team)
    }

    /// Free a slot when its connection drops.
    pub fn release(&mut self, player: PlayerId) {
        if let Some(slot) = self.slots.get_mut(&player) {
            if slot.claimed {
                info!("Player {} left", player);
            }
            slot.claimed = false;
        }
    }

    /// Number of bound slots.
    #[must_use]
    pub fn claimed(&self) -> usize {
        self.slots.values().filter(|s| s.claimed).count()
    }

    /// Whether every slot is bound.
    #[must_use]
    pub fn is_full(&self) -> bool {
        !self.slots.is_empty() && self.slots.values().all(|s| s.claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_test_utils::fixtures::two_team_game;

    #[test]
    fn test_claim_all_slots() {
        let mut lobby = Lobby::from_game(&two_team_game());
        assert!(!lobby.is_full());
        assert_eq!(lobby.claim(1), Ok(1));
        assert_eq!(lobby.claim(2), Ok(2));
        assert!(lobby.is_full());
    }

    #[test]
    fn test_claim_errors() {
        let mut lobby = Lobby::from_game(&two_team_game());
        assert_eq!(lobby.claim(9), Err(LobbyError::UnknownSlot(9)));
        lobby.claim(1).unwrap();
        assert_eq!(lobby.claim(1), Err(LobbyError::SlotTaken(1)));
    }

    #[test]
    fn test_release_reopens_slot() {
        let mut lobby = Lobby::from_game(&two_team_game());
        lobby.claim(1).unwrap();
        lobby.release(1);
        assert_eq!(lobby.claimed(), 0);
        assert_eq!(lobby.claim(1), Ok(1));
    }
}
