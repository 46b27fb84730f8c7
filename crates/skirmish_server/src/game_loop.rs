//! Authoritative match loop.
//!
//! One task owns the [`Simulation`]. Connections talk to it only through
//! channels: commands and joins arrive on an mpsc queue, reliable events
//! leave on a per-player mpsc, and snapshots are published on a watch
//! channel so a slow reader only ever sees the newest one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use skirmish_core::command::Command;
use skirmish_core::components::{PlayerId, TeamId};
use skirmish_core::game_state::MatchPhase;
use skirmish_core::math::Fixed;
use skirmish_core::protocol::{MatchEvent, WorldSnapshot};
use skirmish_core::simulation::Simulation;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::lobby::{Lobby, LobbyError};

/// Depth of the inbound queue.
const INBOUND_CAPACITY: usize = 1024;

/// Latest published snapshot.
pub type SnapshotFeed = watch::Receiver<Option<Arc<WorldSnapshot>>>;

/// Reliable events for one player.
pub type EventFeed = mpsc::UnboundedReceiver<MatchEvent>;

/// Message from a connection to the match loop.
#[derive(Debug)]
pub enum LoopInput {
    /// Claim a player slot.
    Join {
        /// Requested slot.
        player_id: PlayerId,
        /// Where to deliver reliable events.
        events: mpsc::UnboundedSender<MatchEvent>,
        /// Claim outcome.
        reply: oneshot::Sender<std::result::Result<TeamId, LobbyError>>,
    },
    /// Queue a command.
    Command {
        /// Sender.
        player_id: PlayerId,
        /// The command.
        command: Command,
    },
    /// Connection dropped.
    Leave {
        /// Slot to free.
        player_id: PlayerId,
    },
}

/// Handle connections use to reach the match loop.
#[derive(Debug, Clone)]
pub struct MatchHandle {
    inbound: mpsc::Sender<LoopInput>,
    snapshots: SnapshotFeed,
}

impl MatchHandle {
    /// Claim a slot. On success returns the team and the event feed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Rejected`] if the slot is refused and
    /// [`ServerError::LoopClosed`] if the loop has stopped.
    pub async fn join(&self, player_id: PlayerId) -> Result<(TeamId, EventFeed)> {
        let (events, feed) = mpsc::unbounded_channel();
        let (reply, outcome) = oneshot::channel();
        self.inbound
            .send(LoopInput::Join {
                player_id,
                events,
                reply,
            })
            .await
            .map_err(|_| ServerError::LoopClosed)?;
        let team = outcome.await.map_err(|_| ServerError::LoopClosed)??;
        Ok((team, feed))
    }

    /// Forward a command.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LoopClosed`] if the loop has stopped.
    pub async fn command(&self, player_id: PlayerId, command: Command) -> Result<()> {
        self.inbound
            .send(LoopInput::Command { player_id, command })
            .await
            .map_err(|_| ServerError::LoopClosed)
    }

    /// Release a slot. Errors are ignored; the loop may already be gone.
    pub async fn leave(&self, player_id: PlayerId) {
        let _ = self.inbound.send(LoopInput::Leave { player_id }).await;
    }

    /// Subscribe to snapshots.
    #[must_use]
    pub fn snapshots(&self) -> SnapshotFeed {
        self.snapshots.clone()
    }
}

/// The match loop state.
#[derive(Debug)]
pub struct GameLoop {
    sim: Simulation,
    lobby: Lobby,
    subscribers: BTreeMap<PlayerId, mpsc::UnboundedSender<MatchEvent>>,
    tick_rate: u32,
    dt: Fixed,
    snapshot_interval: u64,
}

impl GameLoop {
    /// Wrap a simulation that is waiting for players.
    #[must_use]
    pub fn new(sim: Simulation, config: &ServerConfig) -> Self {
        let lobby = Lobby::from_game(sim.game());
        Self {
            sim,
            lobby,
            subscribers: BTreeMap::new(),
            tick_rate: config.tick_rate.max(1),
            dt: config.tick_dt(),
            snapshot_interval: u64::from(config.snapshot_interval.max(1)),
        }
    }

    /// The simulation.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// The match has been decided.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.sim.game().phase() == MatchPhase::GameCompleted
    }

    /// Apply one inbound message.
    pub fn handle_input(&mut self, input: LoopInput) {
        match input {
            LoopInput::Join {
                player_id,
                events,
                reply,
            } => {
                let outcome = self.lobby.claim(player_id);
                if outcome.is_ok() {
                    self.subscribers.insert(player_id, events);
                }
                let _ = reply.send(outcome);
                if self.lobby.is_full() && self.sim.game().phase() == MatchPhase::WaitingForPlayers {
                    self.sim.start_match();
                }
            }
            LoopInput::Command { player_id, command } => {
                if self.subscribers.contains_key(&player_id) {
                    self.sim.submit_command(player_id, command);
                } else {
                    debug!("Dropping command from unbound player {player_id}");
                }
            }
            LoopInput::Leave { player_id } => {
                self.subscribers.remove(&player_id);
                self.lobby.release(player_id);
            }
        }
    }

    /// Advance one tick, deliver its events and return a snapshot when one
    /// is due.
    pub fn step(&mut self) -> Option<WorldSnapshot> {
        self.sim.tick(self.dt);

        let events = self.sim.drain_events();
        if !events.is_empty() {
            self.subscribers.retain(|player, feed| {
                let open = events.iter().all(|e| feed.send(*e).is_ok());
                if !open {
                    debug!("Event feed for player {player} closed");
                }
                open
            });
        }

        (self.sim.get_tick() % self.snapshot_interval == 0 || self.is_finished())
            .then(|| self.sim.collect_snapshot())
    }

    /// Run the loop on the current runtime.
    ///
    /// The task ends when the match completes or every handle is dropped,
    /// returning the winner if there is one.
    pub fn spawn(self) -> (MatchHandle, JoinHandle<Option<TeamId>>) {
        let (inbound, queue) = mpsc::channel(INBOUND_CAPACITY);
        let (publish, snapshots) = watch::channel(None);
        let task = tokio::spawn(self.run(queue, publish));
        (MatchHandle { inbound, snapshots }, task)
    }

    async fn run(
        mut self,
        mut queue: mpsc::Receiver<LoopInput>,
        publish: watch::Sender<Option<Arc<WorldSnapshot>>>,
    ) -> Option<TeamId> {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.tick_rate));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Match loop running at {} Hz", self.tick_rate);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(snapshot) = self.step() {
                        publish.send_replace(Some(Arc::new(snapshot)));
                    }
                    if self.is_finished() {
                        break;
                    }
                }
                input = queue.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
            }
        }

        let winner = self.sim.game().winner();
        info!("Match loop stopped at tick {}, winner {:?}", self.sim.get_tick(), winner);
        winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_test_utils::fixtures::{point, test_catalog, two_team_game};

    fn waiting_duel() -> Simulation {
        let catalog = test_catalog();
        let mut sim = Simulation::new(two_team_game());
        sim.spawn_entity(&catalog, "trooper", 1, point(0, 0)).unwrap();
        sim.spawn_entity(&catalog, "trooper", 2, point(6, 0)).unwrap();
        sim
    }

    fn join(game: &mut GameLoop, player_id: PlayerId) -> (oneshot::Receiver<std::result::Result<TeamId, LobbyError>>, EventFeed) {
        let (events, feed) = mpsc::unbounded_channel();
        let (reply, outcome) = oneshot::channel();
        game.handle_input(LoopInput::Join {
            player_id,
            events,
            reply,
        });
        (outcome, feed)
    }

    #[test]
    fn test_match_starts_when_lobby_full() {
        let mut game = GameLoop::new(waiting_duel(), &ServerConfig::default());
        let (mut first, mut red) = join(&mut game, 1);
        assert_eq!(first.try_recv().unwrap(), Ok(1));
        assert_eq!(game.simulation().game().phase(), MatchPhase::WaitingForPlayers);

        let (_second, mut blue) = join(&mut game, 2);
        assert_eq!(game.simulation().game().phase(), MatchPhase::GameInProgress);

        game.step();
        let started = MatchEvent::GameStateTransition {
            from: MatchPhase::WaitingForPlayers,
            to: MatchPhase::GameInProgress,
            winner: None,
        };
        assert_eq!(red.try_recv().unwrap(), started);
        assert_eq!(blue.try_recv().unwrap(), started);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let mut game = GameLoop::new(waiting_duel(), &ServerConfig::default());
        let _first = join(&mut game, 1);
        let (mut second, _) = join(&mut game, 1);
        assert_eq!(second.try_recv().unwrap(), Err(LobbyError::SlotTaken(1)));
    }

    #[test]
    fn test_commands_from_unbound_players_dropped() {
        let mut game = GameLoop::new(waiting_duel(), &ServerConfig::default());
        let _red = join(&mut game, 1);
        let _blue = join(&mut game, 2);
        game.handle_input(LoopInput::Command {
            player_id: 7,
            command: Command::move_to(vec![1], point(-20, 0)),
        });
        game.handle_input(LoopInput::Command {
            player_id: 1,
            command: Command::move_to(vec![1], point(-20, 0)),
        });
        game.step();
        game.step();
        assert!(game.simulation().entity(1).unwrap().position.x < point(0, 0).x);
    }

    #[test]
    fn test_snapshot_interval() {
        let config = ServerConfig {
            snapshot_interval: 3,
            ..ServerConfig::default()
        };
        let mut game = GameLoop::new(waiting_duel(), &config);
        let published: Vec<bool> = (0..6).map(|_| game.step().is_some()).collect();
        assert_eq!(published, vec![false, false, true, false, false, true]);
    }

    #[tokio::test]
    async fn test_handle_join_unknown_slot() {
        let (handle, task) = GameLoop::new(waiting_duel(), &ServerConfig::default()).spawn();
        assert!(matches!(
            handle.join(9).await,
            Err(ServerError::Rejected(LobbyError::UnknownSlot(9)))
        ));
        task.abort();
    }

    #[tokio::test]
    async fn test_spawned_loop_plays_to_completion() {
        let config = ServerConfig {
            tick_rate: 200,
            ..ServerConfig::default()
        };
        let (handle, task) = GameLoop::new(waiting_duel(), &config).spawn();
        let (team, mut red) = handle.join(1).await.unwrap();
        assert_eq!(team, 1);
        let (_, _blue) = handle.join(2).await.unwrap();

        let winner = tokio::time::timeout(Duration::from_secs(30), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(winner, Some(1));

        let mut last = None;
        while let Ok(event) = red.try_recv() {
            last = Some(event);
        }
        assert!(matches!(
            last,
            Some(MatchEvent::GameStateTransition {
                to: MatchPhase::GameCompleted,
                ..
            })
        ));
        let snapshot = handle.snapshots().borrow().clone().unwrap();
        assert_eq!(snapshot.game.phase, MatchPhase::GameCompleted);
    }
}
