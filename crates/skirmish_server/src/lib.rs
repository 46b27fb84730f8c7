//! # Skirmish Dedicated Server
//!
//! Authoritative match host. Owns the [`skirmish_core::simulation::Simulation`],
//! binds players to slots, forwards their commands into the tick loop and
//! replicates snapshots and events back over QUIC.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod error;
pub mod game_loop;
pub mod lobby;
pub mod network;

pub use config::{MatchConfig, ServerConfig};
pub use error::{Result, ServerError};
pub use game_loop::{GameLoop, MatchHandle};
