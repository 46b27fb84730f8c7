//! # Skirmish Core
//!
//! Authoritative match simulation for a team-based skirmish game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - A headless authoritative server
//! - Client-side mirrors driven purely by snapshots
//! - Determinism testing and desync diagnostics
//!
//! ## Crate Structure
//!
//! - [`entity`] - Entity behaviour state machine
//! - [`weapon`] - Weapon targeting state machine
//! - [`vision`] - Sensors, visibility aggregation and gates
//! - [`capture`] - Capture point state machine
//! - [`registry`] - Entity lifetime and command dispatch
//! - [`simulation`] - Core simulation loop
//! - [`protocol`] - Wire messages and framing
//! - [`client`] - Client-side mirror world
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ability;
pub mod capture;
pub mod client;
pub mod command;
pub mod components;
pub mod data;
pub mod entity;
pub mod error;
pub mod game_state;
pub mod math;
pub mod navigation;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod simulation;
pub mod spatial;
pub mod vision;
pub mod weapon;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capture::{CaptureEvent, CapturePoint, CapturePointConfig, CaptureState, GainKind};
    pub use crate::client::ClientWorld;
    pub use crate::command::{Command, CommandKind};
    pub use crate::components::*;
    pub use crate::data::UnitCatalog;
    pub use crate::entity::{AiState, Entity, StanceMode};
    pub use crate::error::{GameError, Result};
    pub use crate::game_state::{GameState, MatchPhase, Player, Team};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::navigation::{NavigationService, OpenGround};
    pub use crate::protocol::{ClientMessage, MatchEvent, ServerMessage, WorldSnapshot};
    pub use crate::registry::EntityRegistry;
    pub use crate::simulation::{Simulation, TickEvents, TICK_RATE};
    pub use crate::spatial::{LayerMask, Obstacle, SpatialQuery, SpatialWorld};
    pub use crate::weapon::{Weapon, WeaponKind, WeaponState};
}
