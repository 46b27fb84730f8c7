//! Replication protocol: snapshots, one-shot events and the wire codec.
//!
//! Snapshots are full-state and self-superseding, so they tolerate
//! unordered or lost delivery. [`MatchEvent`]s are never re-sent and must
//! travel on a reliable, ordered channel.
//!
//! Payloads are `bincode`; streams carry them as frames with a
//! little-endian `u32` length prefix.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::capture::{CapturePoint, CaptureState};
use crate::command::Command;
use crate::components::{CapturePointId, EffectFlags, EntityId, PlayerId, Pool, TeamId};
use crate::entity::{AiState, Entity, StanceMode};
use crate::error::{GameError, Result};
use crate::game_state::{GameState, MatchPhase, Team};
use crate::math::{fixed_serde, Fixed, QuatFixed, Vec2Fixed};
use crate::weapon::{WeaponState, WeaponTarget};

/// Largest accepted frame payload in bytes.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Length of the frame header.
pub const FRAME_HEADER_LEN: usize = 4;

/// Live combat state of the equipped weapon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponSnapshot {
    /// Template id.
    pub type_id: String,
    /// Engagement state.
    pub state: WeaponState,
    /// Current target.
    pub target: WeaponTarget,
    /// Seconds until the next strike may start.
    #[serde(with = "fixed_serde")]
    pub cooldown: Fixed,
    /// Damage of the next strike.
    pub damage: u32,
    /// Engagement range.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
}

/// Per-tick state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity id.
    pub id: EntityId,
    /// Template id.
    pub type_id: String,
    /// Ground position.
    pub position: Vec2Fixed,
    /// Yaw rotation.
    pub rotation: QuatFixed,
    /// Airborne flag.
    pub airborne: bool,
    /// Body radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Owning player.
    pub player_id: PlayerId,
    /// Owning team.
    pub team_id: TeamId,
    /// Health pool.
    pub health: Pool,
    /// Shield pool.
    pub shield: Pool,
    /// Shield regeneration per second.
    #[serde(with = "fixed_serde")]
    pub shield_recharge_rate: Fixed,
    /// Travel speed.
    #[serde(with = "fixed_serde")]
    pub move_speed: Fixed,
    /// Sight radius.
    #[serde(with = "fixed_serde")]
    pub vision_range: Fixed,
    /// Sight cone in degrees.
    #[serde(with = "fixed_serde")]
    pub view_angle: Fixed,
    /// Equipped weapon.
    pub weapon: Option<WeaponSnapshot>,
    /// Applied equipment ids.
    pub equipment: Vec<String>,
    /// Behaviour state.
    pub ai_state: AiState,
    /// Stance mode, for toggle-mode units.
    pub stance: Option<StanceMode>,
    /// Stance switch in progress.
    pub toggling: bool,
    /// One-shot presentation flags raised since the previous snapshot.
    pub effects: EffectFlags,
}

impl EntitySnapshot {
    /// Capture an entity's replicated fields.
    #[must_use]
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            type_id: entity.type_id.clone(),
            position: entity.position,
            rotation: QuatFixed::from_facing(entity.facing),
            airborne: entity.airborne,
            radius: entity.radius,
            player_id: entity.player_id,
            team_id: entity.team_id,
            health: entity.health,
            shield: entity.shield,
            shield_recharge_rate: entity.shield_recharge_rate,
            move_speed: entity.move_speed,
            vision_range: entity.sensor.view_radius,
            view_angle: entity.sensor.view_angle,
            weapon: entity.primary_weapon().map(|w| WeaponSnapshot {
                type_id: w.type_id.clone(),
                state: w.state(),
                target: w.target(),
                cooldown: w.cooldown(),
                damage: w.current_damage(),
                range: w.range,
            }),
            equipment: entity.equipment.clone(),
            ai_state: entity.ai_state(),
            stance: entity.stance.map(|s| s.mode),
            toggling: entity.is_toggling(),
            effects: entity.effects,
        }
    }
}

/// Per-tick state of one capture point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePointSnapshot {
    /// Point id.
    pub id: CapturePointId,
    /// Center.
    pub position: Vec2Fixed,
    /// Capture radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Capture state.
    pub state: CaptureState,
    /// Team capturing.
    pub capturing_team: Option<TeamId>,
    /// Owner.
    pub owning_team: Option<TeamId>,
    /// Seconds of progress.
    #[serde(with = "fixed_serde")]
    pub capture_timer: Fixed,
}

impl CapturePointSnapshot {
    /// Capture a point's replicated fields.
    #[must_use]
    pub fn from_point(point: &CapturePoint) -> Self {
        Self {
            id: point.id,
            position: point.position,
            radius: point.radius,
            state: point.state(),
            capturing_team: point.capturing_team(),
            owning_team: point.owning_team(),
            capture_timer: point.capture_timer(),
        }
    }
}

/// Match phase and rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    /// Overall phase.
    pub phase: MatchPhase,
    /// Teams with score, players and resources.
    pub teams: Vec<Team>,
    /// Winner once completed.
    pub winner: Option<TeamId>,
}

impl GameStateSnapshot {
    /// Capture the game state.
    #[must_use]
    pub fn from_state(state: &GameState) -> Self {
        Self {
            phase: state.phase(),
            teams: state.teams().cloned().collect(),
            winner: state.winner(),
        }
    }

    /// Rebuild a read-only mirror.
    #[must_use]
    pub fn to_state(&self) -> GameState {
        GameState::from_parts(self.phase, self.teams.clone(), self.winner)
    }
}

/// Everything a client needs for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Simulation tick the snapshot was taken after.
    pub tick: u64,
    /// Living entities, sorted by id.
    pub entities: Vec<EntitySnapshot>,
    /// Capture points, sorted by id.
    pub capture_points: Vec<CapturePointSnapshot>,
    /// Match state.
    pub game: GameStateSnapshot,
}

/// Reliable one-shot notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchEvent {
    /// An entity died.
    EntityDeath {
        /// Dead entity.
        entity: EntityId,
    },
    /// An entity left the field without dying.
    EntityDespawn {
        /// Removed entity.
        entity: EntityId,
    },
    /// A capture point changed hands.
    CapturePointOwnerChanged {
        /// Point id.
        point: CapturePointId,
        /// Previous owner.
        previous: Option<TeamId>,
        /// New owner.
        owner: TeamId,
    },
    /// The match phase changed.
    GameStateTransition {
        /// Old phase.
        from: MatchPhase,
        /// New phase.
        to: MatchPhase,
        /// Winner when entering `GameCompleted`.
        winner: Option<TeamId>,
    },
}

/// Client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Claim a player slot.
    Hello {
        /// Requested slot.
        player_id: PlayerId,
    },
    /// Issue a command as the claimed player.
    Command(Command),
}

/// Server-to-client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Slot claimed.
    Welcome {
        /// Claimed slot.
        player_id: PlayerId,
        /// Team of the slot.
        team_id: TeamId,
    },
    /// Slot claim refused.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
    /// Full state.
    Snapshot(WorldSnapshot),
    /// One-shot event.
    Event(MatchEvent),
}

/// Encode a message with bincode.
///
/// # Errors
///
/// Returns [`GameError::Codec`] if serialization fails.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    bincode::serialize(message).map_err(|e| GameError::Codec(format!("Failed to encode: {e}")))
}

/// Decode a bincode message.
///
/// # Errors
///
/// Returns [`GameError::Codec`] if the bytes are not a valid `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| GameError::Codec(format!("Failed to decode: {e}")))
}

/// Encode a message as a length-prefixed frame.
///
/// # Errors
///
/// Returns [`GameError::Codec`] if encoding fails or the payload exceeds
/// [`MAX_FRAME_LEN`].
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let payload = encode(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(GameError::Codec(format!(
            "Frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            payload.len()
        )));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| GameError::Codec("Frame length overflow".to_string()))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Payload length announced by a frame header.
///
/// # Errors
///
/// Returns [`GameError::Codec`] if the length exceeds [`MAX_FRAME_LEN`].
pub fn frame_len(header: [u8; FRAME_HEADER_LEN]) -> Result<usize> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(GameError::Codec(format!(
            "Frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }
    Ok(len)
}

/// Split one complete frame off the front of `buffer`.
///
/// Returns `Ok(None)` if the buffer does not yet hold a whole frame.
///
/// # Errors
///
/// Returns [`GameError::Codec`] on an oversized header or a payload that
/// does not decode.
pub fn decode_frame<T: DeserializeOwned>(buffer: &[u8]) -> Result<Option<(T, usize)>> {
    let Some(header) = buffer.get(..FRAME_HEADER_LEN) else {
        return Ok(None);
    };
    let mut raw = [0u8; FRAME_HEADER_LEN];
    raw.copy_from_slice(header);
    let len = frame_len(raw)?;
    let Some(payload) = buffer.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len) else {
        return Ok(None);
    };
    Ok(Some((decode(payload)?, FRAME_HEADER_LEN + len)))
}
