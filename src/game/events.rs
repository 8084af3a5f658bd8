//! Game Events
//!
//! Everything observable that happened during a tick, in the order it
//! happened. The session layer turns the client-visible ones into
//! outgoing messages; the rest are for logging and tests.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::collision::ExplosionKind;
use crate::game::state::{Buff, PlayerId, Score, Team};
use crate::game::tile::{Tile, TilePos};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// A tile code was rewritten
    TileChanged {
        /// Rewritten tile
        pos: TilePos,
        /// Its new value
        tile: Tile,
    },

    /// The whole map was replaced
    MapReloaded,

    /// A capture changed the score
    ScoreChanged {
        /// Score after the capture
        score: Score,
    },

    /// Explosion other than a death pop
    Explosion {
        /// Centre in world units
        position: Vec2,
        /// What blew up
        kind: ExplosionKind,
    },

    /// Player joined
    PlayerJoined {
        /// Player concerned
        player_id: PlayerId,
        /// Team it was balanced onto
        team: Team,
    },

    /// Player left
    PlayerLeft {
        /// Player concerned
        player_id: PlayerId,
    },

    /// Player died
    PlayerKilled {
        /// Who died
        victim_id: PlayerId,
        /// Enemy credited with the kill, if any
        killer_id: Option<PlayerId>,
    },

    /// Player came back at the spawn point
    PlayerRespawned {
        /// Player concerned
        player_id: PlayerId,
    },

    /// Player picked up an enemy flag
    FlagGrabbed {
        /// Player concerned
        player_id: PlayerId,
        /// Team owning the flag
        flag: Team,
    },

    /// Player brought a flag home
    FlagCaptured {
        /// Player concerned
        player_id: PlayerId,
        /// Team owning the flag
        flag: Team,
    },

    /// Carried flag went back to its tile without a capture
    FlagDropped {
        /// Player concerned
        player_id: PlayerId,
        /// Team owning the flag
        flag: Team,
    },

    /// Power-up picked up
    BuffGranted {
        /// Player concerned
        player_id: PlayerId,
        /// Granted buff
        buff: Buff,
    },

    /// Buff ran out
    BuffExpired {
        /// Player concerned
        player_id: PlayerId,
        /// Expired buff
        buff: Buff,
    },
}

/// A game event with timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self { tick, data }
    }

    /// Player involved, if any.
    pub fn player_id(&self) -> Option<PlayerId> {
        match &self.data {
            GameEventData::PlayerJoined { player_id, .. }
            | GameEventData::PlayerLeft { player_id }
            | GameEventData::PlayerRespawned { player_id }
            | GameEventData::FlagGrabbed { player_id, .. }
            | GameEventData::FlagCaptured { player_id, .. }
            | GameEventData::FlagDropped { player_id, .. }
            | GameEventData::BuffGranted { player_id, .. }
            | GameEventData::BuffExpired { player_id, .. } => Some(*player_id),
            GameEventData::PlayerKilled { victim_id, .. } => Some(*victim_id),
            _ => None,
        }
    }
}
