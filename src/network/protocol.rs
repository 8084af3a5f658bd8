//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

use serde::{Serialize, Deserialize};

use crate::game::diff::PlayerDiff;
use crate::game::state::Score;
use crate::game::tile::TileGrid;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// A movement key went down.
    #[serde(rename = "keydown")]
    KeyDown(KeyInput),

    /// A movement key went up.
    #[serde(rename = "keyup")]
    KeyUp(KeyInput),

    /// Chat line from the player.
    #[serde(rename = "chat")]
    Chat(ChatRequest),

    /// Heartbeat, answered with `pr`.
    #[serde(rename = "p")]
    Ping(Heartbeat),
}

/// Key name carried by `keydown`/`keyup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    /// One of `up`, `down`, `left`, `right`.
    pub k: String,
}

/// Outgoing chat from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Text.
    pub message: String,
    /// Everyone, or only the sender's team.
    #[serde(rename = "toAll", default)]
    pub to_all: bool,
}

/// Heartbeat payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Client-chosen id, echoed back.
    pub id: u64,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Assigned player id, once at connect.
    #[serde(rename = "id")]
    Id(u32),

    /// Full tile grid, at connect and on every reload.
    #[serde(rename = "map")]
    Map(MapSnapshot),

    /// Team scores.
    #[serde(rename = "score")]
    Score(Score),

    /// Match clock. Sent once at connect; the clock itself is not run.
    #[serde(rename = "time")]
    Time(TimeInfo),

    /// Changed player fields since this connection's last broadcast.
    #[serde(rename = "p")]
    Players(Vec<PlayerDiff>),

    /// One tile was rewritten.
    #[serde(rename = "mapupdate")]
    MapUpdate(TileUpdate),

    /// Something other than a death pop exploded.
    #[serde(rename = "bomb")]
    Bomb(Blast),

    /// Chat line.
    #[serde(rename = "chat")]
    Chat(ChatLine),

    /// A player disconnected.
    #[serde(rename = "playerLeft")]
    PlayerLeft(u32),

    /// Heartbeat reply carrying the client's id.
    #[serde(rename = "pr")]
    Pong(u64),

    /// Request was rejected.
    #[serde(rename = "error")]
    Error(ServerError),
}

/// Map payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    /// Column-major tile codes.
    pub tiles: TileGrid,
}

/// Match clock payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInfo {
    /// Time remaining.
    pub tile: u64,
    /// Clock state.
    pub state: u8,
}

impl Default for TimeInfo {
    fn default() -> Self {
        Self { tile: 0, state: 1 }
    }
}

/// Single tile rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileUpdate {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
    /// New tile code.
    pub v: f64,
}

/// Explosion location and kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Blast {
    /// World x.
    pub x: f64,
    /// World y.
    pub y: f64,
    /// 1 for a rolling bomb, 2 for a bomb tile.
    #[serde(rename = "type")]
    pub kind: u8,
}

/// Who a chat line is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTarget {
    /// Every connection.
    All,
    /// The sender's team.
    Team,
}

/// Chat line as relayed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    /// Sender, `None` for server notices.
    pub from: Option<u32>,
    /// Audience.
    pub to: ChatTarget,
    /// Text.
    pub message: String,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed frame, unknown key name or similar.
    InvalidInput,
    /// Connection limit reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
