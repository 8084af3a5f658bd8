//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! All world mutation goes through the single [`GameSession`]; this layer
//! only moves messages in and out.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{
    ClientMessage, ServerMessage, ChatLine, ChatTarget, ErrorCode, ServerError,
};
pub use session::{Audience, GameSession, Outbound, Welcome};
pub use server::{GameServer, ServerConfig, GameServerError};
