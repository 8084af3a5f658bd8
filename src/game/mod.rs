//! Game Logic Module
//!
//! The authoritative engine. Deterministic for a given seed and input order.
//!
//! ## Module Structure
//!
//! - `tile`: Tile codes and the map grid
//! - `state`: Players, teams, buffs, stats, score
//! - `engine`: The engine context and store operations
//! - `adapter`: Physics bodies tagged with game identity
//! - `collision`: Rules applied to begin-contacts
//! - `schedule`: Delayed commands (respawn, buff expiry, regeneration)
//! - `tick`: Fixed-step loop
//! - `diff`: Per-viewer delta encoding of player state
//! - `events`: Game events

pub mod tile;
pub mod state;
pub mod engine;
pub mod adapter;
pub mod collision;
pub mod schedule;
pub mod tick;
pub mod diff;
pub mod events;

// Re-export key types
pub use tile::{Tile, TileGrid, TilePos};
pub use state::{Buff, GameState, PlayerId, PlayerState, Score, Stats, Team};
pub use engine::{Engine, EngineError};
pub use adapter::{BodyTag, EntityKind, PhysicsAdapter};
pub use collision::{explosion_force, ExplosionKind};
pub use schedule::{Scheduler, TimerCommand};
pub use tick::TickResult;
pub use diff::{DiffBroadcaster, PlayerDiff, PlayerView};
pub use events::{GameEvent, GameEventData};
