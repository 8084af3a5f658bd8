//! # Tileball Game Server
//!
//! Authoritative engine and WebSocket server for Tileball, a tile-based
//! capture-the-flag arena.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TILEBALL SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── vec2.rs     - 2D vector                                 │
//! │  └── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │                                                              │
//! │  physics/        - Capability interface + built-in backend   │
//! │  └── arena.rs    - Circles, boxes, sensors, begin-contacts   │
//! │                                                              │
//! │  game/           - Game logic (authoritative)                │
//! │  ├── tile.rs     - Tile codes and the map grid               │
//! │  ├── state.rs    - Players, teams, buffs, score              │
//! │  ├── engine.rs   - Engine context and store operations       │
//! │  ├── adapter.rs  - Bodies tagged with game identity          │
//! │  ├── collision.rs- Rules applied to contacts                 │
//! │  ├── schedule.rs - Respawn, expiry and regeneration timers   │
//! │  ├── tick.rs     - Fixed-step simulation loop                │
//! │  └── diff.rs     - Per-viewer player diffs                   │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── session.rs  - The shared session and its feed           │
//! │                                                              │
//! │  config.rs       - Engine tuning and startup settings        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Everything that mutates the world (ticks, timers, contacts, input,
//! joins and leaves) runs one at a time through a single [`game::Engine`].
//! Contacts come back from the physics step as a list, and timers live in
//! a min-heap drained at the start of each tick, so a timer firing for a
//! player who has already left is just a failed lookup.
//!
//! Given the same seed, map and input order the engine produces the same
//! world.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;
pub mod physics;

// Re-export commonly used types
pub use config::{EngineConfig, Settings};
pub use core::vec2::Vec2;
pub use core::rng::DeterministicRng;
pub use game::{Engine, EngineError, PlayerId, Team, Tile, TileGrid, TilePos};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
