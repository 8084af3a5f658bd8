//! Configuration
//!
//! [`EngineConfig`] tunes the simulation; [`Settings`] is what the binary
//! reads at startup (map override, engine tuning, bind address).

use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::vec2::Vec2;
use crate::game::tile::TileGrid;

/// Simulation parameters. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Simulation rate (ticks per second)
    pub tick_rate: u32,
    /// World units per tile
    pub tile_size: f64,
    /// Where players respawn
    pub spawn_point: Vec2,
    /// Horizontal gap between players joining at the same time
    pub spawn_spacing: f64,

    /// Player body radius
    pub player_radius: f64,
    /// Player body mass
    pub player_mass: f64,
    /// Player damping while alive
    pub player_damping: f64,
    /// Player damping while dead
    pub dead_damping: f64,
    /// Name given to new players
    pub player_name: String,

    /// Input force per held axis
    pub force_amount: f64,
    /// Per-axis clamp on input force
    pub force_limit: f64,
    /// Force limit multiplier while the grip buff is active
    pub grip_multiplier: f64,
    /// Boost pad force
    pub boost_force: f64,

    /// Explosion rating when a player dies (type 0)
    pub pop_force: f64,
    /// Explosion rating of a rolling bomb buff (type 1)
    pub rolling_bomb_force: f64,
    /// Explosion rating of a bomb tile (type 2)
    pub bomb_force: f64,

    /// Flag sensor radius
    pub flag_radius: f64,
    /// Boost sensor radius
    pub boost_radius: f64,
    /// Power-up sensor radius
    pub powerup_radius: f64,
    /// Bomb sensor radius
    pub bomb_radius: f64,
    /// Spike radius
    pub spike_radius: f64,

    /// Respawn delay
    pub respawn_ms: u64,
    /// Buff duration
    pub buff_ms: u64,
    /// Power-up tile regeneration delay
    pub powerup_regen_ms: u64,
    /// Bomb tile regeneration delay
    pub bomb_regen_ms: u64,

    /// RNG seed for power-up variants
    pub rng_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            tile_size: 40.0,
            spawn_point: Vec2::new(550.0, 550.0),
            spawn_spacing: 50.0,

            player_radius: 19.0,
            player_mass: 0.075,
            player_damping: 0.6,
            dead_damping: 1.0,
            player_name: "Some Ball".to_string(),

            force_amount: 60.0,
            force_limit: 40.0,
            grip_multiplier: 1.5,
            boost_force: 4000.0,

            pop_force: 10_000.0,
            rolling_bomb_force: 40_000.0,
            bomb_force: 40_000.0,

            flag_radius: 16.0,
            boost_radius: 16.0,
            powerup_radius: 16.0,
            bomb_radius: 16.0,
            spike_radius: 12.0,

            respawn_ms: 3000,
            buff_ms: 20_000,
            powerup_regen_ms: 60_000,
            bomb_regen_ms: 30_000,

            rng_seed: 0x5EED,
        }
    }
}

impl EngineConfig {
    /// Seconds per tick.
    #[inline]
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate.max(1) as f64
    }

    /// Engine clock at a given tick.
    #[inline]
    pub fn tick_to_ms(&self, tick: u64) -> u64 {
        tick * 1000 / self.tick_rate.max(1) as u64
    }
}

/// Startup settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Map override; the built-in arena is used when absent
    pub map: Option<TileGrid>,
    /// Engine tuning
    pub engine: EngineConfig,
    /// Listen address override
    pub bind_addr: Option<String>,
}

/// Errors loading [`Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid settings JSON
    #[error("Invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The configured map, or the built-in arena.
    pub fn map_or_default(&self) -> TileGrid {
        self.map.clone().unwrap_or_else(TileGrid::default_arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tile::{Tile, TilePos};

    #[test]
    fn test_partial_settings() {
        let settings = Settings::from_json(
            r#"{ "engine": { "powerup_regen_ms": 5000 }, "map": [[1, 1], [1, 7]] }"#,
        )
        .unwrap();

        assert_eq!(settings.engine.powerup_regen_ms, 5000);
        assert_eq!(settings.engine.respawn_ms, 3000);
        assert_eq!(settings.engine.player_name, "Some Ball");
        let map = settings.map_or_default();
        assert_eq!(map.get(TilePos::new(1, 1)), Some(Tile::Spike));
        assert!(settings.bind_addr.is_none());
    }

    #[test]
    fn test_empty_settings_use_default_arena() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.map_or_default(), TileGrid::default_arena());
    }

    #[test]
    fn test_bad_settings() {
        assert!(matches!(Settings::from_json("{ nope"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Settings::load("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_clock() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_to_ms(60), 1000);
        assert_eq!(config.tick_to_ms(180), 3000);
        assert_eq!(config.tick_to_ms(1), 16);
    }
}
