//! Engine Context
//!
//! [`Engine`] owns the whole world: the state store, the physics adapter,
//! the timer heap and the configuration. There are no globals; whoever owns
//! the engine owns the game.
//!
//! This file holds construction and the store operations. Collision rules,
//! timer firing and the tick live in their own modules as further `impl`
//! blocks on the same type.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::vec2::Vec2;
use crate::game::adapter::{EntityKind, PhysicsAdapter};
use crate::game::diff::PlayerView;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::schedule::Scheduler;
use crate::game::state::{Buff, FlagRef, GameState, KeyState, PlayerId, PlayerState, Score, Team};
use crate::game::tile::{Tile, TileGrid, TilePos};
use crate::physics::{ArenaPhysics, BodyId, PhysicsBackend, PhysicsError, Shape};

/// Engine failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Request rejected without touching the world
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Physics backend refused an operation
    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),
}

/// The authoritative game.
#[derive(Debug)]
pub struct Engine<P: PhysicsBackend = ArenaPhysics> {
    pub(crate) state: GameState,
    pub(crate) bodies: PhysicsAdapter<P>,
    pub(crate) timers: Scheduler,
    pub(crate) config: EngineConfig,
}

impl Engine<ArenaPhysics> {
    /// Build an engine on the built-in physics backend.
    ///
    /// Without a map the built-in arena is used.
    pub fn new(config: EngineConfig, map: Option<TileGrid>) -> Result<Self, EngineError> {
        Self::with_backend(ArenaPhysics::new(), config, map)
    }
}

impl<P: PhysicsBackend> Engine<P> {
    /// Build an engine on any physics backend.
    pub fn with_backend(
        backend: P,
        config: EngineConfig,
        map: Option<TileGrid>,
    ) -> Result<Self, EngineError> {
        let grid = map.unwrap_or_else(TileGrid::default_arena);
        let mut engine = Self {
            state: GameState::new(TileGrid::default(), config.rng_seed),
            bodies: PhysicsAdapter::new(backend),
            timers: Scheduler::new(),
            config,
        };
        engine.check_world(&grid)?;
        engine.construct_world(grid)?;
        info!(
            width = engine.state.grid.width(),
            height = engine.state.grid.height(),
            entities = engine.bodies.tile_entity_count(),
            walls = engine.bodies.wall_shape_count(),
            "World constructed"
        );
        Ok(engine)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only world state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Physics adapter (bodies and tags).
    pub fn bodies(&self) -> &PhysicsAdapter<P> {
        &self.bodies
    }

    /// Pending timers.
    pub fn timers(&self) -> &Scheduler {
        &self.timers
    }

    /// Current tile grid.
    pub fn map(&self) -> &TileGrid {
        &self.state.grid
    }

    /// Team scores.
    pub fn score(&self) -> Score {
        self.state.score
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.state.tick
    }

    /// Engine clock in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.state.now_ms
    }

    /// A player's state.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.state.get_player(id)
    }

    /// World position of a player's body.
    pub fn player_position(&self, id: PlayerId) -> Option<Vec2> {
        self.state.get_player(id).and_then(|p| self.bodies.position(p.body))
    }

    /// Read-only projection of every player.
    pub fn players(&self) -> Vec<PlayerView> {
        self.state
            .players
            .values()
            .map(|p| {
                let position = self.bodies.position(p.body).unwrap_or(self.config.spawn_point);
                PlayerView::new(p, position)
            })
            .collect()
    }

    /// Drain events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        self.state.take_events()
    }

    // =========================================================================
    // Players
    // =========================================================================

    /// Add a player on the smaller team, spread out from the spawn point.
    pub fn add_player(&mut self) -> Result<PlayerId, EngineError> {
        let team = self.state.smaller_team();
        let offset = self.state.players.len() as f64 * self.config.spawn_spacing;
        let position = self.config.spawn_point + Vec2::new(offset, 0.0);

        let id = self.state.allocate_player_id();
        let body = self.bodies.spawn_dynamic(
            EntityKind::Player(id),
            self.config.player_mass,
            position,
            self.config.player_damping,
            Shape::Circle { radius: self.config.player_radius },
        )?;

        let player = PlayerState::new(id, body, team, self.config.player_name.clone());
        self.state.players.insert(id, player);
        info!(player = %id, ?team, "Player joined");
        self.state.push_event(GameEventData::PlayerJoined { player_id: id, team });
        Ok(id)
    }

    /// Remove a player and its body. Unknown ids are ignored.
    ///
    /// A carried flag goes back to its tile first.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerState> {
        let carrying = self.state.get_player(id)?.carrying.is_some();
        if carrying {
            self.drop_flag(id);
        }
        let player = self.state.players.remove(&id)?;
        self.bodies.remove_body(player.body);
        info!(player = %id, "Player left");
        self.state.push_event(GameEventData::PlayerLeft { player_id: id });
        Some(player)
    }

    /// Record a key press or release.
    ///
    /// Unknown key names are rejected; unknown players are ignored.
    pub fn key_press(&mut self, id: PlayerId, key: &str, pressed: bool) -> Result<(), EngineError> {
        if !KeyState::NAMES.contains(&key) {
            return Err(EngineError::InvalidInput(format!("unknown key '{key}'")));
        }
        if let Some(player) = self.state.get_player_mut(id) {
            player.keys.set(key, pressed);
        }
        Ok(())
    }

    // =========================================================================
    // Flags and score
    // =========================================================================

    /// Pick up a flag: mark its tile carried and remember it on the player.
    pub fn grab(&mut self, id: PlayerId, flag: FlagRef) {
        let Some(player) = self.state.get_player_mut(id) else {
            return;
        };
        if player.carrying.is_some() {
            return;
        }
        player.carrying = Some(flag);
        player.stats.grabs += 1;

        self.write_tile(flag.pos, Tile::Flag { team: flag.team, carried: true });
        info!(player = %id, flag = ?flag.team, "Flag grabbed");
        self.state.push_event(GameEventData::FlagGrabbed { player_id: id, flag: flag.team });
    }

    /// Score the carried flag for the carrier's team.
    pub fn capture(&mut self, id: PlayerId) {
        let Some(player) = self.state.get_player_mut(id) else {
            return;
        };
        let Some(flag) = player.carrying.take() else {
            return;
        };
        player.stats.captures += 1;
        let team = player.team;

        for mate in self.state.players.values_mut() {
            if mate.team == team && mate.id != id {
                mate.stats.support += 1;
            }
        }

        self.restore_flag(flag);
        self.state.score.add(team);
        info!(player = %id, ?team, score = ?self.state.score, "Flag captured");
        self.state.push_event(GameEventData::FlagCaptured { player_id: id, flag: flag.team });
        self.state.push_event(GameEventData::ScoreChanged { score: self.state.score });
    }

    /// Return the carried flag to its tile without scoring.
    pub fn drop_flag(&mut self, id: PlayerId) {
        let Some(player) = self.state.get_player_mut(id) else {
            return;
        };
        let Some(flag) = player.carrying.take() else {
            return;
        };
        player.stats.drops += 1;

        self.restore_flag(flag);
        debug!(player = %id, flag = ?flag.team, "Flag dropped");
        self.state.push_event(GameEventData::FlagDropped { player_id: id, flag: flag.team });
    }

    fn restore_flag(&mut self, flag: FlagRef) {
        // The tile may have been rewritten since the grab
        if self.state.grid.get(flag.pos) == Some(Tile::Flag { team: flag.team, carried: true }) {
            self.write_tile(flag.pos, Tile::Flag { team: flag.team, carried: false });
        }
    }

    // =========================================================================
    // Map
    // =========================================================================

    /// Replace a tile and its linked entity.
    ///
    /// The new entity is created before the old one goes, so a physics
    /// error leaves the tile and its entity as they were.
    pub fn update_tile(&mut self, pos: TilePos, tile: Tile) -> Result<(), EngineError> {
        let Some(current) = self.state.grid.get(pos) else {
            return Err(EngineError::InvalidInput(format!(
                "tile {pos} outside {}x{} grid",
                self.state.grid.width(),
                self.state.grid.height()
            )));
        };

        if tile == Tile::Wall {
            self.wall_shape().validate()?;
        }
        let previous = self.bodies.tile_entity(pos);
        self.spawn_tile_entity(pos, tile)?;
        if let Some(old) = previous {
            self.bodies.remove_body(old);
        }
        self.write_tile(pos, tile);
        if current == Tile::Wall || tile == Tile::Wall {
            self.rebuild_walls()?;
        }
        Ok(())
    }

    /// Replace the whole map, rebuilding every map entity.
    ///
    /// A grid whose entities cannot be built is rejected before the
    /// current world is touched.
    pub fn set_map(&mut self, grid: TileGrid) -> Result<(), EngineError> {
        self.check_world(&grid)?;
        // Flag references point into the old grid
        for player in self.state.players.values_mut() {
            player.carrying = None;
        }
        self.bodies.clear_map_bodies();
        self.construct_world(grid)?;
        info!(
            width = self.state.grid.width(),
            height = self.state.grid.height(),
            "Map reloaded"
        );
        self.state.push_event(GameEventData::MapReloaded);
        Ok(())
    }

    /// The single writer of tile codes.
    pub(crate) fn write_tile(&mut self, pos: TilePos, tile: Tile) {
        if self.state.grid.set(pos, tile) {
            self.state.push_event(GameEventData::TileChanged { pos, tile });
        }
    }

    /// Populate the physics world from a grid.
    ///
    /// Carried flags and cooldown bombs are reset, and spawn points get a
    /// random live power-up, so every occupied tile has exactly one entity.
    fn construct_world(&mut self, grid: TileGrid) -> Result<(), EngineError> {
        self.state.grid = grid;
        let tiles: Vec<(TilePos, Tile)> = self.state.grid.iter().collect();
        let tile_size = self.config.tile_size;

        for (pos, original) in tiles {
            let tile = match original.canonical() {
                Tile::PowerupSpawn => self.random_powerup(),
                other => other,
            };
            if tile != original {
                self.state.grid.set(pos, tile);
            }
            if tile == Tile::Wall {
                self.bodies.add_wall(pos.world(tile_size), tile_size)?;
            } else {
                self.spawn_tile_entity(pos, tile)?;
            }
        }
        Ok(())
    }

    fn rebuild_walls(&mut self) -> Result<(), EngineError> {
        self.bodies.clear_walls();
        let tile_size = self.config.tile_size;
        let walls: Vec<TilePos> = self
            .state
            .grid
            .iter()
            .filter(|(_, t)| *t == Tile::Wall)
            .map(|(pos, _)| pos)
            .collect();
        for pos in walls {
            self.bodies.add_wall(pos.world(tile_size), tile_size)?;
        }
        Ok(())
    }

    /// Check that every tile of `grid` can be given its entity.
    fn check_world(&self, grid: &TileGrid) -> Result<(), EngineError> {
        grid.iter().try_for_each(|(_, tile)| self.check_tile(tile))
    }

    /// Check the geometry a tile would be built with, as construction
    /// would canonicalise it.
    fn check_tile(&self, tile: Tile) -> Result<(), EngineError> {
        let shape = match tile.canonical() {
            Tile::Wall => Some(self.wall_shape()),
            // Every variant shares one radius
            Tile::PowerupSpawn => self.tile_body(Tile::Powerup(Buff::Grip)).map(|(_, s, _)| s),
            other => self.tile_body(other).map(|(_, s, _)| s),
        };
        if let Some(shape) = shape {
            shape.validate()?;
        }
        Ok(())
    }

    fn wall_shape(&self) -> Shape {
        Shape::Rect { width: self.config.tile_size, height: self.config.tile_size }
    }

    /// Kind, shape and sensor flag of the entity a tile calls for.
    fn tile_body(&self, tile: Tile) -> Option<(EntityKind, Shape, bool)> {
        let c = &self.config;
        let (kind, radius, sensor) = match tile {
            Tile::Flag { team, .. } => (EntityKind::Flag(team), c.flag_radius, true),
            Tile::Boost => (EntityKind::Boost, c.boost_radius, true),
            Tile::Powerup(buff) => (EntityKind::Powerup(buff), c.powerup_radius, true),
            Tile::Spike => (EntityKind::Spike, c.spike_radius, false),
            Tile::Bomb => (EntityKind::Bomb, c.bomb_radius, true),
            Tile::Empty
            | Tile::Wall
            | Tile::PowerupSpawn
            | Tile::BombCooldown
            | Tile::Other(_) => return None,
        };
        Some((kind, Shape::Circle { radius }, sensor))
    }

    /// Create the entity a tile code calls for, if any.
    pub(crate) fn spawn_tile_entity(
        &mut self,
        pos: TilePos,
        tile: Tile,
    ) -> Result<Option<BodyId>, EngineError> {
        let Some((kind, shape, sensor)) = self.tile_body(tile) else {
            return Ok(None);
        };
        let position = pos.world(self.config.tile_size);
        let body = self.bodies.spawn_static(kind, position, shape, sensor, Some(pos))?;
        Ok(Some(body))
    }

    /// Home position of a team's flag, if it is on the map and not carried.
    pub(crate) fn home_flag(&self, team: Team) -> Option<Vec2> {
        self.state
            .grid
            .iter()
            .find(|(_, t)| *t == Tile::Flag { team, carried: false })
            .map(|(pos, _)| pos.world(self.config.tile_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid_with(tiles: &[(usize, usize, Tile)]) -> TileGrid {
        let mut grid = TileGrid::walled(10, 10);
        for &(x, y, tile) in tiles {
            grid.set(TilePos::new(x, y), tile);
        }
        grid
    }

    fn engine(tiles: &[(usize, usize, Tile)]) -> Engine {
        Engine::new(EngineConfig::default(), Some(grid_with(tiles))).unwrap()
    }

    #[test]
    fn test_add_player_spreads_and_balances() {
        let mut engine = engine(&[]);
        let a = engine.add_player().unwrap();
        let b = engine.add_player().unwrap();
        let c = engine.add_player().unwrap();

        assert_eq!(engine.player_position(a), Some(Vec2::new(550.0, 550.0)));
        assert_eq!(engine.player_position(b), Some(Vec2::new(600.0, 550.0)));
        assert_eq!(engine.player_position(c), Some(Vec2::new(650.0, 550.0)));

        assert_eq!(engine.player(a).unwrap().team, Team::Red);
        assert_eq!(engine.player(b).unwrap().team, Team::Blue);
        assert_eq!(engine.player(c).unwrap().team, Team::Red);
        assert_eq!(engine.player(a).unwrap().name, "Some Ball");
    }

    #[test]
    fn test_remove_player() {
        let mut engine = engine(&[]);
        let id = engine.add_player().unwrap();
        let body = engine.player(id).unwrap().body;

        assert!(engine.remove_player(id).is_some());
        assert!(engine.player(id).is_none());
        assert!(engine.bodies().tag(body).is_none());
        assert!(engine.bodies().position(body).is_none());

        // Second removal is a no-op
        assert!(engine.remove_player(id).is_none());
        assert!(engine.remove_player(PlayerId(99)).is_none());
    }

    #[test]
    fn test_key_press() {
        let mut engine = engine(&[]);
        let id = engine.add_player().unwrap();

        engine.key_press(id, "left", true).unwrap();
        assert!(engine.player(id).unwrap().keys.left);

        let err = engine.key_press(id, "jump", true);
        assert!(matches!(err, Err(EngineError::InvalidInput(_))));
        assert_eq!(engine.player(id).unwrap().keys, KeyState { left: true, ..KeyState::default() });

        // Unknown player with a valid key: silently ignored
        assert!(engine.key_press(PlayerId(42), "up", true).is_ok());
    }

    #[test]
    fn test_update_tile_keeps_entity_linked() {
        let mut engine = engine(&[(3, 3, Tile::Spike)]);
        let pos = TilePos::new(3, 3);
        let spike = engine.bodies().tile_entity(pos).unwrap();

        engine.update_tile(pos, Tile::Boost).unwrap();
        let boost = engine.bodies().tile_entity(pos).unwrap();
        assert_ne!(spike, boost);
        assert_eq!(engine.bodies().tag(boost).unwrap().kind, EntityKind::Boost);
        assert_eq!(engine.map().get(pos), Some(Tile::Boost));

        engine.update_tile(pos, Tile::Empty).unwrap();
        assert_eq!(engine.bodies().tile_entity(pos), None);

        let events = engine.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1].data,
            GameEventData::TileChanged { tile: Tile::Empty, .. }
        ));
    }

    #[test]
    fn test_update_tile_out_of_range() {
        let mut engine = engine(&[]);
        let before = engine.map().clone();
        let err = engine.update_tile(TilePos::new(10, 0), Tile::Spike);
        assert!(matches!(err, Err(EngineError::InvalidInput(_))));
        assert_eq!(engine.map(), &before);
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_update_tile_walls() {
        let mut engine = engine(&[]);
        assert_eq!(engine.bodies().wall_shape_count(), 36);

        engine.update_tile(TilePos::new(5, 5), Tile::Wall).unwrap();
        assert_eq!(engine.bodies().wall_shape_count(), 37);

        engine.update_tile(TilePos::new(0, 0), Tile::Spike).unwrap();
        assert_eq!(engine.bodies().wall_shape_count(), 36);
        assert!(engine.bodies().tile_entity(TilePos::new(0, 0)).is_some());
    }

    #[test]
    fn test_grab_capture_drop() {
        let red = TilePos::new(2, 2);
        let blue = TilePos::new(7, 7);
        let mut engine = engine(&[
            (2, 2, Tile::Flag { team: Team::Red, carried: false }),
            (7, 7, Tile::Flag { team: Team::Blue, carried: false }),
        ]);
        let a = engine.add_player().unwrap();
        let rival = engine.add_player().unwrap();
        let ally = engine.add_player().unwrap();
        assert_eq!(engine.player(ally).unwrap().team, Team::Red);

        engine.grab(a, FlagRef { team: Team::Blue, pos: blue });
        assert_eq!(engine.map().get(blue), Some(Tile::Flag { team: Team::Blue, carried: true }));
        assert_eq!(engine.player(a).unwrap().stats.grabs, 1);

        engine.capture(a);
        assert_eq!(engine.score(), Score { r: 1, b: 0 });
        assert_eq!(engine.map().get(blue), Some(Tile::Flag { team: Team::Blue, carried: false }));
        assert_eq!(engine.map().get(red), Some(Tile::Flag { team: Team::Red, carried: false }));
        assert!(engine.player(a).unwrap().carrying.is_none());
        assert_eq!(engine.player(a).unwrap().stats.captures, 1);
        assert_eq!(engine.player(ally).unwrap().stats.support, 1);
        assert_eq!(engine.player(rival).unwrap().stats.support, 0);

        // Capturing with nothing carried changes nothing
        engine.capture(a);
        assert_eq!(engine.score(), Score { r: 1, b: 0 });

        engine.grab(a, FlagRef { team: Team::Blue, pos: blue });
        engine.drop_flag(a);
        assert_eq!(engine.map().get(blue), Some(Tile::Flag { team: Team::Blue, carried: false }));
        assert_eq!(engine.player(a).unwrap().stats.drops, 1);
        assert_eq!(engine.score(), Score { r: 1, b: 0 });
    }

    #[test]
    fn test_disconnect_drops_flag() {
        let blue = TilePos::new(7, 7);
        let mut engine = engine(&[(7, 7, Tile::Flag { team: Team::Blue, carried: false })]);
        let a = engine.add_player().unwrap();
        engine.grab(a, FlagRef { team: Team::Blue, pos: blue });

        engine.remove_player(a);
        assert_eq!(engine.map().get(blue), Some(Tile::Flag { team: Team::Blue, carried: false }));
    }

    #[test]
    fn test_construction_normalises_tiles() {
        let engine = engine(&[
            (2, 2, Tile::Flag { team: Team::Red, carried: true }),
            (3, 3, Tile::BombCooldown),
            (4, 4, Tile::PowerupSpawn),
            (5, 5, Tile::Other(2.0)),
        ]);
        assert_eq!(engine.map().get(TilePos::new(2, 2)), Some(Tile::Flag { team: Team::Red, carried: false }));
        assert_eq!(engine.map().get(TilePos::new(3, 3)), Some(Tile::Bomb));
        assert!(matches!(engine.map().get(TilePos::new(4, 4)), Some(Tile::Powerup(_))));
        assert_eq!(engine.map().get(TilePos::new(5, 5)), Some(Tile::Other(2.0)));
        assert_eq!(engine.bodies().tile_entity_count(), 3);
        assert!(engine.bodies().tile_entity(TilePos::new(5, 5)).is_none());
    }

    #[test]
    fn test_set_map_rebuilds_world() {
        let mut engine = engine(&[(3, 3, Tile::Spike), (4, 4, Tile::Boost)]);
        let id = engine.add_player().unwrap();

        let mut grid = TileGrid::walled(6, 6);
        grid.set(TilePos::new(2, 2), Tile::Powerup(Buff::Speed));
        engine.set_map(grid.clone()).unwrap();

        assert_eq!(engine.map(), &grid);
        assert_eq!(engine.bodies().tile_entity_count(), 1);
        assert_eq!(engine.bodies().wall_shape_count(), 20);
        assert!(engine.player(id).is_some());
        assert!(engine
            .take_events()
            .iter()
            .any(|e| e.data == GameEventData::MapReloaded));
    }

    #[test]
    fn test_invalid_geometry_is_an_error() {
        let config = EngineConfig { spike_radius: -1.0, ..EngineConfig::default() };
        let result = Engine::new(config, Some(grid_with(&[(3, 3, Tile::Spike)])));
        assert!(matches!(result, Err(EngineError::Physics(PhysicsError::InvalidGeometry(_)))));
    }

    #[test]
    fn test_failed_update_keeps_tile_and_entity() {
        let config = EngineConfig { powerup_radius: -1.0, ..EngineConfig::default() };
        let pos = TilePos::new(3, 3);
        let mut engine = Engine::new(config, Some(grid_with(&[(3, 3, Tile::Bomb)]))).unwrap();
        let bomb = engine.bodies().tile_entity(pos).unwrap();

        let err = engine.update_tile(pos, Tile::Powerup(Buff::Bomb));
        assert!(matches!(err, Err(EngineError::Physics(PhysicsError::InvalidGeometry(_)))));
        assert_eq!(engine.map().get(pos), Some(Tile::Bomb));
        assert_eq!(engine.bodies().tile_entity(pos), Some(bomb));
        assert_eq!(engine.bodies().tag(bomb).unwrap().kind, EntityKind::Bomb);
        assert!(engine.take_events().is_empty());

        // Tiles without an entity are still fine
        engine.update_tile(pos, Tile::PowerupSpawn).unwrap();
        assert_eq!(engine.bodies().tile_entity(pos), None);
    }

    #[test]
    fn test_rejected_map_leaves_world_alone() {
        let config = EngineConfig { powerup_radius: -1.0, ..EngineConfig::default() };
        let blue = TilePos::new(7, 7);
        let mut engine = Engine::new(
            config,
            Some(grid_with(&[(3, 3, Tile::Spike), (7, 7, Tile::Flag { team: Team::Blue, carried: false })])),
        )
        .unwrap();
        let a = engine.add_player().unwrap();
        engine.grab(a, FlagRef { team: Team::Blue, pos: blue });
        engine.take_events();
        let before = engine.map().clone();

        // A spawn point would become a live power-up
        let mut grid = TileGrid::walled(6, 6);
        grid.set(TilePos::new(2, 2), Tile::PowerupSpawn);
        assert!(engine.set_map(grid).is_err());

        assert_eq!(engine.map(), &before);
        assert_eq!(engine.bodies().tile_entity_count(), 2);
        assert_eq!(engine.bodies().wall_shape_count(), 36);
        assert!(engine.player(a).unwrap().carrying.is_some());
        assert!(engine.take_events().is_empty());
    }

    fn arb_tile() -> impl Strategy<Value = Tile> {
        prop_oneof![
            4 => Just(Tile::Empty),
            2 => Just(Tile::Wall),
            1 => Just(Tile::Flag { team: Team::Red, carried: false }),
            1 => Just(Tile::Flag { team: Team::Blue, carried: true }),
            1 => Just(Tile::Boost),
            1 => Just(Tile::PowerupSpawn),
            1 => Just(Tile::Powerup(Buff::Tagpro)),
            1 => Just(Tile::Spike),
            1 => Just(Tile::Bomb),
            1 => Just(Tile::BombCooldown),
        ]
    }

    proptest! {
        #[test]
        fn prop_one_entity_per_occupied_tile(
            columns in prop::collection::vec(prop::collection::vec(arb_tile(), 1..8), 1..8)
        ) {
            let mut grid = TileGrid::new(columns.len(), columns[0].len());
            for (x, column) in columns.iter().enumerate() {
                for (y, &tile) in column.iter().enumerate() {
                    grid.set(TilePos::new(x, y), tile);
                }
            }
            let walls = grid.iter().filter(|(_, t)| *t == Tile::Wall).count();
            let occupied = grid.iter().filter(|(_, t)| !matches!(t, Tile::Empty | Tile::Wall)).count();

            let engine = Engine::new(EngineConfig::default(), Some(grid)).unwrap();

            prop_assert_eq!(engine.bodies().tile_entity_count(), occupied);
            prop_assert_eq!(engine.bodies().wall_shape_count(), walls);
            let wall_bodies = usize::from(walls > 0);
            prop_assert_eq!(engine.bodies().backend().body_count(), occupied + wall_bodies);
            for (pos, tile) in engine.map().iter() {
                let linked = engine.bodies().tile_entity(pos).is_some();
                prop_assert_eq!(linked, !matches!(tile, Tile::Empty | Tile::Wall));
            }
        }
    }
}
