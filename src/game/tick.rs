//! Authoritative Simulation Tick
//!
//! One fixed step of the game. Order within a tick:
//!
//! 1. advance the clock and fire due timers
//! 2. step physics and apply collision rules to the contacts it returns
//! 3. turn held keys into forces (integrated by the *next* step)
//! 4. accumulate time-based stats

use tracing::{trace, warn};

use crate::core::vec2::Vec2;
use crate::game::engine::{Engine, EngineError};
use crate::game::events::GameEvent;
use crate::game::state::{Buff, Team};
use crate::physics::PhysicsBackend;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Contacts the physics step reported
    pub contacts: usize,
}

impl<P: PhysicsBackend> Engine<P> {
    /// Run one simulation tick.
    ///
    /// A physics error stops the tick where it happened; the clock has
    /// already advanced and events recorded so far stay pending.
    pub fn tick(&mut self) -> Result<TickResult, EngineError> {
        let previous_ms = self.state.now_ms;
        self.state.tick += 1;
        self.state.now_ms = self.config.tick_to_ms(self.state.tick);
        let elapsed_ms = self.state.now_ms - previous_ms;

        // 1. Timers
        self.fire_due_timers()?;

        // 2. Physics and collision rules
        let contacts = self.bodies.step(self.config.dt());
        let contact_count = contacts.len();
        for contact in contacts {
            #[cfg(feature = "debug-tracing")]
            trace!(?contact, tick = self.state.tick, "Contact");
            self.handle_contact(contact)?;
        }

        // 3. Input forces for the next step
        self.apply_input_forces();

        // 4. Stats
        self.accumulate_stats(elapsed_ms);

        let events = self.state.take_events();
        if !events.is_empty() {
            trace!(tick = self.state.tick, count = events.len(), "Tick events");
        }
        Ok(TickResult { events, contacts: contact_count })
    }

    /// Run ticks until the engine clock reaches `ms`, stopping at the first error.
    pub fn run_until(&mut self, ms: u64) -> Result<Vec<GameEvent>, EngineError> {
        let mut events = Vec::new();
        while self.state.now_ms < ms {
            match self.tick() {
                Ok(result) => events.extend(result.events),
                Err(e) => {
                    warn!(error = %e, tick = self.state.tick, "Tick aborted");
                    return Err(e);
                }
            }
        }
        Ok(events)
    }

    fn apply_input_forces(&mut self) {
        let amount = self.config.force_amount;
        for player in self.state.players.values() {
            if player.dead {
                continue;
            }
            let (dx, dy) = player.keys.direction();
            if dx == 0.0 && dy == 0.0 {
                continue;
            }
            let limit = if player.buffs.has(Buff::Grip) {
                self.config.force_limit * self.config.grip_multiplier
            } else {
                self.config.force_limit
            };
            let force = Vec2::new(dx * amount, dy * amount).clamp_axes(limit);
            if let Some(position) = self.bodies.position(player.body) {
                self.bodies.apply_force(player.body, force, position);
            }
        }
    }

    fn accumulate_stats(&mut self, elapsed_ms: u64) {
        let guard_radius = 2.0 * self.config.tile_size;
        let homes = [
            (Team::Red, self.home_flag(Team::Red)),
            (Team::Blue, self.home_flag(Team::Blue)),
        ];
        let positions: Vec<_> = self
            .state
            .players
            .values()
            .map(|p| self.bodies.position(p.body))
            .collect();

        for (player, position) in self.state.players.values_mut().zip(positions) {
            if player.carrying.is_some() {
                player.stats.hold += elapsed_ms;
            }
            if player.dead {
                continue;
            }
            let home = homes.iter().find(|(team, _)| *team == player.team).and_then(|(_, h)| *h);
            if let (Some(home), Some(position)) = (home, position) {
                if position.distance(home) <= guard_radius {
                    player.stats.prevent += elapsed_ms;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::game::schedule::TimerCommand;
    use crate::game::state::{FlagRef, PlayerId};
    use crate::game::tile::{Tile, TileGrid, TilePos};
    use crate::physics::ArenaPhysics;

    fn engine_with(grid: TileGrid, config: EngineConfig) -> Engine<ArenaPhysics> {
        Engine::new(config, Some(grid)).unwrap()
    }

    fn open_engine() -> Engine<ArenaPhysics> {
        engine_with(TileGrid::walled(30, 30), EngineConfig::default())
    }

    #[test]
    fn test_clock_advances() {
        let mut engine = open_engine();
        for _ in 0..60 {
            engine.tick().unwrap();
        }
        assert_eq!(engine.tick_count(), 60);
        assert_eq!(engine.now_ms(), 1000);
    }

    #[test]
    fn test_input_moves_player_next_tick() {
        let mut engine = open_engine();
        let id = engine.add_player().unwrap();
        engine.key_press(id, "down", true).unwrap();

        // Force is applied after this tick's step
        engine.tick().unwrap();
        assert_eq!(engine.player_position(id), Some(Vec2::new(550.0, 550.0)));

        engine.tick().unwrap();
        let pos = engine.player_position(id).unwrap();
        assert!(pos.y > 550.0);
        assert_eq!(pos.x, 550.0);
    }

    #[test]
    fn test_grip_raises_force_limit() {
        let mut plain = open_engine();
        let mut gripped = open_engine();
        let a = plain.add_player().unwrap();
        let b = gripped.add_player().unwrap();
        gripped.state.get_player_mut(b).unwrap().buffs.grant(Buff::Grip, 60_000);

        for (engine, id) in [(&mut plain, a), (&mut gripped, b)] {
            engine.key_press(id, "right", true).unwrap();
            engine.tick().unwrap();
            engine.tick().unwrap();
        }

        let slow = plain.player_position(a).unwrap().x - 550.0;
        let fast = gripped.player_position(b).unwrap().x - 550.0;
        // Limit 40 without grip, 60 with it
        assert!((fast / slow - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_dead_players_ignore_input() {
        let mut engine = open_engine();
        let id = engine.add_player().unwrap();
        engine.kill(id, None).unwrap();
        engine.key_press(id, "left", true).unwrap();

        for _ in 0..10 {
            engine.tick().unwrap();
        }
        assert_eq!(engine.player_position(id), Some(Vec2::new(550.0, 550.0)));
    }

    #[test]
    fn test_respawn_for_departed_player_is_ignored() {
        let mut engine = open_engine();
        let id = engine.add_player().unwrap();
        engine.kill(id, None).unwrap();
        engine.remove_player(id);

        assert!(engine.run_until(3500).is_ok());
        assert!(engine.player(id).is_none());
        assert!(engine.timers().is_empty());
    }

    #[test]
    fn test_buff_expires_without_contact() {
        let mut engine = open_engine();
        let id = engine.add_player().unwrap();
        engine.state.get_player_mut(id).unwrap().buffs.grant(Buff::Speed, 20_000);
        engine.schedule(20_000, TimerCommand::ExpireBuff(id, Buff::Speed));

        engine.run_until(19_980).unwrap();
        assert!(engine.player(id).unwrap().buffs.has(Buff::Speed));
        engine.run_until(20_000).unwrap();
        assert!(!engine.player(id).unwrap().buffs.has(Buff::Speed));
    }

    #[test]
    fn test_regrant_extends_buff() {
        let mut engine = open_engine();
        let id = engine.add_player().unwrap();

        engine.state.get_player_mut(id).unwrap().buffs.grant(Buff::Grip, 20_000);
        engine.schedule(20_000, TimerCommand::ExpireBuff(id, Buff::Grip));
        engine.run_until(5_000).unwrap();

        let until = engine.now_ms() + 20_000;
        engine.state.get_player_mut(id).unwrap().buffs.grant(Buff::Grip, until);
        engine.schedule(20_000, TimerCommand::ExpireBuff(id, Buff::Grip));

        // First timer fires but the buff was extended
        engine.run_until(20_500).unwrap();
        assert!(engine.player(id).unwrap().buffs.has(Buff::Grip));
        engine.run_until(until).unwrap();
        assert!(!engine.player(id).unwrap().buffs.has(Buff::Grip));
    }

    #[test]
    fn test_hold_and_prevent_accumulate() {
        let mut grid = TileGrid::walled(30, 30);
        // Red home flag right under the spawn point, blue flag elsewhere
        grid.set(TilePos::new(14, 14), Tile::Flag { team: Team::Red, carried: false });
        grid.set(TilePos::new(25, 25), Tile::Flag { team: Team::Blue, carried: false });
        let mut engine = engine_with(grid, EngineConfig::default());
        let id = engine.add_player().unwrap();

        engine.run_until(1000).unwrap();
        assert_eq!(engine.player(id).unwrap().stats.prevent, 1000);
        assert_eq!(engine.player(id).unwrap().stats.hold, 0);

        engine.grab(id, FlagRef { team: Team::Blue, pos: TilePos::new(25, 25) });
        engine.run_until(3000).unwrap();
        let stats = engine.player(id).unwrap().stats;
        assert_eq!(stats.hold, 2000);
        assert_eq!(stats.prevent, 3000);
    }

    #[test]
    fn test_regen_skips_rewritten_tile() {
        let config = EngineConfig { bomb_regen_ms: 100, ..EngineConfig::default() };
        let mut grid = TileGrid::walled(10, 10);
        grid.set(TilePos::new(5, 5), Tile::Bomb);
        let mut engine = engine_with(grid, config);
        let pos = TilePos::new(5, 5);

        engine.update_tile(pos, Tile::BombCooldown).unwrap();
        engine.schedule(100, TimerCommand::RegenBomb(pos));
        engine.update_tile(pos, Tile::Spike).unwrap();

        engine.run_until(200).unwrap();
        assert_eq!(engine.map().get(pos), Some(Tile::Spike));
        assert_eq!(engine.bodies().tile_entity_count(), 1);
    }

    #[test]
    fn test_failed_timer_keeps_later_timers() {
        let config = EngineConfig { powerup_radius: -1.0, ..EngineConfig::default() };
        let mut engine = engine_with(TileGrid::walled(30, 30), config);
        let pos = TilePos::new(4, 4);
        engine.state.grid.set(pos, Tile::PowerupSpawn);
        engine.schedule(3000, TimerCommand::RegenPowerup(pos));

        // Respawn lands on the same tick, queued after the regen
        let id = engine.add_player().unwrap();
        engine.kill(id, None).unwrap();
        assert_eq!(engine.timers().len(), 2);

        assert!(engine.run_until(3000).is_err());
        assert_eq!(engine.timers().len(), 1);
        assert_eq!(engine.map().get(pos), Some(Tile::PowerupSpawn));
        assert!(engine.bodies().tile_entity(pos).is_none());
        assert!(engine.player(id).unwrap().dead);

        engine.tick().unwrap();
        assert!(engine.timers().is_empty());
        assert!(!engine.player(id).unwrap().dead);
        assert_eq!(engine.player_position(id), Some(engine.config().spawn_point));
    }

    #[test]
    fn test_unknown_player_timer_is_noop() {
        let mut engine = open_engine();
        engine.schedule(10, TimerCommand::Respawn(PlayerId(77)));
        engine.schedule(10, TimerCommand::ExpireBuff(PlayerId(77), Buff::Bomb));
        assert!(engine.run_until(100).is_ok());
    }
}
