//! Delayed-Event Scheduler
//!
//! One-shot timers kept in a min-heap ordered by fire time, then by
//! insertion sequence. The tick drains due timers before stepping physics,
//! so timers never interleave with collision handling.
//!
//! Timers cannot be cancelled. Every command re-checks the world when it
//! fires and does nothing if its target is gone or has changed.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::debug;

use crate::game::engine::{Engine, EngineError};
use crate::game::events::GameEventData;
use crate::game::state::{Buff, PlayerId};
use crate::game::tile::{Tile, TilePos};
use crate::physics::{PhysicsBackend, Shape, ShapeDesc};

/// Work to run when a timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerCommand {
    /// Bring a dead player back at the spawn point
    Respawn(PlayerId),
    /// Clear a buff unless it was extended
    ExpireBuff(PlayerId, Buff),
    /// Turn a power-up spawn point back into a live power-up
    RegenPowerup(TilePos),
    /// Turn a bomb cooldown tile back into a live bomb
    RegenBomb(TilePos),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Timer {
    fire_at: u64,
    seq: u64,
    command: TimerCommand,
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending timers.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    heap: BinaryHeap<Reverse<Timer>>,
    next_seq: u64,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `command` no earlier than `now + delay_ms`.
    pub fn schedule(&mut self, now: u64, delay_ms: u64, command: TimerCommand) {
        let timer = Timer {
            fire_at: now.saturating_add(delay_ms),
            seq: self.next_seq,
            command,
        };
        self.next_seq += 1;
        self.heap.push(Reverse(timer));
    }

    /// Remove and return the earliest command due at `now`, if any.
    ///
    /// Timers leave the heap one at a time, so anything not yet popped
    /// survives a failure while an earlier command runs.
    pub fn pop_due(&mut self, now: u64) -> Option<TimerCommand> {
        let due = self.heap.peek().map_or(false, |Reverse(timer)| timer.fire_at <= now);
        if !due {
            return None;
        }
        self.heap.pop().map(|Reverse(timer)| timer.command)
    }

    /// Earliest pending fire time.
    pub fn next_fire_at(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(t)| t.fire_at)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// No pending timers?
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// =============================================================================
// FIRING
// =============================================================================

impl<P: PhysicsBackend> Engine<P> {
    /// Queue a command relative to the engine clock.
    pub(crate) fn schedule(&mut self, delay_ms: u64, command: TimerCommand) {
        self.timers.schedule(self.state.now_ms, delay_ms, command);
    }

    /// Fire every timer due at the current engine time.
    ///
    /// On error the failing command is spent; later timers stay queued
    /// and fire on the next tick.
    pub(crate) fn fire_due_timers(&mut self) -> Result<(), EngineError> {
        while let Some(command) = self.timers.pop_due(self.state.now_ms) {
            self.fire(command)?;
        }
        Ok(())
    }

    fn fire(&mut self, command: TimerCommand) -> Result<(), EngineError> {
        debug!(?command, now = self.state.now_ms, "Timer fired");
        match command {
            TimerCommand::Respawn(id) => self.respawn(id),
            TimerCommand::ExpireBuff(id, buff) => {
                let now = self.state.now_ms;
                let expired = self
                    .state
                    .get_player_mut(id)
                    .map_or(false, |p| p.buffs.expire(buff, now));
                if expired {
                    self.state.push_event(GameEventData::BuffExpired { player_id: id, buff });
                }
                Ok(())
            }
            TimerCommand::RegenPowerup(pos) => {
                if self.state.grid.get(pos) != Some(Tile::PowerupSpawn) {
                    return Ok(());
                }
                let variant = self.random_powerup();
                self.update_tile(pos, variant)
            }
            TimerCommand::RegenBomb(pos) => {
                if self.state.grid.get(pos) != Some(Tile::BombCooldown) {
                    return Ok(());
                }
                self.update_tile(pos, Tile::Bomb)
            }
        }
    }

    fn respawn(&mut self, id: PlayerId) -> Result<(), EngineError> {
        let Some(player) = self.state.get_player(id) else {
            return Ok(());
        };
        if !player.dead {
            return Ok(());
        }
        let body = player.body;

        self.bodies.reset_motion(body, self.config.spawn_point);
        self.bodies.set_damping(body, self.config.player_damping);
        self.bodies.clear_shapes(body);
        self.bodies.attach_shape(
            body,
            ShapeDesc::solid(Shape::Circle { radius: self.config.player_radius }),
        )?;

        if let Some(player) = self.state.get_player_mut(id) {
            player.dead = false;
        }
        debug!(player = %id, "Player respawned");
        self.state.push_event(GameEventData::PlayerRespawned { player_id: id });
        Ok(())
    }

    /// A live power-up tile with a random variant.
    pub(crate) fn random_powerup(&mut self) -> Tile {
        let buff = self
            .state
            .rng
            .choose(&Buff::ALL)
            .copied()
            .unwrap_or(Buff::Grip);
        Tile::Powerup(buff)
    }
}
