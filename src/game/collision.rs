//! Collision Rules
//!
//! Applies game rules to the begin-contacts returned by a physics step.
//! Each contact is looked up in the adapter's tag table when it is handled,
//! so a body removed by an earlier contact in the same step is skipped.

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::vec2::Vec2;
use crate::game::adapter::{BodyTag, EntityKind};
use crate::game::engine::{Engine, EngineError};
use crate::game::events::GameEventData;
use crate::game::schedule::TimerCommand;
use crate::game::state::{Buff, FlagRef, PlayerId, Team};
use crate::game::tile::{Tile, TilePos};
use crate::physics::{BodyId, Contact, PhysicsBackend};

/// Explosion type, as sent to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExplosionKind {
    /// A player dying
    Pop = 0,
    /// A rolling bomb buff going off on enemy contact
    RollingBomb = 1,
    /// A bomb tile
    BombTile = 2,
}

impl ExplosionKind {
    /// Wire code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Force an explosion applies to a target.
///
/// Magnitude falls off as `base / (dx² + dy²)^(1/4)` along the direction
/// from the centre to the target. Targets that would receive more than
/// `base` (closer than one unit, including the centre itself) get nothing.
pub fn explosion_force(center: Vec2, target: Vec2, base: f64) -> Option<Vec2> {
    let delta = target - center;
    let magnitude = base / delta.length_squared().powf(0.25);
    if !magnitude.is_finite() || magnitude > base {
        return None;
    }
    Some(Vec2::from_angle(delta.angle()).scale(magnitude))
}

impl<P: PhysicsBackend> Engine<P> {
    /// Apply the rule table to one begin-contact.
    pub fn handle_contact(&mut self, contact: Contact) -> Result<(), EngineError> {
        let (Some(a), Some(b)) = (self.bodies.tag(contact.a), self.bodies.tag(contact.b)) else {
            return Ok(());
        };
        match (a.kind, b.kind) {
            (EntityKind::Player(pa), EntityKind::Player(pb)) => self.player_vs_player(pa, pb),
            (EntityKind::Player(player), _) => self.player_touch(player, contact.b, b),
            (_, EntityKind::Player(player)) => self.player_touch(player, contact.a, a),
            _ => Ok(()),
        }
    }

    fn player_touch(&mut self, id: PlayerId, body: BodyId, tag: BodyTag) -> Result<(), EngineError> {
        if !self.state.get_player(id).map_or(false, |p| p.is_alive()) {
            return Ok(());
        }
        match tag.kind {
            EntityKind::Spike => self.kill(id, None),
            EntityKind::Bomb => self.detonate_bomb_tile(body, tag.map_id),
            EntityKind::Boost => {
                self.boost(id, body);
                Ok(())
            }
            EntityKind::Powerup(buff) => self.pick_up(id, buff, tag.map_id),
            EntityKind::Flag(team) => {
                if let Some(pos) = tag.map_id {
                    self.touch_flag(id, team, pos);
                }
                Ok(())
            }
            EntityKind::Wall | EntityKind::Player(_) => Ok(()),
        }
    }

    fn touch_flag(&mut self, id: PlayerId, flag: Team, pos: TilePos) {
        let Some(player) = self.state.get_player(id) else {
            return;
        };
        let (team, carrying) = (player.team, player.carrying.is_some());

        if flag != team && !carrying {
            let at_home = self.state.grid.get(pos) == Some(Tile::Flag { team: flag, carried: false });
            if at_home {
                self.grab(id, FlagRef { team: flag, pos });
            }
        } else if flag == team && carrying {
            self.capture(id);
        }
    }

    fn boost(&mut self, id: PlayerId, pad: BodyId) {
        let Some(player) = self.state.get_player(id) else {
            return;
        };
        let body = player.body;
        let (Some(state), Some(pad_pos)) = (self.bodies.body_state(body), self.bodies.position(pad)) else {
            return;
        };
        let heading = state.velocity.angle();
        let force = Vec2::from_angle(heading).scale(self.config.boost_force);
        let point = pad_pos.mirrored_through(state.position);
        debug!(player = %id, ?force, "Boost");
        self.bodies.apply_force(body, force, point);
    }

    fn pick_up(&mut self, id: PlayerId, buff: Buff, map_id: Option<TilePos>) -> Result<(), EngineError> {
        let until = self.state.now_ms + self.config.buff_ms;
        if let Some(player) = self.state.get_player_mut(id) {
            player.buffs.grant(buff, until);
        }
        self.schedule(self.config.buff_ms, TimerCommand::ExpireBuff(id, buff));
        debug!(player = %id, ?buff, "Power-up picked up");
        self.state.push_event(GameEventData::BuffGranted { player_id: id, buff });

        if let Some(pos) = map_id {
            self.update_tile(pos, Tile::PowerupSpawn)?;
            self.schedule(self.config.powerup_regen_ms, TimerCommand::RegenPowerup(pos));
        }
        Ok(())
    }

    fn detonate_bomb_tile(&mut self, bomb: BodyId, map_id: Option<TilePos>) -> Result<(), EngineError> {
        let Some(center) = self.bodies.position(bomb) else {
            return Ok(());
        };
        self.explode(center, self.config.bomb_force, ExplosionKind::BombTile);

        match map_id {
            Some(pos) => {
                self.update_tile(pos, Tile::BombCooldown)?;
                self.schedule(self.config.bomb_regen_ms, TimerCommand::RegenBomb(pos));
            }
            None => self.bodies.remove_body(bomb),
        }
        Ok(())
    }

    fn player_vs_player(&mut self, a: PlayerId, b: PlayerId) -> Result<(), EngineError> {
        let (Some(pa), Some(pb)) = (self.state.get_player(a), self.state.get_player(b)) else {
            return Ok(());
        };
        if pa.team == pb.team || !pa.is_alive() || !pb.is_alive() {
            return Ok(());
        }

        // Bomb shields are sampled before any bomb goes off
        let a_bomb = pa.buffs.has(Buff::Bomb);
        let b_bomb = pb.buffs.has(Buff::Bomb);
        let a_tagpro = pa.buffs.has(Buff::Tagpro);
        let b_tagpro = pb.buffs.has(Buff::Tagpro);

        for (holder, armed) in [(a, a_bomb), (b, b_bomb)] {
            if armed {
                self.detonate_rolling_bomb(holder);
            }
        }

        if a_tagpro && !b_bomb {
            self.tag(a, b)?;
        }
        if b_tagpro && !a_bomb {
            self.tag(b, a)?;
        }
        Ok(())
    }

    fn detonate_rolling_bomb(&mut self, holder: PlayerId) {
        let Some(player) = self.state.get_player_mut(holder) else {
            return;
        };
        player.buffs.clear(Buff::Bomb);
        let body = player.body;
        if let Some(center) = self.bodies.position(body) {
            self.explode(center, self.config.rolling_bomb_force, ExplosionKind::RollingBomb);
        }
    }

    fn tag(&mut self, tagger: PlayerId, victim: PlayerId) -> Result<(), EngineError> {
        if !self.state.get_player(victim).map_or(false, |p| p.is_alive()) {
            return Ok(());
        }
        if let Some(player) = self.state.get_player_mut(tagger) {
            player.stats.tags += 1;
        }
        self.kill(victim, Some(tagger))
    }

    /// Kill a player: drop its flag, pop, and queue the respawn.
    pub(crate) fn kill(&mut self, victim: PlayerId, killer: Option<PlayerId>) -> Result<(), EngineError> {
        let Some(player) = self.state.get_player(victim) else {
            return Ok(());
        };
        if player.dead {
            return Ok(());
        }
        let body = player.body;
        let carrying = player.carrying.is_some();

        if carrying {
            self.drop_flag(victim);
            if let Some(player) = killer.and_then(|k| self.state.get_player_mut(k)) {
                player.stats.returns += 1;
            }
        }

        self.bodies.clear_shapes(body);
        if let Some(center) = self.bodies.position(body) {
            self.explode(center, self.config.pop_force, ExplosionKind::Pop);
        }
        self.bodies.zero_force(body);
        self.bodies.set_damping(body, self.config.dead_damping);

        if let Some(player) = self.state.get_player_mut(victim) {
            player.dead = true;
            player.stats.pops += 1;
        }
        self.schedule(self.config.respawn_ms, TimerCommand::Respawn(victim));

        info!(victim = %victim, killer = ?killer, "Player killed");
        self.state.push_event(GameEventData::PlayerKilled { victim_id: victim, killer_id: killer });
        Ok(())
    }

    /// Push every live player away from `center`.
    pub(crate) fn explode(&mut self, center: Vec2, base: f64, kind: ExplosionKind) {
        let targets: Vec<BodyId> = self
            .state
            .players
            .values()
            .filter(|p| p.is_alive())
            .map(|p| p.body)
            .collect();

        for body in targets {
            let Some(position) = self.bodies.position(body) else {
                continue;
            };
            if let Some(force) = explosion_force(center, position, base) {
                self.bodies.apply_force(body, force, position);
            }
        }

        if kind != ExplosionKind::Pop {
            debug!(?center, ?kind, "Explosion");
            self.state.push_event(GameEventData::Explosion { position: center, kind });
        }
    }
}
