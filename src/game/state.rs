//! Game State Definitions
//!
//! All state types owned by the engine: players, teams, buffs, stats and
//! the score. Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::tile::{TileGrid, TilePos};
use crate::physics::BodyId;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Engine-assigned player identifier.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TEAM
// =============================================================================

/// Team 1 (red) or team 2 (blue).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Team {
    /// Team 1, flag code 3
    Red = 1,
    /// Team 2, flag code 4
    Blue = 2,
}

impl Team {
    /// Wire number (1 or 2).
    #[inline]
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Tile code of this team's flag at home.
    pub fn flag_code(self) -> f64 {
        match self {
            Team::Red => 3.0,
            Team::Blue => 4.0,
        }
    }
}

// =============================================================================
// BUFFS
// =============================================================================

/// Timed power-up effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Buff {
    /// Raises the input force limit (tile 6.1)
    Grip,
    /// Rolling bomb: detonates on the next enemy contact (tile 6.2)
    Bomb,
    /// Kills enemies on contact (tile 6.3)
    Tagpro,
    /// Speed (tile 6.4)
    Speed,
}

impl Buff {
    /// Every variant, in tile-code order.
    pub const ALL: [Buff; 4] = [Buff::Grip, Buff::Bomb, Buff::Tagpro, Buff::Speed];

    /// Tile code of the live power-up granting this buff.
    pub fn tile_code(self) -> f64 {
        match self {
            Buff::Grip => 6.1,
            Buff::Bomb => 6.2,
            Buff::Tagpro => 6.3,
            Buff::Speed => 6.4,
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Expiry time (engine ms) per buff; `None` when inactive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffs {
    expires_at: [Option<u64>; 4],
}

impl Buffs {
    /// Is the buff active?
    #[inline]
    pub fn has(&self, buff: Buff) -> bool {
        self.expires_at[buff.index()].is_some()
    }

    /// When the buff runs out.
    pub fn expiry(&self, buff: Buff) -> Option<u64> {
        self.expires_at[buff.index()]
    }

    /// Activate (or extend) a buff until `until`.
    pub fn grant(&mut self, buff: Buff, until: u64) {
        let slot = &mut self.expires_at[buff.index()];
        *slot = Some(slot.map_or(until, |current| current.max(until)));
    }

    /// Deactivate a buff.
    pub fn clear(&mut self, buff: Buff) {
        self.expires_at[buff.index()] = None;
    }

    /// Clear the buff if its expiry has passed. Returns true if it was cleared.
    pub fn expire(&mut self, buff: Buff, now: u64) -> bool {
        match self.expires_at[buff.index()] {
            Some(at) if at <= now => {
                self.clear(buff);
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// INPUT
// =============================================================================

/// Held movement keys, as last reported by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    /// Up
    pub up: bool,
    /// Down
    pub down: bool,
    /// Left
    pub left: bool,
    /// Right
    pub right: bool,
}

impl KeyState {
    /// Recognised key names.
    pub const NAMES: [&'static str; 4] = ["up", "down", "left", "right"];

    /// Set a key by name. Returns false for unknown names.
    pub fn set(&mut self, key: &str, pressed: bool) -> bool {
        let slot = match key {
            "up" => &mut self.up,
            "down" => &mut self.down,
            "left" => &mut self.left,
            "right" => &mut self.right,
            _ => return false,
        };
        *slot = pressed;
        true
    }

    /// Per-axis direction in `{-1, 0, 1}`; y grows downwards.
    pub fn direction(&self) -> (f64, f64) {
        let axis = |neg: bool, pos: bool| match (neg, pos) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        };
        (axis(self.left, self.right), axis(self.up, self.down))
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Per-player counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Flags captured
    pub captures: u32,
    /// Flags lost while carrying
    pub drops: u32,
    /// Flags grabbed
    pub grabs: u32,
    /// Milliseconds spent carrying a flag
    pub hold: u64,
    /// Deaths
    pub pops: u32,
    /// Milliseconds spent guarding the home flag
    pub prevent: u64,
    /// Enemy carriers killed
    pub returns: u32,
    /// Team captures this player assisted
    pub support: u32,
    /// Tagpro kills
    pub tags: u32,
}

impl Stats {
    /// Aggregate score.
    pub fn points(&self) -> u64 {
        self.captures as u64 * 100
            + self.returns as u64 * 10
            + self.tags as u64 * 5
            + self.grabs as u64 * 2
            + self.support as u64 * 10
            + self.hold / 1000
            + self.prevent / 1000
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Weak reference to a flag: which team's, and where its tile is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRef {
    /// Owning team of the flag
    pub team: Team,
    /// Tile the flag lives on
    pub pos: TilePos,
}

/// State of a single player.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerState {
    /// Unique player ID
    pub id: PlayerId,

    /// Owned physics body
    pub body: BodyId,

    /// Team
    pub team: Team,

    /// Display name
    pub name: String,

    /// Held keys
    pub keys: KeyState,

    /// Waiting to respawn?
    pub dead: bool,

    /// Flag currently carried
    pub carrying: Option<FlagRef>,

    /// Active buffs
    pub buffs: Buffs,

    /// Counters
    pub stats: Stats,
}

impl PlayerState {
    /// Create a live player with no input, buffs or stats.
    pub fn new(id: PlayerId, body: BodyId, team: Team, name: impl Into<String>) -> Self {
        Self {
            id,
            body,
            team,
            name: name.into(),
            keys: KeyState::default(),
            dead: false,
            carrying: None,
            buffs: Buffs::default(),
            stats: Stats::default(),
        }
    }

    /// Alive and able to interact.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.dead
    }
}

// =============================================================================
// SCORE
// =============================================================================

/// Team capture counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Team 1 (red)
    pub r: u32,
    /// Team 2 (blue)
    pub b: u32,
}

impl Score {
    /// Record one capture.
    pub fn add(&mut self, team: Team) {
        match team {
            Team::Red => self.r += 1,
            Team::Blue => self.b += 1,
        }
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// The world store: tile grid, player registry, score and clock.
///
/// Physics bodies and timers live beside it in the engine.
#[derive(Clone, Debug)]
pub struct GameState {
    /// Current map
    pub grid: TileGrid,

    /// All players (BTreeMap for deterministic iteration)
    pub players: BTreeMap<PlayerId, PlayerState>,

    /// Team scores
    pub score: Score,

    /// Deterministic RNG state
    pub rng: DeterministicRng,

    /// Ticks since construction
    pub tick: u64,

    /// Engine clock in milliseconds, derived from `tick`
    pub now_ms: u64,

    /// Next player ID (monotonic counter)
    pub next_player_id: u32,

    /// Events generated since the last drain
    pending_events: Vec<GameEvent>,
}

impl GameState {
    /// Create a state with an empty registry.
    pub fn new(grid: TileGrid, rng_seed: u64) -> Self {
        Self {
            grid,
            players: BTreeMap::new(),
            score: Score::default(),
            rng: DeterministicRng::new(rng_seed),
            tick: 0,
            now_ms: 0,
            next_player_id: 1,
            pending_events: Vec::new(),
        }
    }

    /// Reserve the next player ID.
    pub fn allocate_player_id(&mut self) -> PlayerId {
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        id
    }

    /// Team a new player should join: the smaller one, ties to red.
    pub fn smaller_team(&self) -> Team {
        let red = self.players.values().filter(|p| p.team == Team::Red).count();
        let blue = self.players.len() - red;
        if blue < red { Team::Blue } else { Team::Red }
    }

    /// Get a player by ID.
    pub fn get_player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    /// Get a player mutably by ID.
    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(&id)
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Record an event at the current tick.
    pub fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.tick, data));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u32, team: Team) -> PlayerState {
        PlayerState::new(PlayerId(id), BodyId(id), team, "Some Ball")
    }

    #[test]
    fn test_team_balancing() {
        let mut state = GameState::new(TileGrid::default(), 1);
        assert_eq!(state.smaller_team(), Team::Red);

        state.players.insert(PlayerId(1), player(1, Team::Red));
        assert_eq!(state.smaller_team(), Team::Blue);

        state.players.insert(PlayerId(2), player(2, Team::Blue));
        assert_eq!(state.smaller_team(), Team::Red);
    }

    #[test]
    fn test_key_state() {
        let mut keys = KeyState::default();
        assert!(keys.set("left", true));
        assert!(keys.set("up", true));
        assert_eq!(keys.direction(), (-1.0, -1.0));

        assert!(!keys.set("jump", true));
        assert_eq!(keys, KeyState { up: true, left: true, ..KeyState::default() });

        keys.set("right", true);
        assert_eq!(keys.direction(), (0.0, -1.0));
    }

    #[test]
    fn test_buff_grant_extends() {
        let mut buffs = Buffs::default();
        buffs.grant(Buff::Speed, 20_000);
        buffs.grant(Buff::Speed, 25_000);
        assert_eq!(buffs.expiry(Buff::Speed), Some(25_000));

        // First timer fires early: still active
        assert!(!buffs.expire(Buff::Speed, 20_000));
        assert!(buffs.has(Buff::Speed));

        assert!(buffs.expire(Buff::Speed, 25_000));
        assert!(!buffs.has(Buff::Speed));
    }

    #[test]
    fn test_stats_points() {
        let stats = Stats {
            captures: 2,
            returns: 1,
            tags: 3,
            grabs: 4,
            support: 1,
            hold: 12_500,
            prevent: 3_999,
            ..Stats::default()
        };
        assert_eq!(stats.points(), 200 + 10 + 15 + 8 + 10 + 12 + 3);
    }

    #[test]
    fn test_score() {
        let mut score = Score::default();
        score.add(Team::Blue);
        assert_eq!(score, Score { r: 0, b: 1 });
        assert_eq!(serde_json::to_string(&score).unwrap(), r#"{"r":0,"b":1}"#);
    }

    #[test]
    fn test_player_ids_are_monotonic() {
        let mut state = GameState::new(TileGrid::default(), 1);
        assert_eq!(state.allocate_player_id(), PlayerId(1));
        assert_eq!(state.allocate_player_id(), PlayerId(2));
    }
}
