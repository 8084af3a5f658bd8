//! Tile Grid
//!
//! The map is a 2D array of numeric codes. Each code names the entity that
//! occupies the cell; the engine keeps the code and the physics entity linked
//! to it in step (see `Engine::update_tile`).
//!
//! | code | tile |
//! |------|------|
//! | 0 | empty |
//! | 1 | wall |
//! | 3 / 3.1 | team 1 flag / carried |
//! | 4 / 4.1 | team 2 flag / carried |
//! | 5 | boost |
//! | 6 | power-up spawn point |
//! | 6.1 - 6.4 | live power-up (grip, bomb, tagpro, speed) |
//! | 7 | spike |
//! | 10 / 10.1 | bomb / bomb cooldown |

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::state::{Buff, Team};

// =============================================================================
// TILE
// =============================================================================

/// Decoded tile code.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
#[derive(Default)]
pub enum Tile {
    /// Nothing
    #[default]
    Empty,
    /// Part of the static wall aggregate
    Wall,
    /// A team's flag; `carried` while someone holds it
    Flag { team: Team, carried: bool },
    /// Speed pad
    Boost,
    /// Power-up spawn point waiting to regenerate
    PowerupSpawn,
    /// Live power-up of a given variant
    Powerup(Buff),
    /// Kills on touch
    Spike,
    /// Live bomb
    Bomb,
    /// Bomb waiting to regenerate
    BombCooldown,
    /// Unrecognised code, kept verbatim
    Other(f64),
}

impl Tile {
    /// Decode a numeric code.
    pub fn from_code(code: f64) -> Self {
        if !code.is_finite() {
            return Tile::Other(code);
        }
        let tenths = (code * 10.0).round();
        if (tenths - code * 10.0).abs() > 1e-6 {
            return Tile::Other(code);
        }
        match tenths as i64 {
            0 => Tile::Empty,
            10 => Tile::Wall,
            30 => Tile::Flag { team: Team::Red, carried: false },
            31 => Tile::Flag { team: Team::Red, carried: true },
            40 => Tile::Flag { team: Team::Blue, carried: false },
            41 => Tile::Flag { team: Team::Blue, carried: true },
            50 => Tile::Boost,
            60 => Tile::PowerupSpawn,
            61 => Tile::Powerup(Buff::Grip),
            62 => Tile::Powerup(Buff::Bomb),
            63 => Tile::Powerup(Buff::Tagpro),
            64 => Tile::Powerup(Buff::Speed),
            70 => Tile::Spike,
            100 => Tile::Bomb,
            101 => Tile::BombCooldown,
            _ => Tile::Other(code),
        }
    }

    /// Encode as the numeric wire code.
    pub fn code(self) -> f64 {
        match self {
            Tile::Empty => 0.0,
            Tile::Wall => 1.0,
            Tile::Flag { team, carried } => {
                let base = team.flag_code();
                if carried { base + 0.1 } else { base }
            }
            Tile::Boost => 5.0,
            Tile::PowerupSpawn => 6.0,
            Tile::Powerup(buff) => buff.tile_code(),
            Tile::Spike => 7.0,
            Tile::Bomb => 10.0,
            Tile::BombCooldown => 10.1,
            Tile::Other(code) => code,
        }
    }

    /// Form a map-linked entity is spawned in: carried flags become home
    /// flags, cooldown bombs become live. `PowerupSpawn` is left to the
    /// caller, which picks a variant.
    pub fn canonical(self) -> Self {
        match self {
            Tile::Flag { team, .. } => Tile::Flag { team, carried: false },
            Tile::BombCooldown => Tile::Bomb,
            other => other,
        }
    }
}

impl From<f64> for Tile {
    fn from(code: f64) -> Self {
        Tile::from_code(code)
    }
}

impl From<Tile> for f64 {
    fn from(tile: Tile) -> Self {
        tile.code()
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// =============================================================================
// TILE POSITION
// =============================================================================

/// Grid coordinates of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TilePos {
    /// Column
    pub x: usize,
    /// Row
    pub y: usize,
}

impl TilePos {
    /// Create a position.
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// World coordinates of the tile's entity.
    #[inline]
    pub fn world(self, tile_size: f64) -> Vec2 {
        Vec2::new(self.x as f64 * tile_size, self.y as f64 * tile_size)
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// TILE GRID
// =============================================================================

/// Column-major tile grid: `tiles[x][y]`.
///
/// Serializes as a nested array of numeric codes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileGrid {
    tiles: Vec<Vec<Tile>>,
}

impl TileGrid {
    /// Grid of empty tiles.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            tiles: vec![vec![Tile::Empty; height]; width],
        }
    }

    /// Build from numeric codes laid out as `codes[x][y]`.
    pub fn from_codes(codes: &[Vec<f64>]) -> Self {
        Self {
            tiles: codes
                .iter()
                .map(|column| column.iter().map(|&c| Tile::from_code(c)).collect())
                .collect(),
        }
    }

    /// Empty arena enclosed by a ring of walls.
    pub fn walled(width: usize, height: usize) -> Self {
        let mut grid = Self::new(width, height);
        for x in 0..width {
            for y in 0..height {
                if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                    grid.tiles[x][y] = Tile::Wall;
                }
            }
        }
        grid
    }

    /// The built-in map used when no override is configured.
    pub fn default_arena() -> Self {
        let mut grid = Self::walled(30, 30);
        let features = [
            (3, 14, Tile::Flag { team: Team::Red, carried: false }),
            (26, 14, Tile::Flag { team: Team::Blue, carried: false }),
            (8, 8, Tile::Boost),
            (21, 21, Tile::Boost),
            (14, 4, Tile::PowerupSpawn),
            (15, 25, Tile::PowerupSpawn),
            (14, 9, Tile::Spike),
            (15, 20, Tile::Spike),
            (5, 24, Tile::Bomb),
            (24, 5, Tile::Bomb),
        ];
        for (x, y, tile) in features {
            grid.tiles[x][y] = tile;
        }
        grid
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.tiles.len()
    }

    /// Number of rows (length of the longest column).
    pub fn height(&self) -> usize {
        self.tiles.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Tile at a position, if inside the grid.
    pub fn get(&self, pos: TilePos) -> Option<Tile> {
        self.tiles.get(pos.x)?.get(pos.y).copied()
    }

    /// Overwrite a tile. Returns `false` if the position is outside the grid.
    pub fn set(&mut self, pos: TilePos, tile: Tile) -> bool {
        match self.tiles.get_mut(pos.x).and_then(|col| col.get_mut(pos.y)) {
            Some(slot) => {
                *slot = tile;
                true
            }
            None => false,
        }
    }

    /// Iterate over every tile in column order.
    pub fn iter(&self) -> impl Iterator<Item = (TilePos, Tile)> + '_ {
        self.tiles.iter().enumerate().flat_map(|(x, column)| {
            column
                .iter()
                .enumerate()
                .map(move |(y, &tile)| (TilePos::new(x, y), tile))
        })
    }
}
