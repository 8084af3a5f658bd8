//! State Diff Broadcaster
//!
//! Each connection keeps a shadow of the last player values it sent and
//! only sends what changed. A player seen for the first time is compared
//! against a blank view, so its first diff carries every non-default field.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::state::{Buff, PlayerState};

/// Read-only projection of a player, as clients see it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Player ID
    pub id: u32,
    /// Display name
    pub name: String,
    /// Team number (1 or 2)
    pub team: u8,
    /// World x
    pub x: f64,
    /// World y
    pub y: f64,
    /// Waiting to respawn
    pub dead: bool,
    /// Rolling bomb buff
    pub bomb: bool,
    /// Grip buff
    pub grip: bool,
    /// Speed buff
    pub speed: bool,
    /// Tagpro buff
    pub tagpro: bool,
    /// Team number of the carried flag
    pub flag: Option<u8>,
    /// Flags captured
    pub captures: u32,
    /// Flags lost
    pub drops: u32,
    /// Flags grabbed
    pub grabs: u32,
    /// Seconds carrying a flag
    pub hold: u64,
    /// Deaths
    pub pops: u32,
    /// Seconds guarding the home flag
    pub prevent: u64,
    /// Carriers killed
    pub returns: u32,
    /// Captures assisted
    pub support: u32,
    /// Tagpro kills
    pub tags: u32,
    /// Aggregate score
    pub score: u64,
}

impl PlayerView {
    /// Project a player at a world position.
    pub fn new(player: &PlayerState, position: Vec2) -> Self {
        let stats = &player.stats;
        Self {
            id: player.id.0,
            name: player.name.clone(),
            team: player.team.number(),
            x: position.x,
            y: position.y,
            dead: player.dead,
            bomb: player.buffs.has(Buff::Bomb),
            grip: player.buffs.has(Buff::Grip),
            speed: player.buffs.has(Buff::Speed),
            tagpro: player.buffs.has(Buff::Tagpro),
            flag: player.carrying.map(|f| f.team.number()),
            captures: stats.captures,
            drops: stats.drops,
            grabs: stats.grabs,
            hold: stats.hold / 1000,
            pops: stats.pops,
            prevent: stats.prevent / 1000,
            returns: stats.returns,
            support: stats.support,
            tags: stats.tags,
            score: stats.points(),
        }
    }

    /// Blank view for an id, the starting point of every shadow.
    pub fn blank(id: u32) -> Self {
        Self { id, ..Self::default() }
    }
}

/// Changed fields of one player. `id` is always present.
///
/// Fields mirror [`PlayerView`]; `None` means unchanged.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerDiff {
    /// Player ID
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bomb: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagpro: Option<bool>,
    /// `Some(None)` when a flag was dropped or captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<Option<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captures: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grabs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
}

impl PlayerDiff {
    /// Fields of `current` that differ from `previous`.
    pub fn between(previous: &PlayerView, current: &PlayerView) -> Self {
        fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
            (old != new).then(|| new.clone())
        }

        Self {
            id: current.id,
            name: changed(&previous.name, &current.name),
            team: changed(&previous.team, &current.team),
            x: changed(&previous.x, &current.x),
            y: changed(&previous.y, &current.y),
            dead: changed(&previous.dead, &current.dead),
            bomb: changed(&previous.bomb, &current.bomb),
            grip: changed(&previous.grip, &current.grip),
            speed: changed(&previous.speed, &current.speed),
            tagpro: changed(&previous.tagpro, &current.tagpro),
            flag: changed(&previous.flag, &current.flag),
            captures: changed(&previous.captures, &current.captures),
            drops: changed(&previous.drops, &current.drops),
            grabs: changed(&previous.grabs, &current.grabs),
            hold: changed(&previous.hold, &current.hold),
            pops: changed(&previous.pops, &current.pops),
            prevent: changed(&previous.prevent, &current.prevent),
            returns: changed(&previous.returns, &current.returns),
            support: changed(&previous.support, &current.support),
            tags: changed(&previous.tags, &current.tags),
            score: changed(&previous.score, &current.score),
        }
    }

    /// Nothing but the id?
    pub fn is_empty(&self) -> bool {
        *self == Self { id: self.id, ..Self::default() }
    }
}

/// Per-connection shadow of what the client has been told.
#[derive(Clone, Debug, Default)]
pub struct DiffBroadcaster {
    shadow: BTreeMap<u32, PlayerView>,
}

impl DiffBroadcaster {
    /// Fresh broadcaster that has sent nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff the current projection against the shadow and update the shadow.
    ///
    /// Players with no changes are left out. Ids missing from `players`
    /// are forgotten, so a returning id starts from blank again.
    pub fn diff(&mut self, players: &[PlayerView]) -> Vec<PlayerDiff> {
        let mut out = Vec::new();
        for view in players {
            let previous = self
                .shadow
                .entry(view.id)
                .or_insert_with(|| PlayerView::blank(view.id));
            let diff = PlayerDiff::between(previous, view);
            if !diff.is_empty() {
                *previous = view.clone();
                out.push(diff);
            }
        }
        self.shadow.retain(|id, _| players.iter().any(|p| p.id == *id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: u32, x: f64) -> PlayerView {
        PlayerView {
            id,
            name: "Some Ball".to_string(),
            team: 1,
            x,
            y: 550.0,
            ..PlayerView::default()
        }
    }

    #[test]
    fn test_first_diff_has_non_default_fields() {
        let mut broadcaster = DiffBroadcaster::new();
        let diffs = broadcaster.diff(&[view(1, 550.0)]);

        assert_eq!(diffs.len(), 1);
        let json = serde_json::to_value(&diffs[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": 1, "name": "Some Ball", "team": 1, "x": 550.0, "y": 550.0 })
        );
    }

    #[test]
    fn test_unchanged_players_are_skipped() {
        let mut broadcaster = DiffBroadcaster::new();
        broadcaster.diff(&[view(1, 550.0), view(2, 600.0)]);

        let diffs = broadcaster.diff(&[view(1, 552.5), view(2, 600.0)]);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0], PlayerDiff { id: 1, x: Some(552.5), ..PlayerDiff::default() });

        assert!(broadcaster.diff(&[view(1, 552.5), view(2, 600.0)]).is_empty());
    }

    #[test]
    fn test_flag_cleared_is_sent_as_null() {
        let mut broadcaster = DiffBroadcaster::new();
        let carrying = PlayerView { flag: Some(2), ..view(1, 550.0) };
        broadcaster.diff(&[carrying]);

        let diffs = broadcaster.diff(&[view(1, 550.0)]);
        let json = serde_json::to_value(&diffs[0]).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 1, "flag": null }));
    }

    #[test]
    fn test_departed_players_are_forgotten() {
        let mut broadcaster = DiffBroadcaster::new();
        broadcaster.diff(&[view(1, 550.0), view(2, 600.0)]);
        broadcaster.diff(&[view(1, 550.0)]);
        assert!(broadcaster.diff(&[view(1, 550.0)]).is_empty());

        // Same id coming back is new again
        let diffs = broadcaster.diff(&[view(1, 550.0), view(2, 600.0)]);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].name.as_deref(), Some("Some Ball"));
    }
}
