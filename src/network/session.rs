//! Game Session
//!
//! The one place the shared world is mutated from the network side.
//! The server keeps a single `GameSession` behind a lock; connects,
//! disconnects, key presses and ticks all go through it, so they are
//! applied strictly one after another.
//!
//! Client-visible engine events are turned into [`ServerMessage`]s and
//! published on a broadcast feed that every connection subscribes to.

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::game::diff::PlayerView;
use crate::game::engine::{Engine, EngineError};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::{PlayerId, PlayerState, Team};
use crate::game::tick::TickResult;
use crate::network::protocol::{
    Blast, ChatLine, ChatRequest, ChatTarget, MapSnapshot, ServerMessage, TileUpdate, TimeInfo,
};
use crate::physics::{ArenaPhysics, PhysicsBackend};

/// Messages buffered per subscriber before it starts lagging.
const FEED_CAPACITY: usize = 256;

/// Who should receive a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connection.
    All,
    /// Connections whose player is on this team.
    Team(Team),
}

impl Audience {
    /// Should a connection playing for `team` get this message?
    pub fn includes(self, team: Option<Team>) -> bool {
        match self {
            Audience::All => true,
            Audience::Team(t) => team == Some(t),
        }
    }
}

/// A message on the shared feed.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Recipients.
    pub audience: Audience,
    /// Payload.
    pub message: ServerMessage,
}

/// What a new connection is told before anything else.
#[derive(Debug, Clone)]
pub struct Welcome {
    /// The player created for this connection.
    pub player_id: PlayerId,
    /// The player's team.
    pub team: Team,
    /// `id`, `map`, `score` and `time`, in that order.
    pub messages: Vec<ServerMessage>,
}

/// Engine plus its outward feed.
pub struct GameSession<P: PhysicsBackend = ArenaPhysics> {
    engine: Engine<P>,
    feed: broadcast::Sender<Outbound>,
}

impl<P: PhysicsBackend> GameSession<P> {
    /// Wrap an engine.
    pub fn new(engine: Engine<P>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { engine, feed }
    }

    /// The engine.
    pub fn engine(&self) -> &Engine<P> {
        &self.engine
    }

    /// Mutable engine, for map overrides and tests.
    pub fn engine_mut(&mut self) -> &mut Engine<P> {
        &mut self.engine
    }

    /// Receive everything published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.feed.subscribe()
    }

    /// Current player projection.
    pub fn player_views(&self) -> Vec<PlayerView> {
        self.engine.players()
    }

    /// Team of a connected player.
    pub fn team_of(&self, id: PlayerId) -> Option<Team> {
        self.engine.player(id).map(|p| p.team)
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Create a player for a new connection.
    pub fn connect(&mut self) -> Result<Welcome, EngineError> {
        let player_id = self.engine.add_player()?;
        let team = self.team_of(player_id).unwrap_or(Team::Red);
        info!(player = %player_id, ?team, players = self.engine.state().players.len(), "Client joined");

        let messages = vec![
            ServerMessage::Id(player_id.0),
            ServerMessage::Map(MapSnapshot { tiles: self.engine.map().clone() }),
            ServerMessage::Score(self.engine.score()),
            ServerMessage::Time(TimeInfo::default()),
        ];
        Ok(Welcome { player_id, team, messages })
    }

    /// Remove a departed connection's player and tell everyone else.
    ///
    /// Unknown ids are ignored.
    pub fn disconnect(&mut self, id: PlayerId) -> Option<PlayerState> {
        let removed = self.engine.remove_player(id)?;
        info!(player = %id, name = %removed.name, "Client left");

        // Flag drop and departure are visible right away, not on the next tick
        let events = self.engine.take_events();
        self.publish_events(&events);
        self.publish(
            Audience::All,
            ServerMessage::Chat(ChatLine {
                from: None,
                to: ChatTarget::All,
                message: format!("{} has left the game.", removed.name),
            }),
        );
        Some(removed)
    }

    // =========================================================================
    // Client input
    // =========================================================================

    /// Forward a key press or release.
    pub fn key_press(&mut self, id: PlayerId, key: &str, pressed: bool) -> Result<(), EngineError> {
        self.engine.key_press(id, key, pressed)
    }

    /// Relay a chat line. Returns `false` if the sender is not in the game.
    pub fn chat(&self, from: PlayerId, request: ChatRequest) -> bool {
        let Some(team) = self.team_of(from) else {
            return false;
        };
        let (audience, to) = if request.to_all {
            (Audience::All, ChatTarget::All)
        } else {
            (Audience::Team(team), ChatTarget::Team)
        };
        debug!(player = %from, ?to, "Chat");
        self.publish(
            audience,
            ServerMessage::Chat(ChatLine { from: Some(from.0), to, message: request.message }),
        );
        true
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Advance the engine one tick and publish what clients need to see.
    pub fn run_tick(&mut self) -> Result<TickResult, EngineError> {
        match self.engine.tick() {
            Ok(result) => {
                self.publish_events(&result.events);
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, tick = self.engine.tick_count(), "Tick failed");
                Err(e)
            }
        }
    }

    /// Send a message to part of the audience. Nobody listening is fine.
    pub fn publish(&self, audience: Audience, message: ServerMessage) {
        let _ = self.feed.send(Outbound { audience, message });
    }

    fn publish_events(&self, events: &[GameEvent]) {
        for event in events {
            if let Some(message) = self.event_message(event) {
                self.publish(Audience::All, message);
            }
        }
    }

    /// Client-facing form of an engine event, if it has one.
    fn event_message(&self, event: &GameEvent) -> Option<ServerMessage> {
        let message = match &event.data {
            GameEventData::TileChanged { pos, tile } => ServerMessage::MapUpdate(TileUpdate {
                x: pos.x,
                y: pos.y,
                v: tile.code(),
            }),
            GameEventData::MapReloaded => {
                ServerMessage::Map(MapSnapshot { tiles: self.engine.map().clone() })
            }
            GameEventData::ScoreChanged { score } => ServerMessage::Score(*score),
            GameEventData::Explosion { position, kind } => ServerMessage::Bomb(Blast {
                x: position.x,
                y: position.y,
                kind: kind.code(),
            }),
            GameEventData::PlayerLeft { player_id } => ServerMessage::PlayerLeft(player_id.0),
            _ => return None,
        };
        Some(message)
    }
}
