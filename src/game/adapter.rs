//! Physics Adapter
//!
//! Wraps a [`PhysicsBackend`] with game identity. Every body the engine
//! creates gets a [`BodyTag`] in a side table keyed by [`BodyId`]: what it is,
//! and for map entities which tile spawned it. Collision rules dispatch on
//! these tags only.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::state::{Buff, PlayerId, Team};
use crate::game::tile::TilePos;
use crate::physics::{
    BodyDesc, BodyId, BodyState, Contact, PhysicsBackend, PhysicsError, Shape, ShapeDesc,
};

/// What a body represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// The wall aggregate
    Wall,
    /// A player's ball
    Player(PlayerId),
    /// A team's flag
    Flag(Team),
    /// A live power-up
    Powerup(Buff),
    /// Boost pad
    Boost,
    /// Spike
    Spike,
    /// Live bomb
    Bomb,
}

/// Side-table entry for a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BodyTag {
    /// Entity kind
    pub kind: EntityKind,
    /// Tile that spawned the entity
    pub map_id: Option<TilePos>,
}

/// Backend plus identity tables.
#[derive(Debug)]
pub struct PhysicsAdapter<P> {
    backend: P,
    tags: BTreeMap<BodyId, BodyTag>,
    by_tile: BTreeMap<TilePos, BodyId>,
    walls: Option<BodyId>,
    wall_shapes: usize,
}

impl<P: PhysicsBackend> PhysicsAdapter<P> {
    /// Wrap a backend.
    pub fn new(backend: P) -> Self {
        Self {
            backend,
            tags: BTreeMap::new(),
            by_tile: BTreeMap::new(),
            walls: None,
            wall_shapes: 0,
        }
    }

    /// Create a static body with one shape.
    pub fn spawn_static(
        &mut self,
        kind: EntityKind,
        position: Vec2,
        shape: Shape,
        sensor: bool,
        map_id: Option<TilePos>,
    ) -> Result<BodyId, PhysicsError> {
        let desc = if sensor { ShapeDesc::sensor(shape) } else { ShapeDesc::solid(shape) };
        self.spawn(BodyDesc::fixed(position), desc, BodyTag { kind, map_id })
    }

    /// Create a dynamic body with one solid shape.
    pub fn spawn_dynamic(
        &mut self,
        kind: EntityKind,
        mass: f64,
        position: Vec2,
        damping: f64,
        shape: Shape,
    ) -> Result<BodyId, PhysicsError> {
        self.spawn(
            BodyDesc::dynamic(mass, position, damping),
            ShapeDesc::solid(shape),
            BodyTag { kind, map_id: None },
        )
    }

    fn spawn(&mut self, desc: BodyDesc, shape: ShapeDesc, tag: BodyTag) -> Result<BodyId, PhysicsError> {
        shape.shape.validate()?;
        let id = self.backend.create_body(desc);
        if let Err(e) = self.backend.attach_shape(id, shape) {
            self.backend.remove_body(id);
            return Err(e);
        }
        self.tags.insert(id, tag);
        if let Some(pos) = tag.map_id {
            self.by_tile.insert(pos, id);
        }
        Ok(id)
    }

    /// Add one wall tile to the static wall aggregate.
    pub fn add_wall(&mut self, offset: Vec2, size: f64) -> Result<(), PhysicsError> {
        let walls = match self.walls {
            Some(id) => id,
            None => {
                let id = self.backend.create_body(BodyDesc::fixed(Vec2::ZERO));
                self.tags.insert(id, BodyTag { kind: EntityKind::Wall, map_id: None });
                self.walls = Some(id);
                id
            }
        };
        let shape = ShapeDesc::solid(Shape::Rect { width: size, height: size }).at(offset);
        self.backend.attach_shape(walls, shape)?;
        self.wall_shapes += 1;
        Ok(())
    }

    /// Drop every wall shape, keeping the aggregate body.
    pub fn clear_walls(&mut self) {
        if let Some(walls) = self.walls {
            self.backend.clear_shapes(walls);
        }
        self.wall_shapes = 0;
    }

    /// Number of wall tiles in the aggregate.
    pub fn wall_shape_count(&self) -> usize {
        self.wall_shapes
    }

    /// The wall aggregate body, once any wall exists.
    pub fn walls(&self) -> Option<BodyId> {
        self.walls
    }

    /// Accumulate a force for the next step.
    pub fn apply_force(&mut self, body: BodyId, force: Vec2, point: Vec2) {
        self.backend.apply_force(body, force, point);
    }

    /// Cancel accumulated force.
    pub fn zero_force(&mut self, body: BodyId) {
        self.backend.zero_force(body);
    }

    /// Teleport and stop a body.
    pub fn reset_motion(&mut self, body: BodyId, position: Vec2) {
        self.backend.reset_motion(body, position);
    }

    /// Change damping.
    pub fn set_damping(&mut self, body: BodyId, damping: f64) {
        self.backend.set_damping(body, damping);
    }

    /// Detach every shape.
    pub fn clear_shapes(&mut self, body: BodyId) {
        self.backend.clear_shapes(body);
    }

    /// Attach a shape to an existing body.
    pub fn attach_shape(&mut self, body: BodyId, shape: ShapeDesc) -> Result<(), PhysicsError> {
        self.backend.attach_shape(body, shape)
    }

    /// Destroy a body and forget its tag.
    pub fn remove_body(&mut self, body: BodyId) {
        self.backend.remove_body(body);
        if let Some(tag) = self.tags.remove(&body) {
            if let Some(pos) = tag.map_id {
                if self.by_tile.get(&pos) == Some(&body) {
                    self.by_tile.remove(&pos);
                }
            }
        }
        if self.walls == Some(body) {
            self.walls = None;
            self.wall_shapes = 0;
        }
    }

    /// Entity linked to a tile.
    pub fn tile_entity(&self, pos: TilePos) -> Option<BodyId> {
        self.by_tile.get(&pos).copied()
    }

    /// Number of tile-linked entities.
    pub fn tile_entity_count(&self) -> usize {
        self.by_tile.len()
    }

    /// Destroy every map entity and the wall aggregate; players stay.
    pub fn clear_map_bodies(&mut self) {
        let doomed: Vec<BodyId> = self
            .tags
            .iter()
            .filter(|(_, tag)| !matches!(tag.kind, EntityKind::Player(_)))
            .map(|(&id, _)| id)
            .collect();
        for body in doomed {
            self.remove_body(body);
        }
    }

    /// Tag of a live body.
    pub fn tag(&self, body: BodyId) -> Option<BodyTag> {
        self.tags.get(&body).copied()
    }

    /// Position of a live body.
    pub fn position(&self, body: BodyId) -> Option<Vec2> {
        self.backend.body_state(body).map(|s| s.position)
    }

    /// Velocity of a live body.
    pub fn velocity(&self, body: BodyId) -> Option<Vec2> {
        self.backend.body_state(body).map(|s| s.velocity)
    }

    /// Position and velocity of a live body.
    pub fn body_state(&self, body: BodyId) -> Option<BodyState> {
        self.backend.body_state(body)
    }

    /// Advance the simulation and return contacts that began.
    pub fn step(&mut self, dt: f64) -> Vec<Contact> {
        self.backend.step(dt)
    }

    /// Underlying backend.
    pub fn backend(&self) -> &P {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::ArenaPhysics;

    fn adapter() -> PhysicsAdapter<ArenaPhysics> {
        PhysicsAdapter::new(ArenaPhysics::new())
    }

    #[test]
    fn test_spawn_tags_body() {
        let mut bodies = adapter();
        let pos = TilePos::new(3, 4);
        let id = bodies
            .spawn_static(EntityKind::Spike, pos.world(40.0), Shape::Circle { radius: 12.0 }, false, Some(pos))
            .unwrap();

        assert_eq!(bodies.tag(id), Some(BodyTag { kind: EntityKind::Spike, map_id: Some(pos) }));
        assert_eq!(bodies.tile_entity(pos), Some(id));
        assert_eq!(bodies.position(id), Some(Vec2::new(120.0, 160.0)));

        bodies.remove_body(id);
        assert_eq!(bodies.tag(id), None);
        assert_eq!(bodies.tile_entity(pos), None);
    }

    #[test]
    fn test_replacement_survives_removing_the_old_body() {
        let mut bodies = adapter();
        let pos = TilePos::new(2, 2);
        let spike = bodies
            .spawn_static(EntityKind::Spike, pos.world(40.0), Shape::Circle { radius: 14.0 }, false, Some(pos))
            .unwrap();
        let boost = bodies
            .spawn_static(EntityKind::Boost, pos.world(40.0), Shape::Circle { radius: 8.0 }, true, Some(pos))
            .unwrap();
        assert_eq!(bodies.tile_entity(pos), Some(boost));

        bodies.remove_body(spike);
        assert_eq!(bodies.tile_entity(pos), Some(boost));
        assert_eq!(bodies.tile_entity_count(), 1);
        assert_eq!(bodies.backend().body_count(), 1);
    }

    #[test]
    fn test_invalid_shape_leaves_nothing_behind() {
        let mut bodies = adapter();
        let err = bodies.spawn_static(
            EntityKind::Boost,
            Vec2::ZERO,
            Shape::Circle { radius: 0.0 },
            true,
            Some(TilePos::new(1, 1)),
        );
        assert!(matches!(err, Err(PhysicsError::InvalidGeometry(_))));
        assert_eq!(bodies.tile_entity_count(), 0);
        assert_eq!(bodies.backend().body_count(), 0);
    }

    #[test]
    fn test_walls_share_one_body() {
        let mut bodies = adapter();
        for x in 0..5 {
            bodies.add_wall(Vec2::new(x as f64 * 40.0, 0.0), 40.0).unwrap();
        }
        let walls = bodies.walls().unwrap();
        assert_eq!(bodies.wall_shape_count(), 5);
        assert_eq!(bodies.backend().shape_count(walls), 5);
        assert_eq!(bodies.backend().body_count(), 1);
        assert_eq!(bodies.tag(walls).map(|t| t.kind), Some(EntityKind::Wall));
    }

    #[test]
    fn test_clear_map_bodies_keeps_players() {
        let mut bodies = adapter();
        bodies.add_wall(Vec2::ZERO, 40.0).unwrap();
        let pos = TilePos::new(2, 2);
        bodies
            .spawn_static(EntityKind::Bomb, pos.world(40.0), Shape::Circle { radius: 16.0 }, true, Some(pos))
            .unwrap();
        let ball = bodies
            .spawn_dynamic(EntityKind::Player(PlayerId(1)), 0.075, Vec2::new(300.0, 300.0), 0.6, Shape::Circle { radius: 19.0 })
            .unwrap();

        bodies.clear_map_bodies();

        assert_eq!(bodies.backend().body_count(), 1);
        assert!(bodies.walls().is_none());
        assert_eq!(bodies.wall_shape_count(), 0);
        assert_eq!(bodies.tile_entity_count(), 0);
        assert!(bodies.tag(ball).is_some());
    }
}
