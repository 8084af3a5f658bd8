//! Physics Capability Interface
//!
//! The engine never talks to a physics implementation directly; it goes
//! through [`PhysicsBackend`]. A backend owns bodies and shapes, integrates
//! forces, and reports the pairs of bodies that started touching during a
//! step. It knows nothing about walls, flags or players - identity lives in
//! the engine's side table (see `game::adapter`).
//!
//! [`arena::ArenaPhysics`] is the built-in backend.

pub mod arena;

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;

pub use arena::ArenaPhysics;

/// Opaque handle to a body owned by a backend.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub u32);

impl fmt::Debug for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Body#{}", self.0)
    }
}

/// Parameters for a new body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyDesc {
    /// Mass; `0.0` makes the body static.
    pub mass: f64,
    /// World position of the body origin.
    pub position: Vec2,
    /// Velocity damping in `[0, 1]`, applied as `v *= (1 - damping)^dt`.
    pub damping: f64,
}

impl BodyDesc {
    /// A static (immovable) body.
    pub fn fixed(position: Vec2) -> Self {
        Self { mass: 0.0, position, damping: 0.0 }
    }

    /// A dynamic body.
    pub fn dynamic(mass: f64, position: Vec2, damping: f64) -> Self {
        Self { mass, position, damping }
    }
}

/// Collision geometry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Circle centred on the shape origin.
    Circle {
        /// Radius in world units.
        radius: f64,
    },
    /// Axis-aligned rectangle centred on the shape origin.
    Rect {
        /// Extent along x.
        width: f64,
        /// Extent along y.
        height: f64,
    },
}

impl Shape {
    /// Check the geometry can be simulated.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let ok = match *self {
            Shape::Circle { radius } => radius.is_finite() && radius > 0.0,
            Shape::Rect { width, height } => {
                width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0
            }
        };
        if ok {
            Ok(())
        } else {
            Err(PhysicsError::InvalidGeometry(*self))
        }
    }
}

/// A shape attached to a body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeDesc {
    /// Geometry
    pub shape: Shape,
    /// Sensors report contacts but never push anything.
    pub sensor: bool,
    /// Offset of the shape origin from the body origin.
    pub offset: Vec2,
}

impl ShapeDesc {
    /// Solid shape at the body origin.
    pub fn solid(shape: Shape) -> Self {
        Self { shape, sensor: false, offset: Vec2::ZERO }
    }

    /// Sensor shape at the body origin.
    pub fn sensor(shape: Shape) -> Self {
        Self { shape, sensor: true, offset: Vec2::ZERO }
    }

    /// Same shape moved by `offset`.
    pub fn at(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }
}

/// Snapshot of a body's kinematic state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    /// World position
    pub position: Vec2,
    /// Linear velocity
    pub velocity: Vec2,
}

/// Two bodies whose shapes started overlapping during a step.
///
/// `a < b` always holds, so the same pair never shows up twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Contact {
    /// Lower handle
    pub a: BodyId,
    /// Higher handle
    pub b: BodyId,
}

impl Contact {
    /// Build an ordered contact.
    pub fn new(x: BodyId, y: BodyId) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// Physics failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    /// Shape dimensions are not positive finite numbers.
    #[error("Invalid geometry: {0:?}")]
    InvalidGeometry(Shape),

    /// Body handle does not exist.
    #[error("Unknown body: {0:?}")]
    UnknownBody(BodyId),
}

/// Capabilities the engine needs from a physics implementation.
///
/// Operations on a body that no longer exists are ignored, except where a
/// `Result` says otherwise.
pub trait PhysicsBackend {
    /// Create a body with no shapes.
    fn create_body(&mut self, desc: BodyDesc) -> BodyId;

    /// Attach a shape to an existing body.
    fn attach_shape(&mut self, body: BodyId, shape: ShapeDesc) -> Result<(), PhysicsError>;

    /// Remove every shape from a body. The body keeps moving but touches nothing.
    fn clear_shapes(&mut self, body: BodyId);

    /// Accumulate a force for the next step, applied at world point `point`.
    fn apply_force(&mut self, body: BodyId, force: Vec2, point: Vec2);

    /// Drop any force accumulated since the last step.
    fn zero_force(&mut self, body: BodyId);

    /// Teleport a body and stop it.
    fn reset_motion(&mut self, body: BodyId, position: Vec2);

    /// Change velocity damping.
    fn set_damping(&mut self, body: BodyId, damping: f64);

    /// Destroy a body and everything attached to it.
    fn remove_body(&mut self, body: BodyId);

    /// Current position and velocity.
    fn body_state(&self, body: BodyId) -> Option<BodyState>;

    /// Advance the simulation by `dt` seconds and return the contacts that began.
    fn step(&mut self, dt: f64) -> Vec<Contact>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_is_ordered() {
        let c = Contact::new(BodyId(7), BodyId(3));
        assert_eq!(c.a, BodyId(3));
        assert_eq!(c.b, BodyId(7));
        assert_eq!(c, Contact::new(BodyId(3), BodyId(7)));
    }

    #[test]
    fn test_shape_validation() {
        assert!(Shape::Circle { radius: 19.0 }.validate().is_ok());
        assert!(Shape::Circle { radius: 0.0 }.validate().is_err());
        assert!(Shape::Rect { width: 40.0, height: f64::NAN }.validate().is_err());
        assert_eq!(
            Shape::Rect { width: -1.0, height: 1.0 }.validate(),
            Err(PhysicsError::InvalidGeometry(Shape::Rect { width: -1.0, height: 1.0 }))
        );
    }
}
