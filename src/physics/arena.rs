//! Built-in Physics Backend
//!
//! A small top-down 2D engine: no gravity, no rotation. Dynamic bodies
//! integrate accumulated forces each step, solid shapes are pushed apart
//! along the contact normal, sensors only report overlap.
//!
//! Iteration is over `BTreeMap`s, so a step is deterministic for a given
//! sequence of calls.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::vec2::Vec2;
use super::{
    BodyDesc, BodyId, BodyState, Contact, PhysicsBackend, PhysicsError, Shape, ShapeDesc,
};

#[derive(Clone, Debug)]
struct Body {
    inv_mass: f64,
    position: Vec2,
    velocity: Vec2,
    force: Vec2,
    damping: f64,
    shapes: Vec<ShapeDesc>,
}

impl Body {
    #[inline]
    fn is_dynamic(&self) -> bool {
        self.inv_mass > 0.0
    }
}

/// Overlap between two shapes: unit normal pointing from the first shape
/// towards the second, and penetration depth.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Manifold {
    normal: Vec2,
    depth: f64,
}

/// The built-in physics world.
#[derive(Clone, Debug, Default)]
pub struct ArenaPhysics {
    bodies: BTreeMap<BodyId, Body>,
    next_id: u32,
    /// Pairs overlapping at the end of the previous step.
    touching: BTreeSet<Contact>,
}

impl ArenaPhysics {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of shapes attached to a body (0 for unknown bodies).
    pub fn shape_count(&self, body: BodyId) -> usize {
        self.bodies.get(&body).map_or(0, |b| b.shapes.len())
    }

    fn integrate(&mut self, dt: f64) {
        for body in self.bodies.values_mut() {
            if !body.is_dynamic() {
                body.force = Vec2::ZERO;
                continue;
            }
            body.velocity += body.force.scale(body.inv_mass * dt);
            body.velocity = body.velocity.scale((1.0 - body.damping).max(0.0).powf(dt));
            body.position += body.velocity.scale(dt);
            body.force = Vec2::ZERO;
        }
    }

    /// Find overlapping pairs and push solid ones apart.
    fn detect_and_resolve(&mut self) -> BTreeSet<Contact> {
        let ids: Vec<BodyId> = self.bodies.keys().copied().collect();
        let mut overlapping = BTreeSet::new();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (id_a, id_b) = (ids[i], ids[j]);
                let (Some(a), Some(b)) = (self.bodies.get(&id_a), self.bodies.get(&id_b)) else {
                    continue;
                };
                if !a.is_dynamic() && !b.is_dynamic() {
                    continue;
                }

                let mut touched = false;
                let mut deepest: Option<Manifold> = None;
                for sa in &a.shapes {
                    for sb in &b.shapes {
                        let Some(m) = shape_overlap(a.position + sa.offset, &sa.shape, b.position + sb.offset, &sb.shape) else {
                            continue;
                        };
                        touched = true;
                        if sa.sensor || sb.sensor {
                            continue;
                        }
                        if deepest.map_or(true, |d| m.depth > d.depth) {
                            deepest = Some(m);
                        }
                    }
                }

                if touched {
                    overlapping.insert(Contact::new(id_a, id_b));
                }
                if let Some(m) = deepest {
                    self.resolve(id_a, id_b, m);
                }
            }
        }

        overlapping
    }

    /// Separate two bodies and remove their approaching velocity.
    fn resolve(&mut self, id_a: BodyId, id_b: BodyId, m: Manifold) {
        let (inv_a, inv_b, vel_a, vel_b) = match (self.bodies.get(&id_a), self.bodies.get(&id_b)) {
            (Some(a), Some(b)) => (a.inv_mass, b.inv_mass, a.velocity, b.velocity),
            _ => return,
        };
        let total = inv_a + inv_b;
        if total <= 0.0 {
            return;
        }

        let closing = (vel_b - vel_a).dot(m.normal);
        let impulse = if closing < 0.0 { -closing / total } else { 0.0 };

        if let Some(a) = self.bodies.get_mut(&id_a) {
            a.position = a.position - m.normal.scale(m.depth * inv_a / total);
            a.velocity = a.velocity - m.normal.scale(impulse * inv_a);
        }
        if let Some(b) = self.bodies.get_mut(&id_b) {
            b.position = b.position + m.normal.scale(m.depth * inv_b / total);
            b.velocity = b.velocity + m.normal.scale(impulse * inv_b);
        }
    }
}

impl PhysicsBackend for ArenaPhysics {
    fn create_body(&mut self, desc: BodyDesc) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        let inv_mass = if desc.mass > 0.0 { 1.0 / desc.mass } else { 0.0 };
        self.bodies.insert(id, Body {
            inv_mass,
            position: desc.position,
            velocity: Vec2::ZERO,
            force: Vec2::ZERO,
            damping: desc.damping,
            shapes: Vec::new(),
        });
        id
    }

    fn attach_shape(&mut self, body: BodyId, shape: ShapeDesc) -> Result<(), PhysicsError> {
        shape.shape.validate()?;
        let body = self.bodies.get_mut(&body).ok_or(PhysicsError::UnknownBody(body))?;
        body.shapes.push(shape);
        Ok(())
    }

    fn clear_shapes(&mut self, body: BodyId) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.shapes.clear();
        }
        self.touching.retain(|c| c.a != body && c.b != body);
    }

    fn apply_force(&mut self, body: BodyId, force: Vec2, _point: Vec2) {
        // No rotation: the application point only matters for torque.
        if let Some(b) = self.bodies.get_mut(&body) {
            b.force += force;
        }
    }

    fn zero_force(&mut self, body: BodyId) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.force = Vec2::ZERO;
        }
    }

    fn reset_motion(&mut self, body: BodyId, position: Vec2) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.position = position;
            b.velocity = Vec2::ZERO;
            b.force = Vec2::ZERO;
        }
    }

    fn set_damping(&mut self, body: BodyId, damping: f64) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.damping = damping;
        }
    }

    fn remove_body(&mut self, body: BodyId) {
        self.bodies.remove(&body);
        self.touching.retain(|c| c.a != body && c.b != body);
    }

    fn body_state(&self, body: BodyId) -> Option<BodyState> {
        self.bodies.get(&body).map(|b| BodyState {
            position: b.position,
            velocity: b.velocity,
        })
    }

    fn step(&mut self, dt: f64) -> Vec<Contact> {
        self.integrate(dt);
        let overlapping = self.detect_and_resolve();
        let began: Vec<Contact> = overlapping.difference(&self.touching).copied().collect();
        self.touching = overlapping;
        began
    }
}

// =============================================================================
// NARROW PHASE
// =============================================================================

fn shape_overlap(pos_a: Vec2, a: &Shape, pos_b: Vec2, b: &Shape) -> Option<Manifold> {
    match (*a, *b) {
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            circle_circle(pos_a, ra, pos_b, rb)
        }
        (Shape::Circle { radius }, Shape::Rect { width, height }) => {
            circle_rect(pos_a, radius, pos_b, Vec2::new(width / 2.0, height / 2.0))
        }
        (Shape::Rect { width, height }, Shape::Circle { radius }) => {
            circle_rect(pos_b, radius, pos_a, Vec2::new(width / 2.0, height / 2.0))
                .map(|m| Manifold { normal: -m.normal, depth: m.depth })
        }
        (Shape::Rect { width: wa, height: ha }, Shape::Rect { width: wb, height: hb }) => {
            rect_rect(pos_a, Vec2::new(wa / 2.0, ha / 2.0), pos_b, Vec2::new(wb / 2.0, hb / 2.0))
        }
    }
}

fn circle_circle(pos_a: Vec2, ra: f64, pos_b: Vec2, rb: f64) -> Option<Manifold> {
    let delta = pos_b - pos_a;
    let combined = ra + rb;
    let dist_sq = delta.length_squared();
    if dist_sq >= combined * combined {
        return None;
    }
    let dist = dist_sq.sqrt();
    let normal = if dist > 0.0 { delta.scale(1.0 / dist) } else { Vec2::new(1.0, 0.0) };
    Some(Manifold { normal, depth: combined - dist })
}

/// Circle against an axis-aligned box; normal points from circle to box.
fn circle_rect(center: Vec2, radius: f64, rect: Vec2, half: Vec2) -> Option<Manifold> {
    let local = center - rect;
    let closest = Vec2::new(local.x.clamp(-half.x, half.x), local.y.clamp(-half.y, half.y));

    if closest != local {
        // Centre outside the box
        let delta = local - closest;
        let dist_sq = delta.length_squared();
        if dist_sq >= radius * radius {
            return None;
        }
        let dist = dist_sq.sqrt();
        return Some(Manifold { normal: -delta.scale(1.0 / dist), depth: radius - dist });
    }

    // Centre inside the box: leave through the nearest face
    let gap_x = half.x - local.x.abs();
    let gap_y = half.y - local.y.abs();
    if gap_x < gap_y {
        let sign = if local.x >= 0.0 { 1.0 } else { -1.0 };
        Some(Manifold { normal: Vec2::new(-sign, 0.0), depth: radius + gap_x })
    } else {
        let sign = if local.y >= 0.0 { 1.0 } else { -1.0 };
        Some(Manifold { normal: Vec2::new(0.0, -sign), depth: radius + gap_y })
    }
}

fn rect_rect(pos_a: Vec2, half_a: Vec2, pos_b: Vec2, half_b: Vec2) -> Option<Manifold> {
    let delta = pos_b - pos_a;
    let overlap_x = half_a.x + half_b.x - delta.x.abs();
    let overlap_y = half_a.y + half_b.y - delta.y.abs();
    if overlap_x <= 0.0 || overlap_y <= 0.0 {
        return None;
    }
    if overlap_x < overlap_y {
        let sign = if delta.x >= 0.0 { 1.0 } else { -1.0 };
        Some(Manifold { normal: Vec2::new(sign, 0.0), depth: overlap_x })
    } else {
        let sign = if delta.y >= 0.0 { 1.0 } else { -1.0 };
        Some(Manifold { normal: Vec2::new(0.0, sign), depth: overlap_y })
    }
}
