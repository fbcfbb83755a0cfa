//! Core state types for the N-body simulation.
//!
//! Defines 2D and 3D body/system structs:
//! - `Body` / `System`  using `NVec2` (2d, hierarchical solver)
//! - `Body3` / `System3` using `NVec3` (3d, tiled solver)
//!
//! Each system holds the dense list of bodies and the current simulation time `t`.
//! Bodies are only ever appended, never removed.

use nalgebra::{Vector2, Vector3};
pub type NVec2 = Vector2<f64>;
pub type NVec3 = Vector3<f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub x: NVec2, // position
    pub v: NVec2, // velocity
    pub m: f64, // mass
}

impl Body {
    pub fn new(x: NVec2, v: NVec2, m: f64) -> Self {
        Self { x, v, m }
    }
}

#[derive(Debug, Clone, Default)]
pub struct System {
    pub bodies: Vec<Body>, // 2d collection of bodies
    pub t: f64, // time
}

impl System {
    pub fn new(bodies: Vec<Body>) -> Self {
        Self { bodies, t: 0.0 }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Append bodies at the end of the store; existing entries keep their index and state
    pub fn append(&mut self, more: Vec<Body>) {
        self.bodies.extend(more);
    }

    /// Total linear momentum `sum(m_i * v_i)`
    pub fn momentum(&self) -> NVec2 {
        self.bodies.iter().fold(NVec2::zeros(), |p, b| p + b.v * b.m)
    }

    /// Positions widened to a 3-component record with z = 0
    pub fn positions(&self) -> impl ExactSizeIterator<Item = [f32; 3]> + '_ {
        self.bodies.iter().map(|b| [b.x.x as f32, b.x.y as f32, 0.0])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body3 {
    pub x: NVec3, // 3d position
    pub v: NVec3, // 3d velocity
    pub m: f64, // mass
}

impl Body3 {
    pub fn new(x: NVec3, v: NVec3, m: f64) -> Self {
        Self { x, v, m }
    }

    /// Drop the z components (planar scenarios are generated with z = 0)
    pub fn to_planar(&self) -> Body {
        Body {
            x: NVec2::new(self.x.x, self.x.y),
            v: NVec2::new(self.v.x, self.v.y),
            m: self.m,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct System3 {
    pub bodies: Vec<Body3>, // 3d collection of bodies
    pub t: f64, // time
}

impl System3 {
    pub fn new(bodies: Vec<Body3>) -> Self {
        Self { bodies, t: 0.0 }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Total linear momentum `sum(m_i * v_i)`
    pub fn momentum(&self) -> NVec3 {
        self.bodies.iter().fold(NVec3::zeros(), |p, b| p + b.v * b.m)
    }
}
