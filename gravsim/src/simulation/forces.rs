//! Force / acceleration contributors for the n-body engine
//!
//! Defines the 2D and 3D acceleration traits, direct Newtonian gravity for
//! both dimensionalities and the Barnes–Hut variant used by the hierarchical
//! solver.
//!
//! Every contributor uses the same softened force law: a body of mass `m`
//! at separation `r` pulls with magnitude `G m / (|r|^2 + eps^2)` along the
//! unit separation vector.

use nalgebra::SVector;
use rayon::prelude::*;

use crate::simulation::barnes_hut::BarnesHutTree;
use crate::simulation::params::Parameters;
use crate::simulation::states::{NVec2, NVec3, System, System3};

/// Acceleration exerted by a mass `m` at displacement `r` (pointing from the
/// evaluation point to the mass).
///
/// A zero displacement contributes nothing, so coincident bodies never
/// produce a singular term.
#[inline]
pub fn softened_pull<const D: usize>(r: &SVector<f64, D>, m: f64, g: f64, eps2: f64) -> SVector<f64, D> {
    let r2 = r.norm_squared();
    if r2 == 0.0 {
        return SVector::zeros();
    }

    // |a| = G m / (r^2 + eps^2), direction r / |r|
    let coef = g * m / ((r2 + eps2) * r2.sqrt());
    *r * coef
}

/// Trait for 2D acceleration sources operating on [`System`]
/// Implementations overwrite `out[i]` with the acceleration of body `i`
pub trait Acceleration {
    fn acceleration(&self, sys: &System, out: &mut [NVec2]);
}

/// 2D Newtonian gravity (direct n^2 sum)
pub struct NewtonianGravity {
    pub g: f64, // gravitational constant
    pub eps2: f64, // softening squared
}

impl NewtonianGravity {
    pub fn from_params(p: &Parameters) -> Self {
        Self { g: p.g, eps2: p.eps2() }
    }
}

impl Acceleration for NewtonianGravity {
    fn acceleration(&self, sys: &System, out: &mut [NVec2]) {
        for a in out.iter_mut() {
            *a = NVec2::zeros();
        }

        let n = sys.bodies.len();
        // Loop over each unordered pair (i, j) with i < j
        for i in 0..n {
            let bi = &sys.bodies[i];
            for j in (i + 1)..n {
                let bj = &sys.bodies[j];

                // r points from i to j: i is pulled along +r, j along -r
                let r = bj.x - bi.x;
                out[i] += softened_pull(&r, bj.m, self.g, self.eps2);
                out[j] -= softened_pull(&r, bi.m, self.g, self.eps2);
            }
        }
    }
}

/// 2D Newtonian gravity evaluated via a Barnes–Hut quadtree
/// Wraps [`BarnesHutTree`] to get approximate O(N log N) accelerations
/// controlled by `theta` (opening angle) and `eps2` (softening)
pub struct NewtonianGravityBarnesHut {
    pub g: f64,
    pub eps2: f64,
    pub theta: f64,
}

impl NewtonianGravityBarnesHut {
    pub fn from_params(p: &Parameters) -> Self {
        Self {
            g: p.g,
            eps2: p.eps2(),
            theta: p.theta,
        }
    }
}

impl Acceleration for NewtonianGravityBarnesHut {
    /// The tree is rebuilt from scratch on every call
    fn acceleration(&self, sys: &System, out: &mut [NVec2]) {
        if sys.bodies.is_empty() {
            return;
        }

        let tree = BarnesHutTree::build(sys);
        // traversals only read the tree, each body owns its output slot
        out.par_iter_mut().enumerate().for_each(|(i, a)| {
            *a = tree.force_on_body(i, sys, self.g, self.eps2, self.theta);
        });
    }
}

// =========================================================================================
// 2D stuff above
// 3D stuff below
// =========================================================================================

/// Trait for 3D acceleration sources operating on [`System3`]
pub trait Acceleration3 {
    fn acceleration(&self, sys: &System3, out: &mut [NVec3]);
}

/// 3D Newtonian gravity with softening (direct n^2 sum).
/// Host-side reference for the tiled solver.
pub struct NewtonianGravity3 {
    pub g: f64,
    pub eps2: f64,
}

impl NewtonianGravity3 {
    pub fn from_params(p: &Parameters) -> Self {
        Self { g: p.g, eps2: p.eps2() }
    }
}

impl Acceleration3 for NewtonianGravity3 {
    fn acceleration(&self, sys: &System3, out: &mut [NVec3]) {
        for a in out.iter_mut() {
            *a = NVec3::zeros();
        }

        let n = sys.bodies.len();
        for i in 0..n {
            let bi = &sys.bodies[i];
            for j in (i + 1)..n {
                let bj = &sys.bodies[j];
                let r = bj.x - bi.x;
                out[i] += softened_pull(&r, bj.m, self.g, self.eps2);
                out[j] -= softened_pull(&r, bi.m, self.g, self.eps2);
            }
        }
    }
}
