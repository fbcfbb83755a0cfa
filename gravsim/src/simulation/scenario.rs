//! Body factories for the named scenarios
//!
//! Produces the initial body list handed to a solver on `init`, and the
//! clusters appended on `addBodies`. Generation is driven by a caller-owned
//! RNG so a seeded orchestrator reproduces the same bodies.
//!
//! Every generator works in 3D; `planar = true` keeps all z components at
//! zero so the result can be narrowed to 2D bodies for the hierarchical solver.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::simulation::params::Parameters;
use crate::simulation::states::{Body, Body3, NVec3};

/// Mass of the central body of a disk galaxy
pub const CENTRAL_MASS: f64 = 50_000.0;
/// Mass of every ordinary body
pub const BODY_MASS: f64 = 1.0;

const DISK_RADIUS: f64 = 400.0;
const DISK_INNER_RADIUS: f64 = 20.0;
const DISK_THICKNESS: f64 = 5.0;
const GALAXY_RADIUS: f64 = 180.0;
const GALAXY_OFFSET: [f64; 2] = [320.0, 120.0];
const GALAXY_APPROACH_SPEED: f64 = 8.0;
const SPHERE_RADIUS: f64 = 300.0;
const CUSTOM_HALF_SIZE: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    GalaxyCollision,
    Sphere,
    Disk,
    Custom,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioKind::GalaxyCollision => "galaxy_collision",
            ScenarioKind::Sphere => "sphere",
            ScenarioKind::Disk => "disk",
            ScenarioKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A blob of bodies sharing one bulk velocity, used for body injection
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    pub center: NVec3,
    pub velocity: NVec3,
    pub count: usize,
    pub radius: f64,
}

/// Generate `count` bodies for `kind`
pub fn generate<R: Rng>(kind: ScenarioKind, count: usize, planar: bool, params: &Parameters, rng: &mut R) -> Vec<Body3> {
    match kind {
        ScenarioKind::Disk => disk_galaxy(count, NVec3::zeros(), NVec3::zeros(), DISK_RADIUS, planar, params, rng),
        ScenarioKind::GalaxyCollision => {
            let first = count - count / 2;
            let second = count / 2;
            let offset = NVec3::new(GALAXY_OFFSET[0], GALAXY_OFFSET[1], 0.0);
            let approach = NVec3::new(GALAXY_APPROACH_SPEED, 0.0, 0.0);
            let mut bodies = disk_galaxy(first, -offset, approach, GALAXY_RADIUS, planar, params, rng);
            bodies.extend(disk_galaxy(second, offset, -approach, GALAXY_RADIUS, planar, params, rng));
            bodies
        }
        ScenarioKind::Sphere => (0..count)
            .map(|_| Body3::new(sample_ball(SPHERE_RADIUS, planar, rng), NVec3::zeros(), BODY_MASS))
            .collect(),
        ScenarioKind::Custom => (0..count)
            .map(|_| {
                let z = if planar { 0.0 } else { rng.gen_range(-CUSTOM_HALF_SIZE..CUSTOM_HALF_SIZE) };
                let x = NVec3::new(
                    rng.gen_range(-CUSTOM_HALF_SIZE..CUSTOM_HALF_SIZE),
                    rng.gen_range(-CUSTOM_HALF_SIZE..CUSTOM_HALF_SIZE),
                    z,
                );
                Body3::new(x, NVec3::zeros(), BODY_MASS)
            })
            .collect(),
    }
}

/// 2D bodies for the hierarchical solver
pub fn generate_2d<R: Rng>(kind: ScenarioKind, count: usize, params: &Parameters, rng: &mut R) -> Vec<Body> {
    generate(kind, count, true, params, rng).iter().map(Body3::to_planar).collect()
}

/// 3D bodies for the tiled solver
pub fn generate_3d<R: Rng>(kind: ScenarioKind, count: usize, params: &Parameters, rng: &mut R) -> Vec<Body3> {
    generate(kind, count, false, params, rng)
}

/// Bodies spread uniformly inside `spec.radius` around `spec.center`, all
/// moving with `spec.velocity`
pub fn cluster<R: Rng>(spec: &ClusterSpec, planar: bool, rng: &mut R) -> Vec<Body3> {
    let mut center = spec.center;
    let mut velocity = spec.velocity;
    if planar {
        center.z = 0.0;
        velocity.z = 0.0;
    }

    (0..spec.count)
        .map(|_| Body3::new(center + sample_ball(spec.radius, planar, rng), velocity, BODY_MASS))
        .collect()
}

/// A rotating disk: one central mass plus `count - 1` bodies on roughly
/// circular orbits around it
fn disk_galaxy<R: Rng>(
    count: usize,
    center: NVec3,
    bulk_velocity: NVec3,
    radius: f64,
    planar: bool,
    params: &Parameters,
    rng: &mut R,
) -> Vec<Body3> {
    let mut bodies = Vec::with_capacity(count);
    if count == 0 {
        return bodies;
    }
    bodies.push(Body3::new(center, bulk_velocity, CENTRAL_MASS));

    let orbiters = (count - 1) as f64;
    let eps2 = params.eps2();
    for _ in 1..count {
        // sqrt keeps the surface density uniform over the annulus
        let u: f64 = rng.gen_range(0.0..1.0);
        let r = DISK_INNER_RADIUS + (radius - DISK_INNER_RADIUS) * u.sqrt();
        let angle = rng.gen_range(0.0..std::f64::consts::TAU);
        let z = if planar { 0.0 } else { rng.gen_range(-DISK_THICKNESS..DISK_THICKNESS) };

        let offset = NVec3::new(r * angle.cos(), r * angle.sin(), z);

        // v^2 / r = G M / (r^2 + eps^2) for the softened force law
        let enclosed = CENTRAL_MASS + BODY_MASS * orbiters * (r / radius).powi(2);
        let speed = (params.g * enclosed * r / (r * r + eps2)).sqrt();
        let tangent = NVec3::new(-angle.sin(), angle.cos(), 0.0);

        bodies.push(Body3::new(center + offset, bulk_velocity + tangent * speed, BODY_MASS));
    }

    bodies
}

/// Uniform sample inside a ball (or a disc when `planar`) by rejection
fn sample_ball<R: Rng>(radius: f64, planar: bool, rng: &mut R) -> NVec3 {
    if radius <= 0.0 {
        return NVec3::zeros();
    }
    loop {
        let x = rng.gen_range(-1.0..1.0);
        let y = rng.gen_range(-1.0..1.0);
        let z = if planar { 0.0 } else { rng.gen_range(-1.0..1.0) };
        let p = NVec3::new(x, y, z);
        if p.norm_squared() <= 1.0 {
            return p * radius;
        }
    }
}
