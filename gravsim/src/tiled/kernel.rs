//! Tiled all-pairs gravity kernel.
//!
//! Bodies are split into workgroups of `tile_size` lanes, one lane per body.
//! Each workgroup walks over the body list one tile at a time:
//!
//! 1. every lane stages one body (position + mass) of the current tile into
//!    the workgroup's shared storage, lanes past the end stage a zero-mass
//!    entry;
//! 2. barrier;
//! 3. every lane with a live body accumulates the pull of all staged bodies;
//! 4. barrier, next tile.
//!
//! Lanes are executed in lockstep: a barrier is the boundary between two
//! phases and is only passed once all `tile_size` lanes of the workgroup
//! have arrived, including lanes beyond the live body count. Those lanes do
//! no accumulation and no write-back but must still arrive, otherwise the
//! workgroup would stall at the barrier.
//!
//! Workgroups are independent and run in parallel on the rayon pool. All of
//! them read the positions at the start of the step; integration results are
//! written back after the tile loop finished everywhere.

use rayon::prelude::*;

use crate::simulation::params::Parameters;
use crate::tiled::buffer::DeviceBody;

/// Uniforms of one dispatch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelParams {
    pub g: f32,
    pub dt: f32,
    pub eps2: f32,
}

impl KernelParams {
    pub fn from_params(p: &Parameters) -> Self {
        Self {
            g: p.g as f32,
            dt: p.dt as f32,
            eps2: p.eps2() as f32,
        }
    }
}

/// Execution counters of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelStats {
    pub workgroups: usize,
    /// Tiles consumed per workgroup
    pub tiles: usize,
    /// Barriers passed, summed over workgroups
    pub barriers: usize,
    /// Lane arrivals at barriers, summed over workgroups
    pub lane_arrivals: usize,
}

impl KernelStats {
    fn merge(self, other: Self) -> Self {
        Self {
            workgroups: self.workgroups + other.workgroups,
            tiles: self.tiles.max(other.tiles),
            barriers: self.barriers + other.barriers,
            lane_arrivals: self.lane_arrivals + other.lane_arrivals,
        }
    }
}

/// One workgroup: `tile_size` lanes sharing a staged tile
struct Workgroup<'a> {
    group: usize,
    tile_size: usize,
    bodies: &'a [DeviceBody],
    shared: Vec<[f32; 4]>, // x, y, z, mass
    acc: Vec<[f32; 3]>,
    stats: KernelStats,
}

impl<'a> Workgroup<'a> {
    fn new(group: usize, tile_size: usize, bodies: &'a [DeviceBody]) -> Self {
        Self {
            group,
            tile_size,
            bodies,
            shared: vec![[0.0; 4]; tile_size],
            acc: vec![[0.0; 3]; tile_size],
            stats: KernelStats { workgroups: 1, ..KernelStats::default() },
        }
    }

    fn global_index(&self, lane: usize) -> usize {
        self.group * self.tile_size + lane
    }

    fn barrier(&mut self, arrived: usize) {
        debug_assert_eq!(arrived, self.tile_size, "every lane must reach the barrier");
        self.stats.barriers += 1;
        self.stats.lane_arrivals += arrived;
    }

    fn run(&mut self, g: f32, eps2: f32) {
        let n = self.bodies.len();
        let tiles = n.div_ceil(self.tile_size);

        for tile in 0..tiles {
            // stage
            let mut arrived = 0;
            for lane in 0..self.tile_size {
                let src = tile * self.tile_size + lane;
                self.shared[lane] = match self.bodies.get(src) {
                    Some(b) => [b.position[0], b.position[1], b.position[2], b.mass],
                    None => [0.0; 4],
                };
                arrived += 1;
            }
            self.barrier(arrived);

            // accumulate
            let mut arrived = 0;
            for lane in 0..self.tile_size {
                let gid = self.global_index(lane);
                if let Some(body) = self.bodies.get(gid) {
                    let p = body.position;
                    let mut a = self.acc[lane];
                    for staged in &self.shared {
                        let pull = softened_pull_f32(
                            [staged[0] - p[0], staged[1] - p[1], staged[2] - p[2]],
                            staged[3],
                            g,
                            eps2,
                        );
                        a[0] += pull[0];
                        a[1] += pull[1];
                        a[2] += pull[2];
                    }
                    self.acc[lane] = a;
                }
                arrived += 1;
            }
            self.barrier(arrived);
        }

        self.stats.tiles = tiles;
    }
}

/// Same force law as the host solvers, in device precision
#[inline]
fn softened_pull_f32(r: [f32; 3], m: f32, g: f32, eps2: f32) -> [f32; 3] {
    let r2 = r[0] * r[0] + r[1] * r[1] + r[2] * r[2];
    if r2 == 0.0 {
        return [0.0; 3]; // self term, or a padding entry at the origin
    }
    let coef = g * m / ((r2 + eps2) * r2.sqrt());
    [r[0] * coef, r[1] * coef, r[2] * coef]
}

/// Accelerations of all bodies computed tile by tile
pub fn tiled_accelerations(bodies: &[DeviceBody], tile_size: usize, g: f32, eps2: f32) -> (Vec<[f32; 3]>, KernelStats) {
    let tile_size = tile_size.max(1);
    let mut acc = vec![[0.0f32; 3]; bodies.len()];
    if bodies.is_empty() {
        return (acc, KernelStats::default());
    }

    let stats = acc
        .par_chunks_mut(tile_size)
        .enumerate()
        .map(|(group, out)| {
            let mut wg = Workgroup::new(group, tile_size, bodies);
            wg.run(g, eps2);
            // only lanes with a live body write back
            out.copy_from_slice(&wg.acc[..out.len()]);
            wg.stats
        })
        .reduce(KernelStats::default, KernelStats::merge);

    (acc, stats)
}

/// One full step: tiled accelerations, then `v += a dt` and `x += v dt`
/// using the updated velocity.
pub fn integrate_step(bodies: &mut [DeviceBody], tile_size: usize, params: &KernelParams) -> KernelStats {
    let (acc, stats) = tiled_accelerations(bodies, tile_size, params.g, params.eps2);
    let dt = params.dt;

    bodies.par_iter_mut().zip(acc.par_iter()).for_each(|(b, a)| {
        for k in 0..3 {
            b.velocity[k] += a[k] * dt;
            b.position[k] += b.velocity[k] * dt;
        }
    });

    stats
}
