use std::sync::Arc;
use std::time::Instant;

use crate::simulation::states::{Body, Body3, System, System3, NVec2, NVec3};
use crate::simulation::params::Parameters;
use crate::simulation::forces::{Acceleration, NewtonianGravity, NewtonianGravityBarnesHut, NewtonianGravity3};
use crate::simulation::hierarchical::HierarchicalSolver;
use crate::simulation::integrator::semi_implicit_euler_3d;
use crate::tiled::device::{DeviceError, SoftwareProvider};
use crate::tiled::solver::TiledSolver;

/// Helper to build a deterministic 2D system of size `n`, no rand needed
fn make_system(n: usize) -> System {
    let bodies = (0..n)
        .map(|i| {
            let i_f = i as f64;
            let x = NVec2::new((i_f * 0.37).sin() * 50.0, (i_f * 0.13).cos() * 50.0);
            Body::new(x, NVec2::zeros(), 1.0)
        })
        .collect();
    System::new(bodies)
}

/// Same as [`make_system`] with a z component
fn make_system3(n: usize) -> System3 {
    let bodies = (0..n)
        .map(|i| {
            let i_f = i as f64;
            let x = NVec3::new(
                (i_f * 0.37).sin() * 50.0,
                (i_f * 0.13).cos() * 50.0,
                (i_f * 0.07).sin() * 50.0,
            );
            Body3::new(x, NVec3::zeros(), 1.0)
        })
        .collect();
    System3::new(bodies)
}

fn make_params() -> Parameters {
    Parameters {
        theta: 0.7,
        g: 0.1,
        dt: 0.001,
        softening: 0.01,
    }
}

/// One force evaluation, direct sum vs Barnes–Hut, for a range of n
pub fn bench_gravity() {
    let ns = [200, 400, 800, 1600, 3200, 6400];
    let params = make_params();

    for n in ns {
        let sys = make_system(n);
        let mut out = vec![NVec2::zeros(); n];

        let direct = NewtonianGravity::from_params(&params);
        let bh = NewtonianGravityBarnesHut::from_params(&params);

        // Warm up
        direct.acceleration(&sys, &mut out);
        bh.acceleration(&sys, &mut out);

        let t0 = Instant::now();
        direct.acceleration(&sys, &mut out);
        let dt_direct = t0.elapsed().as_secs_f64();

        let t1 = Instant::now();
        bh.acceleration(&sys, &mut out);
        let dt_bh = t1.elapsed().as_secs_f64();

        println!("N = {n:5}, direct = {:8.6} s, BH = {:8.6} s", dt_direct, dt_bh);
    }
}

/// Full hierarchical solver steps (tree rebuild + two evaluations)
pub fn bench_hierarchical() {
    let ns = [1000, 2000, 4000, 8000, 16000, 32000];
    let steps = 3;
    let params = make_params();

    for n in ns {
        let mut solver = HierarchicalSolver::new(make_system(n).bodies);

        // Warm-up
        solver.step(&params);

        let t0 = Instant::now();
        for _ in 0..steps {
            solver.step(&params);
        }
        let per_step = t0.elapsed().as_secs_f64() / steps as f64;

        println!("N = {:5}, hierarchical step = {:8.6} s", n, per_step);
    }
}

/// Tiled solver on the software device vs the host double loop, per step.
/// Paste output directly into excel to graph
pub async fn bench_tiled(tile_size: usize) -> Result<(), DeviceError> {
    let params = make_params();
    let mut solver = TiledSolver::new(Arc::new(SoftwareProvider::new(tile_size))).await?;

    println!("N,host_direct_ms,tiled_ms");

    for n in (500..=4000).step_by(500) {
        // Large n: only 1 step to avoid minutes of runtime
        let steps = if n <= 2000 { 3 } else { 1 };

        let mut sys = make_system3(n);
        let direct = NewtonianGravity3::from_params(&params);

        let t0 = Instant::now();
        for _ in 0..steps {
            semi_implicit_euler_3d(&mut sys, &direct, &params);
        }
        let ms_direct = t0.elapsed().as_secs_f64() * 1000.0 / steps as f64;

        solver.upload(&make_system3(n).bodies).await?;
        solver.step(&params).await?; // warm-up

        let t1 = Instant::now();
        for _ in 0..steps {
            solver.step(&params).await?;
        }
        let ms_tiled = t1.elapsed().as_secs_f64() * 1000.0 / steps as f64;

        println!("{},{:.6},{:.6}", n, ms_direct, ms_tiled);
    }

    solver.shutdown().await
}
