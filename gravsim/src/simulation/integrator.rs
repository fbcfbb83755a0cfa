//! Fixed-step time integrators for the N-body system
//!
//! Two schemes, kept separate on purpose (see [`IntegrationScheme`]):
//! - [`kick_drift_kick`]: symmetric leapfrog used by the hierarchical solver
//! - [`semi_implicit_euler_3d`]: single-stage update used by the tiled
//!   solver; this host version is the reference the device kernel is checked
//!   against
//!
//! [`IntegrationScheme`]: crate::simulation::engine::IntegrationScheme

use super::forces::{Acceleration, Acceleration3};
use super::params::Parameters;
use super::states::{NVec2, NVec3, System, System3};

/// Advance the 2D system by one kick-drift-kick leapfrog step.
/// Uses two force evaluations per step and updates positions, velocities,
/// and `sys.t` in-place based on `params.dt`
pub fn kick_drift_kick(sys: &mut System, forces: &dyn Acceleration, params: &Parameters) {
    let n = sys.bodies.len();
    if n == 0 { // no bodies, return
        return;
    }

    let dt = params.dt; // time step dt
    let half_dt = 0.5 * dt; // half step dt/2

    // a_n from x_n
    let mut a_old = vec![NVec2::zeros(); n];
    forces.acceleration(&*sys, &mut a_old);

    // Kick: v_n+1/2 = v_n + (dt/2) a_n
    for (b, a) in sys.bodies.iter_mut().zip(a_old.iter()) {
        b.v += half_dt * *a;
    }

    // Drift: x_n+1 = x_n + dt v_n+1/2
    for b in sys.bodies.iter_mut() {
        b.x += dt * b.v;
    }

    sys.t += dt;

    // a_n+1 from x_n+1, tree rebuilt at the new positions
    let mut a_new = vec![NVec2::zeros(); n];
    forces.acceleration(&*sys, &mut a_new);

    // Second kick: v_n+1 = v_n+1/2 + (dt/2) a_n+1
    for (b, a) in sys.bodies.iter_mut().zip(a_new.iter()) {
        b.v += half_dt * *a;
    }
}

// =========================================================================================
// 3d stuff below
// =========================================================================================

/// Advance the 3D system by one semi-implicit Euler step.
/// One force evaluation: `v_n+1 = v_n + dt a_n`, then `x_n+1 = x_n + dt v_n+1`.
pub fn semi_implicit_euler_3d(sys: &mut System3, forces: &dyn Acceleration3, params: &Parameters) {
    let n = sys.bodies.len();
    if n == 0 { // No bodies, return
        return;
    }
    let dt = params.dt;

    let mut a = vec![NVec3::zeros(); n];
    forces.acceleration(&*sys, &mut a);

    for (b, a) in sys.bodies.iter_mut().zip(a.iter()) {
        b.v += dt * *a;
        b.x += dt * b.v; // uses the velocity just updated
    }

    sys.t += dt;
}
