//! The 2D hierarchical solver: a body store advanced by Barnes–Hut forces
//! and kick-drift-kick integration.

use crate::simulation::engine::IntegrationScheme;
use crate::simulation::forces::NewtonianGravityBarnesHut;
use crate::simulation::integrator::kick_drift_kick;
use crate::simulation::params::Parameters;
use crate::simulation::states::{Body, System};

#[derive(Debug, Clone, Default)]
pub struct HierarchicalSolver {
    system: System,
}

impl HierarchicalSolver {
    pub const SCHEME: IntegrationScheme = IntegrationScheme::KickDriftKick;

    pub fn new(bodies: Vec<Body>) -> Self {
        Self { system: System::new(bodies) }
    }

    /// Advance every body by exactly one leapfrog step with the given parameters.
    /// Synchronous and CPU-bound; an empty store is a no-op.
    pub fn step(&mut self, params: &Parameters) {
        let forces = NewtonianGravityBarnesHut::from_params(params);
        kick_drift_kick(&mut self.system, &forces, params);
    }

    pub fn inject(&mut self, bodies: Vec<Body>) {
        self.system.append(bodies);
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn body_count(&self) -> usize {
        self.system.len()
    }
}
