//! The single active solver slot.

use tracing::warn;

use crate::simulation::engine::{IntegrationScheme, Mode};
use crate::simulation::hierarchical::HierarchicalSolver;
use crate::simulation::params::Parameters;
use crate::simulation::states::Body3;
use crate::tiled::device::DeviceError;
use crate::tiled::solver::TiledSolver;

/// Exactly one solver at a time, or none before the first `init`
#[derive(Default)]
pub enum ActiveSolver {
    #[default]
    Uninitialized,
    Hierarchical(HierarchicalSolver),
    Tiled(TiledSolver),
}

impl ActiveSolver {
    pub fn mode(&self) -> Option<Mode> {
        match self {
            ActiveSolver::Uninitialized => None,
            ActiveSolver::Hierarchical(_) => Some(Mode::Cpu),
            ActiveSolver::Tiled(_) => Some(Mode::Gpu),
        }
    }

    pub fn scheme(&self) -> Option<IntegrationScheme> {
        match self {
            ActiveSolver::Uninitialized => None,
            ActiveSolver::Hierarchical(_) => Some(HierarchicalSolver::SCHEME),
            ActiveSolver::Tiled(_) => Some(TiledSolver::SCHEME),
        }
    }

    pub fn body_count(&self) -> usize {
        match self {
            ActiveSolver::Uninitialized => 0,
            ActiveSolver::Hierarchical(s) => s.body_count(),
            ActiveSolver::Tiled(s) => s.body_count(),
        }
    }

    /// One step; tiled steps are awaited until the device finished
    pub async fn step(&mut self, params: &Parameters) -> Result<(), DeviceError> {
        match self {
            ActiveSolver::Uninitialized => Ok(()),
            ActiveSolver::Hierarchical(s) => {
                s.step(params);
                Ok(())
            }
            ActiveSolver::Tiled(s) => s.step(params).await.map(|_| ()),
        }
    }

    /// Positions for a snapshot frame, `None` when there is nothing to send.
    /// A failed device readback of a non-empty store yields `None`.
    pub async fn positions(&self) -> Option<Vec<[f32; 3]>> {
        match self {
            ActiveSolver::Uninitialized => None,
            ActiveSolver::Hierarchical(s) => Some(s.system().positions().collect()),
            ActiveSolver::Tiled(s) => {
                let bodies = s.read_bodies().await;
                if bodies.is_empty() && s.body_count() > 0 {
                    return None;
                }
                Some(bodies.iter().map(|b| [b.x.x as f32, b.x.y as f32, b.x.z as f32]).collect())
            }
        }
    }

    /// Append bodies; planar solvers drop the z components
    pub async fn inject(&mut self, bodies: Vec<Body3>) -> Result<(), DeviceError> {
        match self {
            ActiveSolver::Uninitialized => Ok(()),
            ActiveSolver::Hierarchical(s) => {
                s.inject(bodies.iter().map(Body3::to_planar).collect());
                Ok(())
            }
            ActiveSolver::Tiled(s) => s.inject(bodies).await,
        }
    }

    /// Release whatever the solver holds. Device resources are returned
    /// before this resolves.
    pub async fn shutdown(self) -> Result<(), DeviceError> {
        match self {
            ActiveSolver::Tiled(s) => s.shutdown().await,
            _ => Ok(()),
        }
    }

    /// Release in the background, logging failures
    pub fn shutdown_detached(self) {
        if let ActiveSolver::Tiled(s) = self {
            tokio::spawn(async move {
                if let Err(e) = s.shutdown().await {
                    warn!(error = %e, "tiled solver teardown failed");
                }
            });
        }
    }
}
