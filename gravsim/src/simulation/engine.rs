//! High-level runtime engine selection
//!
//! `Mode` picks which solver is active and, with it, the dimensionality of
//! the body store: `cpu` runs the 2D Barnes–Hut solver, `gpu` the 3D tiled
//! direct solver.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Cpu, // hierarchical, 2d
    Gpu, // tiled direct, 3d
}

impl Mode {
    pub fn is_3d(self) -> bool {
        matches!(self, Mode::Gpu)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Cpu => "cpu",
            Mode::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time integration strategy used by a solver.
///
/// The two solvers deliberately integrate differently and are kept apart:
/// trajectories of each are expected to match their own history, not each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationScheme {
    /// Half kick, full drift, half kick. Time-reversible, two force evaluations per step.
    KickDriftKick,
    /// `v += a dt` then `x += v dt` with the updated velocity. One force evaluation per step.
    SemiImplicitEuler,
}
