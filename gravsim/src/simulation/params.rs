//! Physical parameters for the simulation
//!
//! `Parameters` holds the values a solver reads at the start of every step:
//! - gravitational constant `g`
//! - integration step size `dt`
//! - softening length `softening` (epsilon, added as epsilon^2 under the distance)
//! - opening angle `theta` (hierarchical solver only)
//!
//! `ParamsUpdate` is a partial update received from a client. Fields left out
//! keep their current value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub theta: f64, // opening angle, ratio of node width to distance
    pub g: f64, // gravitational constant
    pub dt: f64, // step size
    pub softening: f64, // softening length epsilon
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            theta: 0.5,
            g: 1.0,
            dt: 0.01,
            softening: 0.5,
        }
    }
}

impl Parameters {
    /// Squared softening length, the form used by the force law
    pub fn eps2(&self) -> f64 {
        self.softening * self.softening
    }
}

/// Any subset of the parameter fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ParamsUpdate {
    pub theta: Option<f64>,
    pub g: Option<f64>,
    pub dt: Option<f64>,
    pub softening: Option<f64>,
}

impl ParamsUpdate {
    pub fn is_empty(&self) -> bool {
        self.theta.is_none() && self.g.is_none() && self.dt.is_none() && self.softening.is_none()
    }

    /// True when every present field is a finite number
    pub fn is_finite(&self) -> bool {
        [self.theta, self.g, self.dt, self.softening]
            .iter()
            .flatten()
            .all(|v| v.is_finite())
    }

    /// Write the present fields into `params`.
    /// `theta` is only routed when the target parameter set belongs to the
    /// hierarchical solver; the tiled solver has no opening angle.
    pub fn apply(&self, params: &mut Parameters, uses_theta: bool) {
        if uses_theta {
            if let Some(theta) = self.theta {
                params.theta = theta;
            }
        }
        if let Some(g) = self.g {
            params.g = g;
        }
        if let Some(dt) = self.dt {
            params.dt = dt;
        }
        if let Some(softening) = self.softening {
            params.softening = softening;
        }
    }
}
