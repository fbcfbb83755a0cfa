//! Server configuration loaded from YAML.
//!
//! A thin, `serde`-deserializable description of how the service runs:
//!
//! - [`ServerSection`]     – where the WebSocket endpoint listens
//! - [`SimulationSection`] – cadence, default scenario, limits, seed
//! - [`TiledSection`]      – tile size and compute backend of the 3D solver
//! - [`Parameters`]        – initial physical parameters of both solvers
//! - [`ServerConfig`]      – top-level wrapper
//!
//! # YAML format
//! Every field is optional; this is the full set with its defaults:
//!
//! ```yaml
//! server:
//!   bind: "127.0.0.1:8080"
//!
//! simulation:
//!   tick_interval_ms: 16        # cadence at speed 1
//!   default_scenario: "galaxy_collision"
//!   default_body_count: 2000
//!   max_body_count: 200000
//!   seed: 42
//!   subscriber_buffer: 64       # frames queued per subscriber
//!   start_paused: false
//!
//! tiled:
//!   tile_size: 256              # lanes per workgroup
//!   backend: "software"         # or "unavailable"
//!
//! parameters:
//!   theta: 0.5
//!   g: 1.0
//!   dt: 0.01
//!   softening: 0.5
//! ```
//!
//! The runtime settings of the orchestrator and the broadcast loop are
//! derived from this with [`ServerConfig::orchestrator_settings`] and
//! [`ServerConfig::broadcast_settings`].

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::orchestrator::broadcast::BroadcastSettings;
use crate::orchestrator::orchestrator::OrchestratorSettings;
use crate::simulation::params::Parameters;
use crate::simulation::scenario::ScenarioKind;
use crate::tiled::device::{ContextProvider, SoftwareProvider, UnavailableProvider};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config value: {0}")]
    Invalid(&'static str),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String, // socket address of the WebSocket endpoint
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8080".into() }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationSection {
    pub tick_interval_ms: u64,
    pub default_scenario: ScenarioKind, // used at startup and by `reset`
    pub default_body_count: usize,
    pub max_body_count: usize, // larger `init` and `addBodies` requests are clamped
    pub seed: u64, // scenario generation seed, makes runs reproducible
    pub subscriber_buffer: usize,
    pub start_paused: bool,
}

impl Default for SimulationSection {
    fn default() -> Self {
        let runtime = OrchestratorSettings::default();
        Self {
            tick_interval_ms: 16,
            default_scenario: runtime.default_scenario,
            default_body_count: runtime.default_body_count,
            max_body_count: runtime.max_body_count,
            seed: runtime.seed,
            subscriber_buffer: 64,
            start_paused: runtime.start_paused,
        }
    }
}

/// Compute backend for the tiled solver
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Software, // host emulation of the tile kernel
    Unavailable, // context creation always fails; gpu requests fall back to cpu
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TiledSection {
    pub tile_size: usize,
    pub backend: Backend,
}

impl Default for TiledSection {
    fn default() -> Self {
        Self {
            tile_size: 256,
            backend: Backend::Software,
        }
    }
}

impl TiledSection {
    pub fn provider(&self) -> Arc<dyn ContextProvider> {
        match self.backend {
            Backend::Software => Arc::new(SoftwareProvider::new(self.tile_size)),
            Backend::Unavailable => Arc::new(UnavailableProvider::default()),
        }
    }
}

/// Top-level configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub simulation: SimulationSection,
    pub tiled: TiledSection,
    pub parameters: Parameters,
}

impl ServerConfig {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let file = File::open(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
                serde_yaml::from_reader(BufReader::new(file))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("simulation.tick_interval_ms must be positive"));
        }
        if sim.max_body_count == 0 || sim.default_body_count == 0 {
            return Err(ConfigError::Invalid("body counts must be positive"));
        }
        if sim.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid("simulation.subscriber_buffer must be positive"));
        }
        if self.tiled.tile_size == 0 {
            return Err(ConfigError::Invalid("tiled.tile_size must be positive"));
        }
        let p = &self.parameters;
        if ![p.theta, p.g, p.dt, p.softening].iter().all(|v| v.is_finite()) {
            return Err(ConfigError::Invalid("parameters must be finite"));
        }
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let sim = &self.simulation;
        OrchestratorSettings {
            default_scenario: sim.default_scenario,
            default_body_count: sim.default_body_count.min(sim.max_body_count),
            max_body_count: sim.max_body_count,
            seed: sim.seed,
            parameters: self.parameters,
            start_paused: sim.start_paused,
        }
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            tick_interval: Duration::from_millis(self.simulation.tick_interval_ms),
            subscriber_buffer: self.simulation.subscriber_buffer,
        }
    }
}
