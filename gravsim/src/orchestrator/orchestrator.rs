//! Simulation orchestrator: one active solver plus the state around it.
//!
//! States: uninitialized, cpu-active (2D hierarchical), gpu-active (3D
//! tiled). `init` always replaces the active solver; the previous one is
//! released in the background. A tiled solver that fails to come up is
//! replaced by a hierarchical one with the same body count and scenario,
//! so the orchestrator is never left half initialized.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::orchestrator::codec::{self, CodecError};
use crate::orchestrator::messages::{AddBodiesRequest, StateMessage};
use crate::orchestrator::solver::ActiveSolver;
use crate::simulation::engine::Mode;
use crate::simulation::hierarchical::HierarchicalSolver;
use crate::simulation::params::{Parameters, ParamsUpdate};
use crate::simulation::scenario::{self, ClusterSpec, ScenarioKind};
use crate::simulation::states::NVec3;
use crate::tiled::device::{ContextProvider, DeviceError};
use crate::tiled::solver::TiledSolver;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Scenario used by `reset` and at startup
    pub default_scenario: ScenarioKind,
    pub default_body_count: usize,
    /// Upper bound on the store size, applied to `init` and injections
    pub max_body_count: usize,
    pub seed: u64,
    /// Initial value of both parameter sets
    pub parameters: Parameters,
    pub start_paused: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_scenario: ScenarioKind::GalaxyCollision,
            default_body_count: 2_000,
            max_body_count: 200_000,
            seed: 42,
            parameters: Parameters::default(),
            start_paused: false,
        }
    }
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    provider: Arc<dyn ContextProvider>,
    solver: ActiveSolver,
    scenario: ScenarioKind,
    cpu_params: Parameters,
    gpu_params: Parameters,
    paused: bool,
    speed: f64,
    sim_time: f64,
    rate: StepRate,
    rng: StdRng,
}

impl Orchestrator {
    /// A new orchestrator in the uninitialized state.
    /// `provider` is used for every tiled solver this orchestrator creates.
    pub fn new(settings: OrchestratorSettings, provider: Arc<dyn ContextProvider>) -> Self {
        Self {
            provider,
            solver: ActiveSolver::Uninitialized,
            scenario: settings.default_scenario,
            cpu_params: settings.parameters,
            gpu_params: settings.parameters,
            paused: settings.start_paused,
            speed: 1.0,
            sim_time: 0.0,
            rate: StepRate::new(Instant::now()),
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
        }
    }

    /// Replace the active solver with a fresh one of `mode`.
    /// Returns the mode that actually became active.
    pub async fn init(&mut self, mode: Mode, body_count: usize, scenario: ScenarioKind) -> Mode {
        let count = self.clamp_count(body_count);

        std::mem::take(&mut self.solver).shutdown_detached();
        self.sim_time = 0.0;
        self.scenario = scenario;

        self.solver = match mode {
            Mode::Cpu => self.hierarchical(count, scenario),
            Mode::Gpu => {
                let tiled = self.tiled(count, scenario).await;
                match tiled {
                    Ok(solver) => ActiveSolver::Tiled(solver),
                    Err(e) => {
                        warn!(error = %e, count, scenario = %scenario, "tiled solver unavailable, falling back to cpu");
                        self.hierarchical(count, scenario)
                    }
                }
            }
        };

        let active = self.mode();
        let scheme = self.solver.scheme();
        info!(mode = %active, count, scenario = %scenario, ?scheme, "simulation initialized");
        active
    }

    /// Back to the default scenario on the hierarchical solver
    pub async fn reset(&mut self) -> Mode {
        let scenario = self.settings.default_scenario;
        let count = self.settings.default_body_count;
        self.init(Mode::Cpu, count, scenario).await
    }

    fn hierarchical(&mut self, count: usize, scenario: ScenarioKind) -> ActiveSolver {
        let bodies = scenario::generate_2d(scenario, count, &self.cpu_params, &mut self.rng);
        ActiveSolver::Hierarchical(HierarchicalSolver::new(bodies))
    }

    async fn tiled(&mut self, count: usize, scenario: ScenarioKind) -> Result<TiledSolver, DeviceError> {
        let mut solver = TiledSolver::new(Arc::clone(&self.provider)).await?;
        debug!(backend = solver.backend(), "tiled solver created");
        let bodies = scenario::generate_3d(scenario, count, &self.gpu_params, &mut self.rng);
        if let Err(e) = solver.upload(&bodies).await {
            solver.shutdown().await.ok();
            return Err(e);
        }
        Ok(solver)
    }

    fn clamp_count(&self, requested: usize) -> usize {
        let max = self.settings.max_body_count;
        if requested > max {
            warn!(requested, max, "body count clamped");
            max
        } else {
            requested
        }
    }

    pub fn play(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Broadcast cadence multiplier; 0 stops the cadence
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.max(0.0);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Exactly one integration step, independent of the paused flag.
    /// Returns false if the solver failed to step.
    pub async fn step(&mut self) -> bool {
        let params = *self.active_params();
        match self.solver.step(&params).await {
            Ok(()) => {
                if self.solver.mode().is_some() {
                    self.sim_time += params.dt;
                    self.rate.record(Instant::now());
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "solver step failed");
                false
            }
        }
    }

    /// Merge `update` into the parameter set of the active solver
    pub fn set_params(&mut self, update: &ParamsUpdate) {
        if update.is_empty() {
            return;
        }
        let mode = self.mode();
        let uses_theta = mode == Mode::Cpu;
        update.apply(self.params_mut(mode), uses_theta);
        debug!(mode = %mode, ?update, "parameters updated");
    }

    /// Append a cluster of new bodies to the active store
    pub async fn inject_bodies(&mut self, request: &AddBodiesRequest) {
        let room = self.settings.max_body_count.saturating_sub(self.solver.body_count());
        let count = request.count.min(room);
        if count < request.count {
            warn!(requested = request.count, added = count, "injection clamped to max body count");
        }
        if count == 0 {
            return;
        }

        let spec = ClusterSpec {
            center: NVec3::new(request.x, request.y, request.z),
            velocity: NVec3::new(request.vx, request.vy, request.vz),
            count,
            radius: request.radius,
        };
        let planar = !self.mode().is_3d();
        let bodies = scenario::cluster(&spec, planar, &mut self.rng);

        if let Err(e) = self.solver.inject(bodies).await {
            warn!(error = %e, "body injection failed");
        }
    }

    /// Current positions encoded as a frame, `None` if there is nothing to send
    pub async fn snapshot(&self) -> Option<Vec<u8>> {
        let positions = self.solver.positions().await?;
        match codec::encode_snapshot(positions.into_iter()) {
            Ok(frame) => Some(frame),
            Err(CodecError::TooManyBodies(n)) => {
                warn!(count = n, "store too large for a snapshot frame");
                None
            }
            Err(e) => {
                warn!(error = %e, "snapshot encoding failed");
                None
            }
        }
    }

    /// Active mode; an uninitialized orchestrator reports cpu
    pub fn mode(&self) -> Mode {
        self.solver.mode().unwrap_or(Mode::Cpu)
    }

    /// Read-only view of the active solver
    pub fn solver(&self) -> &ActiveSolver {
        &self.solver
    }

    pub fn body_count(&self) -> usize {
        self.solver.body_count()
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn scenario(&self) -> ScenarioKind {
        self.scenario
    }

    pub fn active_params(&self) -> &Parameters {
        match self.mode() {
            Mode::Cpu => &self.cpu_params,
            Mode::Gpu => &self.gpu_params,
        }
    }

    fn params_mut(&mut self, mode: Mode) -> &mut Parameters {
        match mode {
            Mode::Cpu => &mut self.cpu_params,
            Mode::Gpu => &mut self.gpu_params,
        }
    }

    pub fn state_message(&mut self) -> StateMessage {
        let mode = self.mode();
        StateMessage {
            mode,
            body_count: self.body_count(),
            sim_time: self.sim_time,
            paused: self.paused,
            steps_per_second: self.rate.per_second(Instant::now()),
            is_3d: mode.is_3d(),
            params: *self.active_params(),
        }
    }

    /// Release the active solver and wait for its device resources
    pub async fn shutdown(mut self) -> Result<(), DeviceError> {
        let solver = std::mem::take(&mut self.solver);
        solver.shutdown().await
    }
}

const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Steps completed in the last full one-second window
#[derive(Debug, Clone)]
struct StepRate {
    window_start: Instant,
    in_window: u32,
    last: u32,
}

impl StepRate {
    fn new(now: Instant) -> Self {
        Self { window_start: now, in_window: 0, last: 0 }
    }

    fn roll(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < RATE_WINDOW {
            return;
        }
        // a gap longer than one window means the last full window was empty
        self.last = if elapsed < RATE_WINDOW * 2 { self.in_window } else { 0 };
        self.in_window = 0;
        let windows = (elapsed.as_nanos() / RATE_WINDOW.as_nanos()) as u32;
        self.window_start += RATE_WINDOW * windows;
    }

    fn record(&mut self, now: Instant) {
        self.roll(now);
        self.in_window += 1;
    }

    fn per_second(&mut self, now: Instant) -> u32 {
        self.roll(now);
        self.last
    }
}
