pub mod simulation;
pub mod tiled;
pub mod orchestrator;
pub mod configuration;
pub mod server;
pub mod benchmark;

pub use simulation::states::{Body, System, NVec2, Body3, System3, NVec3};
pub use simulation::params::{Parameters, ParamsUpdate};
pub use simulation::engine::{Mode, IntegrationScheme};
pub use simulation::forces::{Acceleration, Acceleration3, NewtonianGravity, NewtonianGravityBarnesHut, NewtonianGravity3};
pub use simulation::integrator::{kick_drift_kick, semi_implicit_euler_3d};
pub use simulation::hierarchical::HierarchicalSolver;
pub use simulation::scenario::ScenarioKind;

pub use tiled::device::{ComputeContext, ContextProvider, DeviceError, SoftwareContext, SoftwareProvider, UnavailableProvider};
pub use tiled::solver::TiledSolver;

pub use orchestrator::orchestrator::{Orchestrator, OrchestratorSettings};
pub use orchestrator::broadcast::{BroadcastSettings, Frame, SimulationHandle};
pub use orchestrator::messages::{ControlMessage, StateMessage};
pub use orchestrator::codec::{encode_snapshot, decode_snapshot, CodecError};

pub use configuration::config::{ServerConfig, ConfigError};

pub use benchmark::benchmark::{bench_gravity, bench_hierarchical, bench_tiled};
