//! Text messages exchanged with clients.
//!
//! Inbound control messages are one JSON object each, tagged by `type`:
//!
//! ```json
//! {"type": "init", "mode": "gpu", "bodyCount": 20000, "scenario": "sphere"}
//! {"type": "control", "command": "speed", "speed": 2.0}
//! {"type": "params", "theta": 0.7}
//! {"type": "addBodies", "x": 10.0, "y": -4.0, "count": 200}
//! ```
//!
//! They are decoded once, here, into [`ControlMessage`]; an unrecognized
//! `type` becomes [`ControlMessage::Unknown`]. The outbound [`StateMessage`]
//! reports the orchestrator state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulation::engine::Mode;
use crate::simulation::params::{Parameters, ParamsUpdate};
use crate::simulation::scenario::ScenarioKind;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed control message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid control message: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "init")]
    Init(InitRequest),
    #[serde(rename = "control")]
    Control(ControlCommand),
    #[serde(rename = "params")]
    Params(ParamsUpdate),
    #[serde(rename = "addBodies")]
    AddBodies(AddBodiesRequest),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub mode: Mode,
    pub body_count: usize,
    pub scenario: ScenarioKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ControlCommand {
    Play,
    Pause,
    Step,
    Reset,
    Speed { speed: f64 },
}

/// A cluster of new bodies around (x, y, z) moving with (vx, vy, vz)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AddBodiesRequest {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
    #[serde(default = "default_add_count")]
    pub count: usize,
    #[serde(default = "default_add_radius")]
    pub radius: f64,
}

fn default_add_count() -> usize {
    100
}

fn default_add_radius() -> f64 {
    50.0
}

/// Parse and validate one inbound text message
pub fn decode(text: &str) -> Result<ControlMessage, MessageError> {
    let message: ControlMessage = serde_json::from_str(text)?;
    validate(&message)?;
    Ok(message)
}

fn validate(message: &ControlMessage) -> Result<(), MessageError> {
    match message {
        ControlMessage::Init(init) if init.body_count == 0 => Err(MessageError::Invalid("bodyCount must be positive")),
        ControlMessage::Control(ControlCommand::Speed { speed }) if !speed.is_finite() || *speed < 0.0 => {
            Err(MessageError::Invalid("speed must be a non-negative number"))
        }
        ControlMessage::Params(update) if !update.is_finite() => Err(MessageError::Invalid("parameters must be finite")),
        ControlMessage::AddBodies(add) => {
            if add.count == 0 {
                return Err(MessageError::Invalid("count must be positive"));
            }
            if !add.radius.is_finite() || add.radius <= 0.0 {
                return Err(MessageError::Invalid("radius must be positive"));
            }
            let coords = [add.x, add.y, add.z, add.vx, add.vy, add.vz];
            if !coords.iter().all(|c| c.is_finite()) {
                return Err(MessageError::Invalid("position and velocity must be finite"));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Orchestrator state as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "state", rename_all = "camelCase")]
pub struct StateMessage {
    pub mode: Mode,
    pub body_count: usize,
    pub sim_time: f64,
    pub paused: bool,
    pub steps_per_second: u32,
    #[serde(rename = "is3D")]
    pub is_3d: bool,
    pub params: Parameters,
}

impl StateMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
