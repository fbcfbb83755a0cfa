//! The 3D tiled direct solver.
//!
//! Host-side facade over a [`ComputeWorker`]: every method turns into one
//! task on the worker thread. Body state lives in the device body buffer;
//! the host only keeps the live count.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::simulation::engine::IntegrationScheme;
use crate::simulation::params::Parameters;
use crate::simulation::states::Body3;
use crate::tiled::buffer::DeviceBody;
use crate::tiled::device::{ContextProvider, DeviceError};
use crate::tiled::kernel::{KernelParams, KernelStats};
use crate::tiled::worker::{ComputeWorker, TaskHandle, WorkerState};

pub struct TiledSolver {
    worker: ComputeWorker,
    count: usize,
}

impl TiledSolver {
    pub const SCHEME: IntegrationScheme = IntegrationScheme::SemiImplicitEuler;

    /// Start a worker and create its compute context.
    /// Context creation failures are returned as is.
    pub async fn new(provider: Arc<dyn ContextProvider>) -> Result<Self, DeviceError> {
        let worker = ComputeWorker::spawn(provider).await?;
        Ok(Self { worker, count: 0 })
    }

    pub fn backend(&self) -> &str {
        self.worker.backend()
    }

    /// Replace the device-side bodies
    pub async fn upload(&mut self, bodies: &[Body3]) -> Result<(), DeviceError> {
        let data: Vec<DeviceBody> = bodies.iter().map(DeviceBody::from).collect();
        let count = data.len();
        self.worker
            .submit(move |state: &mut WorkerState| state.bodies.upload(state.context.as_mut(), &data))
            .wait()
            .await??;
        self.count = count;
        Ok(())
    }

    /// One integration step over all live bodies, awaited until it completed
    pub async fn step(&mut self, params: &Parameters) -> Result<KernelStats, DeviceError> {
        self.step_detached(params).wait().await?
    }

    /// Queue one step without waiting for it
    pub fn step_detached(&self, params: &Parameters) -> TaskHandle<Result<KernelStats, DeviceError>> {
        let uniforms = KernelParams::from_params(params);
        self.worker.submit(move |state: &mut WorkerState| {
            let count = state.bodies.count();
            match state.bodies.id() {
                Some(id) if count > 0 => state.context.dispatch(id, count, &uniforms),
                _ => Ok(KernelStats::default()),
            }
        })
    }

    /// Current body state read back from the device.
    /// A failed readback is logged and yields an empty list.
    pub async fn read_bodies(&self) -> Vec<Body3> {
        let result = self
            .worker
            .submit(|state: &mut WorkerState| state.bodies.read(state.context.as_mut()))
            .wait()
            .await;

        match result {
            Ok(Ok(bodies)) => bodies.iter().map(DeviceBody::to_body).collect(),
            Ok(Err(e)) | Err(e) => {
                warn!(error = %e, "device readback failed");
                Vec::new()
            }
        }
    }

    /// Allocated length of the device body buffer
    pub async fn capacity(&self) -> Result<usize, DeviceError> {
        self.worker
            .submit(|state: &mut WorkerState| state.bodies.capacity())
            .wait()
            .await
    }

    /// Append bodies after the existing ones.
    ///
    /// Readback, extension and re-upload run as one task, so no step can
    /// interleave between reading the current state and writing it back.
    pub async fn inject(&mut self, bodies: Vec<Body3>) -> Result<(), DeviceError> {
        let extra: Vec<DeviceBody> = bodies.iter().map(DeviceBody::from).collect();
        let count = self
            .worker
            .submit(move |state: &mut WorkerState| {
                let mut current = state.bodies.read(state.context.as_mut())?;
                current.extend_from_slice(&extra);
                state.bodies.upload(state.context.as_mut(), &current)?;
                Ok::<_, DeviceError>(current.len())
            })
            .wait()
            .await??;

        debug!(added = bodies.len(), total = count, "bodies injected on device");
        self.count = count;
        Ok(())
    }

    pub fn body_count(&self) -> usize {
        self.count
    }

    /// Release device resources and stop the worker
    pub async fn shutdown(self) -> Result<(), DeviceError> {
        self.worker.shutdown().await
    }
}
