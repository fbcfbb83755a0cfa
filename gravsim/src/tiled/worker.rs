//! Dedicated compute worker owning a compute context.
//!
//! The worker is one OS thread. It creates its context through a
//! [`ContextProvider`] on startup and keeps it, together with the device body
//! buffer, until teardown. Nothing else can reach the context: all device
//! work is submitted as a closure over [`WorkerState`] and executed on the
//! worker thread in submission order.
//!
//! Callers either await the returned [`TaskHandle`] or drop it; a dropped
//! handle does not cancel the task.

use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::tiled::buffer::DeviceBodyBuffer;
use crate::tiled::device::{ComputeContext, ContextProvider, DeviceError};

/// Everything the worker thread owns
pub struct WorkerState {
    pub context: Box<dyn ComputeContext>,
    pub bodies: DeviceBodyBuffer,
}

type Task = Box<dyn FnOnce(&mut WorkerState) + Send>;

/// Pending result of a submitted task
#[must_use = "drop the handle explicitly to fire and forget"]
pub struct TaskHandle<R> {
    rx: oneshot::Receiver<R>,
}

impl<R> TaskHandle<R> {
    /// Wait for the task to finish on the worker
    pub async fn wait(self) -> Result<R, DeviceError> {
        self.rx.await.map_err(|_| DeviceError::WorkerGone)
    }
}

pub struct ComputeWorker {
    tx: Option<mpsc::UnboundedSender<Task>>,
    thread: Option<thread::JoinHandle<()>>,
    backend: String,
}

impl ComputeWorker {
    /// Start the worker thread and create its context there.
    /// Fails with the provider's error if no context can be created.
    pub async fn spawn(provider: Arc<dyn ContextProvider>) -> Result<Self, DeviceError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String, DeviceError>>();

        let thread = thread::Builder::new()
            .name("compute-worker".into())
            .spawn(move || {
                let created = provider.create().and_then(|mut context| {
                    context.make_current()?;
                    Ok(context)
                });
                let context = match created {
                    Ok(context) => context,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(context.name().to_string()));

                let mut state = WorkerState {
                    context,
                    bodies: DeviceBodyBuffer::new(),
                };
                while let Some(task) = rx.blocking_recv() {
                    task(&mut state);
                }
                debug!("compute worker exiting");
            })
            .map_err(|e| DeviceError::ContextUnavailable(format!("failed to start compute worker: {e}")))?;

        match ready_rx.await {
            Ok(Ok(backend)) => {
                info!(backend = %backend, "compute worker started");
                Ok(Self {
                    tx: Some(tx),
                    thread: Some(thread),
                    backend,
                })
            }
            // the thread has already returned
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::WorkerGone),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Queue `f` for execution on the worker thread
    pub fn submit<R, F>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce(&mut WorkerState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let task: Task = Box::new(move |state| {
            let _ = reply_tx.send(f(state));
        });

        // a closed channel drops the task and with it `reply_tx`,
        // so the handle resolves to `WorkerGone`
        if let Some(tx) = &self.tx {
            let _ = tx.send(task);
        }

        TaskHandle { rx: reply_rx }
    }

    /// Release every device resource, then stop the thread.
    ///
    /// Teardown runs as the last task on the worker; the thread is joined
    /// only once it has completed.
    pub async fn shutdown(mut self) -> Result<(), DeviceError> {
        let result = self.submit(teardown).wait().await;

        // closing the channel ends the worker loop
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                _ => warn!("compute worker did not exit cleanly"),
            }
        }

        info!(backend = %self.backend, "compute worker stopped");
        result?
    }
}

impl Drop for ComputeWorker {
    /// A worker dropped without `shutdown` still releases its resources:
    /// teardown is queued and the thread exits on its own afterwards.
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let task: Task = Box::new(|state| {
                if let Err(e) = teardown(state) {
                    warn!(error = %e, "compute context teardown failed");
                }
            });
            let _ = tx.send(task);
        }
    }
}

/// Make the context current, release the body buffer, destroy the context
fn teardown(state: &mut WorkerState) -> Result<(), DeviceError> {
    state.context.make_current()?;
    let released = state.bodies.release(state.context.as_mut());
    let destroyed = state.context.destroy();
    released.and(destroyed)
}
