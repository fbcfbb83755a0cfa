//! Compute context abstraction and the software device.
//!
//! A [`ComputeContext`] is the device API the tiled solver talks to: buffer
//! management, kernel dispatch and readback. Contexts are not `Send`. A
//! [`ContextProvider`] is handed to the compute worker and invoked on the
//! worker's own thread, so a context is created, used and destroyed on one
//! thread only.
//!
//! # Implementations
//! - [`SoftwareContext`]: executes the tile kernel on the host with
//!   lockstep lane emulation (always available)
//! - [`UnavailableProvider`]: never produces a context; models an
//!   environment without a compatible device

use std::collections::HashMap;

use thiserror::Error;

use crate::tiled::buffer::DeviceBody;
use crate::tiled::kernel::{self, KernelParams, KernelStats};

/// Errors raised by a compute context or the worker that owns it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// No context could be created in this environment.
    #[error("compute context unavailable: {0}")]
    ContextUnavailable(String),

    /// An operation was issued while the context was not current.
    #[error("compute context is not current")]
    NotCurrent,

    /// An operation was issued after the context was destroyed.
    #[error("compute context has been destroyed")]
    Destroyed,

    /// A buffer handle that this context never issued, or already released.
    #[error("unknown device buffer {0:?}")]
    UnknownBuffer(BufferId),

    /// A read or write beyond the allocated length of a buffer.
    #[error("device buffer access out of range: {len} elements requested, capacity {capacity}")]
    OutOfRange { len: usize, capacity: usize },

    /// Generic device-side failure (lost device, failed readback, ...).
    #[error("device operation failed: {0}")]
    Operation(String),

    /// The compute worker is gone; the task never ran or its reply was lost.
    #[error("compute worker is not running")]
    WorkerGone,
}

/// Handle to a buffer allocated by a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Device API used by the tiled solver.
///
/// Every method except [`ComputeContext::name`] requires the context to be
/// current on the calling thread.
pub trait ComputeContext {
    /// Backend name (e.g. "software").
    fn name(&self) -> &str;

    /// Bind the context to the calling thread.
    fn make_current(&mut self) -> Result<(), DeviceError>;

    /// Allocate a body buffer holding `len` elements.
    fn create_buffer(&mut self, len: usize) -> Result<BufferId, DeviceError>;

    fn release_buffer(&mut self, id: BufferId) -> Result<(), DeviceError>;

    /// Copy `data` into the start of the buffer.
    fn write_buffer(&mut self, id: BufferId, data: &[DeviceBody]) -> Result<(), DeviceError>;

    /// Copy the first `len` elements of the buffer back to the host.
    fn read_buffer(&mut self, id: BufferId, len: usize) -> Result<Vec<DeviceBody>, DeviceError>;

    /// Run one n-body integration step over the first `count` bodies of the buffer.
    fn dispatch(&mut self, id: BufferId, count: usize, params: &KernelParams) -> Result<KernelStats, DeviceError>;

    /// Release the context itself. No other call is valid afterwards.
    fn destroy(&mut self) -> Result<(), DeviceError>;
}

/// Factory for compute contexts, invoked on the compute worker thread.
pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self) -> Result<Box<dyn ComputeContext>, DeviceError>;
}

/// Provider for [`SoftwareContext`]
#[derive(Debug, Clone)]
pub struct SoftwareProvider {
    pub tile_size: usize,
}

impl SoftwareProvider {
    pub fn new(tile_size: usize) -> Self {
        Self { tile_size }
    }
}

impl ContextProvider for SoftwareProvider {
    fn name(&self) -> &str {
        "software"
    }

    fn create(&self) -> Result<Box<dyn ComputeContext>, DeviceError> {
        Ok(Box::new(SoftwareContext::new(self.tile_size)))
    }
}

/// Provider whose context creation always fails
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Default for UnavailableProvider {
    fn default() -> Self {
        Self::new("no compatible compute adapter")
    }
}

impl ContextProvider for UnavailableProvider {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn create(&self) -> Result<Box<dyn ComputeContext>, DeviceError> {
        Err(DeviceError::ContextUnavailable(self.reason.clone()))
    }
}

/// Host-memory device executing the tile kernel with emulated workgroups.
///
/// Buffers live in the context; the host only sees copies made by
/// [`ComputeContext::read_buffer`].
pub struct SoftwareContext {
    tile_size: usize,
    buffers: HashMap<BufferId, Vec<DeviceBody>>,
    next_id: u32,
    current: bool,
    destroyed: bool,
}

impl SoftwareContext {
    pub fn new(tile_size: usize) -> Self {
        Self {
            tile_size: tile_size.max(1),
            buffers: HashMap::new(),
            next_id: 0,
            current: false,
            destroyed: false,
        }
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn check(&self) -> Result<(), DeviceError> {
        if self.destroyed {
            return Err(DeviceError::Destroyed);
        }
        if !self.current {
            return Err(DeviceError::NotCurrent);
        }
        Ok(())
    }

    fn buffer_mut(&mut self, id: BufferId) -> Result<&mut Vec<DeviceBody>, DeviceError> {
        self.buffers.get_mut(&id).ok_or(DeviceError::UnknownBuffer(id))
    }
}

impl ComputeContext for SoftwareContext {
    fn name(&self) -> &str {
        "software"
    }

    fn make_current(&mut self) -> Result<(), DeviceError> {
        if self.destroyed {
            return Err(DeviceError::Destroyed);
        }
        self.current = true;
        Ok(())
    }

    fn create_buffer(&mut self, len: usize) -> Result<BufferId, DeviceError> {
        self.check()?;
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.buffers.insert(id, vec![DeviceBody::default(); len]);
        Ok(id)
    }

    fn release_buffer(&mut self, id: BufferId) -> Result<(), DeviceError> {
        self.check()?;
        self.buffers.remove(&id).map(|_| ()).ok_or(DeviceError::UnknownBuffer(id))
    }

    fn write_buffer(&mut self, id: BufferId, data: &[DeviceBody]) -> Result<(), DeviceError> {
        self.check()?;
        let buffer = self.buffer_mut(id)?;
        if data.len() > buffer.len() {
            return Err(DeviceError::OutOfRange { len: data.len(), capacity: buffer.len() });
        }
        buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&mut self, id: BufferId, len: usize) -> Result<Vec<DeviceBody>, DeviceError> {
        self.check()?;
        let buffer = self.buffer_mut(id)?;
        if len > buffer.len() {
            return Err(DeviceError::OutOfRange { len, capacity: buffer.len() });
        }
        Ok(buffer[..len].to_vec())
    }

    fn dispatch(&mut self, id: BufferId, count: usize, params: &KernelParams) -> Result<KernelStats, DeviceError> {
        self.check()?;
        let tile_size = self.tile_size;
        let buffer = self.buffer_mut(id)?;
        if count > buffer.len() {
            return Err(DeviceError::OutOfRange { len: count, capacity: buffer.len() });
        }
        Ok(kernel::integrate_step(&mut buffer[..count], tile_size, params))
    }

    fn destroy(&mut self) -> Result<(), DeviceError> {
        self.check()?;
        self.buffers.clear();
        self.current = false;
        self.destroyed = true;
        Ok(())
    }
}
