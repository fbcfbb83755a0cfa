//! Device-side body layout and the grow-only body buffer.

use bytemuck::{Pod, Zeroable};

use crate::simulation::states::{Body3, NVec3};
use crate::tiled::device::{BufferId, ComputeContext, DeviceError};

/// One body as stored on the device: position + mass, velocity + padding.
/// 32 bytes, two 16-byte rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DeviceBody {
    pub position: [f32; 3],
    pub mass: f32,
    pub velocity: [f32; 3],
    pub _pad: f32,
}

impl DeviceBody {
    pub fn to_body(&self) -> Body3 {
        let [x, y, z] = self.position;
        let [vx, vy, vz] = self.velocity;
        Body3 {
            x: NVec3::new(x as f64, y as f64, z as f64),
            v: NVec3::new(vx as f64, vy as f64, vz as f64),
            m: self.mass as f64,
        }
    }
}

impl From<&Body3> for DeviceBody {
    fn from(b: &Body3) -> Self {
        Self {
            position: [b.x.x as f32, b.x.y as f32, b.x.z as f32],
            mass: b.m as f32,
            velocity: [b.v.x as f32, b.v.y as f32, b.v.z as f32],
            _pad: 0.0,
        }
    }
}

/// Body buffer owned by a compute context.
///
/// `capacity` only grows: an upload larger than the current allocation
/// replaces it with one of exactly the requested size, smaller uploads reuse
/// it. `count` is the number of live bodies; elements past it are stale and
/// never read.
#[derive(Debug, Default)]
pub struct DeviceBodyBuffer {
    id: Option<BufferId>,
    capacity: usize,
    count: usize,
}

impl DeviceBodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<BufferId> {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Replace the buffer contents with `bodies`, growing the allocation first if needed
    pub fn upload(&mut self, ctx: &mut dyn ComputeContext, bodies: &[DeviceBody]) -> Result<(), DeviceError> {
        self.reserve(ctx, bodies.len())?;
        if let Some(id) = self.id {
            ctx.write_buffer(id, bodies)?;
        }
        self.count = bodies.len();
        Ok(())
    }

    /// Live bodies only
    pub fn read(&self, ctx: &mut dyn ComputeContext) -> Result<Vec<DeviceBody>, DeviceError> {
        match self.id {
            Some(id) => ctx.read_buffer(id, self.count),
            None => Ok(Vec::new()),
        }
    }

    pub fn release(&mut self, ctx: &mut dyn ComputeContext) -> Result<(), DeviceError> {
        if let Some(id) = self.id.take() {
            ctx.release_buffer(id)?;
        }
        self.capacity = 0;
        self.count = 0;
        Ok(())
    }

    fn reserve(&mut self, ctx: &mut dyn ComputeContext, needed: usize) -> Result<(), DeviceError> {
        if needed <= self.capacity {
            return Ok(());
        }

        let new_id = ctx.create_buffer(needed)?;
        let old = self.id.replace(new_id);
        self.capacity = needed;
        self.count = 0;
        if let Some(old) = old {
            ctx.release_buffer(old)?;
        }
        Ok(())
    }
}
