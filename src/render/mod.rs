//! Host side of the tracer: path-trace scheduling, light sampling, frames.
//!
//! The scheduler never touches the device directly. It asks an
//! [`Intersector`] to advance a ray to its next intersection; the device
//! implementation is [`GpuTracer`](crate::device::GpuTracer) and
//! [`HostIntersector`] walks the same octree on the CPU.

mod frame;
mod host;
mod light;
mod queue;
mod scheduler;
mod task;

pub use frame::*;
pub use host::HostIntersector;
pub use light::{LightSampler, MAX_SHADOW_STEPS};
pub use queue::PendingQueue;
pub use scheduler::{fold_child, PixelSample, TraceEngine, TraceStats, TraceStatsSnapshot};
pub use task::{Branch, IntersectionSlot, Outcome, RayTask, TaskId};

use crate::scene::Ray;
use crate::util::{Error, Result, Vec3};

/// Advances rays through the voxel scene.
pub trait Intersector: Send + Sync {
    /// Move `ray` to the next surface where the block differs from its
    /// current material and enter it.
    ///
    /// Returns `Ok(false)` when the ray leaves the scene; the ray is left
    /// untouched in that case.
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool>;
}

impl<T: Intersector + ?Sized> Intersector for &T {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        (**self).next_intersection(ray)
    }
}

/// Primary rays sharing one origin, resolved in a single device call.
#[derive(Debug, Clone, Copy)]
pub struct BatchRequest<'a> {
    /// Packed `x, y, z` triples, one per ray.
    pub directions: &'a [f32],
    pub origin: Vec3,
    /// Seeds the stochastic alpha test.
    pub seed: u32,
    /// Octree node visits per ray; 0 selects the kernel default.
    pub max_depth: u32,
    /// Treat every non-air block as opaque.
    pub preview: bool,
    pub sun_direction: Vec3,
}

impl BatchRequest<'_> {
    /// Number of rays, rejecting a direction array that is not whole triples.
    pub fn ray_count(&self) -> Result<usize> {
        if self.directions.len() % 3 != 0 {
            return Err(Error::invalid(format!(
                "direction array length {} is not a multiple of 3",
                self.directions.len()
            )));
        }
        Ok(self.directions.len() / 3)
    }
}

/// Resolves batches of primary rays to depth, block and sun cosine.
pub trait DepthPreview: Send + Sync {
    /// Three floats per ray: distance (`-1` on miss), block id, sun cosine.
    fn intersect_batch(&self, request: &BatchRequest<'_>) -> Result<Vec<f32>>;
}
