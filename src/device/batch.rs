//! Batched primary intersection for the preview pass.

use super::gpu_types::TraceParams;
use super::kernel::KernelKind;
use super::tracer::GpuTracer;
use crate::render::{BatchRequest, DepthPreview};
use crate::util::{Error, Result};

/// Values written per ray: distance (or -1), block id, sun cosine.
pub const BATCH_STRIDE: usize = 3;

impl DepthPreview for GpuTracer {
    #[tracing::instrument(skip_all, fields(rays = request.directions.len() / 3, preview = request.preview))]
    fn intersect_batch(&self, request: &BatchRequest<'_>) -> Result<Vec<f32>> {
        let ray_count = request.ray_count()?;
        let scene = self.scene()?;
        let ray_count = u32::try_from(ray_count)
            .map_err(|_| Error::invalid(format!("{ray_count} rays in one batch")))?;

        let params = TraceParams {
            origin: request.origin.to_array(),
            ray_count,
            sun_direction: request.sun_direction.to_array(),
            seed: request.seed,
            max_depth: request.max_depth,
            preview: request.preview as u32,
            _pad: [0; 2],
        };
        let out = self.kernels.dispatch::<f32, f32>(
            &self.ctx,
            KernelKind::Depth,
            scene.bind_group(),
            &params,
            request.directions,
            ray_count as usize * BATCH_STRIDE,
        )?;
        tracing::debug!(rays = ray_count, "batch resolved");
        Ok(out)
    }
}
