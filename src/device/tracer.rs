//! Device-backed intersector.

use super::context::GpuContext;
use super::gpu_types::{GpuHit, GpuRayQuery, SceneInfo, TraceParams};
use super::kernel::{KernelKind, Kernels};
use super::uploader::{DeviceStore, GpuScene, SceneUploader, UploadStats};
use crate::render::Intersector;
use crate::scene::{BlockPalette, OctreeSnapshot, Ray, SceneExport};
use crate::util::{Error, Result};

/// Compute device, kernels and resident scene.
///
/// Uploads take `&mut self` while tracing borrows `&self`, so a reload can
/// never overlap an intersection request.
pub struct GpuTracer {
    pub(crate) ctx: GpuContext,
    pub(crate) kernels: Kernels,
    uploader: SceneUploader<DeviceStore>,
}

impl GpuTracer {
    /// Open the default adapter and build the kernels.
    pub fn new() -> Result<Self> {
        Self::with_context(GpuContext::new()?)
    }

    pub fn with_context(ctx: GpuContext) -> Result<Self> {
        let kernels = Kernels::new(&ctx)?;
        let store = DeviceStore::new(ctx.device.clone(), ctx.queue.clone(), kernels.scene_layout().clone());
        let uploader = SceneUploader::new(store, ctx.max_rows());
        Ok(Self { ctx, kernels, uploader })
    }

    /// Replace the resident scene.
    pub fn upload(&mut self, octree: &OctreeSnapshot, palette: &BlockPalette, emitter_intensity: f64) -> Result<()> {
        self.uploader.upload(octree, palette, emitter_intensity).map(|_| ())
    }

    /// Replace the resident scene with the one a host renderer exports.
    pub fn load_from(&mut self, export: &dyn SceneExport, emitter_intensity: f64) -> Result<()> {
        self.uploader.load_from(export, emitter_intensity).map(|_| ())
    }

    #[inline]
    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    #[inline]
    pub fn upload_stats(&self) -> UploadStats {
        self.uploader.stats()
    }

    #[inline]
    pub fn scene_info(&self) -> Option<&SceneInfo> {
        self.uploader.info()
    }

    pub(crate) fn scene(&self) -> Result<&GpuScene> {
        self.uploader.resident().ok_or(Error::NoScene)
    }

    /// Resolve a group of independent rays in one dispatch.
    pub fn intersect_rays(&self, queries: &[GpuRayQuery]) -> Result<Vec<GpuHit>> {
        let scene = self.scene()?;
        let ray_count = u32::try_from(queries.len())
            .map_err(|_| Error::invalid(format!("{} rays in one dispatch", queries.len())))?;
        let params = TraceParams { ray_count, ..Default::default() };
        self.kernels
            .dispatch(&self.ctx, KernelKind::Intersect, scene.bind_group(), &params, queries, queries.len())
    }
}

impl Intersector for GpuTracer {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        let hits = self.intersect_rays(&[GpuRayQuery::from_ray(ray)])?;
        match hits.first().and_then(GpuHit::to_intersection) {
            Some(hit) => {
                ray.enter(&hit);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
