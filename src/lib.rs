//! # voxtrace
//!
//! Voxel octree path tracer that offloads ray/octree intersection to a GPU
//! compute device through wgpu.
//!
//! The host renderer keeps its scene, camera and material model. It uploads an
//! octree snapshot plus block palette once per scene change, then either asks
//! for a whole-frame depth preview in one batched dispatch or path-traces
//! pixels on host threads, each ray segment resolved on the device.
//!
//! ## Modules
//!
//! - [`util`] - Error type and math helpers
//! - [`config`] - Render parameters
//! - [`scene`] - Host scene interface (octree, palette, sky, emitters, camera)
//! - [`device`] - Device context, scene upload, compute kernels
//! - [`render`] - Path-trace scheduler, light sampling, frame driver
//!
//! ## Example
//!
//! ```ignore
//! use voxtrace::prelude::*;
//!
//! let mut tracer = GpuTracer::new()?;
//! tracer.upload(&octree, &palette, params.emitter_intensity)?;
//!
//! let engine = TraceEngine::new(&tracer, &params, &palette, &sky);
//! let report = render_pass(&engine, &camera, 640, 360, 0);
//! report.finalize_into(&mut buffer);
//! ```

pub mod util;
pub mod config;
pub mod scene;
pub mod device;
pub mod render;

// Re-export commonly used types
pub use config::{EmitterSamplingStrategy, RenderParams};
pub use device::GpuTracer;
pub use util::{Error, Result};

/// Build date (UTC, `YYYY-MM-DD`) and cargo profile, set by the build script.
pub const BUILD_STAMP: &str = env!("VOXTRACE_BUILD");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EmitterSamplingStrategy, RenderParams};
    pub use crate::device::{GpuContext, GpuTracer};
    pub use crate::render::{
        render_pass, render_preview, DepthPreview, HostIntersector, Intersector, PixelSample, SampleBuffer,
        TraceEngine,
    };
    pub use crate::scene::{
        Block, BlockPalette, Camera, EmitterGrid, EmitterIndex, Environment, GradientSky, OctreeSnapshot,
        PinholeCamera, Ray, SceneExport, StaticScene, Sun, Texture,
    };
    pub use crate::util::{Error, Result};
}
