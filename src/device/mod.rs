//! Compute device side: scene packing and upload, kernels, dispatch.
//!
//! - [`layout`] packs an octree and palette into fixed-row-width images
//! - [`SceneUploader`] owns the resident device scene and replaces it on reload
//! - [`GpuTracer`] answers single-ray queries ([`Intersector`](crate::render::Intersector))
//!   and preview batches ([`DepthPreview`](crate::render::DepthPreview))

mod batch;
mod context;
mod gpu_types;
mod kernel;
pub mod layout;
mod tracer;
mod uploader;

pub use batch::BATCH_STRIDE;
pub use context::GpuContext;
pub use gpu_types::{GpuHit, GpuRayQuery, SceneInfo, TraceParams};
pub use kernel::{KernelKind, Kernels, WG_SIZE};
pub use layout::{PackedImage, PackedScene, ROW_TEXELS, ROW_VALUES};
pub use tracer::GpuTracer;
pub use uploader::{DeviceStore, GpuScene, SceneStore, SceneUploader, UploadStats};
