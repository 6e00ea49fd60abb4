//! Host scene interface.
//!
//! The rendering application owns its scene, camera and material model. The
//! tracer sees it only through the read-only types and traits in this module:
//!
//! - [`OctreeSnapshot`] and [`BlockPalette`] - what gets uploaded to the device
//! - [`SceneExport`] - versioned accessor the uploader pulls snapshots through
//! - [`Environment`] / [`Sun`] - sky lookups for escaped rays and shadow rays
//! - [`EmitterIndex`] - spatial index of emitters for next-event estimation
//! - [`Camera`] - primary ray generation

mod camera;
mod emitters;
mod octree;
mod palette;
mod ray;
mod sky;

pub use camera::*;
pub use emitters::*;
pub use octree::*;
pub use palette::*;
pub use ray::*;
pub use sky::*;

use std::borrow::Cow;

use crate::util::Result;

/// Version of the export contract implemented by this crate.
pub const SCENE_EXPORT_VERSION: u32 = 1;

/// Read-only snapshot accessors exposed by the host renderer.
pub trait SceneExport {
    /// Contract version the host implements.
    fn export_version(&self) -> u32 {
        SCENE_EXPORT_VERSION
    }

    /// Current voxel octree.
    fn octree(&self) -> Result<Cow<'_, OctreeSnapshot>>;

    /// Current block palette.
    fn palette(&self) -> Result<Cow<'_, BlockPalette>>;
}

/// Owned scene, the simplest [`SceneExport`].
#[derive(Debug, Clone)]
pub struct StaticScene {
    pub octree: OctreeSnapshot,
    pub palette: BlockPalette,
}

impl SceneExport for StaticScene {
    fn octree(&self) -> Result<Cow<'_, OctreeSnapshot>> {
        Ok(Cow::Borrowed(&self.octree))
    }

    fn palette(&self) -> Result<Cow<'_, BlockPalette>> {
        Ok(Cow::Borrowed(&self.palette))
    }
}
