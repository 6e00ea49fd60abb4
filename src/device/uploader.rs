//! Device scene upload and reload accounting.

use wgpu::util::DeviceExt;

use super::gpu_types::SceneInfo;
use super::kernel::{
    ATLAS_BINDING, META_BINDING, OCTREE_BINDING, SCENE_INFO_BINDING, TRANSPARENT_BINDING,
};
use super::layout::{PackedImage, PackedScene, ROW_TEXELS};
use crate::scene::{BlockPalette, OctreeSnapshot, SceneExport, SCENE_EXPORT_VERSION};
use crate::util::{Error, Result};

/// Allocates and frees the device copy of a packed scene.
///
/// The uploader only talks to the device through this trait, which keeps its
/// reload accounting testable without an adapter.
pub trait SceneStore {
    type Resident;

    /// Allocate device resources holding `scene`.
    fn create(&self, scene: &PackedScene) -> Result<Self::Resident>;

    /// Free resources returned by [`create`](Self::create).
    fn release(&self, resident: Self::Resident);
}

/// Allocation counters across the uploader's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// Successful uploads.
    pub uploads: u64,
    /// Resident scenes allocated.
    pub allocations: u64,
    /// Resident scenes released.
    pub releases: u64,
    /// Atlas buffer growths summed over all uploads.
    pub atlas_grows: u64,
}

/// Owns the resident device scene and replaces it wholesale on reload.
pub struct SceneUploader<S: SceneStore> {
    store: S,
    resident: Option<S::Resident>,
    info: Option<SceneInfo>,
    max_rows: u32,
    stats: UploadStats,
}

impl<S: SceneStore> SceneUploader<S> {
    /// Uploader whose images may use at most `max_rows` rows.
    pub fn new(store: S, max_rows: u32) -> Self {
        Self { store, resident: None, info: None, max_rows, stats: UploadStats::default() }
    }

    /// Pack `octree` and `palette` and make them the resident scene.
    ///
    /// Packing errors are returned before the previous scene is released, so
    /// a failed upload leaves the old scene usable.
    #[tracing::instrument(skip_all, fields(depth = octree.depth, nodes = octree.nodes.len(), blocks = palette.len()))]
    pub fn upload(&mut self, octree: &OctreeSnapshot, palette: &BlockPalette, emitter_intensity: f64) -> Result<&S::Resident> {
        let packed = PackedScene::pack(octree, palette, emitter_intensity)?;
        packed.check_rows(self.max_rows)?;

        if let Some(old) = self.resident.take() {
            self.store.release(old);
            self.info = None;
            self.stats.releases += 1;
        }
        debug_assert_eq!(self.stats.releases, self.stats.allocations);

        let resident = self.store.create(&packed)?;
        self.stats.allocations += 1;
        self.stats.uploads += 1;
        self.stats.atlas_grows += packed.atlas_grow_count as u64;
        self.info = Some(packed.info);

        tracing::info!(
            octree_rows = packed.octree.rows(),
            atlas_rows = packed.atlas.rows(),
            atlas_texels = packed.atlas.len(),
            transparent = packed.transparent.len(),
            "scene uploaded"
        );
        Ok(self.resident.insert(resident))
    }

    /// Upload the scene currently exposed by a host renderer.
    pub fn load_from(&mut self, export: &dyn SceneExport, emitter_intensity: f64) -> Result<&S::Resident> {
        let version = export.export_version();
        if version != SCENE_EXPORT_VERSION {
            return Err(Error::SceneExport(format!(
                "export version {version} not supported (expected {SCENE_EXPORT_VERSION})"
            )));
        }
        let octree = export.octree()?;
        let palette = export.palette()?;
        self.upload(&octree, &palette, emitter_intensity)
    }

    /// Release the resident scene, if any.
    pub fn clear(&mut self) {
        if let Some(old) = self.resident.take() {
            self.store.release(old);
            self.stats.releases += 1;
        }
        self.info = None;
    }

    #[inline]
    pub fn resident(&self) -> Option<&S::Resident> {
        self.resident.as_ref()
    }

    #[inline]
    pub fn info(&self) -> Option<&SceneInfo> {
        self.info.as_ref()
    }

    #[inline]
    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: SceneStore> Drop for SceneUploader<S> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Device copy of a packed scene: three images, two buffers and the bind
/// group tying them to group 0.
pub struct GpuScene {
    octree: wgpu::Texture,
    atlas: wgpu::Texture,
    block_meta: wgpu::Texture,
    transparent: wgpu::Buffer,
    info: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GpuScene {
    #[inline]
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

/// [`SceneStore`] backed by a wgpu device.
pub struct DeviceStore {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
}

impl DeviceStore {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, layout: wgpu::BindGroupLayout) -> Self {
        Self { device, queue, layout }
    }

    fn image<T: bytemuck::Pod>(&self, label: &str, format: wgpu::TextureFormat, image: &PackedImage<T>) -> wgpu::Texture {
        self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d { width: ROW_TEXELS, height: image.texture_rows(), depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &image.texture_bytes(),
        )
    }
}

impl SceneStore for DeviceStore {
    type Resident = GpuScene;

    fn create(&self, scene: &PackedScene) -> Result<GpuScene> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let octree = self.image("vt_octree", wgpu::TextureFormat::Rgba32Sint, &scene.octree);
        let atlas = self.image("vt_atlas", wgpu::TextureFormat::Rgba32Uint, &scene.atlas);
        let block_meta = self.image("vt_block_meta", wgpu::TextureFormat::Rgba32Sint, &scene.block_meta);
        let transparent = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vt_transparent"),
            contents: &scene.transparent_bytes(),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let info = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vt_scene_info"),
            contents: bytemuck::bytes_of(&scene.info),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let octree_view = octree.create_view(&wgpu::TextureViewDescriptor::default());
        let atlas_view = atlas.create_view(&wgpu::TextureViewDescriptor::default());
        let meta_view = block_meta.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vt_scene_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: OCTREE_BINDING, resource: wgpu::BindingResource::TextureView(&octree_view) },
                wgpu::BindGroupEntry { binding: ATLAS_BINDING, resource: wgpu::BindingResource::TextureView(&atlas_view) },
                wgpu::BindGroupEntry { binding: META_BINDING, resource: wgpu::BindingResource::TextureView(&meta_view) },
                wgpu::BindGroupEntry { binding: TRANSPARENT_BINDING, resource: transparent.as_entire_binding() },
                wgpu::BindGroupEntry { binding: SCENE_INFO_BINDING, resource: info.as_entire_binding() },
            ],
        });

        let scene = GpuScene { octree, atlas, block_meta, transparent, info, bind_group };
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            self.release(scene);
            return Err(Error::DeviceUnavailable(format!("scene allocation failed: {e}")));
        }
        Ok(scene)
    }

    fn release(&self, scene: GpuScene) {
        scene.octree.destroy();
        scene.atlas.destroy();
        scene.block_meta.destroy();
        scene.transparent.destroy();
        scene.info.destroy();
    }
}
