//! Host-side packing of scene data into device images.
//!
//! Every device image is a 2-D, 4-channel texture exactly [`ROW_TEXELS`] texels
//! wide. A flat array of length `L` is zero-padded up to the smallest multiple
//! of [`ROW_VALUES`] and laid out row-major, so value `i` lives in texel
//! `i / 4`, channel `i % 4`.

use bytemuck::Pod;

use super::gpu_types::SceneInfo;
use crate::scene::{BlockPalette, OctreeSnapshot};
use crate::util::{Error, Result};

/// Texels per image row.
pub const ROW_TEXELS: u32 = 8192;

/// Channels per texel.
pub const CHANNELS: usize = 4;

/// Scalar values per image row.
pub const ROW_VALUES: usize = ROW_TEXELS as usize * CHANNELS;

/// Smallest multiple of [`ROW_VALUES`] holding `len` values.
#[inline]
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(ROW_VALUES) * ROW_VALUES
}

/// Copy `values` into a zero-padded, row-aligned array.
pub fn pack_rows<T: Pod>(values: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(padded_len(values.len()));
    out.extend_from_slice(values);
    out.resize(padded_len(values.len()), T::zeroed());
    out
}

/// Row-aligned image ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedImage<T> {
    data: Vec<T>,
    /// Meaningful values before padding.
    len: usize,
}

impl<T: Pod> PackedImage<T> {
    pub fn from_values(values: &[T]) -> Self {
        Self { data: pack_rows(values), len: values.len() }
    }

    /// Rows holding data; 0 for an empty image.
    #[inline]
    pub fn rows(&self) -> u32 {
        (self.data.len() / ROW_VALUES) as u32
    }

    /// Rows the device texture is created with; textures cannot be empty.
    #[inline]
    pub fn texture_rows(&self) -> u32 {
        self.rows().max(1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.data
    }

    /// Upload bytes covering [`texture_rows`](Self::texture_rows) full rows.
    pub fn texture_bytes(&self) -> Vec<u8> {
        let mut bytes = bytemuck::cast_slice(&self.data).to_vec();
        if bytes.is_empty() {
            bytes.resize(ROW_VALUES * std::mem::size_of::<T>(), 0);
        }
        bytes
    }
}

/// Concatenation of every block texture, addressed by texel offset.
///
/// The backing buffer is pre-sized to one reference texture per block and
/// grows geometrically when larger textures overflow it.
#[derive(Debug, Clone)]
pub struct AtlasBuilder {
    texels: Vec<u32>,
    grow_count: u32,
}

impl AtlasBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { texels: Vec::with_capacity(capacity), grow_count: 0 }
    }

    /// Append `texels`, returning the offset of the first one.
    pub fn push(&mut self, texels: &[u32]) -> u32 {
        let offset = self.texels.len();
        let needed = offset + texels.len();
        if needed > self.texels.capacity() {
            let cap = self.texels.capacity();
            let target = (cap * 2).max(needed);
            self.texels.reserve_exact(target - offset);
            self.grow_count += 1;
        }
        self.texels.extend_from_slice(texels);
        offset as u32
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.texels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.texels.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.texels.capacity()
    }

    /// Times the buffer had to be enlarged past its initial sizing.
    #[inline]
    pub fn grow_count(&self) -> u32 {
        self.grow_count
    }

    pub fn into_texels(self) -> Vec<u32> {
        self.texels
    }
}

/// Quantize a material scalar to `value * 256`.
#[inline]
pub fn quantize(value: f64) -> i32 {
    (value * 256.0) as i32
}

/// Per-block device record: one `Rgba32Sint` texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    pub texel_offset: i32,
    /// `emittance * emitter_intensity * 256`.
    pub emittance: i32,
    /// `specular * 256`.
    pub specular: i32,
    pub width: u16,
    pub height: u16,
}

impl BlockMeta {
    #[inline]
    pub fn to_texel(self) -> [i32; 4] {
        let size = ((self.width as u32) << 16) | self.height as u32;
        [self.texel_offset, self.emittance, self.specular, size as i32]
    }
}

/// Everything one scene upload writes to the device.
#[derive(Debug, Clone)]
pub struct PackedScene {
    pub octree: PackedImage<i32>,
    /// Block texels as flat values; four share one `Rgba32Uint` image texel.
    pub atlas: PackedImage<u32>,
    pub block_meta: PackedImage<i32>,
    pub transparent: Vec<u32>,
    pub info: SceneInfo,
    /// Atlas buffer growth while packing.
    pub atlas_grow_count: u32,
}

impl PackedScene {
    /// Pack an octree and palette into device images.
    #[tracing::instrument(skip_all, fields(nodes = octree.nodes.len(), blocks = palette.len()))]
    pub fn pack(octree: &OctreeSnapshot, palette: &BlockPalette, emitter_intensity: f64) -> Result<Self> {
        octree.validate()?;

        let reference = &palette.reference_block().texture;
        let mut atlas = AtlasBuilder::with_capacity(reference.texels.len() * palette.len());
        let mut meta = Vec::with_capacity(palette.len() * CHANNELS);

        for (id, block) in palette.iter().enumerate() {
            let tex = &block.texture;
            if tex.width == 0 || tex.height == 0 || tex.width > u16::MAX as u32 || tex.height > u16::MAX as u32 {
                return Err(Error::SceneExport(format!(
                    "block {id} ({}) has unsupported texture size {}x{}",
                    block.name, tex.width, tex.height
                )));
            }
            if tex.texels.len() != (tex.width * tex.height) as usize {
                return Err(Error::SceneExport(format!(
                    "block {id} ({}) texture holds {} texels, expected {}x{}",
                    block.name,
                    tex.texels.len(),
                    tex.width,
                    tex.height
                )));
            }
            let offset = atlas.push(&tex.texels);
            let record = BlockMeta {
                texel_offset: offset as i32,
                emittance: quantize(block.emittance as f64 * emitter_intensity),
                specular: quantize(block.specular as f64),
                width: tex.width as u16,
                height: tex.height as u16,
            };
            meta.extend_from_slice(&record.to_texel());
        }

        if atlas.grow_count() > 0 {
            tracing::debug!(grows = atlas.grow_count(), texels = atlas.len(), "atlas outgrew reference sizing");
        }

        let transparent = palette.transparent_ids();
        let info = SceneInfo {
            octree_depth: octree.depth,
            octree_len: octree.nodes.len() as u32,
            transparent_count: transparent.len() as u32,
            block_count: palette.len() as u32,
        };
        let atlas_grow_count = atlas.grow_count();

        Ok(Self {
            octree: PackedImage::from_values(&octree.nodes),
            atlas: PackedImage::from_values(&atlas.into_texels()),
            block_meta: PackedImage::from_values(&meta),
            transparent,
            info,
            atlas_grow_count,
        })
    }

    /// Fail with [`Error::SceneTooLarge`] when any image exceeds `max_rows`.
    pub fn check_rows(&self, max_rows: u32) -> Result<()> {
        for (what, rows) in [
            ("octree", self.octree.rows()),
            ("texture atlas", self.atlas.rows()),
            ("block metadata", self.block_meta.rows()),
        ] {
            if rows > max_rows {
                return Err(Error::SceneTooLarge { what, rows, limit: max_rows });
            }
        }
        Ok(())
    }

    /// Transparent list as uploaded; storage bindings cannot be empty.
    pub fn transparent_bytes(&self) -> Vec<u8> {
        if self.transparent.is_empty() {
            bytemuck::cast_slice(&[u32::MAX]).to_vec()
        } else {
            bytemuck::cast_slice(&self.transparent).to_vec()
        }
    }
}
