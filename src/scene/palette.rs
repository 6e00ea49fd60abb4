//! Block palette: per-block textures and material properties.

use crate::util::{DVec4, Error, Result};

/// Block id reserved for air; octree leaves of value 0 are air.
pub const AIR: u32 = 0;

/// Square-or-rectangular ARGB texture of one block face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    /// Row-major `0xAARRGGBB` texels.
    pub texels: Vec<u32>,
}

impl Texture {
    /// Texture filled with one color.
    pub fn solid(width: u32, height: u32, argb: u32) -> Self {
        Self { width, height, texels: vec![argb; (width * height) as usize] }
    }

    /// Fully transparent 1x1 texture.
    pub fn empty() -> Self {
        Self::solid(1, 1, 0)
    }
}

/// Material properties of one palette entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub texture: Texture,
    pub emittance: f32,
    pub specular: f32,
    /// Rendered as air by the device (not intersected).
    pub invisible: bool,
    pub sub_surface_scattering: bool,
    pub water: bool,
}

impl Block {
    /// Opaque, non-emissive block with the given texture.
    pub fn new(name: impl Into<String>, texture: Texture) -> Self {
        Self {
            name: name.into(),
            texture,
            emittance: 0.0,
            specular: 0.0,
            invisible: false,
            sub_surface_scattering: false,
            water: false,
        }
    }

    pub fn air() -> Self {
        Self { invisible: true, ..Self::new("air", Texture::empty()) }
    }

    pub fn with_emittance(mut self, emittance: f32) -> Self {
        self.emittance = emittance;
        self
    }

    pub fn with_specular(mut self, specular: f32) -> Self {
        self.specular = specular;
        self
    }

    pub fn with_invisible(mut self, invisible: bool) -> Self {
        self.invisible = invisible;
        self
    }

    pub fn with_sub_surface_scattering(mut self, sss: bool) -> Self {
        self.sub_surface_scattering = sss;
        self
    }

    pub fn with_water(mut self, water: bool) -> Self {
        self.water = water;
        self
    }
}

/// Ordered block list; a block's index is its id in the octree.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPalette {
    blocks: Vec<Block>,
    /// Fully opaque, full-size block used to size the texture atlas.
    reference_block: u32,
}

impl BlockPalette {
    /// Palette holding only air; `reference_block` starts at air until set.
    pub fn new() -> Self {
        Self { blocks: vec![Block::air()], reference_block: AIR }
    }

    /// Append a block and return its id.
    pub fn push(&mut self, block: Block) -> u32 {
        self.blocks.push(block);
        (self.blocks.len() - 1) as u32
    }

    /// Mark the block whose texture size sizes the atlas.
    pub fn set_reference_block(&mut self, id: u32) -> Result<()> {
        if id as usize >= self.blocks.len() {
            return Err(Error::SceneExport(format!("reference block {id} not in palette")));
        }
        self.reference_block = id;
        Ok(())
    }

    #[inline]
    pub fn reference_block(&self) -> &Block {
        &self.blocks[self.reference_block as usize]
    }

    /// Properties of block `id`; unknown ids resolve to air.
    #[inline]
    pub fn get(&self, id: u32) -> &Block {
        self.blocks.get(id as usize).unwrap_or(&self.blocks[AIR as usize])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Ids of blocks flagged invisible, in palette order.
    pub fn transparent_ids(&self) -> Vec<u32> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.invisible)
            .map(|(i, _)| i as u32)
            .collect()
    }
}

impl Default for BlockPalette {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an `0xAARRGGBB` texel into linear RGB plus alpha.
pub fn texel_to_linear(argb: u32) -> DVec4 {
    let channel = |shift: u32| ((argb >> shift) & 0xFF) as f64 / 255.0;
    DVec4::new(
        channel(16).powf(2.2),
        channel(8).powf(2.2),
        channel(0).powf(2.2),
        channel(24),
    )
}
