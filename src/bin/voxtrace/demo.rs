//! Built-in test scene: stone floor, a glass wall, a lamp and a mirror block.

use voxtrace::scene::{
    Block, BlockPalette, EmitterGrid, EmitterPosition, GradientSky, OctreeSnapshot, PinholeCamera, Texture,
};
use voxtrace::util::DVec3;
use voxtrace::Result;

pub const SIZE_DEPTH: u32 = 5;

pub struct Demo {
    pub octree: OctreeSnapshot,
    pub palette: BlockPalette,
    pub emitters: EmitterGrid,
    pub sky: GradientSky,
    pub camera: PinholeCamera,
}

pub fn build() -> Result<Demo> {
    let mut palette = BlockPalette::new();
    let stone = palette.push(Block::new("stone", Texture::solid(4, 4, 0xFF7F7F7F)));
    let glass = palette.push(Block::new("glass", Texture::solid(4, 4, 0x60C0E0FF)));
    let lamp = palette.push(Block::new("lamp", Texture::solid(4, 4, 0xFFFFE0A0)).with_emittance(1.0));
    let mirror = palette.push(Block::new("mirror", Texture::solid(4, 4, 0xFFE0E0E0)).with_specular(0.9));
    palette.set_reference_block(stone)?;

    let octree = OctreeSnapshot::from_fn(SIZE_DEPTH, |x, y, z| match (x, y, z) {
        (_, 0, _) => stone,
        (20, 1..=4, 8..=20) => glass,
        (10, 1, 14) => lamp,
        (14..=15, 1..=2, 18..=19) => mirror,
        _ => 0,
    });

    let mut emitters = EmitterGrid::new(8);
    emitters.insert(EmitterPosition::voxel(10, 1, 14));

    Ok(Demo {
        octree,
        palette,
        emitters,
        sky: GradientSky::default(),
        camera: PinholeCamera::looking_at(DVec3::new(2.0, 6.0, 2.0), DVec3::new(14.0, 1.0, 14.0), 70.0),
    })
}
