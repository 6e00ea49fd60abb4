//! Scene upload and reload accounting against a recording store.

use std::cell::{Cell, RefCell};

use voxtrace::device::layout::{PackedScene, ROW_VALUES};
use voxtrace::device::{SceneStore, SceneUploader};
use voxtrace::scene::{Block, BlockPalette, OctreeSnapshot, StaticScene, Texture};
use voxtrace::util::{Error, Result};

/// Keeps a copy of every packed scene and counts live allocations.
#[derive(Default)]
struct RecordingStore {
    live: Cell<i64>,
    created: RefCell<Vec<PackedScene>>,
}

impl SceneStore for RecordingStore {
    type Resident = usize;

    fn create(&self, scene: &PackedScene) -> Result<usize> {
        self.live.set(self.live.get() + 1);
        let mut created = self.created.borrow_mut();
        created.push(scene.clone());
        Ok(created.len() - 1)
    }

    fn release(&self, _: usize) {
        self.live.set(self.live.get() - 1);
    }
}

fn palette() -> BlockPalette {
    let mut p = BlockPalette::new();
    let stone = p.push(Block::new("stone", Texture::solid(4, 4, 0xFF808080)));
    p.push(Block::new("glass", Texture::solid(4, 4, 0x40FFFFFF)).with_invisible(true));
    p.push(Block::new("torch", Texture::solid(2, 8, 0xFFFFC060)).with_emittance(0.75));
    p.set_reference_block(stone).unwrap();
    p
}

fn terrain() -> OctreeSnapshot {
    OctreeSnapshot::from_fn(4, |x, y, z| match (x, y, z) {
        (_, 0, _) => 1,
        (3, 1, 3) => 2,
        (5, 1, 9) => 3,
        _ => 0,
    })
}

#[test]
fn test_reload_reproduces_layout() {
    let mut up = SceneUploader::new(RecordingStore::default(), 8192);
    let octree = terrain();
    let palette = palette();

    up.upload(&octree, &palette, 13.0).unwrap();
    up.upload(&octree, &palette, 13.0).unwrap();

    let created = up.store().created.borrow();
    assert_eq!(created.len(), 2);
    let (a, b) = (&created[0], &created[1]);
    assert_eq!(a.octree, b.octree);
    assert_eq!(a.atlas, b.atlas);
    assert_eq!(a.block_meta, b.block_meta);
    assert_eq!(a.transparent, b.transparent);
    assert_eq!(a.info, b.info);
}

#[test]
fn test_images_are_whole_rows() {
    let packed = PackedScene::pack(&terrain(), &palette(), 13.0).unwrap();
    for len in [packed.octree.values().len(), packed.atlas.values().len(), packed.block_meta.values().len()] {
        assert!(len > 0);
        assert_eq!(len % ROW_VALUES, 0);
    }
    assert_eq!(packed.info.block_count, 4);
    // air is always transparent
    assert_eq!(packed.transparent, vec![0, 2]);
}

#[test]
fn test_releases_match_allocations() {
    let mut up = SceneUploader::new(RecordingStore::default(), 8192);
    let scene = StaticScene { octree: terrain(), palette: palette() };
    for i in 1..=5 {
        up.load_from(&scene, 13.0).unwrap();
        let stats = up.stats();
        assert_eq!(stats.allocations, i);
        assert_eq!(stats.releases, i - 1);
        assert_eq!(up.store().live.get(), 1);
    }
    up.clear();
    assert_eq!(up.stats().releases, up.stats().allocations);
    assert_eq!(up.store().live.get(), 0);
}

#[test]
fn test_failed_upload_keeps_previous_scene() {
    let mut up = SceneUploader::new(RecordingStore::default(), 8192);
    up.upload(&terrain(), &palette(), 13.0).unwrap();
    let before = *up.info().unwrap();

    // child pointer past the end of the node array
    let broken = OctreeSnapshot::new(vec![1, 0, 0], 2);
    assert!(matches!(up.upload(&broken, &palette(), 13.0), Err(Error::SceneExport(_))));

    assert_eq!(up.resident(), Some(&0));
    assert_eq!(*up.info().unwrap(), before);
    assert_eq!(up.stats().releases, 0);
    assert_eq!(up.store().live.get(), 1);
}

#[test]
fn test_oversized_scene_rejected_before_release() {
    let mut up = SceneUploader::new(RecordingStore::default(), 1);
    up.upload(&terrain(), &palette(), 13.0).unwrap();

    // a full checkerboard tree needs several rows of octree texels
    let checker = OctreeSnapshot::from_fn(6, |x, y, z| (x + y + z) % 2);
    assert!(matches!(
        up.upload(&checker, &palette(), 13.0),
        Err(Error::SceneTooLarge { what: "octree", limit: 1, .. })
    ));
    assert_eq!(up.resident(), Some(&0));
    assert_eq!(up.stats().allocations, 1);
    assert_eq!(up.stats().releases, 0);
}
