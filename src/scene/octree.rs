//! Packed voxel octree snapshot.
//!
//! One `i32` per node:
//! - `value > 0`: branch, the 8 children start at index `value`
//! - `value <= 0`: leaf holding block id `-value`
//!
//! Child order within a branch is `(bx << 2) | (by << 1) | bz`, where `b?` is
//! the coordinate bit selecting the upper half on that axis. The root cube
//! spans `[0, 2^depth)` on every axis.

use crate::util::{Error, Result};

/// Immutable snapshot of the host octree, replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OctreeSnapshot {
    pub nodes: Vec<i32>,
    pub depth: u32,
}

/// Deepest tree accepted; coordinates must stay exact in `f32` on the device.
pub const MAX_OCTREE_DEPTH: u32 = 20;

enum Node {
    Leaf(u32),
    Branch(Box<[Node; 8]>),
}

impl OctreeSnapshot {
    /// Wrap an existing node array.
    pub fn new(nodes: Vec<i32>, depth: u32) -> Self {
        Self { nodes, depth }
    }

    /// Build a snapshot by evaluating `block(x, y, z)` for every voxel.
    ///
    /// Uniform subtrees collapse into a single leaf.
    pub fn from_fn(depth: u32, block: impl Fn(u32, u32, u32) -> u32) -> Self {
        let root = build_node(&block, 0, 0, 0, 1u32 << depth);
        let mut nodes = vec![0];
        flatten(&mut nodes, 0, &root);
        Self { nodes, depth }
    }

    /// Edge length of the root cube.
    #[inline]
    pub fn size(&self) -> u32 {
        1u32 << self.depth
    }

    /// Block id of the voxel at integer coordinates, `None` outside the cube.
    pub fn block_at(&self, x: u32, y: u32, z: u32) -> Option<u32> {
        let size = self.size();
        if x >= size || y >= size || z >= size {
            return None;
        }
        let mut idx = 0usize;
        for level in 0..self.depth {
            let value = *self.nodes.get(idx)?;
            if value <= 0 {
                return Some(value.unsigned_abs());
            }
            let shift = self.depth - 1 - level;
            let octant = (((x >> shift) & 1) << 2) | (((y >> shift) & 1) << 1) | ((z >> shift) & 1);
            idx = value as usize + octant as usize;
        }
        self.nodes.get(idx).map(|v| v.unsigned_abs())
    }

    /// Check that every branch points at 8 in-range children and the depth fits the device.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::SceneExport("octree has no nodes".into()));
        }
        if self.depth > MAX_OCTREE_DEPTH {
            return Err(Error::SceneExport(format!(
                "octree depth {} exceeds {}",
                self.depth, MAX_OCTREE_DEPTH
            )));
        }
        let len = self.nodes.len();
        for (i, &value) in self.nodes.iter().enumerate() {
            if value > 0 && value as usize + 8 > len {
                return Err(Error::SceneExport(format!(
                    "node {i} points at children {value}..{} past the end ({len})",
                    value as usize + 8
                )));
            }
        }
        Ok(())
    }
}

fn build_node(block: &impl Fn(u32, u32, u32) -> u32, x: u32, y: u32, z: u32, size: u32) -> Node {
    if size == 1 {
        return Node::Leaf(block(x, y, z));
    }
    let half = size / 2;
    let children: [Node; 8] = std::array::from_fn(|octant| {
        let o = octant as u32;
        build_node(
            block,
            x + ((o >> 2) & 1) * half,
            y + ((o >> 1) & 1) * half,
            z + (o & 1) * half,
            half,
        )
    });
    if let Node::Leaf(first) = children[0] {
        if children.iter().all(|c| matches!(c, Node::Leaf(id) if *id == first)) {
            return Node::Leaf(first);
        }
    }
    Node::Branch(Box::new(children))
}

fn flatten(nodes: &mut Vec<i32>, idx: usize, node: &Node) {
    match node {
        Node::Leaf(id) => nodes[idx] = -(*id as i32),
        Node::Branch(children) => {
            let first = nodes.len();
            nodes.resize(first + 8, 0);
            nodes[idx] = first as i32;
            for (i, child) in children.iter().enumerate() {
                flatten(nodes, first + i, child);
            }
        }
    }
}
