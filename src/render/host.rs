//! CPU octree walk with the same hit rules as the device kernels.
//!
//! Used for shadow and emitter probes that should not queue behind the
//! device, and as a reference intersector in tests.

use super::Intersector;
use crate::scene::{texel_to_linear, BlockPalette, Intersection, OctreeSnapshot, Ray, AIR};
use crate::util::{DVec3, Result};

/// Cell lookups per query before giving up.
const MAX_STEPS: u32 = 2048;

/// Push past a cell boundary before the next lookup.
const NUDGE: f64 = 1e-6;

/// Host-memory intersector over an octree snapshot and its palette.
#[derive(Debug, Clone)]
pub struct HostIntersector {
    octree: OctreeSnapshot,
    palette: BlockPalette,
    transparent: Vec<bool>,
}

struct Leaf {
    block: u32,
    lo: DVec3,
    size: f64,
}

impl HostIntersector {
    /// Wrap a snapshot; rejects trees the walk cannot address.
    pub fn new(octree: OctreeSnapshot, palette: BlockPalette) -> Result<Self> {
        octree.validate()?;
        let transparent = palette.iter().map(|b| b.invisible).collect();
        Ok(Self { octree, palette, transparent })
    }

    /// Block as the tracer sees it: invisible and unknown ids are air.
    #[inline]
    fn visible(&self, block: u32) -> u32 {
        match self.transparent.get(block as usize) {
            Some(false) => block,
            _ => AIR,
        }
    }

    fn find_leaf(&self, x: u32, y: u32, z: u32) -> Leaf {
        let depth = self.octree.depth;
        let nodes = &self.octree.nodes;
        let mut idx = 0usize;
        let mut lo = [0u32; 3];
        let mut size = self.octree.size();
        for level in 0..=depth {
            let value = nodes.get(idx).copied().unwrap_or(0);
            if value <= 0 || level == depth || value as usize + 8 > nodes.len() {
                let block = if value < 0 { value.unsigned_abs() } else { AIR };
                return Leaf { block, lo: DVec3::new(lo[0] as f64, lo[1] as f64, lo[2] as f64), size: size as f64 };
            }
            size >>= 1;
            let shift = depth - 1 - level;
            let b = [(x >> shift) & 1, (y >> shift) & 1, (z >> shift) & 1];
            for axis in 0..3 {
                lo[axis] += b[axis] * size;
            }
            idx = value as usize + ((b[0] << 2) | (b[1] << 1) | b[2]) as usize;
        }
        Leaf { block: AIR, lo: DVec3::ZERO, size: 1.0 }
    }

    fn sample_texel(&self, block: u32, hit: DVec3, n: DVec3) -> u32 {
        let tex = &self.palette.get(block).texture;
        if tex.width == 0 || tex.height == 0 {
            return 0;
        }
        let (u, v) = if n.x != 0.0 {
            (hit.z, hit.y)
        } else if n.y != 0.0 {
            (hit.x, hit.z)
        } else {
            (hit.x, hit.y)
        };
        let (fu, fv) = (u - u.floor(), v - v.floor());
        let tu = ((fu * tex.width as f64) as u32).min(tex.width - 1);
        let tv = (((1.0 - fv) * tex.height as f64) as u32).min(tex.height - 1);
        tex.texels.get((tv * tex.width + tu) as usize).copied().unwrap_or(0)
    }

    /// March until the block differs from `material`.
    fn march(&self, origin: DVec3, dir: DVec3, material: u32) -> Option<Intersection> {
        let size = self.octree.size() as f64;
        let inv = DVec3::new(safe_inv(dir.x), safe_inv(dir.y), safe_inv(dir.z));

        let t0 = (DVec3::ZERO - origin) * inv;
        let t1 = (DVec3::splat(size) - origin) * inv;
        let t_near = t0.min(t1);
        let t_far = t0.max(t1).min_element();
        let mut t = t_near.max_element().max(0.0);
        if t > t_far {
            return None;
        }

        let mut normal = if t > 0.0 {
            axis_normal(max_axis(t_near), dir)
        } else {
            axis_normal(max_axis(dir.abs()), dir)
        };

        let current = self.visible(material);
        for _ in 0..MAX_STEPS {
            if t >= t_far {
                break;
            }
            let p = (origin + dir * (t + NUDGE)).floor().clamp(DVec3::ZERO, DVec3::splat(size - 1.0));
            let leaf = self.find_leaf(p.x as u32, p.y as u32, p.z as u32);
            let block = self.visible(leaf.block);

            if block != current {
                let texel = self.sample_texel(block, origin + dir * t, normal);
                if block == AIR || texel >> 24 != 0 {
                    return Some(Intersection {
                        distance: t,
                        normal,
                        block,
                        data: 0,
                        color: texel_to_linear(texel),
                    });
                }
            }

            let ta = (leaf.lo - origin) * inv;
            let tb = (leaf.lo + DVec3::splat(leaf.size) - origin) * inv;
            let exit = ta.max(tb);
            let axis = min_axis(exit);
            normal = axis_normal(axis, dir);
            t = exit[axis].max(t + NUDGE);
        }
        None
    }
}

impl Intersector for HostIntersector {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        match self.march(ray.origin, ray.direction, ray.current_material) {
            Some(hit) => {
                ray.enter(&hit);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[inline]
fn safe_inv(d: f64) -> f64 {
    if d.abs() < 1e-20 {
        1e20_f64.copysign(d)
    } else {
        1.0 / d
    }
}

fn axis_normal(axis: usize, dir: DVec3) -> DVec3 {
    let mut n = DVec3::ZERO;
    n[axis] = if dir[axis] > 0.0 { -1.0 } else { 1.0 };
    n
}

fn min_axis(v: DVec3) -> usize {
    if v.x <= v.y && v.x <= v.z {
        0
    } else if v.y <= v.z {
        1
    } else {
        2
    }
}

fn max_axis(v: DVec3) -> usize {
    if v.x >= v.y && v.x >= v.z {
        0
    } else if v.y >= v.z {
        1
    } else {
        2
    }
}
