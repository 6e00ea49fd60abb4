//! Plain-old-data records shared with the WGSL kernels.
//!
//! Field order and padding match the structs in `wgsl/octree.wgsl`,
//! `wgsl/intersect.wgsl` and `wgsl/depth.wgsl`.

use bytemuck::{Pod, Zeroable};

use crate::scene::{texel_to_linear, Intersection, Ray};
use crate::util::{to_f32, DVec3};

/// Scene scalars (uniform, 16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SceneInfo {
    pub octree_depth: u32,
    /// Raw node count before row padding.
    pub octree_len: u32,
    pub transparent_count: u32,
    pub block_count: u32,
}

/// Per-dispatch scalars (uniform, 48 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TraceParams {
    /// Shared origin of batched primary rays.
    pub origin: [f32; 3],
    pub ray_count: u32,
    pub sun_direction: [f32; 3],
    /// Seed for the stochastic alpha test; 0 disables it.
    pub seed: u32,
    /// Octree node visits per ray; 0 selects the kernel default.
    pub max_depth: u32,
    /// Non-zero treats every non-air block as opaque.
    pub preview: u32,
    pub _pad: [u32; 2],
}

/// One intersection request (storage, 32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuRayQuery {
    pub origin: [f32; 3],
    /// Block the ray currently travels through.
    pub material: u32,
    pub direction: [f32; 3],
    pub _pad: u32,
}

impl GpuRayQuery {
    pub fn from_ray(ray: &Ray) -> Self {
        Self {
            origin: to_f32(ray.origin),
            material: ray.current_material,
            direction: to_f32(ray.direction),
            _pad: 0,
        }
    }
}

/// One intersection result (storage, 32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuHit {
    pub normal: [f32; 3],
    pub distance: f32,
    pub block: u32,
    /// Raw `0xAARRGGBB` atlas texel at the hit.
    pub texel: u32,
    /// 1 on hit, 0 when the ray left the octree.
    pub hit: u32,
    pub _pad: u32,
}

impl GpuHit {
    /// Host-precision view of a hit; `None` on miss.
    pub fn to_intersection(&self) -> Option<Intersection> {
        if self.hit == 0 {
            return None;
        }
        Some(Intersection {
            distance: self.distance as f64,
            normal: DVec3::new(self.normal[0] as f64, self.normal[1] as f64, self.normal[2] as f64),
            block: self.block,
            data: 0,
            color: texel_to_linear(self.texel),
        })
    }
}
