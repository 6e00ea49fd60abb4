//! Host-side ray state carried through one bounce.

use rand::Rng;

use super::palette::AIR;
use crate::util::{orthonormal_basis, reflect, DVec3, DVec4};

/// Probability/emittance threshold below which a material property is ignored.
pub const EPSILON: f64 = 0.000_000_05;

/// Distance a continued ray is pushed off a surface.
///
/// Sized for the device's `f32` coordinates rather than host precision.
pub const OFFSET: f64 = 0.000_1;

/// Result of one device intersection, in host precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub distance: f64,
    /// Unit normal of the entered face, facing the incoming ray.
    pub normal: DVec3,
    pub block: u32,
    pub data: u32,
    /// Linear texel color at the hit, alpha = diffuse probability.
    pub color: DVec4,
}

/// A ray segment with the material context it travels through.
#[derive(Debug, Clone, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
    pub normal: DVec3,
    /// RGB plus alpha; alpha is the probability of a diffuse bounce.
    pub color: DVec4,
    pub emittance: DVec3,
    pub current_material: u32,
    pub current_data: u32,
    pub prev_material: u32,
    pub prev_data: u32,
    pub depth: u32,
    pub specular: bool,
    /// Distance travelled to reach the current intersection.
    pub distance: f64,
}

impl Ray {
    /// Primary ray in air.
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            normal: DVec3::ZERO,
            color: DVec4::ZERO,
            emittance: DVec3::ZERO,
            current_material: AIR,
            current_data: 0,
            prev_material: AIR,
            prev_data: 0,
            depth: 0,
            specular: false,
            distance: 0.0,
        }
    }

    /// Copy of this ray one bounce deeper, with radiance state cleared.
    pub fn continued(&self) -> Self {
        Self {
            color: DVec4::ZERO,
            emittance: DVec3::ZERO,
            depth: self.depth + 1,
            distance: 0.0,
            ..self.clone()
        }
    }

    /// Mirror bounce off the current hit, back into the medium the ray came from.
    pub fn specular_reflection(&self) -> Self {
        let mut r = self.continued();
        r.set_current_material(self.prev_material, self.prev_data);
        r.direction = reflect(self.direction, self.normal).normalize_or_zero();
        r.origin += OFFSET * self.normal;
        r.specular = true;
        r
    }

    /// Cosine-weighted scatter around the hit normal.
    pub fn diffuse_reflection(&self, rng: &mut impl Rng) -> Self {
        let mut r = self.continued();
        r.set_current_material(self.prev_material, self.prev_data);

        let x1: f64 = rng.gen();
        let x2: f64 = rng.gen();
        let radius = x1.sqrt();
        let theta = std::f64::consts::TAU * x2;
        let (tx, ty) = (radius * theta.cos(), radius * theta.sin());
        let tz = (1.0 - x1).sqrt();

        let (t, b) = orthonormal_basis(self.normal);
        r.direction = (t * tx + b * ty + self.normal * tz).normalize_or_zero();
        r.origin += OFFSET * self.normal;
        r.specular = false;
        r
    }

    /// Straight continuation through the current surface.
    pub fn transmitted(&self) -> Self {
        let mut r = self.continued();
        r.origin += OFFSET * r.direction;
        r
    }

    /// Move to an intersection: the entered block becomes the current material.
    pub fn enter(&mut self, hit: &Intersection) {
        self.distance = hit.distance;
        self.origin += self.direction * hit.distance;
        self.normal = hit.normal;
        self.prev_material = self.current_material;
        self.prev_data = self.current_data;
        self.current_material = hit.block;
        self.current_data = hit.data;
        self.color = hit.color;
    }

    #[inline]
    pub fn set_current_material(&mut self, material: u32, data: u32) {
        self.current_material = material;
        self.current_data = data;
    }

    /// Exchange current and previous material, to probe back across a surface.
    pub fn swap_materials(&mut self) {
        std::mem::swap(&mut self.current_material, &mut self.prev_material);
        std::mem::swap(&mut self.current_data, &mut self.prev_data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn hit_floor() -> Ray {
        let mut ray = Ray::new(DVec3::new(0.5, 4.0, 0.5), DVec3::new(1.0, -1.0, 0.0));
        ray.enter(&Intersection {
            distance: 2.0,
            normal: DVec3::Y,
            block: 7,
            data: 0,
            color: DVec4::new(0.5, 0.5, 0.5, 1.0),
        });
        ray
    }

    #[test]
    fn test_enter_updates_material_context() {
        let ray = hit_floor();
        assert_eq!(ray.current_material, 7);
        assert_eq!(ray.prev_material, AIR);
        assert!((ray.origin.y - (4.0 - 2.0 / 2f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn test_children_are_one_deeper() {
        let ray = hit_floor();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(ray.specular_reflection().depth, 1);
        assert_eq!(ray.diffuse_reflection(&mut rng).depth, 1);
        assert_eq!(ray.transmitted().depth, 1);
        assert_eq!(ray.transmitted().current_material, 7);
        assert_eq!(ray.specular_reflection().current_material, AIR);
    }

    #[test]
    fn test_diffuse_stays_in_hemisphere() {
        let ray = hit_floor();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let r = ray.diffuse_reflection(&mut rng);
            assert!(r.direction.dot(DVec3::Y) >= 0.0);
            assert!((r.direction.length() - 1.0).abs() < 1e-9);
            assert!(!r.specular);
        }
    }

    #[test]
    fn test_specular_mirrors() {
        let r = hit_floor().specular_reflection();
        assert!(r.direction.y > 0.0);
        assert!(r.specular);
    }
}
