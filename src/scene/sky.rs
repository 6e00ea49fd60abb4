//! Sky and sun interface consumed by miss shading and shadow rays.

use rand::Rng;

use super::ray::Ray;
use crate::config::EXTINCTION_FACTOR;
use crate::util::{orthonormal_basis, DVec3};

/// Distant light source.
#[derive(Debug, Clone, PartialEq)]
pub struct Sun {
    /// Radians around the vertical axis.
    pub azimuth: f64,
    /// Radians above the horizon.
    pub altitude: f64,
    /// Radiance color.
    pub color: DVec3,
    /// Angular radius of the disk, radians.
    pub radius: f64,
}

impl Default for Sun {
    fn default() -> Self {
        Self {
            azimuth: std::f64::consts::FRAC_PI_4,
            altitude: std::f64::consts::FRAC_PI_3,
            color: DVec3::splat(1.5),
            radius: 0.03,
        }
    }
}

impl Sun {
    /// Unit vector pointing at the sun.
    pub fn direction(&self) -> DVec3 {
        DVec3::new(
            self.azimuth.cos() * self.altitude.cos(),
            self.altitude.sin(),
            self.azimuth.sin() * self.altitude.cos(),
        )
    }

    /// Uniformly sampled direction within the sun disk.
    pub fn random_direction(&self, rng: &mut impl Rng) -> DVec3 {
        let x1: f64 = rng.gen();
        let x2: f64 = rng.gen();
        let cos_a = 1.0 - x1 + x1 * self.radius.cos();
        let sin_a = (1.0 - cos_a * cos_a).max(0.0).sqrt();
        let phi = std::f64::consts::TAU * x2;

        let w = self.direction();
        let (u, v) = orthonormal_basis(w);
        (u * phi.cos() * sin_a + v * phi.sin() * sin_a + w * cos_a).normalize()
    }
}

/// Sky lookups supplied by the host renderer.
pub trait Environment: Send + Sync {
    /// Sky seen directly by a primary ray.
    fn sky_color_interpolated(&self, ray: &Ray) -> DVec3;

    /// Sky seen through a mirror bounce; includes the sun disk.
    fn sky_specular_color(&self, ray: &Ray) -> DVec3;

    /// Sky seen by a diffuse bounce.
    fn sky_color(&self, ray: &Ray) -> DVec3;

    /// Blend fog into a sky color.
    fn add_sky_fog(&self, _ray: &Ray, color: DVec3) -> DVec3 {
        color
    }

    fn sun(&self) -> &Sun;
}

/// Two-color gradient sky with an optional fog layer.
#[derive(Debug, Clone)]
pub struct GradientSky {
    pub horizon: DVec3,
    pub zenith: DVec3,
    pub fog_color: DVec3,
    pub fog_density: f64,
    pub sun: Sun,
}

impl Default for GradientSky {
    fn default() -> Self {
        Self {
            horizon: DVec3::new(0.75, 0.85, 1.0),
            zenith: DVec3::new(0.25, 0.45, 0.85),
            fog_color: DVec3::splat(0.8),
            fog_density: 0.0,
            sun: Sun::default(),
        }
    }
}

impl GradientSky {
    fn gradient(&self, d: DVec3) -> DVec3 {
        let t = d.y.clamp(0.0, 1.0);
        self.horizon.lerp(self.zenith, t)
    }
}

impl Environment for GradientSky {
    fn sky_color_interpolated(&self, ray: &Ray) -> DVec3 {
        self.gradient(ray.direction)
    }

    fn sky_specular_color(&self, ray: &Ray) -> DVec3 {
        let mut color = self.gradient(ray.direction);
        if ray.direction.dot(self.sun.direction()) >= self.sun.radius.cos() {
            color += self.sun.color;
        }
        color
    }

    fn sky_color(&self, ray: &Ray) -> DVec3 {
        self.gradient(ray.direction)
    }

    fn add_sky_fog(&self, ray: &Ray, color: DVec3) -> DVec3 {
        if self.fog_density <= 0.0 {
            return color;
        }
        // Optical depth through a horizontal layer grows toward the horizon.
        let depth = self.fog_density * EXTINCTION_FACTOR / ray.direction.y.abs().max(0.05);
        let f = 1.0 - (-depth).exp();
        color * (1.0 - f) + self.fog_color * f
    }

    fn sun(&self) -> &Sun {
        &self.sun
    }
}
