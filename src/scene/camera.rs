//! Camera ray generation.

use super::ray::Ray;
use crate::util::DVec3;

/// Generates primary rays for normalized image coordinates.
///
/// `y` spans `[-0.5, 0.5]` bottom to top; `x` spans `[-aspect/2, aspect/2]`.
pub trait Camera: Send + Sync {
    fn view_ray(&self, x: f64, y: f64) -> Ray;

    fn position(&self) -> DVec3;
}

/// Pinhole camera looking along yaw/pitch.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeCamera {
    pub position: DVec3,
    /// Radians; 0 looks down +Z.
    pub yaw: f64,
    /// Radians; positive looks up.
    pub pitch: f64,
    /// Vertical field of view, degrees.
    pub fov: f64,
}

impl PinholeCamera {
    pub fn new(position: DVec3, yaw: f64, pitch: f64, fov: f64) -> Self {
        Self { position, yaw, pitch, fov }
    }

    /// Camera at `position` aimed at `target`.
    pub fn looking_at(position: DVec3, target: DVec3, fov: f64) -> Self {
        let d = (target - position).normalize_or_zero();
        let yaw = d.x.atan2(d.z);
        let pitch = d.y.clamp(-1.0, 1.0).asin();
        Self { position, yaw, pitch, fov }
    }

    fn basis(&self) -> (DVec3, DVec3, DVec3) {
        let forward = DVec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        );
        let right = forward.cross(DVec3::Y).normalize_or(DVec3::X);
        let up = right.cross(forward);
        (forward, right, up)
    }
}

impl Camera for PinholeCamera {
    fn view_ray(&self, x: f64, y: f64) -> Ray {
        let (forward, right, up) = self.basis();
        let scale = 2.0 * (self.fov.to_radians() * 0.5).tan();
        let d = forward + right * (x * scale) + up * (y * scale);
        Ray::new(self.position, d)
    }

    fn position(&self) -> DVec3 {
        self.position
    }
}
