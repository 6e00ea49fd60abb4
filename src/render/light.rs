//! Shadow rays and emitter sampling.

use rand::Rng;

use super::Intersector;
use crate::config::RenderParams;
use crate::scene::{BlockPalette, EmitterPosition, Ray, EPSILON, OFFSET};
use crate::util::{rgb, DVec3, DVec4, Result};

/// Surfaces a shadow ray may cross before it is cut off.
pub const MAX_SHADOW_STEPS: u32 = 64;

/// Light transport probes issued synchronously while shading a hit.
#[derive(Clone, Copy)]
pub struct LightSampler<'a> {
    intersector: &'a dyn Intersector,
    params: &'a RenderParams,
    palette: &'a BlockPalette,
}

impl<'a> LightSampler<'a> {
    pub fn new(intersector: &'a dyn Intersector, params: &'a RenderParams, palette: &'a BlockPalette) -> Self {
        Self { intersector, params, palette }
    }

    /// Transmittance from the ray origin along its direction, as RGB filter
    /// plus the fraction of light that gets through in `w`.
    ///
    /// Each crossed surface filters by `c·a + (1 - a)` and keeps `1 - a` of
    /// the light; travelling through water falls off with
    /// `exp(-distance / water_visibility)`.
    pub fn direct_light_attenuation(&self, ray: &mut Ray) -> Result<DVec4> {
        let mut att = DVec4::ONE;
        for _ in 0..MAX_SHADOW_STEPS {
            if att.w <= 0.0 {
                break;
            }
            ray.origin += OFFSET * ray.direction;
            if !self.intersector.next_intersection(ray)? {
                break;
            }
            let a = ray.color.w;
            let mult = 1.0 - a;
            att.x *= ray.color.x * a + mult;
            att.y *= ray.color.y * a + mult;
            att.z *= ray.color.z * a + mult;
            att.w *= mult;
            if self.palette.get(ray.prev_material).water {
                if self.params.water_visibility == 0.0 {
                    att.w = 0.0;
                } else {
                    att.w *= (-ray.distance / self.params.water_visibility).exp();
                }
            }
        }
        Ok(att)
    }

    /// Light reaching the hit at `ray` from a point inside `pos`, or zero if
    /// the emitter is behind the surface or occluded.
    pub fn sample_emitter(&self, ray: &Ray, pos: &EmitterPosition, rng: &mut impl Rng) -> Result<DVec3> {
        let target = DVec3::new(
            pos.x + (rng.gen::<f64>() - 0.5) * pos.radius,
            pos.y + (rng.gen::<f64>() - 0.5) * pos.radius,
            pos.z + (rng.gen::<f64>() - 0.5) * pos.radius,
        );
        let to_target = target - ray.origin;
        let distance = to_target.length();
        if distance <= 0.0 {
            return Ok(DVec3::ZERO);
        }

        let mut probe = ray.clone();
        probe.direction = to_target / distance;
        let cos = probe.direction.dot(probe.normal);
        if cos <= 0.0 {
            return Ok(DVec3::ZERO);
        }

        // Leaving the surface: probe from the hit block back into the medium.
        probe.swap_materials();
        probe.emittance = DVec3::ZERO;
        probe.origin += OFFSET * probe.direction;
        if !self.intersector.next_intersection(&mut probe)? {
            return Ok(DVec3::ZERO);
        }

        let emittance = self.palette.get(probe.current_material).emittance as f64;
        if emittance <= EPSILON {
            return Ok(DVec3::ZERO);
        }
        let scale = emittance * cos * self.params.emitter_intensity / (distance * distance).max(1.0);
        Ok(rgb(probe.color) * scale)
    }
}
