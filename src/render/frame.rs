//! Frame driver: one path-traced sample per pixel, and the depth preview.

use rayon::prelude::*;
use tracing::{debug, warn};

use super::scheduler::{PixelSample, TraceEngine, TraceStatsSnapshot};
use super::{BatchRequest, DepthPreview};
use crate::config::RenderParams;
use crate::device::BATCH_STRIDE;
use crate::scene::Camera;
use crate::util::{to_f32, DVec3, Error, Result, Vec3};

/// Normalized camera coordinates of the center of pixel `(x, y)`, row 0 on top.
#[inline]
pub fn pixel_coords(x: usize, y: usize, width: usize, height: usize) -> (f64, f64) {
    let aspect = width as f64 / height.max(1) as f64;
    let u = aspect * ((x as f64 + 0.5) / width as f64 - 0.5);
    let v = 0.5 - (y as f64 + 0.5) / height as f64;
    (u, v)
}

/// Seed of pixel `index` within the pass seeded by `frame_seed`.
#[inline]
pub fn pixel_seed(frame_seed: u64, index: usize) -> u64 {
    frame_seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

/// Running per-pixel sample sums.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    width: usize,
    height: usize,
    sums: Vec<DVec3>,
    counts: Vec<u32>,
}

impl SampleBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, sums: vec![DVec3::ZERO; width * height], counts: vec![0; width * height] }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Add one sample at `(x, y)`.
    pub fn accumulate(&mut self, x: usize, y: usize, color: DVec3) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(Error::GeometryMismatch { x, y, width: self.width, height: self.height });
        }
        let idx = y * self.width + x;
        self.sums[idx] += color;
        self.counts[idx] += 1;
        Ok(())
    }

    /// Mean of the samples at `(x, y)`; black when there are none.
    pub fn mean(&self, x: usize, y: usize) -> DVec3 {
        let idx = y * self.width + x;
        match self.counts.get(idx) {
            Some(&n) if n > 0 => self.sums[idx] / n as f64,
            _ => DVec3::ZERO,
        }
    }

    /// Samples accumulated at `(x, y)`.
    pub fn sample_count(&self, x: usize, y: usize) -> u32 {
        self.counts.get(y * self.width + x).copied().unwrap_or(0)
    }

    /// Gamma-corrected 8-bit RGBA, row-major.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.mean(x, y);
                out.extend_from_slice(&[encode(c.x), encode(c.y), encode(c.z), 255]);
            }
        }
        out
    }
}

#[inline]
fn encode(linear: f64) -> u8 {
    (linear.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0).round() as u8
}

/// Samples produced by one pass, not yet merged into a buffer.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub width: usize,
    pub height: usize,
    /// `(x, y, sample)` for every pixel that traced successfully.
    pub samples: Vec<(usize, usize, PixelSample)>,
    /// Pixels whose trace returned an error.
    pub failed: usize,
    pub stats: TraceStatsSnapshot,
}

impl PassReport {
    /// Add every sample to `buffer`. Samples outside it are skipped with a
    /// warning; returns how many were accepted.
    pub fn finalize_into(&self, buffer: &mut SampleBuffer) -> usize {
        let mut accepted = 0;
        for &(x, y, sample) in &self.samples {
            match buffer.accumulate(x, y, sample.color) {
                Ok(()) => accepted += 1,
                Err(e) => warn!(error = %e, "skipping sample"),
            }
        }
        accepted
    }
}

/// Trace one sample for every pixel of a `width` x `height` image.
#[tracing::instrument(skip_all, fields(width = width, height = height, frame_seed = frame_seed))]
pub fn render_pass(
    engine: &TraceEngine<'_>,
    camera: &dyn Camera,
    width: usize,
    height: usize,
    frame_seed: u64,
) -> PassReport {
    let results: Vec<(usize, usize, Result<PixelSample>)> = (0..width * height)
        .into_par_iter()
        .map(|i| {
            let (x, y) = (i % width, i / width);
            let (u, v) = pixel_coords(x, y, width, height);
            (x, y, engine.trace(camera.view_ray(u, v), pixel_seed(frame_seed, i)))
        })
        .collect();

    let mut samples = Vec::with_capacity(results.len());
    let mut failed = 0;
    for (x, y, result) in results {
        match result {
            Ok(sample) => samples.push((x, y, sample)),
            Err(e) => {
                failed += 1;
                warn!(x, y, error = %e, "pixel trace failed");
            }
        }
    }

    let stats = engine.stats();
    debug!(traced = samples.len(), failed, enqueued = stats.enqueued, "pass complete");
    PassReport { width, height, samples, failed, stats }
}

/// Grey-scale depth image, row-major, 1 near the camera fading to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f32>,
}

impl PreviewImage {
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|&g| {
                let v = (g.clamp(0.0, 1.0) * 255.0).round() as u8;
                [v, v, v, 255]
            })
            .collect()
    }
}

/// Resolve every primary ray in one batched call and map depth to grey.
///
/// Directions are laid out column by column. Rays that miss stay black.
#[tracing::instrument(skip_all, fields(width = width, height = height))]
pub fn render_preview(
    preview: &dyn DepthPreview,
    camera: &dyn Camera,
    width: usize,
    height: usize,
    sun_direction: DVec3,
    params: &RenderParams,
) -> Result<PreviewImage> {
    let mut directions = vec![0.0f32; width * height * 3];
    for i in 0..width {
        for j in 0..height {
            let (u, v) = pixel_coords(i, j, width, height);
            let d = to_f32(camera.view_ray(u, v).direction);
            let k = (i * height + j) * 3;
            directions[k..k + 3].copy_from_slice(&d);
        }
    }

    let request = BatchRequest {
        directions: &directions,
        origin: Vec3::from_array(to_f32(camera.position())),
        seed: 0,
        max_depth: 0,
        preview: true,
        sun_direction: Vec3::from_array(to_f32(sun_direction)),
    };
    let depths = preview.intersect_batch(&request)?;
    if depths.len() != width * height * BATCH_STRIDE {
        return Err(Error::readback(format!(
            "expected {} preview values, got {}",
            width * height * BATCH_STRIDE,
            depths.len()
        )));
    }

    let range = params.preview_range as f32;
    let mut pixels = vec![0.0f32; width * height];
    for i in 0..width {
        for j in 0..height {
            let depth = depths[(i * height + j) * BATCH_STRIDE];
            if depth >= 0.0 {
                pixels[j * width + i] = (1.0 - depth / range).clamp(0.0, 1.0);
            }
        }
    }
    Ok(PreviewImage { width, height, pixels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PinholeCamera;

    #[test]
    fn test_pixel_coords_span_image() {
        let (u, v) = pixel_coords(0, 0, 4, 2);
        assert!((u + 0.75).abs() < 1e-12);
        assert!((v - 0.25).abs() < 1e-12);
        let (u, v) = pixel_coords(3, 1, 4, 2);
        assert!((u - 0.75).abs() < 1e-12);
        assert!((v + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_accumulate_out_of_range() {
        let mut buf = SampleBuffer::new(2, 2);
        assert!(buf.accumulate(1, 1, DVec3::ONE).is_ok());
        assert!(matches!(buf.accumulate(2, 0, DVec3::ONE), Err(Error::GeometryMismatch { x: 2, .. })));
        assert_eq!(buf.sample_count(1, 1), 1);
    }

    #[test]
    fn test_finalize_skips_foreign_samples() {
        let sample = PixelSample { color: DVec3::splat(0.5), seed: 0 };
        let report = PassReport {
            width: 3,
            height: 1,
            samples: vec![(0, 0, sample), (2, 0, sample)],
            failed: 0,
            stats: TraceStatsSnapshot::default(),
        };
        let mut buf = SampleBuffer::new(2, 1);
        assert_eq!(report.finalize_into(&mut buf), 1);
        assert_eq!(buf.mean(0, 0), DVec3::splat(0.5));
    }

    #[test]
    fn test_mean_over_samples() {
        let mut buf = SampleBuffer::new(1, 1);
        buf.accumulate(0, 0, DVec3::ONE).unwrap();
        buf.accumulate(0, 0, DVec3::ZERO).unwrap();
        assert_eq!(buf.mean(0, 0), DVec3::splat(0.5));
        assert_eq!(buf.to_rgba8()[3], 255);
    }

    /// Fixed depth for rays pointing up, miss otherwise.
    struct Flat;

    impl DepthPreview for Flat {
        fn intersect_batch(&self, request: &BatchRequest<'_>) -> Result<Vec<f32>> {
            Ok(request
                .directions
                .chunks_exact(3)
                .flat_map(|d| if d[1] > 0.0 { [16.0, 1.0, 0.0] } else { [-1.0, 0.0, 0.0] })
                .collect())
        }
    }

    #[test]
    fn test_preview_is_column_major() {
        let cam = PinholeCamera::new(DVec3::ZERO, 0.0, 0.0, 70.0);
        let params = RenderParams::default();
        let img = render_preview(&Flat, &cam, 3, 2, DVec3::Y, &params).unwrap();
        // top row looks up and hits at 16 of 64
        assert_eq!(img.pixels[0], 0.75);
        assert_eq!(img.pixels[2], 0.75);
        assert_eq!(img.pixels[3], 0.0);
    }
}
