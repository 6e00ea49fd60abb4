//! Path-trace scheduler behaviour driven through the public API with
//! host-side intersectors; no compute device needed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use voxtrace::render::{render_pass, HostIntersector, Intersector, LightSampler, SampleBuffer, TraceEngine};
use voxtrace::scene::{
    Block, BlockPalette, EmitterGrid, EmitterPosition, Environment, Intersection, OctreeSnapshot, PinholeCamera,
    Ray, Sun, Texture, AIR,
};
use voxtrace::util::{DVec3, DVec4, Error, Result};
use voxtrace::{EmitterSamplingStrategy, RenderParams};

/// Sky of one constant color.
struct FlatSky {
    color: DVec3,
    sun: Sun,
}

impl FlatSky {
    fn new(color: DVec3) -> Self {
        Self { color, sun: Sun::default() }
    }
}

impl Environment for FlatSky {
    fn sky_color_interpolated(&self, _: &Ray) -> DVec3 {
        self.color
    }

    fn sky_specular_color(&self, _: &Ray) -> DVec3 {
        self.color
    }

    fn sky_color(&self, _: &Ray) -> DVec3 {
        self.color
    }

    fn sun(&self) -> &Sun {
        &self.sun
    }
}

/// Every query hits `block` one unit ahead.
struct AlwaysHit {
    block: u32,
    color: DVec4,
}

impl Intersector for AlwaysHit {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        ray.enter(&Intersection { distance: 1.0, normal: DVec3::Y, block: self.block, data: 0, color: self.color });
        Ok(true)
    }
}

/// Camera rays hit `block`; every deeper ray escapes.
struct FirstHitOnly {
    block: u32,
    color: DVec4,
}

impl Intersector for FirstHitOnly {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        if ray.depth > 0 {
            return Ok(false);
        }
        ray.enter(&Intersection { distance: 2.0, normal: DVec3::Y, block: self.block, data: 0, color: self.color });
        Ok(true)
    }
}

struct Nothing;

impl Intersector for Nothing {
    fn next_intersection(&self, _: &mut Ray) -> Result<bool> {
        Ok(false)
    }
}

struct Broken;

impl Intersector for Broken {
    fn next_intersection(&self, _: &mut Ray) -> Result<bool> {
        Err(Error::readback("device lost"))
    }
}

/// Hits once, then misses.
struct OneHit {
    hit: Intersection,
    used: AtomicBool,
}

impl Intersector for OneHit {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        ray.enter(&self.hit);
        Ok(true)
    }
}

fn palette() -> BlockPalette {
    let mut p = BlockPalette::new();
    p.push(Block::new("mirror", Texture::solid(1, 1, 0xFFFFFFFF)).with_specular(1.0));
    p.push(Block::new("matte", Texture::solid(1, 1, 0xFFCCCCCC)));
    p.push(Block::new("lamp", Texture::solid(1, 1, 0xFFFFFFFF)).with_emittance(1.0));
    p.push(Block::new("water", Texture::solid(1, 1, 0x00000000)).with_water(true));
    p.push(Block::new("wax", Texture::solid(1, 1, 0xFFE0E0E0)).with_sub_surface_scattering(true));
    p
}

const MIRROR: u32 = 1;
const MATTE: u32 = 2;
const LAMP: u32 = 3;
const WATER: u32 = 4;
const WAX: u32 = 5;

fn plain_params() -> RenderParams {
    RenderParams { direct_light: false, emitters_enabled: false, ..RenderParams::default() }
}

fn camera_ray() -> Ray {
    Ray::new(DVec3::new(0.5, 4.0, 0.5), DVec3::NEG_Y)
}

#[test]
fn test_depth_limit_terminates_mirror_chain() {
    let palette = palette();
    let params = RenderParams { ray_depth: 3, ..plain_params() };
    let sky = FlatSky::new(DVec3::ONE);
    let mirrors = AlwaysHit { block: MIRROR, color: DVec4::ONE };
    let engine = TraceEngine::new(&mirrors, &params, &palette, &sky);

    let sample = engine.trace(camera_ray(), 7).unwrap();
    let stats = engine.stats();
    // depths 0, 1 and 2 are traced; the depth 3 child is never enqueued
    assert_eq!(stats.enqueued, 3);
    assert_eq!(stats.resolved, 3);
    assert_eq!(sample.color, DVec3::ZERO);
    assert_eq!(sample.seed, 7);
}

#[test]
fn test_diffuse_fold_multiplies_child() {
    let palette = palette();
    let params = plain_params();
    let sky = FlatSky::new(DVec3::splat(0.5));
    let scene = FirstHitOnly { block: MATTE, color: DVec4::new(0.8, 0.8, 0.8, 1.0) };
    let engine = TraceEngine::new(&scene, &params, &palette, &sky);

    let sample = engine.trace(camera_ray(), 1).unwrap();
    assert!((sample.color - DVec3::splat(0.4)).length() < 1e-12, "{:?}", sample.color);
}

#[test]
fn test_clear_surface_transmits_child() {
    let palette = palette();
    let params = plain_params();
    let sky = FlatSky::new(DVec3::new(0.2, 0.4, 0.6));
    let scene = FirstHitOnly { block: MATTE, color: DVec4::new(0.9, 0.1, 0.1, 0.0) };
    let engine = TraceEngine::new(&scene, &params, &palette, &sky);

    let sample = engine.trace(camera_ray(), 1).unwrap();
    assert!((sample.color - DVec3::new(0.2, 0.4, 0.6)).length() < 1e-12, "{:?}", sample.color);
}

#[test]
fn test_visible_emitter_adds_its_light() {
    let palette = palette();
    let params = RenderParams { direct_light: false, ..RenderParams::default() };
    let sky = FlatSky::new(DVec3::ZERO);
    let scene = FirstHitOnly { block: LAMP, color: DVec4::ONE };
    let engine = TraceEngine::new(&scene, &params, &palette, &sky);

    let sample = engine.trace(camera_ray(), 3).unwrap();
    assert!((sample.color - DVec3::ONE).length() < 1e-12, "{:?}", sample.color);
}

#[test]
fn test_intersector_failure_is_returned() {
    let palette = palette();
    let params = plain_params();
    let sky = FlatSky::new(DVec3::ONE);
    let engine = TraceEngine::new(&Broken, &params, &palette, &sky);
    assert!(matches!(engine.trace(camera_ray(), 0), Err(Error::Readback(_))));
}

#[test]
fn test_escaping_camera_ray_sees_sky() {
    let palette = palette();
    let params = plain_params();
    let sky = FlatSky::new(DVec3::new(0.3, 0.5, 0.9));
    let engine = TraceEngine::new(&Nothing, &params, &palette, &sky);
    let sample = engine.trace(camera_ray(), 0).unwrap();
    assert_eq!(sample.color, DVec3::new(0.3, 0.5, 0.9));
    assert_eq!(engine.stats().resolved, 1);
}

#[test]
fn test_transparent_sky_leaves_background_black() {
    let palette = palette();
    let params = RenderParams { transparent_sky: true, ..plain_params() };
    let sky = FlatSky::new(DVec3::ONE);
    let engine = TraceEngine::new(&Nothing, &params, &palette, &sky);
    let sample = engine.trace(camera_ray(), 0).unwrap();
    assert_eq!(sample.color, DVec3::ZERO);
}

fn water_exit(distance: f64) -> OneHit {
    OneHit {
        hit: Intersection { distance, normal: DVec3::NEG_Y, block: AIR, data: 0, color: DVec4::ZERO },
        used: AtomicBool::new(false),
    }
}

fn water_attenuation(distance: f64, visibility: f64) -> f64 {
    let palette = palette();
    let params = RenderParams { water_visibility: visibility, ..RenderParams::default() };
    let scene = water_exit(distance);
    let light = LightSampler::new(&scene, &params, &palette);
    let mut ray = Ray::new(DVec3::ZERO, DVec3::Y);
    ray.set_current_material(WATER, 0);
    light.direct_light_attenuation(&mut ray).unwrap().w
}

#[test]
fn test_water_attenuation_falls_with_distance() {
    let samples: Vec<f64> = [0.5, 1.0, 2.0, 4.0, 8.0].iter().map(|&d| water_attenuation(d, 9.0)).collect();
    assert!(samples.windows(2).all(|w| w[1] < w[0]), "{samples:?}");
    assert!((samples[1] - (-1.0f64 / 9.0).exp()).abs() < 1e-12);
}

#[test]
fn test_zero_water_visibility_blocks_light() {
    assert_eq!(water_attenuation(0.25, 0.0), 0.0);
}

fn floor_scene() -> (OctreeSnapshot, BlockPalette) {
    let mut palette = BlockPalette::new();
    let stone = palette.push(Block::new("stone", Texture::solid(2, 2, 0xFF909090)));
    let glass = palette.push(Block::new("glass", Texture::solid(2, 2, 0x80A0C0FF)));
    let lamp = palette.push(Block::new("lamp", Texture::solid(2, 2, 0xFFFFFFFF)).with_emittance(1.0));
    let octree = OctreeSnapshot::from_fn(4, |x, y, z| match (x, y, z) {
        (_, 0, _) => stone,
        (6, 1..=3, _) => glass,
        (9, 1, 9) => lamp,
        _ => 0,
    });
    (octree, palette)
}

#[test]
fn test_parallel_pass_resolves_every_task_once() {
    let (octree, palette) = floor_scene();
    let host = HostIntersector::new(octree, palette.clone()).unwrap();
    let params = RenderParams::default();
    let sky = FlatSky::new(DVec3::splat(0.7));
    let engine = TraceEngine::new(&host, &params, &palette, &sky);
    let camera = PinholeCamera::looking_at(DVec3::new(1.0, 5.0, 1.0), DVec3::new(9.0, 1.0, 9.0), 70.0);

    let report = render_pass(&engine, &camera, 12, 8, 42);
    assert_eq!(report.failed, 0);
    assert_eq!(report.samples.len(), 96);

    let stats = engine.stats();
    assert_eq!(stats.enqueued, stats.intersected);
    assert_eq!(stats.enqueued, stats.shaded);
    assert_eq!(stats.enqueued, stats.resolved);
    assert!(stats.enqueued >= 96);
    assert_eq!(engine.pending(), 0);

    let mut buffer = SampleBuffer::new(12, 8);
    assert_eq!(report.finalize_into(&mut buffer), 96);
    for y in 0..8 {
        for x in 0..12 {
            let c = buffer.mean(x, y);
            assert!(c.is_finite() && c.min_element() >= 0.0, "pixel ({x}, {y}) = {c:?}");
        }
    }
}

#[test]
fn test_failed_pixels_are_counted() {
    let palette = palette();
    let params = plain_params();
    let sky = FlatSky::new(DVec3::ONE);
    let engine = TraceEngine::new(&Broken, &params, &palette, &sky);
    let camera = PinholeCamera::new(DVec3::ZERO, 0.0, 0.0, 60.0);

    let report = render_pass(&engine, &camera, 4, 3, 0);
    assert_eq!(report.failed, 12);
    assert!(report.samples.is_empty());
}

#[test]
fn test_same_seed_same_sample() {
    let (octree, palette) = floor_scene();
    let host = HostIntersector::new(octree, palette.clone()).unwrap();
    let params = RenderParams::default();
    let sky = FlatSky::new(DVec3::splat(0.7));
    let engine = TraceEngine::new(&host, &params, &palette, &sky);
    let ray = Ray::new(DVec3::new(2.5, 4.0, 2.5), DVec3::new(0.3, -1.0, 0.4));

    let a = engine.trace(ray.clone(), 99).unwrap();
    let b = engine.trace(ray, 99).unwrap();
    assert_eq!(a, b);
}

/// Forwards to `inner`, holding each call open briefly and recording the
/// most calls ever in progress at once.
struct Exclusive<'a> {
    inner: &'a dyn Intersector,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl<'a> Exclusive<'a> {
    fn new(inner: &'a dyn Intersector) -> Self {
        Self { inner, active: AtomicUsize::new(0), peak: AtomicUsize::new(0), calls: AtomicUsize::new(0) }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst) as u64
    }
}

impl Intersector for Exclusive<'_> {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1));
        let hit = self.inner.next_intersection(ray);
        self.active.fetch_sub(1, Ordering::SeqCst);
        hit
    }
}

fn four_threads() -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap()
}

#[test]
fn test_shadow_rays_on_the_device_are_serialized() {
    let (octree, palette) = floor_scene();
    let host = HostIntersector::new(octree, palette.clone()).unwrap();
    let device = Exclusive::new(&host);
    let params = RenderParams::default();
    let sky = FlatSky::new(DVec3::splat(0.7));
    let engine = TraceEngine::new(&device, &params, &palette, &sky);
    let camera = PinholeCamera::looking_at(DVec3::new(1.0, 5.0, 1.0), DVec3::new(9.0, 1.0, 9.0), 70.0);

    let report = four_threads().install(|| render_pass(&engine, &camera, 16, 8, 5));
    assert_eq!(report.failed, 0);
    // shadow rays reached the device alongside queued requests
    assert!(device.calls() > engine.stats().intersected);
    assert_eq!(device.peak(), 1);
}

#[test]
fn test_separate_shadow_intersector_leaves_device_to_queue() {
    let (octree, palette) = floor_scene();
    let host = HostIntersector::new(octree, palette.clone()).unwrap();
    let device = Exclusive::new(&host);
    let shadow = Exclusive::new(&host);
    let params = RenderParams::default();
    let sky = FlatSky::new(DVec3::splat(0.7));
    let engine = TraceEngine::new(&device, &params, &palette, &sky).with_shadow_intersector(&shadow);
    let camera = PinholeCamera::looking_at(DVec3::new(1.0, 5.0, 1.0), DVec3::new(9.0, 1.0, 9.0), 70.0);

    let report = four_threads().install(|| render_pass(&engine, &camera, 16, 8, 5));
    assert_eq!(report.failed, 0);
    assert_eq!(device.calls(), engine.stats().intersected);
    assert_eq!(device.peak(), 1);
    assert!(shadow.calls() > 0);
}

/// Camera rays land on a matte floor at (0.5, 1, 0.5); rays leaving that
/// hit upward reach a lamp; everything deeper escapes.
struct FloorBesideLamp;

impl Intersector for FloorBesideLamp {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        if ray.depth > 0 {
            return Ok(false);
        }
        let hit = if ray.direction.y < 0.0 {
            Intersection { distance: 3.0, normal: DVec3::Y, block: MATTE, data: 0, color: DVec4::new(0.8, 0.8, 0.8, 1.0) }
        } else {
            Intersection { distance: 1.0, normal: DVec3::NEG_X, block: LAMP, data: 0, color: DVec4::ONE }
        };
        ray.enter(&hit);
        Ok(true)
    }
}

fn lamp_light(sampling: EmitterSamplingStrategy, lamp: EmitterPosition, seed: u64) -> DVec3 {
    let palette = palette();
    let params = RenderParams {
        direct_light: false,
        emitters_enabled: true,
        emitter_sampling: sampling,
        ..RenderParams::default()
    };
    let sky = FlatSky::new(DVec3::ZERO);
    let mut grid = EmitterGrid::new(8);
    grid.insert(lamp);
    let engine = TraceEngine::new(&FloorBesideLamp, &params, &palette, &sky).with_emitters(&grid);
    engine.trace(camera_ray(), seed).unwrap().color
}

#[test]
fn test_emitter_sampling_lights_matte_hit() {
    let beside = EmitterPosition::voxel(1, 1, 0);
    for seed in 0..8 {
        let one = lamp_light(EmitterSamplingStrategy::One, beside, seed);
        let all = lamp_light(EmitterSamplingStrategy::All, beside, seed);
        let none = lamp_light(EmitterSamplingStrategy::None, beside, seed);
        assert!(one.min_element() > 0.0, "seed {seed}: {one:?}");
        assert!(all.min_element() > 0.0, "seed {seed}: {all:?}");
        assert_eq!(none, DVec3::ZERO);
    }
}

#[test]
fn test_distant_emitter_is_not_sampled() {
    let far = EmitterPosition::voxel(40, 1, 0);
    assert_eq!(lamp_light(EmitterSamplingStrategy::All, far, 0), DVec3::ZERO);
    assert_eq!(lamp_light(EmitterSamplingStrategy::One, far, 0), DVec3::ZERO);
}

/// Camera rays hit the underside of `block`, facing away from the sun;
/// everything else escapes.
struct Underside {
    block: u32,
}

impl Intersector for Underside {
    fn next_intersection(&self, ray: &mut Ray) -> Result<bool> {
        if ray.depth > 0 || ray.direction.y >= 0.0 {
            return Ok(false);
        }
        let color = DVec4::new(0.8, 0.8, 0.8, 1.0);
        ray.enter(&Intersection { distance: 3.0, normal: DVec3::NEG_Y, block: self.block, data: 0, color });
        Ok(true)
    }
}

fn lit_seeds(block: u32) -> usize {
    let palette = palette();
    let params = RenderParams { direct_light: true, emitters_enabled: false, ..RenderParams::default() };
    let sky = FlatSky::new(DVec3::ZERO);
    let scene = Underside { block };
    let engine = TraceEngine::new(&scene, &params, &palette, &sky);
    (0..64).filter(|&seed| engine.trace(camera_ray(), seed).unwrap().color != DVec3::ZERO).count()
}

#[test]
fn test_sub_surface_scattering_passes_back_facing_sun() {
    let lit = lit_seeds(WAX);
    assert!(lit > 0 && lit < 64, "{lit} of 64 lit");
    assert_eq!(lit_seeds(MATTE), 0);
}
