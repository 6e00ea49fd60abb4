//! Per-pixel ray-tree tracing over a shared, opportunistically drained queue.
//!
//! Every pixel runs its own loop:
//!
//! 1. try to take the device lock and service one queued request, from any pixel
//! 2. shade every task of this pixel whose intersection has been published
//! 3. fold resolved tasks into their parents, cascading up the tree
//!
//! A thread that loses the race for the device lock keeps shading instead of
//! waiting, so device latency overlaps with host work of other pixels.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::light::LightSampler;
use super::queue::PendingQueue;
use super::task::{Branch, IntersectionSlot, RayTask, TaskId};
use super::Intersector;
use crate::config::{EmitterSamplingStrategy, RenderParams, SUBSURFACE_PROBABILITY};
use crate::scene::{Block, BlockPalette, EmitterIndex, Environment, Ray, AIR, EPSILON, OFFSET};
use crate::util::{rgb, DVec3, DVec4, Result};

/// Work counters of one engine, across all pixels.
#[derive(Debug, Default)]
pub struct TraceStats {
    pub enqueued: AtomicU64,
    pub intersected: AtomicU64,
    pub shaded: AtomicU64,
    pub resolved: AtomicU64,
}

/// Point-in-time copy of [`TraceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStatsSnapshot {
    pub enqueued: u64,
    pub intersected: u64,
    pub shaded: u64,
    pub resolved: u64,
}

impl TraceStats {
    pub fn snapshot(&self) -> TraceStatsSnapshot {
        TraceStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            intersected: self.intersected.load(Ordering::Relaxed),
            shaded: self.shaded.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
        }
    }
}

/// One path-traced sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSample {
    pub color: DVec3,
    pub seed: u64,
}

/// Fold a resolved child into its parent's color.
///
/// `emittance_to_add` belongs to the parent: it is set when the parent's own
/// hit is an emitter.
pub fn fold_child(parent: &mut Ray, emittance_to_add: f64, branch: Branch, child: &Ray, indirect_emitter_color: DVec3) {
    let alpha = parent.color.w;
    let color = match branch {
        Branch::Diffuse => {
            rgb(parent.color)
                * (DVec3::splat(emittance_to_add) + rgb(child.color) + child.emittance + indirect_emitter_color)
        }
        Branch::Specular => rgb(child.color),
        Branch::Transmitted => (rgb(parent.color) * alpha + DVec3::splat(1.0 - alpha)) * rgb(child.color),
        Branch::Root => return,
    };
    parent.color = color.extend(alpha);
}

/// Child spawned while shading a hit.
struct Spawn {
    branch: Branch,
    ray: Ray,
    indirect: DVec3,
}

const BLACK: DVec4 = DVec4::new(0.0, 0.0, 0.0, 1.0);

/// Path tracer for one render pass.
///
/// Shared by all tracer threads of the pass; owns the pass's pending queue
/// and device lock. Shadow and emitter probes that go through the queue's
/// intersector hold the device lock for the duration of the probe.
pub struct TraceEngine<'a> {
    intersector: &'a dyn Intersector,
    light: LightSampler<'a>,
    /// Probes share `intersector` and must be serialized with the queue.
    light_on_device: bool,
    params: &'a RenderParams,
    palette: &'a BlockPalette,
    environment: &'a dyn Environment,
    emitters: Option<&'a dyn EmitterIndex>,
    queue: PendingQueue,
    device_lock: Mutex<()>,
    stats: TraceStats,
}

impl<'a> TraceEngine<'a> {
    /// Engine issuing every query, shadow rays included, through `intersector`.
    pub fn new(
        intersector: &'a dyn Intersector,
        params: &'a RenderParams,
        palette: &'a BlockPalette,
        environment: &'a dyn Environment,
    ) -> Self {
        Self {
            intersector,
            light: LightSampler::new(intersector, params, palette),
            light_on_device: true,
            params,
            palette,
            environment,
            emitters: None,
            queue: PendingQueue::new(),
            device_lock: Mutex::new(()),
            stats: TraceStats::default(),
        }
    }

    /// Emitter index used when emitter sampling is enabled.
    pub fn with_emitters(mut self, emitters: &'a dyn EmitterIndex) -> Self {
        self.emitters = Some(emitters);
        self
    }

    /// Route shadow and emitter probes through a separate intersector.
    ///
    /// `shadow` must be safe to call from every tracer thread at once; probes
    /// then run without the device lock.
    pub fn with_shadow_intersector(mut self, shadow: &'a dyn Intersector) -> Self {
        self.light = LightSampler::new(shadow, self.params, self.palette);
        self.light_on_device = false;
        self
    }

    #[inline]
    pub fn params(&self) -> &RenderParams {
        self.params
    }

    #[inline]
    pub fn stats(&self) -> TraceStatsSnapshot {
        self.stats.snapshot()
    }

    /// Requests waiting for the device.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Trace one camera ray to completion.
    pub fn trace(&self, camera_ray: Ray, seed: u64) -> Result<PixelSample> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tasks: Vec<RayTask> = Vec::new();
        let mut in_flight: Vec<TaskId> = Vec::new();

        let mut root = camera_ray;
        root.set_current_material(AIR, 0);
        self.spawn(&mut tasks, &mut in_flight, None, Branch::Root, root);

        while !in_flight.is_empty() {
            let drained = self.drain_one();

            let mut progressed = false;
            let mut i = 0;
            while i < in_flight.len() {
                let id = in_flight[i];
                let Some(result) = tasks[id].slot.take_result() else {
                    i += 1;
                    continue;
                };
                let (ray, hit) = result?;
                self.shade(&mut tasks, &mut in_flight, id, ray, hit, &mut rng)?;
                // children were appended, so index i now holds the next task
                in_flight.remove(i);
                progressed = true;
            }

            if !drained && !progressed {
                std::thread::yield_now();
            }
        }

        let color = tasks[0].ray.as_ref().map(|r| rgb(r.color)).unwrap_or(DVec3::ZERO);
        Ok(PixelSample { color, seed })
    }

    /// Service one queued request if the device is free. Never blocks.
    fn drain_one(&self) -> bool {
        let Some(_device) = self.device_lock.try_lock() else {
            return false;
        };
        let Some(slot) = self.queue.pop() else {
            return false;
        };
        if slot.service(self.intersector) {
            self.stats.intersected.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Run a synchronous light probe, blocking on the device lock when the
    /// probe shares the queue's intersector.
    fn probe<T>(&self, f: impl FnOnce(&LightSampler<'a>) -> Result<T>) -> Result<T> {
        let _device = self.light_on_device.then(|| self.device_lock.lock());
        f(&self.light)
    }

    fn spawn(
        &self,
        tasks: &mut Vec<RayTask>,
        in_flight: &mut Vec<TaskId>,
        parent: Option<TaskId>,
        branch: Branch,
        ray: Ray,
    ) -> TaskId {
        let slot = IntersectionSlot::new(ray);
        self.queue.push(slot.clone());
        let id = tasks.len();
        tasks.push(RayTask::new(parent, branch, slot));
        in_flight.push(id);
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        id
    }

    fn shade(
        &self,
        tasks: &mut Vec<RayTask>,
        in_flight: &mut Vec<TaskId>,
        id: TaskId,
        mut ray: Ray,
        hit: bool,
        rng: &mut StdRng,
    ) -> Result<()> {
        self.stats.shaded.fetch_add(1, Ordering::Relaxed);

        let spawn = if hit {
            let block = self.palette.get(ray.current_material);
            if block.specular as f64 > EPSILON && rng.gen::<f32>() < block.specular {
                let reflected = ray.specular_reflection();
                self.child_or_black(&mut ray, Branch::Specular, reflected, DVec3::ZERO)
            } else if (rng.gen::<f32>() as f64) < ray.color.w {
                self.shade_diffuse(&mut tasks[id], &mut ray, block, rng)?
            } else {
                let transmitted = ray.transmitted();
                self.child_or_black(&mut ray, Branch::Transmitted, transmitted, DVec3::ZERO)
            }
        } else {
            self.shade_miss(&mut ray);
            None
        };

        tasks[id].ray = Some(ray);
        match spawn {
            Some(Spawn { branch, ray, indirect }) => {
                tasks[id].pending_children += 1;
                let child = self.spawn(tasks, in_flight, Some(id), branch, ray);
                tasks[child].indirect_emitter_color = indirect;
            }
            None => self.resolve(tasks, id),
        }
        Ok(())
    }

    /// Sky lookup for a ray that left the scene.
    fn shade_miss(&self, ray: &mut Ray) {
        let env = self.environment;
        let sky = if ray.depth == 0 {
            if self.params.transparent_sky {
                return;
            }
            env.add_sky_fog(ray, env.sky_color_interpolated(ray))
        } else if ray.specular {
            env.add_sky_fog(ray, env.sky_specular_color(ray))
        } else {
            env.sky_color(ray)
        };
        ray.color = sky.extend(1.0);
    }

    /// Emission, emitter sampling and sun light at a diffuse hit, then the
    /// diffuse bounce.
    fn shade_diffuse(&self, task: &mut RayTask, ray: &mut Ray, block: &Block, rng: &mut StdRng) -> Result<Option<Spawn>> {
        let params = self.params;
        let sampling = params.emitter_sampling;
        let mut indirect = DVec3::ZERO;

        let count_emission = !params.prevent_normal_emitter_with_sampling
            || sampling == EmitterSamplingStrategy::None
            || ray.depth == 0;
        if params.emitters_enabled && count_emission && block.emittance as f64 > EPSILON {
            task.emittance_to_add = task.add_emitted;
            let c = rgb(ray.color);
            ray.emittance = c * c * (block.emittance as f64 * params.emitter_intensity);
        } else if params.emitters_enabled && sampling != EmitterSamplingStrategy::None {
            if let Some(grid) = self.emitters {
                let (x, y, z) = (ray.origin.x as i32, ray.origin.y as i32, ray.origin.z as i32);
                match sampling {
                    EmitterSamplingStrategy::One => {
                        if let Some(pos) = grid.sample_emitter_position(x, y, z, rng) {
                            indirect = self.probe(|light| light.sample_emitter(ray, &pos, rng))?;
                        }
                    }
                    EmitterSamplingStrategy::All => {
                        for pos in grid.emitter_positions(x, y, z) {
                            indirect += self.probe(|light| light.sample_emitter(ray, pos, rng))?;
                        }
                    }
                    EmitterSamplingStrategy::None => {}
                }
            }
        }

        if params.direct_light {
            let sun = self.environment.sun();
            let mut shadow = ray.clone();
            shadow.direction = sun.random_direction(rng);
            let cos = shadow.direction.dot(ray.normal);
            let front = cos > 0.0;
            if front || (block.sub_surface_scattering && (rng.gen::<f32>() as f64) < SUBSURFACE_PROBABILITY) {
                if !front {
                    shadow.origin -= OFFSET * ray.normal;
                }
                shadow.set_current_material(shadow.prev_material, shadow.prev_data);
                let att = self.probe(|light| light.direct_light_attenuation(&mut shadow))?;
                if att.w > 0.0 {
                    indirect += rgb(att) * (att.w * cos.abs()) * sun.color;
                }
            }
        }

        let reflected = ray.diffuse_reflection(rng);
        Ok(self.child_or_black(ray, Branch::Diffuse, reflected, indirect))
    }

    /// Spawn `child` unless it would reach the depth limit; then the parent turns black.
    fn child_or_black(&self, parent: &mut Ray, branch: Branch, child: Ray, indirect: DVec3) -> Option<Spawn> {
        if child.depth < self.params.ray_depth {
            Some(Spawn { branch, ray: child, indirect })
        } else {
            parent.color = BLACK;
            None
        }
    }

    /// Mark `id` resolved and fold it upward while parents complete.
    fn resolve(&self, tasks: &mut [RayTask], mut id: TaskId) {
        loop {
            debug_assert!(!tasks[id].resolved, "task {id} resolved twice");
            tasks[id].resolved = true;
            self.stats.resolved.fetch_add(1, Ordering::Relaxed);

            let Some(parent) = tasks[id].parent else {
                return;
            };
            let branch = tasks[id].branch;
            let indirect = tasks[id].indirect_emitter_color;
            let Some(child) = tasks[id].ray.take() else {
                return;
            };
            let emittance_to_add = tasks[parent].emittance_to_add;
            let parent_task = &mut tasks[parent];
            if let Some(parent_ray) = parent_task.ray.as_mut() {
                fold_child(parent_ray, emittance_to_add, branch, &child, indirect);
            }
            tasks[id].ray = Some(child);

            let parent_task = &mut tasks[parent];
            parent_task.pending_children -= 1;
            if parent_task.pending_children > 0 {
                return;
            }
            id = parent;
        }
    }
}
