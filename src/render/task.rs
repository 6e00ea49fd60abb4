//! Ray tasks: one node of a pixel's ray tree.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::Intersector;
use crate::scene::Ray;
use crate::util::{DVec3, Error, Result};

/// Index of a task in its pixel's arena.
pub type TaskId = usize;

/// How a task's ray was spawned from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Root,
    Specular,
    Diffuse,
    Transmitted,
}

impl Branch {
    /// Weight applied to the emittance of a directly hit emitter.
    #[inline]
    pub fn add_emitted(self) -> f64 {
        match self {
            Branch::Diffuse => 0.0,
            Branch::Root | Branch::Specular | Branch::Transmitted => 1.0,
        }
    }
}

/// Result of one intersection request.
#[derive(Debug)]
pub enum Outcome {
    /// The ray entered a new block; it now sits at the hit.
    Hit(Ray),
    /// The ray left the scene unchanged.
    Miss(Ray),
    /// The intersector failed; the error is taken by whoever shades the task.
    Failed(Mutex<Option<Error>>),
}

/// Pending request shared between the owning pixel and the pending queue.
///
/// Any thread holding the device lock may service it; the owner only reads
/// the outcome once it is published.
#[derive(Debug)]
pub struct IntersectionSlot {
    request: Mutex<Option<Ray>>,
    outcome: OnceLock<Outcome>,
    depth: u32,
}

impl IntersectionSlot {
    pub fn new(ray: Ray) -> Arc<Self> {
        let depth = ray.depth;
        Arc::new(Self { request: Mutex::new(Some(ray)), outcome: OnceLock::new(), depth })
    }

    /// Depth of the queued ray, the queue priority.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Run the intersection and publish its outcome.
    ///
    /// Returns false if the slot was already serviced.
    pub fn service(&self, intersector: &dyn Intersector) -> bool {
        let Some(mut ray) = self.request.lock().take() else {
            return false;
        };
        let outcome = match intersector.next_intersection(&mut ray) {
            Ok(true) => Outcome::Hit(ray),
            Ok(false) => Outcome::Miss(ray),
            Err(e) => Outcome::Failed(Mutex::new(Some(e))),
        };
        self.outcome.set(outcome).is_ok()
    }

    /// True once an outcome has been published.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// The intersected ray and whether it hit; `None` while pending.
    pub fn take_result(&self) -> Option<Result<(Ray, bool)>> {
        Some(match self.outcome.get()? {
            Outcome::Hit(ray) => Ok((ray.clone(), true)),
            Outcome::Miss(ray) => Ok((ray.clone(), false)),
            Outcome::Failed(err) => Err(err
                .lock()
                .take()
                .unwrap_or_else(|| Error::readback("intersection failure already reported"))),
        })
    }
}

/// One node of a pixel's ray tree.
#[derive(Debug)]
pub struct RayTask {
    pub parent: Option<TaskId>,
    pub branch: Branch,
    pub slot: Arc<IntersectionSlot>,
    /// Intersected and shaded ray; `None` until shading.
    pub ray: Option<Ray>,
    /// Emitted light weight for a directly hit emitter (see [`Branch::add_emitted`]).
    pub add_emitted: f64,
    /// Set at this task's own hit when it is an emitter.
    pub emittance_to_add: f64,
    /// Sun and emitter light gathered at the parent's hit, carried by a diffuse child.
    pub indirect_emitter_color: DVec3,
    pub pending_children: u32,
    pub resolved: bool,
}

impl RayTask {
    pub fn new(parent: Option<TaskId>, branch: Branch, slot: Arc<IntersectionSlot>) -> Self {
        Self {
            parent,
            branch,
            slot,
            ray: None,
            add_emitted: branch.add_emitted(),
            emittance_to_add: 0.0,
            indirect_emitter_color: DVec3::ZERO,
            pending_children: 0,
            resolved: false,
        }
    }
}
