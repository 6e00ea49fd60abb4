//! Shared queue of pending intersection requests.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::task::IntersectionSlot;

struct Entry {
    depth: u32,
    seq: u64,
    slot: Arc<IntersectionSlot>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Max-heap: shallowest first, then oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        other.depth.cmp(&self.depth).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Requests from every pixel of a pass, drained shallowest first.
///
/// Ties drain in insertion order. Ordering only affects throughput.
#[derive(Default)]
pub struct PendingQueue {
    heap: Mutex<BinaryHeap<Entry>>,
    seq: AtomicU64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, slot: Arc<IntersectionSlot>) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let depth = slot.depth();
        self.heap.lock().push(Entry { depth, seq, slot });
    }

    pub fn pop(&self) -> Option<Arc<IntersectionSlot>> {
        self.heap.lock().pop().map(|e| e.slot)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Ray;
    use crate::util::DVec3;

    fn slot(depth: u32, x: f64) -> Arc<IntersectionSlot> {
        let mut ray = Ray::new(DVec3::new(x, 0.0, 0.0), DVec3::X);
        ray.depth = depth;
        IntersectionSlot::new(ray)
    }

    struct Echo;

    impl crate::render::Intersector for Echo {
        fn next_intersection(&self, _: &mut Ray) -> crate::util::Result<bool> {
            Ok(false)
        }
    }

    fn origin_x(slot: &IntersectionSlot) -> f64 {
        slot.service(&Echo);
        match slot.take_result() {
            Some(Ok((ray, _))) => ray.origin.x,
            _ => f64::NAN,
        }
    }

    #[test]
    fn test_shallowest_first_fifo_ties() {
        let q = PendingQueue::new();
        q.push(slot(2, 0.0));
        q.push(slot(0, 1.0));
        q.push(slot(1, 2.0));
        q.push(slot(0, 3.0));
        q.push(slot(1, 4.0));

        let order: Vec<(u32, f64)> = std::iter::from_fn(|| q.pop())
            .map(|s| (s.depth(), origin_x(&s)))
            .collect();
        assert_eq!(order, vec![(0, 1.0), (0, 3.0), (1, 2.0), (1, 4.0), (2, 0.0)]);
        assert!(q.is_empty());
    }
}
