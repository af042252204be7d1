use std::cmp::Reverse;

use dary_heap::OctonaryHeap;
use ordered_float::OrderedFloat;

use crate::particle::ParticleIdx;

/// A heap entry. Entries are invalidated by bumping the voxel's generation
/// instead of being removed from the heap.
type Entry = Reverse<(OrderedFloat<f64>, ParticleIdx, u32)>;

/// A priority queue holding the next event time of every voxel.
///
/// Voxels with equal times are ordered by index, so dispatch order only depends on the sampled times.
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    heap: OctonaryHeap<Entry>,
    times: Vec<f64>,
    generations: Vec<u32>,
}

impl EventQueue {
    /// Creates a queue in which no voxel is scheduled.
    pub fn new(voxels: usize) -> EventQueue {
        EventQueue {
            heap: OctonaryHeap::with_capacity(voxels),
            times: vec![f64::INFINITY; voxels],
            generations: vec![0; voxels],
        }
    }

    /// The number of voxels tracked by the queue.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// The time of the next event of the voxel, infinite if it is never going to fire.
    pub fn time_of(&self, voxel: ParticleIdx) -> f64 {
        self.times[voxel.index()]
    }

    /// Sets the next event time of a voxel, replacing any previous one.
    pub fn schedule(&mut self, voxel: ParticleIdx, time: f64) {
        let idx = voxel.index();
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.times[idx] = time;
        if time.is_finite() {
            self.heap
                .push(Reverse((OrderedFloat(time), voxel, self.generations[idx])));
        }
        if self.heap.len() > 2 * self.times.len() + 16 {
            self.compact();
        }
    }

    /// Returns the voxel with the earliest event, and the time of that event.
    pub fn peek(&mut self) -> Option<(f64, ParticleIdx)> {
        while let Some(Reverse((time, voxel, generation))) = self.heap.peek().copied() {
            if self.generations[voxel.index()] == generation {
                return Some((time.0, voxel));
            }
            self.heap.pop();
        }
        None
    }

    /// Drops all invalidated entries.
    fn compact(&mut self) {
        let generations = &self.generations;
        self.heap
            .retain(|Reverse((_, voxel, generation))| generations[voxel.index()] == *generation);
    }
}
