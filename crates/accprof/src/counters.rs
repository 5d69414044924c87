//! Per-offset access counters.
//!
//! One `AtomicU64` per byte of a type's layout. Increments are relaxed: the
//! counts are only read as a snapshot once the observed threads are quiet.

use std::sync::atomic::{AtomicU64, Ordering};

/// Access counters for every byte offset of one type.
#[derive(Debug)]
pub struct AccessCounters {
    counts: Box<[AtomicU64]>,
}

impl AccessCounters {
    /// Allocate `size` zeroed counters.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            counts: (0..size).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Number of tracked offsets (the type's byte size).
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count one access at `offset`. Out-of-range offsets are ignored.
    #[inline]
    pub fn increment(&self, offset: usize) {
        if let Some(counter) = self.counts.get(offset) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current count at `offset` (zero when out of range).
    #[must_use]
    pub fn get(&self, offset: usize) -> u64 {
        self.counts
            .get(offset)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Offsets with a non-zero count, ascending.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .enumerate()
            .filter(|&(_, count)| count != 0)
    }

    /// Sum of all counters.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}
