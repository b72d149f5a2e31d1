use std::collections::HashSet;

use crate::CellId;

/// Alignment bookkeeping for one nested update interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cadence {
    last: f64,
}

impl Cadence {
    /// Time the block last ran.
    #[must_use]
    pub fn last(&self) -> f64 {
        self.last
    }

    /// Elapsed time to hand the block, or `None` when it is not yet due.
    ///
    /// The block is due only when `now - last` lies within `0.001 * interval`
    /// of the interval, so ticks off the interval grid are skipped. On the
    /// bootstrap tick it always runs with the nominal interval as its
    /// elapsed time.
    #[must_use]
    pub fn due(&self, now: f64, interval: f64, bootstrap: bool) -> Option<f64> {
        if bootstrap {
            return Some(interval);
        }
        let elapsed = now - self.last;
        let tolerance = 0.001 * interval;
        ((elapsed - interval).abs() < tolerance).then_some(elapsed)
    }

    pub fn mark(&mut self, now: f64) {
        self.last = now;
    }
}

/// Per-tick queue of cells flagged for division or removal.
///
/// Keeps insertion order for reproducible flushing and rejects a second
/// entry for the same cell.
#[derive(Debug, Clone, Default)]
pub struct DeferredSet {
    order: Vec<CellId>,
    members: HashSet<CellId>,
}

impl DeferredSet {
    /// Queue `id`; returns false if it was already queued this tick.
    pub fn insert(&mut self, id: CellId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push(id);
        true
    }

    #[must_use]
    pub fn contains(&self, id: CellId) -> bool {
        self.members.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Empty the set, yielding queued cells in insertion order.
    pub fn drain(&mut self) -> Vec<CellId> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }
}
