//! Per-partition backpressure.
//!
//! Partition workers have unbounded queues, so the consumer bounds how far a
//! partition can run ahead of its worker instead. A partition is paused once
//! too many of its messages are unacknowledged and resumed when its worker has
//! drained half of them.

use std::collections::{HashMap, HashSet};

/// Default number of unacknowledged messages per partition before it is paused.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 500;

/// What the consumer should do with a partition after a count change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowChange {
    Pause,
    Resume,
    Unchanged,
}

/// Unacknowledged message counts per `(topic, partition)`.
#[derive(Debug)]
pub struct InFlight {
    high_water: usize,
    low_water: usize,
    counts: HashMap<(String, i32), usize>,
    paused: HashSet<(String, i32)>,
}

impl InFlight {
    pub fn new(max_in_flight: usize) -> Self {
        let high_water = max_in_flight.max(1);
        Self {
            high_water,
            low_water: high_water / 2,
            counts: HashMap::new(),
            paused: HashSet::new(),
        }
    }

    /// Count a message handed to the orchestrator.
    pub fn forwarded(&mut self, key: (String, i32)) -> FlowChange {
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count >= self.high_water && self.paused.insert(key) {
            return FlowChange::Pause;
        }
        FlowChange::Unchanged
    }

    /// Count an acknowledgment from a partition worker.
    pub fn acknowledged(&mut self, key: &(String, i32)) -> FlowChange {
        let Some(count) = self.counts.get_mut(key) else {
            return FlowChange::Unchanged;
        };
        *count = count.saturating_sub(1);
        if *count <= self.low_water && self.paused.remove(key) {
            return FlowChange::Resume;
        }
        FlowChange::Unchanged
    }

    pub fn in_flight(&self, key: &(String, i32)) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn is_paused(&self, key: &(String, i32)) -> bool {
        self.paused.contains(key)
    }
}
