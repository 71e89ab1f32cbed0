//! Outcome tracking for the event indexer.
//!
//! Keeps the most recent processed and dead-lettered envelopes in memory for
//! inspection through the read API. This is diagnostic state only: losing it on
//! restart does not affect what was indexed or dead-lettered.

mod ring_buffer;

use std::sync::{PoisonError, RwLock};

use event_indexer_shared::{EventEnvelope, OutcomeRecord};
use serde::Serialize;

use ring_buffer::RingBuffer;

/// Default number of records kept per buffer.
pub const DEFAULT_OUTCOME_CAPACITY: usize = 1000;

/// Current number of records held in each buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub processed: usize,
    pub errors: usize,
}

#[derive(Debug)]
struct Buffers {
    processed: RingBuffer<OutcomeRecord>,
    errors: RingBuffer<OutcomeRecord>,
}

/// Bounded record of recent terminal outcomes, shared by every partition worker
/// and the read API.
///
/// Both buffers sit behind a single lock, so a reader always sees whole records
/// and never a buffer mid-eviction.
#[derive(Debug)]
pub struct OutcomeTracker {
    buffers: RwLock<Buffers>,
}

impl OutcomeTracker {
    /// Create a tracker with separate capacities for processed and error records.
    pub fn new(processed_capacity: usize, error_capacity: usize) -> Self {
        Self {
            buffers: RwLock::new(Buffers {
                processed: RingBuffer::new(processed_capacity),
                errors: RingBuffer::new(error_capacity),
            }),
        }
    }

    /// Record an envelope that was applied to the index (or skipped).
    pub fn record_processed(&self, envelope: EventEnvelope, attempts: u32) {
        let record = OutcomeRecord::processed(envelope, attempts);
        let mut buffers = self.buffers.write().unwrap_or_else(PoisonError::into_inner);
        buffers.processed.push(record);
    }

    /// Record an envelope that was published to the dead-letter channel.
    pub fn record_dead_lettered(&self, envelope: EventEnvelope, reason: impl Into<String>, attempts: u32) {
        let record = OutcomeRecord::dead_lettered(envelope, reason, attempts);
        let mut buffers = self.buffers.write().unwrap_or_else(PoisonError::into_inner);
        buffers.errors.push(record);
    }

    /// Snapshot of processed records, oldest first.
    pub fn list_processed(&self) -> Vec<OutcomeRecord> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .processed
            .snapshot()
    }

    /// Snapshot of dead-lettered records, oldest first.
    pub fn list_errors(&self) -> Vec<OutcomeRecord> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .snapshot()
    }

    /// Capacities of the processed and error buffers.
    pub fn capacity(&self) -> (usize, usize) {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        (buffers.processed.capacity(), buffers.errors.capacity())
    }

    pub fn counts(&self) -> OutcomeCounts {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        OutcomeCounts {
            processed: buffers.processed.len(),
            errors: buffers.errors.len(),
        }
    }
}

impl Default for OutcomeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_OUTCOME_CAPACITY, DEFAULT_OUTCOME_CAPACITY)
    }
}
