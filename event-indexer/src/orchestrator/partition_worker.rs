//! Sequential consumer loop for a single partition.
//!
//! A worker owns one partition's queue and takes each envelope to a terminal
//! state (processed or dead-lettered) before looking at the next one. A
//! transiently failing envelope blocks its partition until it succeeds or
//! exhausts its attempts. Other partitions keep flowing on their own workers.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};

use event_indexer_shared::{DeadLetterRecord, EventEnvelope};

use crate::consumer::{Acknowledgment, PartitionOffset};
use crate::dead_letter::DeadLetterSink;
use crate::errors::ProcessingError;
use crate::loader::IndexLoader;
use crate::orchestrator::retry::{RetryPolicy, RetryState};
use crate::orchestrator::stats::PipelineStats;
use crate::outcome::OutcomeTracker;
use crate::processor::{EventTransformer, IndexMutation};

/// Unit of work routed to a partition worker.
#[derive(Debug)]
pub(crate) enum WorkItem {
    Envelope {
        envelope: EventEnvelope,
        position: PartitionOffset,
    },
    Malformed {
        envelope: EventEnvelope,
        reason: String,
        position: PartitionOffset,
    },
    Tombstone {
        position: PartitionOffset,
    },
}

/// Components shared by every partition worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub transformer: Arc<EventTransformer>,
    pub loader: Arc<IndexLoader>,
    pub dead_letter: Arc<dyn DeadLetterSink>,
    pub tracker: Arc<OutcomeTracker>,
    pub policy: RetryPolicy,
    pub stats: Arc<PipelineStats>,
}

enum Flow {
    Continue,
    Stop,
}

/// Resolves once shutdown is requested. A dropped sender counts as shutdown.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub(crate) struct PartitionWorker {
    topic: String,
    partition: i32,
    ctx: WorkerContext,
    acks: mpsc::UnboundedSender<Acknowledgment>,
    shutdown: watch::Receiver<bool>,
}

impl PartitionWorker {
    pub(crate) fn new(
        topic: String,
        partition: i32,
        ctx: WorkerContext,
        acks: mpsc::UnboundedSender<Acknowledgment>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            topic,
            partition,
            ctx,
            acks,
            shutdown,
        }
    }

    /// Process the queue until it closes or shutdown is requested.
    ///
    /// On shutdown the worker stops between envelopes. An envelope waiting for
    /// a retry is abandoned unacknowledged and will be redelivered.
    pub(crate) async fn run(mut self, mut queue: mpsc::UnboundedReceiver<WorkItem>) {
        info!(topic = %self.topic, partition = self.partition, "Partition worker started");

        loop {
            let item = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => {
                    debug!(partition = self.partition, "Partition worker received shutdown signal");
                    break;
                }
                item = queue.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            if let Flow::Stop = self.handle(item).await {
                break;
            }
        }

        info!(topic = %self.topic, partition = self.partition, "Partition worker stopped");
    }

    async fn handle(&mut self, item: WorkItem) -> Flow {
        match item {
            WorkItem::Envelope { envelope, position } => self.process(envelope, position).await,
            WorkItem::Malformed {
                envelope,
                reason,
                position,
            } => self.dead_letter(envelope, reason, 1, position).await,
            WorkItem::Tombstone { position } => {
                debug!(offset = position.offset, "Acknowledging tombstone");
                self.acknowledge(position);
                Flow::Continue
            }
        }
    }

    #[instrument(
        skip(self, envelope, position),
        fields(
            entity_id = %envelope.entity_id(),
            entity_type = %envelope.entity_type(),
            partition = position.partition,
            offset = position.offset
        )
    )]
    async fn process(&mut self, envelope: EventEnvelope, position: PartitionOffset) -> Flow {
        let mut retry = RetryState::new(&self.ctx.policy);
        retry.begin_attempt();

        let mutation = match self.ctx.transformer.transform(&envelope) {
            Ok(IndexMutation::Skip) => {
                debug!(event_type = %envelope.event_type(), "No index mutation for envelope");
                self.ctx.tracker.record_processed(envelope, retry.attempts());
                self.ctx.stats.record_skipped();
                self.acknowledge(position);
                return Flow::Continue;
            }
            Ok(mutation) => mutation,
            Err(e) => {
                let err = ProcessingError::from(e);
                warn!(error = %err, "Envelope cannot be transformed, dead-lettering");
                retry.record_failure(err.to_string());
                return self
                    .dead_letter(envelope, err.to_string(), retry.attempts(), position)
                    .await;
            }
        };

        loop {
            let err = match self.ctx.loader.apply(&mutation).await {
                Ok(()) => {
                    debug!(attempts = retry.attempts(), "Envelope applied to index");
                    self.ctx.tracker.record_processed(envelope, retry.attempts());
                    self.ctx.stats.record_processed();
                    self.acknowledge(position);
                    return Flow::Continue;
                }
                Err(e) => ProcessingError::from(e),
            };

            if err.is_retryable() && self.ctx.policy.allows_retry(retry.attempts()) {
                let delay = retry.schedule_retry(err.to_string());
                warn!(
                    attempt = retry.attempts(),
                    max_attempts = self.ctx.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient index failure, retrying"
                );
                self.ctx.stats.record_retry();

                let deadline = retry.next_retry_at().unwrap_or_else(Instant::now);
                if !self.wait_unless_shutdown(deadline).await {
                    info!(
                        attempts = retry.attempts(),
                        "Shutdown during backoff, leaving envelope unacknowledged"
                    );
                    return Flow::Stop;
                }
                retry.begin_attempt();
                continue;
            }

            let reason = if err.is_retryable() {
                format!("retries exhausted after {} attempts: {}", retry.attempts(), err)
            } else {
                err.to_string()
            };
            retry.record_failure(err.to_string());
            error!(
                attempts = retry.attempts(),
                errors = ?retry.errors(),
                "Envelope failed terminally, dead-lettering"
            );
            return self
                .dead_letter(envelope, reason, retry.attempts(), position)
                .await;
        }
    }

    /// Publish to the dead-letter sink, retrying until it succeeds or shutdown.
    async fn dead_letter(
        &mut self,
        envelope: EventEnvelope,
        reason: String,
        attempts: u32,
        position: PartitionOffset,
    ) -> Flow {
        let record = DeadLetterRecord::new(envelope, reason, attempts);
        let mut backoff = self.ctx.policy.schedule();
        let mut publish_failures = 0u32;

        while let Err(e) = self.ctx.dead_letter.publish(&record).await {
            publish_failures += 1;
            let delay = backoff.next().unwrap_or(self.ctx.policy.max_delay);
            error!(
                entity_id = %record.envelope.entity_id(),
                offset = position.offset,
                failures = publish_failures,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "Dead-letter publish failed, retrying"
            );
            if !self.wait_unless_shutdown(Instant::now() + delay).await {
                warn!(
                    offset = position.offset,
                    "Shutdown before dead-letter record was published, leaving envelope unacknowledged"
                );
                return Flow::Stop;
            }
        }

        let DeadLetterRecord {
            envelope, reason, ..
        } = record;
        info!(
            entity_id = %envelope.entity_id(),
            offset = position.offset,
            attempts,
            reason = %reason,
            "Envelope dead-lettered"
        );
        self.ctx.tracker.record_dead_lettered(envelope, reason, attempts);
        self.ctx.stats.record_dead_lettered();
        self.acknowledge(position);
        Flow::Continue
    }

    /// Sleep until `deadline`. Returns false if shutdown was requested first.
    async fn wait_unless_shutdown(&mut self, deadline: Instant) -> bool {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => false,
            _ = sleep_until(deadline) => true,
        }
    }

    fn acknowledge(&self, position: PartitionOffset) {
        if self.acks.send(Acknowledgment::new(position)).is_err() {
            warn!(
                topic = %self.topic,
                partition = self.partition,
                "Acknowledgment channel closed"
            );
        }
    }
}
