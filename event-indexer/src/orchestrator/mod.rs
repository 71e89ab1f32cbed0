//! Orchestrator module for the event indexer.
//!
//! Routes envelopes from the consumer to one sequential worker per partition
//! and relays acknowledgments back to the consumer for offset commits.

mod partition_worker;
mod retry;
mod stats;

pub use retry::{
    Backoff, RetryPolicy, RetryState, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
pub use stats::{PipelineStats, StatsSnapshot};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};
use tracing::{error, info, instrument};

use crate::consumer::{Acknowledgment, StreamMessage};
use crate::dead_letter::DeadLetterSink;
use crate::errors::IngestError;
use crate::loader::IndexLoader;
use crate::outcome::OutcomeTracker;
use crate::processor::EventTransformer;
use partition_worker::{shutdown_requested, PartitionWorker, WorkItem, WorkerContext};

/// Source of stream messages.
///
/// Implemented by [`crate::consumer::KafkaConsumer`]; tests substitute their own.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Subscribe to the configured topics.
    fn subscribe(&self) -> Result<(), IngestError>;

    /// Deliver messages on `sender` until shutdown or end of stream.
    ///
    /// Implementations must keep receiving on `ack_receiver` until it closes and
    /// only then return, so that every acknowledgment is committed. Partition
    /// queues are unbounded, so an implementation should stop fetching from a
    /// partition that has too many unacknowledged messages.
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        ack_receiver: mpsc::UnboundedReceiver<Acknowledgment>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IngestError>;
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the consumer to orchestrator channel buffer.
    pub channel_buffer_size: usize,
    /// Retry policy for transient index failures.
    pub retry_policy: RetryPolicy,
    /// How often to log progress.
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            retry_policy: RetryPolicy::default(),
            progress_interval: Duration::from_secs(10),
        }
    }
}

struct WorkerHandle {
    queue: mpsc::UnboundedSender<WorkItem>,
    join: JoinHandle<()>,
}

/// Orchestrator that coordinates the pipeline components.
///
/// The orchestrator:
/// - Spawns one worker per partition on first sight of that partition
/// - Routes each message to its partition's worker, preserving order
/// - Hands acknowledgments back to the consumer over an unbounded channel
/// - Handles shutdown signals
/// - Logs progress
pub struct Orchestrator {
    consumer: Arc<dyn Consumer>,
    context: WorkerContext,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    worker_shutdown: Arc<watch::Sender<bool>>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given components.
    pub fn new(
        consumer: Arc<dyn Consumer>,
        transformer: EventTransformer,
        loader: IndexLoader,
        dead_letter: Arc<dyn DeadLetterSink>,
        tracker: Arc<OutcomeTracker>,
    ) -> Self {
        Self::with_config(
            consumer,
            transformer,
            loader,
            dead_letter,
            tracker,
            OrchestratorConfig::default(),
        )
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        consumer: Arc<dyn Consumer>,
        transformer: EventTransformer,
        loader: IndexLoader,
        dead_letter: Arc<dyn DeadLetterSink>,
        tracker: Arc<OutcomeTracker>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (worker_shutdown, _) = watch::channel(false);

        let context = WorkerContext {
            transformer: Arc::new(transformer),
            loader: Arc::new(loader),
            dead_letter,
            tracker,
            policy: config.retry_policy.clone(),
            stats: Arc::new(PipelineStats::new()),
        };

        Self {
            consumer,
            context,
            config,
            shutdown_tx,
            worker_shutdown: Arc::new(worker_shutdown),
        }
    }

    /// The outcome tracker the workers record into.
    pub fn tracker(&self) -> Arc<OutcomeTracker> {
        Arc::clone(&self.context.tracker)
    }

    /// Current pipeline counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.context.stats.snapshot()
    }

    /// Run the orchestrator.
    ///
    /// Returns when the consumer's stream ends and every queued envelope has been
    /// handled, or after a shutdown once in-flight index calls have completed and
    /// the final offsets are committed.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), IngestError> {
        info!("Starting event indexer orchestrator");

        self.context.loader.check_ready().await?;
        self.consumer.subscribe()?;

        let (event_transmitter, mut event_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);
        let (ack_transmitter, ack_receiver) = mpsc::unbounded_channel::<Acknowledgment>();

        // Start consumer in background
        let consumer = Arc::clone(&self.consumer);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let consumer_handle = tokio::spawn(async move {
            consumer
                .run(event_transmitter, ack_receiver, shutdown_rx)
                .await
        });

        let signal_tx = Arc::clone(&self.worker_shutdown);
        let signal_handle = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                signal_tx.send_replace(true);
            }
        });

        info!("Ready to process events");

        let mut stop = self.worker_shutdown.subscribe();
        let mut workers: HashMap<(String, i32), WorkerHandle> = HashMap::new();
        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut progress = ProgressTracker::new(self.context.stats.snapshot());
        let mut interrupted = false;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut stop) => {
                    info!("Orchestrator stopping on shutdown request");
                    interrupted = true;
                    break;
                }
                msg = event_receiver.recv() => {
                    let item = match msg {
                        Some(StreamMessage::Envelope { envelope, position }) => {
                            Some(WorkItem::Envelope { envelope, position })
                        }
                        Some(StreamMessage::Malformed { envelope, reason, position }) => {
                            Some(WorkItem::Malformed { envelope, reason, position })
                        }
                        Some(StreamMessage::Tombstone { position }) => {
                            Some(WorkItem::Tombstone { position })
                        }
                        Some(StreamMessage::Error(e)) => {
                            error!(error = %e, "Received error from consumer");
                            None
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Consumer stream ended, draining partition queues");
                            break;
                        }
                    };

                    if let Some(item) = item {
                        if !self.route(&mut workers, item, &ack_transmitter) {
                            interrupted = true;
                            break;
                        }
                    }
                }
                _ = progress_timer.tick() => {
                    progress.log(self.context.stats.snapshot(), workers.len());
                }
            }
        }

        if interrupted {
            self.shutdown();
        }

        // Unblocks a consumer waiting on a full channel.
        drop(event_receiver);

        for ((topic, partition), handle) in workers.drain() {
            drop(handle.queue);
            if let Err(e) = handle.join.await {
                error!(topic = %topic, partition, error = %e, "Partition worker failed");
            }
        }

        // The consumer commits its final offsets once every ack sender is gone.
        drop(ack_transmitter);
        let consumer_result = match consumer_handle.await {
            Ok(result) => result,
            Err(e) => Err(IngestError::channel(format!("Consumer task failed: {}", e))),
        };
        signal_handle.abort();

        let final_stats = self.context.stats.snapshot();
        info!(
            processed = final_stats.processed,
            skipped = final_stats.skipped,
            dead_lettered = final_stats.dead_lettered,
            retries = final_stats.retries,
            "Orchestrator shutdown complete"
        );

        if let Err(e) = &consumer_result {
            error!(error = %e, "Consumer error");
        }
        consumer_result
    }

    /// Hand an item to its partition's worker, spawning the worker if needed.
    ///
    /// Never waits, so a partition whose worker is blocked on retries cannot
    /// hold up any other partition. Returns false if the worker is gone.
    fn route(
        &self,
        workers: &mut HashMap<(String, i32), WorkerHandle>,
        item: WorkItem,
        acks: &mpsc::UnboundedSender<Acknowledgment>,
    ) -> bool {
        let key = match &item {
            WorkItem::Envelope { position, .. }
            | WorkItem::Malformed { position, .. }
            | WorkItem::Tombstone { position } => position.partition_key(),
        };

        let handle = workers.entry(key).or_insert_with_key(|(topic, partition)| {
            let (queue, receiver) = mpsc::unbounded_channel();
            let worker = PartitionWorker::new(
                topic.clone(),
                *partition,
                self.context.clone(),
                acks.clone(),
                self.worker_shutdown.subscribe(),
            );
            let join = tokio::spawn(worker.run(receiver));
            WorkerHandle { queue, join }
        });

        if handle.queue.send(item).is_err() {
            error!("Partition worker stopped unexpectedly, shutting down");
            return false;
        }
        true
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.worker_shutdown.send_replace(true);
        let _ = self.shutdown_tx.send(());
    }
}

/// Rate calculation for the periodic progress line.
struct ProgressTracker {
    previous: StatsSnapshot,
    previous_at: Instant,
}

impl ProgressTracker {
    fn new(initial: StatsSnapshot) -> Self {
        Self {
            previous: initial,
            previous_at: Instant::now(),
        }
    }

    fn log(&mut self, current: StatsSnapshot, partitions: usize) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.previous_at).as_secs_f64();

        let rate = |current: u64, previous: u64| {
            if elapsed_secs > 0.0 {
                (current.saturating_sub(previous) as f64) / elapsed_secs
            } else {
                0.0
            }
        };

        info!(
            processed = current.processed,
            skipped = current.skipped,
            dead_lettered = current.dead_lettered,
            retries = current.retries,
            partitions,
            processed_per_sec = format!("{:.2}", rate(current.processed, self.previous.processed)),
            dead_lettered_per_sec =
                format!("{:.2}", rate(current.dead_lettered, self.previous.dead_lettered)),
            "Processing progress"
        );

        self.previous = current;
        self.previous_at = now;
    }
}
