//! Mock dependencies shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use event_indexer::consumer::{Acknowledgment, PartitionOffset, StreamMessage};
use event_indexer::dead_letter::DeadLetterSink;
use event_indexer::errors::{DeadLetterError, IngestError};
use event_indexer::loader::IndexLoader;
use event_indexer::orchestrator::{Consumer, Orchestrator, OrchestratorConfig, RetryPolicy};
use event_indexer::outcome::OutcomeTracker;
use event_indexer::processor::EventTransformer;
use event_indexer_repository::{IndexError, IndexingClient};
use event_indexer_shared::{DeadLetterRecord, DocumentKey, EventEnvelope, IndexDocument};

pub const TOPIC: &str = "domain.events";

/// Consumer that replays a fixed list of messages and records acknowledgments.
pub struct MockConsumer {
    messages: Mutex<Option<Vec<StreamMessage>>>,
    send_end: bool,
    error_on_subscribe: bool,
    pub acks: Arc<Mutex<Vec<Acknowledgment>>>,
}

impl MockConsumer {
    /// Sends `messages` followed by `End`.
    pub fn new(messages: Vec<StreamMessage>) -> Self {
        Self {
            messages: Mutex::new(Some(messages)),
            send_end: true,
            error_on_subscribe: false,
            acks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sends `messages` and then waits for shutdown, like a live broker.
    pub fn open_ended(messages: Vec<StreamMessage>) -> Self {
        Self {
            send_end: false,
            ..Self::new(messages)
        }
    }

    pub fn with_subscribe_error() -> Self {
        Self {
            error_on_subscribe: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn acked_offsets(&self, partition: i32) -> Vec<i64> {
        self.acks
            .lock()
            .unwrap()
            .iter()
            .filter(|ack| ack.position.partition == partition)
            .map(|ack| ack.position.offset)
            .collect()
    }

    pub fn ack_count(&self) -> usize {
        self.acks.lock().unwrap().len()
    }
}

#[async_trait]
impl Consumer for MockConsumer {
    fn subscribe(&self) -> Result<(), IngestError> {
        if self.error_on_subscribe {
            Err(IngestError::KafkaError("Mock subscribe error".to_string()))
        } else {
            Ok(())
        }
    }

    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::UnboundedReceiver<Acknowledgment>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IngestError> {
        let messages = self.messages.lock().unwrap().take().unwrap_or_default();
        for message in messages {
            if sender.send(message).await.is_err() {
                break;
            }
        }
        if self.send_end {
            let _ = sender.send(StreamMessage::End).await;
        }

        // Like the Kafka consumer: keep committing until every ack sender is gone.
        let mut shutdown_seen = false;
        loop {
            tokio::select! {
                _ = shutdown.recv(), if !shutdown_seen => {
                    shutdown_seen = true;
                }
                ack = ack_receiver.recv() => match ack {
                    Some(ack) => {
                        self.acks.lock().unwrap().push(ack);
                    }
                    None => break,
                },
            }
        }

        drop(sender);
        Ok(())
    }
}

/// One call made against [`MockIndexingClient`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub op: &'static str,
    pub entity_id: String,
    pub at: Instant,
}

/// In-memory index with scripted failures.
#[derive(Default)]
pub struct MockIndexingClient {
    store: Mutex<HashMap<DocumentKey, IndexDocument>>,
    calls: Mutex<Vec<RecordedCall>>,
    scripted: Mutex<VecDeque<IndexError>>,
    failing_entities: Mutex<HashMap<String, IndexError>>,
    unreachable: bool,
}

impl MockIndexingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every index existence check fails with a connection error.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Fail the next `n` write calls with `error`.
    pub fn fail_next(&self, n: usize, error: IndexError) {
        let mut scripted = self.scripted.lock().unwrap();
        for _ in 0..n {
            scripted.push_back(error.clone());
        }
    }

    /// Fail every write for `entity_id` with `error`.
    pub fn fail_entity(&self, entity_id: &str, error: IndexError) {
        self.failing_entities
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), error);
    }

    pub fn store(&self) -> HashMap<DocumentKey, IndexDocument> {
        self.store.lock().unwrap().clone()
    }

    pub fn document(&self, entity_type: &str, entity_id: &str) -> Option<IndexDocument> {
        self.store
            .lock()
            .unwrap()
            .get(&DocumentKey::new(entity_type, entity_id))
            .cloned()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, entity_id: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.entity_id == entity_id)
            .collect()
    }

    fn record(&self, op: &'static str, key: &DocumentKey) -> Result<(), IndexError> {
        self.calls.lock().unwrap().push(RecordedCall {
            op,
            entity_id: key.entity_id.clone(),
            at: Instant::now(),
        });

        if let Some(error) = self.failing_entities.lock().unwrap().get(&key.entity_id) {
            return Err(error.clone());
        }
        match self.scripted.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IndexingClient for MockIndexingClient {
    async fn ensure_index_exists(&self, _entity_type: &str) -> Result<(), IndexError> {
        if self.unreachable {
            return Err(IndexError::connection("connection refused"));
        }
        Ok(())
    }

    async fn upsert(&self, key: &DocumentKey, document: &IndexDocument) -> Result<(), IndexError> {
        self.record("upsert", key)?;
        self.store
            .lock()
            .unwrap()
            .insert(key.clone(), document.clone());
        Ok(())
    }

    async fn delete(&self, key: &DocumentKey) -> Result<(), IndexError> {
        self.record("delete", key)?;
        self.store.lock().unwrap().remove(key);
        Ok(())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<IndexDocument>, IndexError> {
        Ok(self.store.lock().unwrap().get(key).cloned())
    }
}

/// Dead-letter sink that keeps published records in memory.
#[derive(Default)]
pub struct MockDeadLetterSink {
    records: Mutex<Vec<DeadLetterRecord>>,
    failures_left: AtomicU32,
    publish_calls: AtomicU32,
}

impl MockDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` publish calls.
    pub fn failing_first(n: u32) -> Self {
        let sink = Self::default();
        sink.failures_left.store(n, Ordering::SeqCst);
        sink
    }

    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn publish_calls(&self) -> u32 {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeadLetterSink for MockDeadLetterSink {
    async fn publish(&self, record: &DeadLetterRecord) -> Result<(), DeadLetterError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeadLetterError::publish("broker unavailable"));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Everything a test needs to drive and inspect one orchestrator run.
pub struct Harness {
    pub consumer: Arc<MockConsumer>,
    pub client: Arc<MockIndexingClient>,
    pub sink: Arc<MockDeadLetterSink>,
    pub tracker: Arc<OutcomeTracker>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new(consumer: MockConsumer) -> Self {
        Self::with_parts(
            consumer,
            Arc::new(MockIndexingClient::new()),
            Arc::new(MockDeadLetterSink::new()),
            Arc::new(OutcomeTracker::default()),
        )
    }

    pub fn with_parts(
        consumer: MockConsumer,
        client: Arc<MockIndexingClient>,
        sink: Arc<MockDeadLetterSink>,
        tracker: Arc<OutcomeTracker>,
    ) -> Self {
        let consumer = Arc::new(consumer);
        let config = OrchestratorConfig {
            retry_policy: RetryPolicy {
                jitter: false,
                ..RetryPolicy::default()
            },
            ..OrchestratorConfig::default()
        };

        let orchestrator = Orchestrator::with_config(
            consumer.clone(),
            EventTransformer::new(),
            IndexLoader::new(client.clone()),
            sink.clone(),
            tracker.clone(),
            config,
        );

        Self {
            consumer,
            client,
            sink,
            tracker,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

pub fn envelope(
    event_type: &str,
    entity_id: &str,
    entity_type: &str,
    payload: Value,
    seconds: i64,
) -> EventEnvelope {
    EventEnvelope::new(event_type, entity_id, entity_type, payload, at(seconds))
}

pub fn message(partition: i32, offset: i64, envelope: EventEnvelope) -> StreamMessage {
    StreamMessage::Envelope {
        envelope,
        position: PartitionOffset::new(TOPIC, partition, offset),
    }
}

pub fn unavailable() -> IndexError {
    IndexError::from_status(503, "service unavailable")
}
