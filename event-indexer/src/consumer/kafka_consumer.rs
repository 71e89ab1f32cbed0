//! Kafka consumer implementation for the event indexer.
//!
//! Consumes event envelopes from Kafka topics and forwards them to the
//! orchestrator. Offsets are committed only when the orchestrator acknowledges
//! that the envelope at that position reached a terminal state.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use event_indexer_kafka::{create_stream_consumer, KafkaClientConfig};
use event_indexer_shared::EventEnvelope;
use rdkafka::{
    consumer::{CommitMode, Consumer as KafkaConsumerApi, StreamConsumer},
    message::Message as KafkaMessage,
    Offset, TopicPartitionList,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::flow::{FlowChange, InFlight, DEFAULT_MAX_IN_FLIGHT};
use crate::consumer::messages::{Acknowledgment, PartitionOffset, StreamMessage};
use crate::errors::IngestError;
use crate::orchestrator::Consumer;

/// Kafka consumer for event envelopes.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topics: Vec<String>,
    reconnect_interval: Duration,
    max_in_flight: usize,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer.
    ///
    /// # Arguments
    ///
    /// * `config` - Broker address and credentials
    /// * `group_id` - Consumer group ID
    /// * `topics` - Topics to subscribe to
    /// * `reconnect_interval` - Pause after a broker error before polling again
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaConsumer)` - A new consumer instance
    /// * `Err(IngestError)` - If consumer creation fails
    pub fn new(
        config: &KafkaClientConfig,
        group_id: &str,
        topics: Vec<String>,
        reconnect_interval: Duration,
    ) -> Result<Self, IngestError> {
        let consumer =
            create_stream_consumer(config, group_id).map_err(|e| IngestError::kafka(e.to_string()))?;

        info!(
            brokers = %config.broker,
            group_id = %group_id,
            topics = ?topics,
            "Created Kafka consumer"
        );

        Ok(Self {
            consumer,
            topics,
            reconnect_interval,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        })
    }

    /// Set how many unacknowledged messages a partition may have before it is paused.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Record an acknowledgment and commit the position after it.
    fn commit_ack(
        &self,
        ack: &Acknowledgment,
        acked: &mut HashMap<(String, i32), i64>,
    ) -> Result<(), IngestError> {
        let position = &ack.position;
        let latest = acked.entry(position.partition_key()).or_insert(position.offset);
        if position.offset > *latest {
            *latest = position.offset;
        }

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &position.topic,
            position.partition,
            Offset::Offset(position.offset + 1),
        )?;
        self.consumer.commit(&tpl, CommitMode::Async)?;

        debug!(
            topic = %position.topic,
            partition = position.partition,
            offset = position.offset,
            "Committed offset after acknowledgment"
        );
        Ok(())
    }

    fn handle_ack(
        &self,
        ack: &Acknowledgment,
        acked: &mut HashMap<(String, i32), i64>,
        in_flight: &mut InFlight,
    ) {
        if let Err(e) = self.commit_ack(ack, acked) {
            error!(error = %e, "Failed to commit offset after acknowledgment");
        }
        if in_flight.acknowledged(&ack.position.partition_key()) == FlowChange::Resume {
            self.set_paused(&ack.position, false);
        }
    }

    /// Pause or resume fetching from the partition of `position`.
    fn set_paused(&self, position: &PartitionOffset, paused: bool) {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(&position.topic, position.partition);

        let result = if paused {
            self.consumer.pause(&tpl)
        } else {
            self.consumer.resume(&tpl)
        };

        match result {
            Ok(()) => info!(
                topic = %position.topic,
                partition = position.partition,
                paused,
                "Changed partition fetch state"
            ),
            Err(e) => error!(
                topic = %position.topic,
                partition = position.partition,
                paused,
                error = %e,
                "Failed to change partition fetch state"
            ),
        }
    }

    /// Synchronously commit the last acknowledged position of every partition.
    fn commit_final(&self, acked: &HashMap<(String, i32), i64>) -> Result<(), IngestError> {
        if acked.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in acked {
            tpl.add_partition_offset(topic, *partition, Offset::Offset(offset + 1))?;
        }
        self.consumer.commit(&tpl, CommitMode::Sync)?;

        info!(partitions = acked.len(), "Committed final offsets");
        Ok(())
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    /// Subscribe to configured topics.
    fn subscribe(&self) -> Result<(), IngestError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topics)
            .map_err(|e| IngestError::kafka(e.to_string()))?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    /// Pull messages until shutdown or end of stream, committing acknowledged offsets.
    ///
    /// After it stops pulling, the consumer keeps committing acknowledgments until
    /// every acknowledgment sender is gone, then commits the final positions.
    #[instrument(skip(self, sender, ack_receiver, shutdown))]
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::UnboundedReceiver<Acknowledgment>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IngestError> {
        use futures::StreamExt;

        let mut message_stream = self.consumer.stream();
        let mut acked: HashMap<(String, i32), i64> = HashMap::new();
        let mut in_flight = InFlight::new(self.max_in_flight);
        let mut consuming = true;

        loop {
            tokio::select! {
                _ = shutdown.recv(), if consuming => {
                    info!("Consumer received shutdown signal");
                    consuming = false;
                }
                ack = ack_receiver.recv() => {
                    match ack {
                        Some(ack) => self.handle_ack(&ack, &mut acked, &mut in_flight),
                        None => {
                            info!("Acknowledgment channel closed");
                            break;
                        }
                    }
                }
                message = message_stream.next(), if consuming => {
                    match message {
                        Some(Ok(msg)) => {
                            let position = PartitionOffset::new(msg.topic(), msg.partition(), msg.offset());
                            debug!(
                                topic = %position.topic,
                                partition = position.partition,
                                offset = position.offset,
                                "Received message from Kafka"
                            );
                            let decoded = decode_message(
                                position.clone(),
                                msg.key(),
                                msg.payload(),
                                msg.timestamp().to_millis(),
                            );
                            if sender.send(decoded).await.is_err() {
                                warn!("Event channel closed, stopping consumption");
                                consuming = false;
                            } else if in_flight.forwarded(position.partition_key()) == FlowChange::Pause {
                                warn!(
                                    topic = %position.topic,
                                    partition = position.partition,
                                    in_flight = in_flight.in_flight(&position.partition_key()),
                                    "Partition worker is behind, pausing partition"
                                );
                                self.set_paused(&position, true);
                            }
                        }
                        Some(Err(e)) => {
                            error!(
                                error = %e,
                                retry_in_ms = self.reconnect_interval.as_millis() as u64,
                                "Kafka error"
                            );
                            let _ = sender.send(StreamMessage::Error(e.to_string())).await;

                            let pause = pause_after_error(
                                self.reconnect_interval,
                                &mut shutdown,
                                &mut ack_receiver,
                                |ack| self.handle_ack(&ack, &mut acked, &mut in_flight),
                            )
                            .await;
                            match pause {
                                ErrorPause::Elapsed => {}
                                ErrorPause::Shutdown => {
                                    info!("Consumer received shutdown signal");
                                    consuming = false;
                                }
                                ErrorPause::AcksClosed => {
                                    info!("Acknowledgment channel closed");
                                    break;
                                }
                            }
                        }
                        None => {
                            info!("Kafka stream ended");
                            let _ = sender.send(StreamMessage::End).await;
                            consuming = false;
                        }
                    }
                }
            }
        }

        self.commit_final(&acked)
    }
}

/// How a pause after a broker error ended.
#[derive(Debug, PartialEq, Eq)]
enum ErrorPause {
    Elapsed,
    Shutdown,
    AcksClosed,
}

/// Wait `interval` before polling again, still passing acknowledgments to
/// `on_ack`. Shutdown ends the wait early.
async fn pause_after_error<F>(
    interval: Duration,
    shutdown: &mut broadcast::Receiver<()>,
    ack_receiver: &mut mpsc::UnboundedReceiver<Acknowledgment>,
    mut on_ack: F,
) -> ErrorPause
where
    F: FnMut(Acknowledgment),
{
    let deadline = tokio::time::sleep(interval);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => return ErrorPause::Shutdown,
            ack = ack_receiver.recv() => match ack {
                Some(ack) => on_ack(ack),
                None => return ErrorPause::AcksClosed,
            },
            _ = &mut deadline => return ErrorPause::Elapsed,
        }
    }
}

/// Turn raw broker message parts into a stream message.
///
/// Undecodable bodies are wrapped in a placeholder envelope so they can be
/// dead-lettered in partition order instead of being dropped.
pub fn decode_message(
    position: PartitionOffset,
    key: Option<&[u8]>,
    payload: Option<&[u8]>,
    timestamp_ms: Option<i64>,
) -> StreamMessage {
    let Some(payload) = payload else {
        debug!(
            topic = %position.topic,
            partition = position.partition,
            offset = position.offset,
            "Received message with empty payload"
        );
        return StreamMessage::Tombstone { position };
    };

    match EventEnvelope::from_json(payload) {
        Ok(envelope) => StreamMessage::Envelope { envelope, position },
        Err(e) => {
            warn!(
                topic = %position.topic,
                partition = position.partition,
                offset = position.offset,
                error = %e,
                "Failed to decode event envelope"
            );
            let received_at: DateTime<Utc> = timestamp_ms
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Utc::now);
            StreamMessage::Malformed {
                envelope: EventEnvelope::undecodable(key, payload, received_at),
                reason: format!("undecodable message: {}", e),
                position,
            }
        }
    }
}
