//! Shared Kafka utilities for the event indexer.
//!
//! This crate provides the librdkafka client configuration used by both the
//! inbound event consumer and the dead-letter producer, so broker address and
//! credentials are configured in one place.
//!
//! ## Usage
//!
//! ```ignore
//! use event_indexer_kafka::{create_stream_consumer, create_dead_letter_producer, KafkaClientConfig};
//!
//! let config = KafkaClientConfig::new("localhost:9092", "event-indexer");
//! let consumer = create_stream_consumer(&config, "event-indexer")?;
//! let producer = create_dead_letter_producer(&config)?;
//! ```

use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::StreamConsumer;
use rdkafka::producer::FutureProducer;

/// Connection settings shared by every Kafka client of the indexer.
#[derive(Debug, Clone)]
pub struct KafkaClientConfig {
    /// Kafka broker address (e.g., "localhost:9092")
    pub broker: String,
    /// Client ID reported to the broker
    pub client_id: String,
    /// SASL username (enables SASL/SSL if set)
    pub username: Option<String>,
    /// SASL password (required if username is set)
    pub password: Option<String>,
    /// Custom CA certificate in PEM format
    pub ssl_ca_pem: Option<String>,
}

impl KafkaClientConfig {
    /// Create a plaintext config with the given broker and client_id.
    pub fn new(broker: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            client_id: client_id.into(),
            username: None,
            password: None,
            ssl_ca_pem: None,
        }
    }

    /// Set SASL credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Set custom CA certificate.
    pub fn with_ssl_ca(mut self, ca_pem: String) -> Self {
        self.ssl_ca_pem = Some(ca_pem);
        self
    }

    /// Base librdkafka settings: broker, client id and security.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &self.broker)
            .set("client.id", &self.client_id);

        // SASL/SSL for managed Kafka, plaintext for local development
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);

            if let Some(ca_pem) = &self.ssl_ca_pem {
                client_config.set("ssl.ca.pem", ca_pem);
            }
        }

        client_config
    }

    /// Consumer settings for a consumer group with manual offset commits.
    ///
    /// Auto-commit is disabled: offsets are committed only after the envelope at
    /// that position has been fully handled.
    pub fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut client_config = self.client_config();

        client_config
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000");

        client_config
    }

    /// Producer settings for durable, idempotent writes.
    pub fn producer_config(&self) -> ClientConfig {
        let mut client_config = self.client_config();

        client_config
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "5")
            .set("compression.type", "zstd")
            .set("linger.ms", "10")
            .set("message.timeout.ms", "30000");

        client_config
    }
}

/// Create a stream consumer joined to `group_id`.
pub fn create_stream_consumer(config: &KafkaClientConfig, group_id: &str) -> Result<StreamConsumer> {
    config
        .consumer_config(group_id)
        .create()
        .context("Failed to create Kafka consumer")
}

/// Create the producer used to publish dead-letter records.
pub fn create_dead_letter_producer(config: &KafkaClientConfig) -> Result<FutureProducer> {
    config
        .producer_config()
        .create()
        .context("Failed to create Kafka dead-letter producer")
}

// Re-export commonly used rdkafka types for convenience
pub use rdkafka::message::{Header, OwnedHeaders};
pub use rdkafka::producer::FutureRecord;
