//! Runtime settings read from the environment.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::consumer::DEFAULT_MAX_IN_FLIGHT;
use crate::dead_letter::dead_letter_topic_for;
use crate::orchestrator::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use crate::outcome::DEFAULT_OUTCOME_CAPACITY;

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "event-indexer";

/// Default source topic.
const DEFAULT_KAFKA_TOPIC: &str = "domain.events";

/// Default pause after a broker error, in milliseconds.
const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5000;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default index name prefix.
const DEFAULT_INDEX_PREFIX: &str = "events";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Default per-call index timeout, in milliseconds.
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection until successful.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(raw: Option<String>) -> Self {
        match raw.unwrap_or_else(|| "retry".to_string()).to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            other => {
                warn!(value = %other, "Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Every setting the indexer reads at startup.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub kafka_broker: String,
    pub kafka_group_id: String,
    pub kafka_topics: Vec<String>,
    pub dead_letter_topic: String,
    pub kafka_username: Option<String>,
    pub kafka_password: Option<String>,
    pub kafka_ssl_ca_pem: Option<String>,
    pub reconnect_interval: Duration,
    pub partition_max_in_flight: usize,

    pub opensearch_url: String,
    pub index_prefix: String,
    pub index_version: u32,
    pub connection_mode: ConnectionMode,
    pub connection_retry_interval: Duration,
    pub request_timeout: Duration,

    pub retry_policy: RetryPolicy,
    pub processed_capacity: usize,
    pub error_capacity: usize,

    pub api_enabled: bool,
    pub api_addr: SocketAddr,
}

impl IndexerSettings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: event-indexer)
    /// - `KAFKA_TOPICS`: Comma separated source topics (default: domain.events)
    /// - `KAFKA_DLQ_TOPIC`: Dead-letter topic (default: first topic + ".dlq")
    /// - `KAFKA_USERNAME` / `KAFKA_PASSWORD` / `KAFKA_SSL_CA_PEM`: optional SASL/SSL
    /// - `BROKER_RECONNECT_INTERVAL_MS`: Pause after a broker error (default: 5000)
    /// - `PARTITION_MAX_IN_FLIGHT`: Unacknowledged messages before a partition is paused (default: 500)
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `INDEX_PREFIX` / `INDEX_VERSION`: Index naming (default: events / 0)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Connection retry interval (default: 15)
    /// - `INDEX_REQUEST_TIMEOUT_MS`: Per-call index timeout (default: 5000)
    /// - `RETRY_MAX_ATTEMPTS` / `RETRY_BASE_DELAY_MS` / `RETRY_MAX_DELAY_MS` / `RETRY_JITTER`
    /// - `OUTCOME_PROCESSED_CAPACITY` / `OUTCOME_ERROR_CAPACITY` (default: 1000 each)
    /// - `API_ENABLED` / `API_ADDR` (default: true / 0.0.0.0:8080)
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns the raw value of a variable.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let kafka_topics: Vec<String> = var("KAFKA_TOPICS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|topics| !topics.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_KAFKA_TOPIC.to_string()]);

        let dead_letter_topic =
            var("KAFKA_DLQ_TOPIC").unwrap_or_else(|| dead_letter_topic_for(&kafka_topics[0]));

        let retry_policy = RetryPolicy {
            max_attempts: parse_or("RETRY_MAX_ATTEMPTS", var("RETRY_MAX_ATTEMPTS"), DEFAULT_MAX_ATTEMPTS)
                .max(1),
            base_delay: Duration::from_millis(parse_or(
                "RETRY_BASE_DELAY_MS",
                var("RETRY_BASE_DELAY_MS"),
                DEFAULT_BASE_DELAY.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(parse_or(
                "RETRY_MAX_DELAY_MS",
                var("RETRY_MAX_DELAY_MS"),
                DEFAULT_MAX_DELAY.as_millis() as u64,
            )),
            jitter: parse_or("RETRY_JITTER", var("RETRY_JITTER"), true),
        };

        let default_api_addr = SocketAddr::from(([0, 0, 0, 0], 8080));

        Self {
            kafka_broker: var("KAFKA_BROKER").unwrap_or_else(|| DEFAULT_KAFKA_BROKER.to_string()),
            kafka_group_id: var("KAFKA_GROUP_ID")
                .unwrap_or_else(|| DEFAULT_KAFKA_GROUP_ID.to_string()),
            kafka_topics,
            dead_letter_topic,
            kafka_username: var("KAFKA_USERNAME"),
            kafka_password: var("KAFKA_PASSWORD"),
            kafka_ssl_ca_pem: var("KAFKA_SSL_CA_PEM"),
            reconnect_interval: Duration::from_millis(parse_or(
                "BROKER_RECONNECT_INTERVAL_MS",
                var("BROKER_RECONNECT_INTERVAL_MS"),
                DEFAULT_RECONNECT_INTERVAL_MS,
            )),
            partition_max_in_flight: parse_or(
                "PARTITION_MAX_IN_FLIGHT",
                var("PARTITION_MAX_IN_FLIGHT"),
                DEFAULT_MAX_IN_FLIGHT,
            )
            .max(1),

            opensearch_url: var("OPENSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            index_prefix: var("INDEX_PREFIX").unwrap_or_else(|| DEFAULT_INDEX_PREFIX.to_string()),
            index_version: parse_or("INDEX_VERSION", var("INDEX_VERSION"), 0),
            connection_mode: ConnectionMode::parse(var("OPENSEARCH_CONNECTION_MODE")),
            connection_retry_interval: Duration::from_secs(parse_or(
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                var("OPENSEARCH_RETRY_INTERVAL_SECS"),
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
            request_timeout: Duration::from_millis(parse_or(
                "INDEX_REQUEST_TIMEOUT_MS",
                var("INDEX_REQUEST_TIMEOUT_MS"),
                DEFAULT_REQUEST_TIMEOUT_MS,
            )),

            retry_policy,
            processed_capacity: parse_or(
                "OUTCOME_PROCESSED_CAPACITY",
                var("OUTCOME_PROCESSED_CAPACITY"),
                DEFAULT_OUTCOME_CAPACITY,
            ),
            error_capacity: parse_or(
                "OUTCOME_ERROR_CAPACITY",
                var("OUTCOME_ERROR_CAPACITY"),
                DEFAULT_OUTCOME_CAPACITY,
            ),

            api_enabled: parse_or("API_ENABLED", var("API_ENABLED"), true),
            api_addr: parse_or("API_ADDR", var("API_ADDR"), default_api_addr),
        }
    }
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

/// Parse `raw`, falling back to `default` (with a warning) if it is not valid.
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match raw {
        None => default,
        Some(value) => match value.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(variable = key, value = %value, default = ?default, "Invalid value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> IndexerSettings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IndexerSettings::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = IndexerSettings::default();
        assert_eq!(s.kafka_broker, "localhost:9092");
        assert_eq!(s.kafka_group_id, "event-indexer");
        assert_eq!(s.kafka_topics, vec!["domain.events".to_string()]);
        assert_eq!(s.dead_letter_topic, "domain.events.dlq");
        assert!(s.kafka_username.is_none());
        assert_eq!(s.reconnect_interval, Duration::from_secs(5));
        assert_eq!(s.partition_max_in_flight, 500);
        assert_eq!(s.opensearch_url, "http://localhost:9200");
        assert_eq!(s.index_prefix, "events");
        assert_eq!(s.index_version, 0);
        assert_eq!(s.connection_mode, ConnectionMode::Retry);
        assert_eq!(s.connection_retry_interval, Duration::from_secs(15));
        assert_eq!(s.request_timeout, Duration::from_secs(5));
        assert_eq!(s.retry_policy, RetryPolicy::default());
        assert_eq!(s.processed_capacity, 1000);
        assert_eq!(s.error_capacity, 1000);
        assert!(s.api_enabled);
        assert_eq!(s.api_addr.to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("KAFKA_TOPICS", "orders, payments ,"),
            ("OPENSEARCH_CONNECTION_MODE", "FAIL-FAST"),
            ("RETRY_MAX_ATTEMPTS", "3"),
            ("RETRY_BASE_DELAY_MS", "50"),
            ("RETRY_JITTER", "false"),
            ("OUTCOME_ERROR_CAPACITY", "10"),
            ("PARTITION_MAX_IN_FLIGHT", "64"),
            ("API_ENABLED", "false"),
            ("API_ADDR", "127.0.0.1:9000"),
        ]);

        assert_eq!(s.kafka_topics, vec!["orders".to_string(), "payments".to_string()]);
        assert_eq!(s.dead_letter_topic, "orders.dlq");
        assert_eq!(s.connection_mode, ConnectionMode::FailFast);
        assert_eq!(s.retry_policy.max_attempts, 3);
        assert_eq!(s.retry_policy.base_delay, Duration::from_millis(50));
        assert!(!s.retry_policy.jitter);
        assert_eq!(s.error_capacity, 10);
        assert_eq!(s.partition_max_in_flight, 64);
        assert!(!s.api_enabled);
        assert_eq!(s.api_addr.port(), 9000);
    }

    #[test]
    fn test_explicit_dead_letter_topic() {
        let s = settings(&[("KAFKA_TOPICS", "orders"), ("KAFKA_DLQ_TOPIC", "failed-orders")]);
        assert_eq!(s.dead_letter_topic, "failed-orders");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let s = settings(&[
            ("RETRY_MAX_ATTEMPTS", "many"),
            ("INDEX_REQUEST_TIMEOUT_MS", "-1"),
            ("API_ADDR", "not an address"),
            ("OPENSEARCH_CONNECTION_MODE", "sometimes"),
            ("KAFKA_TOPICS", " , "),
        ]);

        assert_eq!(s.retry_policy.max_attempts, 5);
        assert_eq!(s.request_timeout, Duration::from_secs(5));
        assert_eq!(s.api_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(s.connection_mode, ConnectionMode::Retry);
        assert_eq!(s.kafka_topics, vec!["domain.events".to_string()]);
    }

    #[test]
    fn test_zero_attempts_is_raised_to_one() {
        let s = settings(&[("RETRY_MAX_ATTEMPTS", "0")]);
        assert_eq!(s.retry_policy.max_attempts, 1);
    }
}
