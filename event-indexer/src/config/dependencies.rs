//! Dependency initialization and wiring for the event indexer.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{error, info, warn};

use event_indexer_kafka::KafkaClientConfig;
use event_indexer_repository::{IndexConfig, IndexingClientConfig, OpenSearchIndexingClient};

use crate::api;
use crate::config::settings::{ConnectionMode, IndexerSettings};
use crate::consumer::KafkaConsumer;
use crate::dead_letter::KafkaDeadLetterSink;
use crate::loader::IndexLoader;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::outcome::OutcomeTracker;
use crate::processor::EventTransformer;
use crate::IndexingError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
    /// Outcome tracker shared by the orchestrator and the read API.
    pub tracker: Arc<OutcomeTracker>,
    settings: IndexerSettings,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`IndexerSettings::from_env`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (only in fail-fast mode for OpenSearch)
    pub async fn new() -> Result<Self, IndexingError> {
        Self::with_settings(IndexerSettings::from_env()).await
    }

    /// Initialize all dependencies from the given settings.
    pub async fn with_settings(settings: IndexerSettings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            kafka_broker = %settings.kafka_broker,
            kafka_group_id = %settings.kafka_group_id,
            topics = ?settings.kafka_topics,
            dead_letter_topic = %settings.dead_letter_topic,
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.connection_retry_interval.as_secs(),
            "Initializing dependencies"
        );

        let index_config = IndexConfig::new(settings.index_prefix.clone(), settings.index_version);
        let client_config = IndexingClientConfig::new(settings.opensearch_url.clone())
            .with_index_config(index_config)
            .with_request_timeout(settings.request_timeout);

        // Exits if the indices cannot be created in fail-fast mode
        let loader = Self::connect_to_opensearch(
            client_config,
            settings.request_timeout,
            settings.connection_mode,
            settings.connection_retry_interval,
        )
        .await?;

        info!("OpenSearch connection established");

        let kafka_config = Self::kafka_config(&settings);

        let consumer = KafkaConsumer::new(
            &kafka_config,
            &settings.kafka_group_id,
            settings.kafka_topics.clone(),
            settings.reconnect_interval,
        )
        .map_err(|e| IndexingError::config(format!("Failed to create Kafka consumer: {}", e)))?
        .with_max_in_flight(settings.partition_max_in_flight);

        info!("Kafka consumer created");

        let dead_letter = KafkaDeadLetterSink::new(&kafka_config, settings.dead_letter_topic.clone())
            .map_err(|e| {
                IndexingError::config(format!("Failed to create dead-letter producer: {}", e))
            })?;

        let tracker = Arc::new(OutcomeTracker::new(
            settings.processed_capacity,
            settings.error_capacity,
        ));

        let config = OrchestratorConfig {
            retry_policy: settings.retry_policy.clone(),
            ..OrchestratorConfig::default()
        };

        let orchestrator = Orchestrator::with_config(
            Arc::new(consumer),
            EventTransformer::new(),
            loader,
            Arc::new(dead_letter),
            Arc::clone(&tracker),
            config,
        );

        Ok(Self {
            orchestrator,
            tracker,
            settings,
        })
    }

    /// Run the orchestrator, serving the read API alongside it if enabled.
    ///
    /// The API server is stopped once the orchestrator returns.
    pub async fn run(self) -> Result<(), IndexingError> {
        let (stop_api, api_stopped) = oneshot::channel::<()>();

        let api_handle = if self.settings.api_enabled {
            let app = api::create_app(Arc::clone(&self.tracker));
            let addr = self.settings.api_addr;
            Some(tokio::spawn(async move {
                let shutdown = async {
                    let _ = api_stopped.await;
                };
                if let Err(e) = api::run_server(app, addr, shutdown).await {
                    error!(addr = %addr, error = %e, "Read API server failed");
                }
            }))
        } else {
            info!("Read API disabled");
            None
        };

        let result = self.orchestrator.run().await;

        let _ = stop_api.send(());
        if let Some(handle) = api_handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Read API task failed");
            }
        }

        result.map_err(IndexingError::from)
    }

    fn kafka_config(settings: &IndexerSettings) -> KafkaClientConfig {
        let mut config = KafkaClientConfig::new(settings.kafka_broker.clone(), "event-indexer");
        if let (Some(username), Some(password)) =
            (settings.kafka_username.clone(), settings.kafka_password.clone())
        {
            config = config.with_credentials(username, password);
        }
        if let Some(ca_pem) = settings.kafka_ssl_ca_pem.clone() {
            config = config.with_ssl_ca(ca_pem);
        }
        config
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        config: IndexingClientConfig,
        request_timeout: Duration,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<IndexLoader, IndexingError> {
        loop {
            match Self::try_connect_opensearch(config.clone(), request_timeout).await {
                Ok(loader) => return Ok(loader),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %config.url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Create the client and make sure every entity index exists.
    async fn try_connect_opensearch(
        config: IndexingClientConfig,
        request_timeout: Duration,
    ) -> Result<IndexLoader, IndexingError> {
        let client = OpenSearchIndexingClient::new(config).map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch client: {}", e))
        })?;

        let loader = IndexLoader::with_timeout(Arc::new(client), request_timeout);
        loader.ensure_indices().await?;

        Ok(loader)
    }
}
