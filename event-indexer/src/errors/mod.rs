//! Error types for the event indexer pipeline.

use event_indexer_repository::IndexError;
use thiserror::Error;

/// Errors that can occur in the pipeline plumbing.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Error from the loader component.
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl IngestError {
    /// Create a loader error.
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::LoaderError(msg.into())
    }

    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

/// An envelope payload the transformer cannot interpret.
///
/// Transformation is deterministic, so none of these are ever retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The payload is not a JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The envelope has no entity id to address the document with.
    #[error("missing entity id")]
    MissingEntityId,

    /// A known payload field has the wrong shape.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}

impl TransformError {
    /// Create a malformed payload error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to publish a dead-letter record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeadLetterError {
    /// The record could not be encoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The broker did not accept the record.
    #[error("Publish error: {0}")]
    PublishError(String),
}

impl DeadLetterError {
    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a publish error.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::PublishError(msg.into())
    }
}

/// Classified failure of one processing attempt.
///
/// This is what a partition worker matches on to decide between retrying and
/// dead-lettering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("transient index error: {0}")]
    TransientIndex(IndexError),

    #[error("permanent index error: {0}")]
    PermanentIndex(IndexError),
}

impl ProcessingError {
    /// Returns true if the attempt may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIndex(_))
    }
}

impl From<IndexError> for ProcessingError {
    fn from(err: IndexError) -> Self {
        if err.is_transient() {
            Self::TransientIndex(err)
        } else {
            Self::PermanentIndex(err)
        }
    }
}
