//! Message bus port used to dispatch task events to executors.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for message bus operations.
pub type MessageBusResult<T> = Result<T, MessageBusError>;

/// Broker acknowledgement for a produced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// The broker durably accepted the message.
    Persisted,
    /// The broker received the message but did not persist it.
    NotPersisted,
}

/// Message bus contract.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Creates the topic if it does not exist yet. Idempotent.
    async fn ensure_topic(
        &self,
        topic: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> MessageBusResult<()>;

    /// Registers a producer identity for `topic`.
    async fn register_producer(&self, producer: &str, topic: &str) -> MessageBusResult<()>;

    /// Subscribes an executor to `topic` within a consumer group.
    async fn register_consumer(
        &self,
        executor: &str,
        topic: &str,
        consumer_group: &str,
    ) -> MessageBusResult<()>;

    /// Publishes one keyed message and reports the broker acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::UnknownTopic`] when the topic was never
    /// ensured, or [`MessageBusError::Transport`] on delivery failure.
    async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> MessageBusResult<Acknowledgement>;
}

/// Errors returned by message bus implementations.
#[derive(Debug, Clone, Error)]
pub enum MessageBusError {
    /// The topic has not been created.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// The producer identity is bound to a different topic.
    #[error("producer '{producer}' is already registered for topic '{topic}'")]
    ProducerConflict {
        /// Producer identity.
        producer: String,
        /// Topic the producer is already bound to.
        topic: String,
    },

    /// Broker or transport failure.
    #[error("message bus transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl MessageBusError {
    /// Wraps a transport error.
    #[must_use]
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
