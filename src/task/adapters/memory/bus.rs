//! In-memory message bus that records topics, subscriptions and messages.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::ports::{Acknowledgement, MessageBus, MessageBusError, MessageBusResult};

/// Partitioning parameters a topic was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicSpec {
    /// Partition count.
    pub partitions: u32,
    /// Replication factor.
    pub replication_factor: u16,
}

/// Consumer subscription recorded by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRegistration {
    /// Executor identity.
    pub executor: String,
    /// Subscribed topic.
    pub topic: String,
    /// Consumer group.
    pub consumer_group: String,
}

/// Message accepted by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// Message key.
    pub key: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// In-memory message bus.
///
/// Messages are only recorded when the configured acknowledgement is
/// [`Acknowledgement::Persisted`].
#[derive(Debug, Clone)]
pub struct InMemoryMessageBus {
    state: Arc<RwLock<BusState>>,
}

#[derive(Debug)]
struct BusState {
    topics: HashMap<String, TopicSpec>,
    producers: HashMap<String, String>,
    consumers: Vec<ConsumerRegistration>,
    messages: Vec<PublishedMessage>,
    acknowledgement: Acknowledgement,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(BusState {
                topics: HashMap::new(),
                producers: HashMap::new(),
                consumers: Vec::new(),
                messages: Vec::new(),
                acknowledgement: Acknowledgement::Persisted,
            })),
        }
    }
}

fn poisoned(err: impl ToString) -> MessageBusError {
    MessageBusError::transport(std::io::Error::other(err.to_string()))
}

impl InMemoryMessageBus {
    /// Creates an empty bus that persists every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the acknowledgement returned by subsequent publishes.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Transport`] when the lock is poisoned.
    pub fn set_acknowledgement(&self, acknowledgement: Acknowledgement) -> MessageBusResult<()> {
        self.state.write().map_err(poisoned)?.acknowledgement = acknowledgement;
        Ok(())
    }

    /// Returns the spec of a created topic.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Transport`] when the lock is poisoned.
    pub fn topic(&self, name: &str) -> MessageBusResult<Option<TopicSpec>> {
        Ok(self.state.read().map_err(poisoned)?.topics.get(name).copied())
    }

    /// Returns the topic a producer identity is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Transport`] when the lock is poisoned.
    pub fn producer_topic(&self, producer: &str) -> MessageBusResult<Option<String>> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .producers
            .get(producer)
            .cloned())
    }

    /// Returns every consumer subscription.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Transport`] when the lock is poisoned.
    pub fn consumers(&self) -> MessageBusResult<Vec<ConsumerRegistration>> {
        Ok(self.state.read().map_err(poisoned)?.consumers.clone())
    }

    /// Returns messages published to `topic`, in publish order.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Transport`] when the lock is poisoned.
    pub fn published(&self, topic: &str) -> MessageBusResult<Vec<PublishedMessage>> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .messages
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn ensure_topic(
        &self,
        topic: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> MessageBusResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.topics.entry(topic.to_owned()).or_insert(TopicSpec {
            partitions,
            replication_factor,
        });
        Ok(())
    }

    async fn register_producer(&self, producer: &str, topic: &str) -> MessageBusResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if !state.topics.contains_key(topic) {
            return Err(MessageBusError::UnknownTopic(topic.to_owned()));
        }
        match state.producers.get(producer) {
            Some(bound) if bound != topic => Err(MessageBusError::ProducerConflict {
                producer: producer.to_owned(),
                topic: bound.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                state
                    .producers
                    .insert(producer.to_owned(), topic.to_owned());
                Ok(())
            }
        }
    }

    async fn register_consumer(
        &self,
        executor: &str,
        topic: &str,
        consumer_group: &str,
    ) -> MessageBusResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if !state.topics.contains_key(topic) {
            return Err(MessageBusError::UnknownTopic(topic.to_owned()));
        }
        let registration = ConsumerRegistration {
            executor: executor.to_owned(),
            topic: topic.to_owned(),
            consumer_group: consumer_group.to_owned(),
        };
        if !state.consumers.contains(&registration) {
            state.consumers.push(registration);
        }
        Ok(())
    }

    async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> MessageBusResult<Acknowledgement> {
        let mut state = self.state.write().map_err(poisoned)?;
        if !state.topics.contains_key(topic) {
            return Err(MessageBusError::UnknownTopic(topic.to_owned()));
        }
        let acknowledgement = state.acknowledgement;
        if acknowledgement == Acknowledgement::Persisted {
            state.messages.push(PublishedMessage {
                topic: topic.to_owned(),
                key: key.to_owned(),
                payload: payload.to_vec(),
            });
        }
        Ok(acknowledgement)
    }
}
