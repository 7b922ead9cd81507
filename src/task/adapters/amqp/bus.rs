//! Message bus backed by an AMQP broker.
//!
//! Topics map to durable direct exchanges and consumer groups to durable
//! quorum queues bound to the exchange, so every executor sharing a group
//! competes for the same messages. AMQP has no partition concept; the
//! partition count is accepted and logged only.

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

use crate::task::ports::{Acknowledgement, MessageBus, MessageBusError, MessageBusResult};

const MAX_RETRIES: usize = 5;
const RETRY_DELAY_MS: u64 = 100;
const PERSISTENT_DELIVERY: u8 = 2;

fn retry_strategy() -> impl Iterator<Item = std::time::Duration> {
    ExponentialBackoff::from_millis(RETRY_DELAY_MS).take(MAX_RETRIES)
}

/// Maps a publisher confirm to an acknowledgement.
///
/// A mandatory publish that no queue accepted is acked with the returned
/// message attached; the broker never stored it.
fn acknowledgement(confirmation: &Confirmation) -> Acknowledgement {
    match confirmation {
        Confirmation::Ack(None) => Acknowledgement::Persisted,
        Confirmation::Ack(Some(_)) | Confirmation::Nack(_) | Confirmation::NotRequested => {
            Acknowledgement::NotPersisted
        }
    }
}

/// AMQP message bus with publisher confirms enabled.
#[derive(Debug, Clone)]
pub struct AmqpMessageBus {
    channel: Channel,
    state: Arc<RwLock<AmqpState>>,
}

#[derive(Debug, Default)]
struct AmqpState {
    replication: HashMap<String, u16>,
    producers: HashMap<String, String>,
}

fn poisoned(err: impl ToString) -> MessageBusError {
    MessageBusError::transport(std::io::Error::other(err.to_string()))
}

impl AmqpMessageBus {
    /// Connects to the broker, retrying with exponential backoff, and opens a
    /// confirm-mode channel.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::Transport`] when the broker is unreachable
    /// or the channel cannot be opened.
    pub async fn connect(url: &str) -> MessageBusResult<Self> {
        let connection = Retry::spawn(retry_strategy(), || {
            Connection::connect(url, ConnectionProperties::default())
        })
        .await
        .map_err(MessageBusError::transport)?;
        let channel = connection
            .create_channel()
            .await
            .map_err(MessageBusError::transport)?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(MessageBusError::transport)?;
        info!("AMQP channel created with publisher confirms");
        Ok(Self::from_channel(channel))
    }

    /// Wraps an existing channel. The channel must already be in confirm
    /// mode for acknowledgements to be meaningful.
    #[must_use]
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            channel,
            state: Arc::new(RwLock::new(AmqpState::default())),
        }
    }

    fn known_topic(&self, topic: &str) -> MessageBusResult<u16> {
        self.state
            .read()
            .map_err(poisoned)?
            .replication
            .get(topic)
            .copied()
            .ok_or_else(|| MessageBusError::UnknownTopic(topic.to_owned()))
    }
}

#[async_trait]
impl MessageBus for AmqpMessageBus {
    async fn ensure_topic(
        &self,
        topic: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> MessageBusResult<()> {
        self.channel
            .exchange_declare(
                topic,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(MessageBusError::transport)?;
        debug!(topic, partitions, "AMQP exchange declared; partition count is advisory");
        self.state
            .write()
            .map_err(poisoned)?
            .replication
            .insert(topic.to_owned(), replication_factor);
        Ok(())
    }

    async fn register_producer(&self, producer: &str, topic: &str) -> MessageBusResult<()> {
        self.known_topic(topic)?;
        let mut state = self.state.write().map_err(poisoned)?;
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
                info!(producer, topic, "producer registered");
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
        let replication_factor = self.known_topic(topic)?;
        let mut arguments = FieldTable::default();
        arguments.insert(
            ShortString::from("x-queue-type"),
            AMQPValue::LongString(LongString::from("quorum")),
        );
        arguments.insert(
            ShortString::from("x-quorum-initial-group-size"),
            AMQPValue::LongInt(i32::from(replication_factor)),
        );
        self.channel
            .queue_declare(
                consumer_group,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                arguments,
            )
            .await
            .map_err(MessageBusError::transport)?;
        self.channel
            .queue_bind(
                consumer_group,
                topic,
                topic,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(MessageBusError::transport)?;
        info!(executor, topic, consumer_group, "consumer group bound");
        Ok(())
    }

    async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> MessageBusResult<Acknowledgement> {
        self.known_topic(topic)?;
        let properties = BasicProperties::default()
            .with_message_id(ShortString::from(key.to_owned()))
            .with_content_type(ShortString::from("application/json"))
            .with_delivery_mode(PERSISTENT_DELIVERY);

        let confirm = Retry::spawn(retry_strategy(), || {
            self.channel.basic_publish(
                topic,
                topic,
                BasicPublishOptions {
                    mandatory: true,
                    ..BasicPublishOptions::default()
                },
                payload,
                properties.clone(),
            )
        })
        .await
        .map_err(MessageBusError::transport)?;

        let confirmation = confirm.await.map_err(MessageBusError::transport)?;
        if let Confirmation::Ack(Some(returned)) = &confirmation {
            warn!(
                topic,
                key,
                reply_code = returned.reply_code,
                reply_text = returned.reply_text.as_str(),
                "message returned by the broker, no queue is bound"
            );
        }
        Ok(acknowledgement(&confirmation))
    }
}
