//! Topic, producer and consumer-group name derivation.

use crate::config::BusConfig;
use crate::task::domain::{TaskTypeName, TaskTypeRegistration};

const SEPARATOR: char = '-';

/// Bus names derived for one task type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRoute {
    /// Task type the route belongs to.
    pub task_type: TaskTypeName,
    /// Topic events are published to.
    pub topic: String,
    /// Producer identity bound to the topic.
    pub producer: String,
    /// Consumer group executors join.
    pub consumer_group: String,
}

/// Pure naming rules shared by every dispatcher instance.
///
/// ```
/// use tasklane::task::services::TopicNaming;
///
/// let naming = TopicNaming::new(Some("billing.eu".into()), None);
/// assert_eq!(naming.topic("Invoice Run"), "billing-eu-Invoice-Run");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicNaming {
    topic_prefix: Option<String>,
    consumer_group_prefix: Option<String>,
}

impl TopicNaming {
    /// Creates naming rules with optional application-scoped prefixes.
    #[must_use]
    pub fn new(topic_prefix: Option<String>, consumer_group_prefix: Option<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.filter(|prefix| !prefix.trim().is_empty()),
            consumer_group_prefix: consumer_group_prefix.filter(|prefix| !prefix.trim().is_empty()),
        }
    }

    /// Returns the topic name for a suffix.
    #[must_use]
    pub fn topic(&self, suffix: &str) -> String {
        scoped(self.topic_prefix.as_deref(), suffix)
    }

    /// Returns the producer identity for a topic.
    #[must_use]
    pub fn producer(&self, topic: &str) -> String {
        format!("{topic}{SEPARATOR}producer")
    }

    /// Returns the consumer-group name for a task type.
    #[must_use]
    pub fn consumer_group(&self, task_type: &TaskTypeName) -> String {
        scoped(self.consumer_group_prefix.as_deref(), task_type.as_str())
    }

    /// Derives every bus name for a registration.
    #[must_use]
    pub fn route(&self, registration: &TaskTypeRegistration) -> TaskRoute {
        let topic = self.topic(registration.topic_suffix());
        TaskRoute {
            task_type: registration.name().clone(),
            producer: self.producer(&topic),
            consumer_group: self.consumer_group(registration.name()),
            topic,
        }
    }
}

impl From<&BusConfig> for TopicNaming {
    fn from(config: &BusConfig) -> Self {
        Self::new(
            config.topic_prefix.clone(),
            config.consumer_group_prefix.clone(),
        )
    }
}

fn scoped(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => normalize(&format!("{prefix}.{name}")),
        None => normalize(name),
    }
}

/// Collapses every run of non-alphanumeric characters into one separator
/// and trims separators from both ends.
fn normalize(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for character in raw.chars() {
        if character.is_ascii_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push(SEPARATOR);
            }
            pending_separator = false;
            normalized.push(character);
        } else {
            pending_separator = true;
        }
    }
    normalized
}
