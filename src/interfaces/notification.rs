//! # Notification Service
//!
//! Topic-based notifications: a topic collects email and SMS subscriptions,
//! each of which must be confirmed by its owner before it receives messages.
//!
//! Topic creation and subscription are idempotent on their natural keys (topic
//! name, protocol plus endpoint), so an activity redelivered after a crash
//! finds the resources it already created instead of duplicating them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Email,
    Sms,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Email, Protocol::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }

    /// Loose syntactic check of an endpoint for this protocol
    pub fn is_valid_endpoint(&self, endpoint: &str) -> bool {
        match self {
            Self::Email => match endpoint.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && domain.contains('.')
                        && !domain.starts_with('.')
                        && !domain.ends_with('.')
                        && !endpoint.chars().any(char::is_whitespace)
                }
                None => false,
            },
            Self::Sms => {
                let digits = endpoint.strip_prefix('+').unwrap_or(endpoint);
                let digits: String = digits.chars().filter(|c| *c != '-' && *c != ' ').collect();
                (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
            }
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            other => Err(NotificationError::UnsupportedProtocol {
                protocol: other.to_string(),
            }),
        }
    }
}

/// Result of a subscribe call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionRef {
    Confirmed(String),
    PendingConfirmation,
}

impl SubscriptionRef {
    /// Subscription id, or `"pending"` while unconfirmed
    pub fn as_output(&self) -> String {
        match self {
            Self::Confirmed(id) => id.clone(),
            Self::PendingConfirmation => "pending".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Confirmed,
    PendingConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: String,
    pub protocol: Protocol,
    pub endpoint: String,
    pub status: SubscriptionStatus,
}

impl Subscription {
    pub fn is_confirmed(&self) -> bool {
        self.status == SubscriptionStatus::Confirmed
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("Topic not found: {topic_ref}")]
    TopicNotFound { topic_ref: String },

    #[error("Invalid {protocol} endpoint: {endpoint}")]
    InvalidEndpoint { protocol: Protocol, endpoint: String },

    #[error("Unsupported protocol: {protocol}")]
    UnsupportedProtocol { protocol: String },

    #[error("Notification backend error: {message}")]
    Backend { message: String },
}

pub type NotificationResult<T> = Result<T, NotificationError>;

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Create a topic, or return the existing one with the same name
    async fn create_topic(&self, name: &str) -> NotificationResult<String>;

    async fn set_display_name(&self, topic_ref: &str, display_name: &str)
        -> NotificationResult<()>;

    /// Subscribe an endpoint; repeating the call returns the same subscription
    async fn subscribe(
        &self,
        topic_ref: &str,
        protocol: Protocol,
        endpoint: &str,
    ) -> NotificationResult<SubscriptionRef>;

    async fn list_subscriptions(&self, topic_ref: &str) -> NotificationResult<Vec<Subscription>>;

    /// Deliver a message to the confirmed subscriptions; returns its message id
    async fn publish(
        &self,
        topic_ref: &str,
        subject: &str,
        message: &str,
    ) -> NotificationResult<String>;

    async fn delete_topic(&self, topic_ref: &str) -> NotificationResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub message_id: String,
    pub topic_ref: String,
    pub subject: String,
    pub message: String,
    pub recipients: Vec<Subscription>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct SubscriptionRecord {
    subscription: Subscription,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TopicRecord {
    name: String,
    display_name: Option<String>,
    subscriptions: Vec<SubscriptionRecord>,
}

/// Process-local notification backend for demos and tests
#[derive(Debug, Default)]
pub struct InMemoryNotificationService {
    topics: DashMap<String, TopicRecord>,
    published: Mutex<Vec<PublishedMessage>>,
    auto_confirm_after: Option<Duration>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirm pending subscriptions once they are this old
    pub fn with_auto_confirm(delay: Duration) -> Self {
        Self {
            auto_confirm_after: Some(delay),
            ..Self::default()
        }
    }

    pub fn topic_ref(name: &str) -> String {
        format!("regflow:topic:{name}")
    }

    /// Confirm pending subscriptions of one protocol; returns how many changed
    pub fn confirm(&self, topic_ref: &str, protocol: Protocol) -> usize {
        let Some(mut topic) = self.topics.get_mut(topic_ref) else {
            return 0;
        };
        let mut confirmed = 0;
        for record in topic
            .subscriptions
            .iter_mut()
            .filter(|r| r.subscription.protocol == protocol)
        {
            if record.subscription.status == SubscriptionStatus::PendingConfirmation {
                record.subscription.status = SubscriptionStatus::Confirmed;
                confirmed += 1;
            }
        }
        confirmed
    }

    /// Drop unconfirmed subscriptions, as if their confirmation links expired
    pub fn expire_pending(&self, topic_ref: &str) -> usize {
        let Some(mut topic) = self.topics.get_mut(topic_ref) else {
            return 0;
        };
        let before = topic.subscriptions.len();
        topic.subscriptions.retain(|r| r.subscription.is_confirmed());
        before - topic.subscriptions.len()
    }

    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn topic_exists(&self, topic_ref: &str) -> bool {
        self.topics.contains_key(topic_ref)
    }

    pub fn display_name(&self, topic_ref: &str) -> Option<String> {
        self.topics
            .get(topic_ref)
            .and_then(|topic| topic.display_name.clone())
    }

    fn apply_auto_confirm(&self, topic: &mut TopicRecord) {
        let Some(delay) = self.auto_confirm_after else {
            return;
        };
        let now = Utc::now();
        for record in &mut topic.subscriptions {
            let age = (now - record.created_at).to_std().unwrap_or_default();
            if record.subscription.status == SubscriptionStatus::PendingConfirmation && age >= delay
            {
                debug!(
                    topic = %topic.name,
                    protocol = %record.subscription.protocol,
                    "Auto-confirming subscription"
                );
                record.subscription.status = SubscriptionStatus::Confirmed;
            }
        }
    }

    fn topic_not_found(topic_ref: &str) -> NotificationError {
        NotificationError::TopicNotFound {
            topic_ref: topic_ref.to_string(),
        }
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn create_topic(&self, name: &str) -> NotificationResult<String> {
        if name.trim().is_empty() {
            return Err(NotificationError::Backend {
                message: "topic name must not be empty".to_string(),
            });
        }
        let topic_ref = Self::topic_ref(name);
        self.topics
            .entry(topic_ref.clone())
            .or_insert_with(|| TopicRecord {
                name: name.to_string(),
                display_name: None,
                subscriptions: Vec::new(),
            });
        Ok(topic_ref)
    }

    async fn set_display_name(
        &self,
        topic_ref: &str,
        display_name: &str,
    ) -> NotificationResult<()> {
        let mut topic = self
            .topics
            .get_mut(topic_ref)
            .ok_or_else(|| Self::topic_not_found(topic_ref))?;
        topic.display_name = Some(display_name.to_string());
        Ok(())
    }

    async fn subscribe(
        &self,
        topic_ref: &str,
        protocol: Protocol,
        endpoint: &str,
    ) -> NotificationResult<SubscriptionRef> {
        if !protocol.is_valid_endpoint(endpoint) {
            return Err(NotificationError::InvalidEndpoint {
                protocol,
                endpoint: endpoint.to_string(),
            });
        }
        let mut topic = self
            .topics
            .get_mut(topic_ref)
            .ok_or_else(|| Self::topic_not_found(topic_ref))?;

        let existing = topic
            .subscriptions
            .iter()
            .find(|r| r.subscription.protocol == protocol && r.subscription.endpoint == endpoint)
            .map(|r| r.subscription.clone());
        let subscription = match existing {
            Some(subscription) => subscription,
            None => {
                let subscription = Subscription {
                    subscription_id: format!("{topic_ref}:{}", Uuid::new_v4()),
                    protocol,
                    endpoint: endpoint.to_string(),
                    status: SubscriptionStatus::PendingConfirmation,
                };
                topic.subscriptions.push(SubscriptionRecord {
                    subscription: subscription.clone(),
                    created_at: Utc::now(),
                });
                subscription
            }
        };

        Ok(match subscription.status {
            SubscriptionStatus::Confirmed => SubscriptionRef::Confirmed(subscription.subscription_id),
            SubscriptionStatus::PendingConfirmation => SubscriptionRef::PendingConfirmation,
        })
    }

    async fn list_subscriptions(&self, topic_ref: &str) -> NotificationResult<Vec<Subscription>> {
        let mut topic = self
            .topics
            .get_mut(topic_ref)
            .ok_or_else(|| Self::topic_not_found(topic_ref))?;
        self.apply_auto_confirm(&mut topic);
        Ok(topic
            .subscriptions
            .iter()
            .map(|r| r.subscription.clone())
            .collect())
    }

    async fn publish(
        &self,
        topic_ref: &str,
        subject: &str,
        message: &str,
    ) -> NotificationResult<String> {
        let recipients = {
            let mut topic = self
                .topics
                .get_mut(topic_ref)
                .ok_or_else(|| Self::topic_not_found(topic_ref))?;
            self.apply_auto_confirm(&mut topic);
            topic
                .subscriptions
                .iter()
                .map(|r| r.subscription.clone())
                .filter(Subscription::is_confirmed)
                .collect::<Vec<_>>()
        };

        let message_id = Uuid::new_v4().to_string();
        self.published.lock().push(PublishedMessage {
            message_id: message_id.clone(),
            topic_ref: topic_ref.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
            recipients,
            published_at: Utc::now(),
        });
        Ok(message_id)
    }

    async fn delete_topic(&self, topic_ref: &str) -> NotificationResult<()> {
        self.topics
            .remove(topic_ref)
            .map(|_| ())
            .ok_or_else(|| Self::topic_not_found(topic_ref))
    }
}
