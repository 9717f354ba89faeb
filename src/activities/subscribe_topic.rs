use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{Activity, ActivityContext, ActivityKind, ActivityOutcome};
use crate::config::NotificationConfig;
use crate::constants::{activity_names, reasons, SMS_DISPLAY_NAME_LENGTH};
use crate::interfaces::{NotificationService, Protocol};
use crate::models::{Payload, EXECUTION_INPUT_KEY};

/// Result key holding the topic reference
pub const TOPIC_REF_KEY: &str = "topic_ref";

/// Contact endpoints, from the contact step's result or the execution input
fn contact_from(input: &Payload) -> Option<Payload> {
    input
        .section(activity_names::GET_CONTACT)
        .or_else(|| input.section(EXECUTION_INPUT_KEY))
        .or_else(|| {
            (input.contains_key("email") || input.contains_key("sms")).then(|| input.clone())
        })
}

/// The topic created by an earlier subscribe step, wherever it sits in the map
pub(crate) fn topic_ref_from(input: &Payload) -> Option<String> {
    if let Some(topic_ref) = input
        .section(activity_names::SUBSCRIBE_TOPIC)
        .and_then(|s| s.get_str(TOPIC_REF_KEY).map(str::to_string))
    {
        return Some(topic_ref);
    }
    input
        .get_str(TOPIC_REF_KEY)
        .map(str::to_string)
        .or_else(|| {
            input
                .sections()
                .find_map(|(_, s)| s.get_str(TOPIC_REF_KEY).map(str::to_string))
        })
}

/// Creates the per-execution topic and subscribes the collected endpoints
pub struct SubscribeTopicActivity {
    notifications: Arc<dyn NotificationService>,
    config: NotificationConfig,
}

impl SubscribeTopicActivity {
    pub fn new(notifications: Arc<dyn NotificationService>, config: NotificationConfig) -> Self {
        Self {
            notifications,
            config,
        }
    }

    /// Topic names are derived from the workflow id so redelivery reuses the topic
    pub fn topic_name(&self, workflow_id: &str) -> String {
        format!("{}-{}", self.config.topic_prefix, workflow_id)
    }

    fn display_name(&self) -> String {
        let name = &self.config.display_name;
        if name.chars().count() > SMS_DISPLAY_NAME_LENGTH {
            warn!(
                display_name = %name,
                limit = SMS_DISPLAY_NAME_LENGTH,
                "Display name is too long for SMS, truncating"
            );
            name.chars().take(SMS_DISPLAY_NAME_LENGTH).collect()
        } else {
            name.clone()
        }
    }
}

#[async_trait]
impl Activity for SubscribeTopicActivity {
    fn kind(&self) -> ActivityKind {
        ActivityKind::SubscribeTopic
    }

    async fn execute(&self, ctx: &ActivityContext, input: Option<Payload>) -> ActivityOutcome {
        let Some(contact) = input.as_ref().and_then(contact_from) else {
            return ActivityOutcome::failed(
                reasons::MISSING_INPUT,
                "no contact information in the activity input",
            );
        };

        let endpoints: Vec<(Protocol, String)> = Protocol::ALL
            .into_iter()
            .filter_map(|protocol| {
                contact
                    .get_str(protocol.as_str())
                    .map(str::trim)
                    .filter(|endpoint| !endpoint.is_empty())
                    .map(|endpoint| (protocol, endpoint.to_string()))
            })
            .collect();
        if endpoints.is_empty() {
            return ActivityOutcome::failed(reasons::MISSING_INPUT, "no email or phone provided");
        }

        let topic_name = self.topic_name(ctx.workflow_id());
        let topic_ref = match self.notifications.create_topic(&topic_name).await {
            Ok(topic_ref) => topic_ref,
            Err(e) => return ActivityOutcome::failed(reasons::TOPIC_CREATION_FAILED, e.to_string()),
        };
        if let Err(e) = self
            .notifications
            .set_display_name(&topic_ref, &self.display_name())
            .await
        {
            return ActivityOutcome::failed(reasons::TOPIC_CREATION_FAILED, e.to_string());
        }

        let mut subscriptions = Map::new();
        for (protocol, endpoint) in endpoints {
            match self
                .notifications
                .subscribe(&topic_ref, protocol, &endpoint)
                .await
            {
                Ok(subscription) => {
                    subscriptions.insert(
                        protocol.as_str().to_string(),
                        Value::String(subscription.as_output()),
                    );
                }
                Err(e) => {
                    return ActivityOutcome::failed(
                        reasons::SUBSCRIPTION_FAILED,
                        format!("{protocol}: {e}"),
                    )
                }
            }
        }

        info!(
            workflow_id = %ctx.workflow_id(),
            topic_ref = %topic_ref,
            subscriptions = subscriptions.len(),
            "📨 Topic ready, confirmation requests sent"
        );
        ActivityOutcome::Completed(
            Payload::new()
                .with(TOPIC_REF_KEY, topic_ref)
                .with("subscriptions", Value::Object(subscriptions)),
        )
    }
}
