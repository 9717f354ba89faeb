use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::subscribe_topic::{topic_ref_from, TOPIC_REF_KEY};
use super::{Activity, ActivityContext, ActivityKind, ActivityOutcome};
use crate::config::NotificationConfig;
use crate::constants::reasons;
use crate::interfaces::{NotificationService, Protocol};
use crate::models::Payload;

/// Publishes the success message to every confirmed subscription
pub struct SendResultActivity {
    notifications: Arc<dyn NotificationService>,
    config: NotificationConfig,
}

impl SendResultActivity {
    pub fn new(notifications: Arc<dyn NotificationService>, config: NotificationConfig) -> Self {
        Self {
            notifications,
            config,
        }
    }
}

#[async_trait]
impl Activity for SendResultActivity {
    fn kind(&self) -> ActivityKind {
        ActivityKind::SendResult
    }

    async fn execute(&self, ctx: &ActivityContext, input: Option<Payload>) -> ActivityOutcome {
        let Some(topic_ref) = input.as_ref().and_then(topic_ref_from) else {
            return ActivityOutcome::failed(reasons::MISSING_INPUT, "no topic in the activity input");
        };

        let subscriptions = match self.notifications.list_subscriptions(&topic_ref).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => return ActivityOutcome::failed(reasons::PUBLISH_FAILED, e.to_string()),
        };
        let mut notified: Vec<Protocol> = subscriptions
            .iter()
            .filter(|s| s.is_confirmed())
            .map(|s| s.protocol)
            .collect();
        notified.sort();
        notified.dedup();

        let message_id = match self
            .notifications
            .publish(
                &topic_ref,
                &self.config.success_subject,
                &self.config.success_message,
            )
            .await
        {
            Ok(message_id) => message_id,
            Err(e) => return ActivityOutcome::failed(reasons::PUBLISH_FAILED, e.to_string()),
        };

        if self.config.delete_topic_on_completion {
            if let Err(e) = self.notifications.delete_topic(&topic_ref).await {
                warn!(topic_ref = %topic_ref, error = %e, "Failed to delete topic after publishing");
            }
        }

        info!(
            workflow_id = %ctx.workflow_id(),
            topic_ref = %topic_ref,
            message_id = %message_id,
            notified = ?notified,
            "📣 Success message published"
        );
        ActivityOutcome::Completed(
            Payload::new()
                .with("message_id", message_id)
                .with(TOPIC_REF_KEY, topic_ref)
                .with(
                    "notified",
                    Value::Array(
                        notified
                            .iter()
                            .map(|p| Value::String(p.as_str().to_string()))
                            .collect(),
                    ),
                ),
        )
    }
}
