//! Waits for subscription owners to confirm.
//!
//! The activity polls the topic's subscriptions at `poll_interval` and reports
//! progress as a heartbeat at `heartbeat_interval`. A slow subscription check
//! never delays a heartbeat or the `max_wait` deadline. It succeeds as soon as one
//! matching subscription is confirmed, and fails when none is left pending or
//! the optional `max_wait` elapses. A rejected heartbeat means the service has
//! already given up on this task, so the activity stops.

use async_trait::async_trait;
use futures::future::{BoxFuture, OptionFuture};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::subscribe_topic::{topic_ref_from, TOPIC_REF_KEY};
use super::{Activity, ActivityContext, ActivityKind, ActivityOutcome};
use crate::config::ConfirmationConfig;
use crate::constants::reasons;
use crate::interfaces::{NotificationResult, NotificationService, Protocol, Subscription};
use crate::models::Payload;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfirmationProgress {
    confirmed: Vec<Protocol>,
    pending: usize,
}

impl ConfirmationProgress {
    fn details(&self) -> String {
        format!("{} confirmed, {} pending", self.confirmed.len(), self.pending)
    }
}

pub struct WaitForConfirmationActivity {
    kind: ActivityKind,
    protocol_filter: Option<Protocol>,
    notifications: Arc<dyn NotificationService>,
    config: ConfirmationConfig,
}

impl WaitForConfirmationActivity {
    /// Wait for any protocol
    pub fn any(notifications: Arc<dyn NotificationService>, config: ConfirmationConfig) -> Self {
        Self {
            kind: ActivityKind::WaitForConfirmation,
            protocol_filter: None,
            notifications,
            config,
        }
    }

    /// Wait for one protocol only, as a member of a parallel group
    pub fn for_protocol(
        protocol: Protocol,
        notifications: Arc<dyn NotificationService>,
        config: ConfirmationConfig,
    ) -> Self {
        let kind = match protocol {
            Protocol::Email => ActivityKind::ConfirmEmail,
            Protocol::Sms => ActivityKind::ConfirmSms,
        };
        Self {
            kind,
            protocol_filter: Some(protocol),
            notifications,
            config,
        }
    }

    fn progress(&self, subscriptions: &[Subscription]) -> ConfirmationProgress {
        let relevant = subscriptions
            .iter()
            .filter(|s| self.protocol_filter.map_or(true, |p| s.protocol == p));
        let mut confirmed = Vec::new();
        let mut pending = 0;
        for subscription in relevant {
            if subscription.is_confirmed() {
                if !confirmed.contains(&subscription.protocol) {
                    confirmed.push(subscription.protocol);
                }
            } else {
                pending += 1;
            }
        }
        confirmed.sort();
        ConfirmationProgress { confirmed, pending }
    }

    fn completed(topic_ref: &str, progress: &ConfirmationProgress) -> ActivityOutcome {
        let confirmed: Vec<Value> = progress
            .confirmed
            .iter()
            .map(|p| Value::String(p.as_str().to_string()))
            .collect();
        ActivityOutcome::Completed(
            Payload::new()
                .with(TOPIC_REF_KEY, topic_ref)
                .with("confirmed", Value::Array(confirmed))
                .with("confirmed_count", progress.confirmed.len())
                .with("pending_count", progress.pending),
        )
    }
}

#[async_trait]
impl Activity for WaitForConfirmationActivity {
    fn kind(&self) -> ActivityKind {
        self.kind
    }

    async fn execute(&self, ctx: &ActivityContext, input: Option<Payload>) -> ActivityOutcome {
        let Some(topic_ref) = input.as_ref().and_then(topic_ref_from) else {
            return ActivityOutcome::failed(reasons::MISSING_INPUT, "no topic in the activity input");
        };

        let started = Instant::now();
        let deadline = self.config.max_wait().map(|wait| started + wait);
        let expiry = sleep_until(deadline.unwrap_or(started));
        tokio::pin!(expiry);
        let mut poll = interval_at(started, self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = interval_at(
            started + self.config.heartbeat_interval(),
            self.config.heartbeat_interval(),
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_progress: Option<ConfirmationProgress> = None;
        // At most one subscription check in flight, polled alongside the heartbeat
        let mut check: Option<BoxFuture<'_, NotificationResult<Vec<Subscription>>>> = None;

        loop {
            tokio::select! {
                _ = poll.tick(), if check.is_none() => {
                    check = Some(self.notifications.list_subscriptions(&topic_ref));
                }
                Some(listed) = OptionFuture::from(check.as_mut()), if check.is_some() => {
                    check = None;
                    let subscriptions = match listed {
                        Ok(subscriptions) => subscriptions,
                        Err(e) => {
                            return ActivityOutcome::failed(reasons::NO_CONFIRMATION, e.to_string());
                        }
                    };
                    let progress = self.progress(&subscriptions);
                    debug!(
                        activity_id = %ctx.activity_id(),
                        progress = %progress.details(),
                        "Checked subscription confirmations"
                    );

                    if !progress.confirmed.is_empty() {
                        info!(
                            workflow_id = %ctx.workflow_id(),
                            activity = %self.kind,
                            confirmed = ?progress.confirmed,
                            "✅ Subscription confirmed"
                        );
                        return Self::completed(&topic_ref, &progress);
                    }
                    if progress.pending == 0 {
                        return ActivityOutcome::failed(
                            reasons::NO_CONFIRMATION,
                            format!("no pending subscriptions left on {topic_ref}"),
                        );
                    }
                    last_progress = Some(progress);
                }
                _ = &mut expiry, if deadline.is_some() => {
                    return ActivityOutcome::failed(
                        reasons::CONFIRMATION_WAIT_EXCEEDED,
                        format!(
                            "{} after {}ms",
                            progress_details(last_progress.as_ref()),
                            started.elapsed().as_millis()
                        ),
                    );
                }
                _ = heartbeat.tick() => {
                    let details = progress_details(last_progress.as_ref());
                    match ctx.heartbeat(details).await {
                        Ok(status) if status.cancel_requested => {
                            warn!(activity_id = %ctx.activity_id(), "Cancellation requested, stopping wait");
                            return ActivityOutcome::failed(reasons::HEARTBEAT_REJECTED, "cancel requested");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(
                                activity_id = %ctx.activity_id(),
                                error = %e,
                                "Heartbeat rejected, abandoning wait"
                            );
                            return ActivityOutcome::failed(reasons::HEARTBEAT_REJECTED, e.to_string());
                        }
                    }
                }
            }
        }
    }
}

fn progress_details(progress: Option<&ConfirmationProgress>) -> String {
    progress
        .map(ConfirmationProgress::details)
        .unwrap_or_else(|| "0 confirmed, 0 pending".to_string())
}
