//! # Activities
//!
//! The units of work the registration workflow schedules. Every activity is
//! registered under a fixed name, receives the accumulated results of the
//! previous steps as its input and reports one [`ActivityOutcome`].
//!
//! Activities run under at-least-once delivery: anything they create is keyed
//! by a deterministic name so a redelivered task finds the same resources.

pub mod context;
pub mod get_contact;
pub mod send_result;
pub mod subscribe_topic;
pub mod wait_for_confirmation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::activity_names;
use crate::models::Payload;

pub use context::ActivityContext;
pub use get_contact::GetContactActivity;
pub use send_result::SendResultActivity;
pub use subscribe_topic::SubscribeTopicActivity;
pub use wait_for_confirmation::WaitForConfirmationActivity;

/// The fixed set of activities a worker can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    GetContact,
    SubscribeTopic,
    WaitForConfirmation,
    ConfirmEmail,
    ConfirmSms,
    SendResult,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::GetContact,
        ActivityKind::SubscribeTopic,
        ActivityKind::WaitForConfirmation,
        ActivityKind::ConfirmEmail,
        ActivityKind::ConfirmSms,
        ActivityKind::SendResult,
    ];

    /// Registered activity type name
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetContact => activity_names::GET_CONTACT,
            Self::SubscribeTopic => activity_names::SUBSCRIBE_TOPIC,
            Self::WaitForConfirmation => activity_names::WAIT_FOR_CONFIRMATION,
            Self::ConfirmEmail => activity_names::CONFIRM_EMAIL,
            Self::ConfirmSms => activity_names::CONFIRM_SMS,
            Self::SendResult => activity_names::SEND_RESULT,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GetContact => "collect the subscriber's email address and phone number",
            Self::SubscribeTopic => "create the notification topic and subscribe the endpoints",
            Self::WaitForConfirmation => "wait until at least one subscription is confirmed",
            Self::ConfirmEmail => "wait until the email subscription is confirmed",
            Self::ConfirmSms => "wait until the SMS subscription is confirmed",
            Self::SendResult => "notify the subscriber that the subscription succeeded",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("Unknown activity: {s}"))
    }
}

/// How an activity ended
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    Completed(Payload),
    Failed { reason: String, detail: String },
}

impl ActivityOutcome {
    pub fn failed(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[async_trait]
pub trait Activity: Send + Sync {
    fn kind(&self) -> ActivityKind;

    /// Run the activity; `input` is the accumulated payload, if the task had one
    async fn execute(&self, ctx: &ActivityContext, input: Option<Payload>) -> ActivityOutcome;
}
