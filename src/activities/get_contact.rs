//! Collects the subscriber's email address and phone number.
//!
//! Either endpoint may be left empty, but not both. An invalid value is asked
//! for again, as is an all-empty answer, up to `max_prompt_attempts` times.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Activity, ActivityContext, ActivityKind, ActivityOutcome};
use crate::constants::reasons;
use crate::interfaces::{Protocol, UserInput, CANCEL_COMMAND};
use crate::models::Payload;

enum PromptError {
    Cancelled,
    Exhausted(Protocol),
}

pub struct GetContactActivity {
    input: Arc<dyn UserInput>,
    max_prompt_attempts: u32,
}

impl GetContactActivity {
    pub fn new(input: Arc<dyn UserInput>, max_prompt_attempts: u32) -> Self {
        Self {
            input,
            max_prompt_attempts: max_prompt_attempts.max(1),
        }
    }

    fn label(protocol: Protocol) -> &'static str {
        match protocol {
            Protocol::Email => "Email",
            Protocol::Sms => "Phone",
        }
    }

    /// Ask for one endpoint; an empty answer means "not provided"
    async fn prompt_endpoint(&self, protocol: Protocol) -> Result<String, PromptError> {
        for _ in 0..self.max_prompt_attempts {
            let value = self
                .input
                .prompt_for_value(Self::label(protocol))
                .await
                .ok_or(PromptError::Cancelled)?;
            let value = value.trim().to_string();

            if value.is_empty() || protocol.is_valid_endpoint(&value) {
                return Ok(value);
            }
            warn!(protocol = %protocol, "Rejected invalid contact endpoint");
            self.input
                .show(&format!("'{value}' is not a valid {protocol} endpoint."))
                .await;
        }
        Err(PromptError::Exhausted(protocol))
    }

    async fn collect(&self) -> Result<(String, String), PromptError> {
        for _ in 0..self.max_prompt_attempts {
            let email = self.prompt_endpoint(Protocol::Email).await?;
            let sms = self.prompt_endpoint(Protocol::Sms).await?;
            if !email.is_empty() || !sms.is_empty() {
                return Ok((email, sms));
            }
            self.input
                .show("Please enter an email address, a phone number, or both.")
                .await;
        }
        Err(PromptError::Exhausted(Protocol::Email))
    }
}

#[async_trait]
impl Activity for GetContactActivity {
    fn kind(&self) -> ActivityKind {
        ActivityKind::GetContact
    }

    async fn execute(&self, ctx: &ActivityContext, _input: Option<Payload>) -> ActivityOutcome {
        self.input
            .show("Please enter your email address and/or your phone number to confirm your subscription.")
            .await;
        self.input
            .show(&format!(
                "If you enter a phone number, it must be able to receive SMS messages. Type '{CANCEL_COMMAND}' to cancel."
            ))
            .await;

        match self.collect().await {
            Ok((email, sms)) => {
                info!(
                    workflow_id = %ctx.workflow_id(),
                    has_email = !email.is_empty(),
                    has_sms = !sms.is_empty(),
                    "Contact information collected"
                );
                ActivityOutcome::Completed(Payload::new().with("email", email).with("sms", sms))
            }
            Err(PromptError::Cancelled) => {
                ActivityOutcome::failed(reasons::NO_INPUT, "input cancelled by user")
            }
            Err(PromptError::Exhausted(protocol)) => ActivityOutcome::failed(
                reasons::NO_INPUT,
                format!(
                    "no valid {protocol} entered after {} attempts",
                    self.max_prompt_attempts
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::ScriptedUserInput;
    use crate::models::DefinitionKey;

    fn ctx() -> ActivityContext {
        ActivityContext::detached("wf-1", DefinitionKey::new("get_contact_activity", "1"))
    }

    #[tokio::test]
    async fn test_collects_both_endpoints() {
        let input = Arc::new(ScriptedUserInput::new(["user@example.com", "+12065550100"]));
        let activity = GetContactActivity::new(input, 3);

        let outcome = activity.execute(&ctx(), None).await;
        let ActivityOutcome::Completed(payload) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(payload.get_str("email"), Some("user@example.com"));
        assert_eq!(payload.get_str("sms"), Some("+12065550100"));
    }

    #[tokio::test]
    async fn test_invalid_value_is_prompted_again() {
        let input = Arc::new(ScriptedUserInput::new(["nope", "user@example.com", ""]));
        let activity = GetContactActivity::new(input.clone(), 3);

        let outcome = activity.execute(&ctx(), None).await;
        let ActivityOutcome::Completed(payload) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(payload.get_str("email"), Some("user@example.com"));
        assert_eq!(payload.get_str("sms"), Some(""));
        assert_eq!(input.prompts(), vec!["Email", "Email", "Phone"]);
    }

    #[tokio::test]
    async fn test_cancel_fails_with_no_input() {
        let input = Arc::new(ScriptedUserInput::from_answers([None]));
        let activity = GetContactActivity::new(input, 3);

        match activity.execute(&ctx(), None).await {
            ActivityOutcome::Failed { reason, .. } => assert_eq!(reason, reasons::NO_INPUT),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_attempts_fail() {
        let input = Arc::new(ScriptedUserInput::new(["bad", "worse"]));
        let activity = GetContactActivity::new(input, 2);

        match activity.execute(&ctx(), None).await {
            ActivityOutcome::Failed { reason, detail } => {
                assert_eq!(reason, reasons::NO_INPUT);
                assert!(detail.contains("email"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
