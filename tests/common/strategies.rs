use proptest::prelude::*;
use registration_workflow::models::{Payload, TimeoutType};

/// What happened to one scheduled activity
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Payload),
    Failed(String),
    TimedOut(TimeoutType),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Strategy for generating version strings with an optional prefix and padding
pub fn version_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u32..10_000).prop_map(|n| n.to_string()),
        ("[a-z]{1,4}", 0u32..1_000).prop_map(|(prefix, n)| format!("{prefix}{n}")),
        ("[a-z]{1,4}", 0u32..100).prop_map(|(prefix, n)| format!("{prefix}{n:03}")),
        (0u32..10, 0u32..10, 0u32..100).prop_map(|(a, b, c)| format!("{a}.{b}.{c}")),
        "[a-z]{1,6}",
    ]
}

/// Strategy for generating small activity results
pub fn payload_strategy() -> impl Strategy<Value = Payload> {
    prop::collection::btree_map("[a-z_]{1,12}", "[a-zA-Z0-9@.+ ]{0,24}", 0..4).prop_map(
        |fields| {
            fields
                .into_iter()
                .fold(Payload::new(), |payload, (key, value)| payload.with(key, value))
        },
    )
}

pub fn timeout_type_strategy() -> impl Strategy<Value = TimeoutType> {
    prop_oneof![
        Just(TimeoutType::ScheduleToStart),
        Just(TimeoutType::StartToClose),
        Just(TimeoutType::ScheduleToClose),
        Just(TimeoutType::Heartbeat),
    ]
}

/// Strategy for generating one activity outcome
pub fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        3 => payload_strategy().prop_map(Outcome::Completed),
        1 => "[a-z ]{1,20}".prop_map(Outcome::Failed),
        1 => timeout_type_strategy().prop_map(Outcome::TimedOut),
    ]
}

/// Strategy for generating the outcomes of a two-member group, in arrival order
pub fn group_outcomes_strategy() -> impl Strategy<Value = Vec<(usize, Outcome)>> {
    (outcome_strategy(), outcome_strategy(), any::<bool>()).prop_map(|(first, second, swap)| {
        if swap {
            vec![(1, second), (0, first)]
        } else {
            vec![(0, first), (1, second)]
        }
    })
}
