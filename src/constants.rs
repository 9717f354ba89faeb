//! # System Constants
//!
//! Names and limits shared by the registration workflow components.

/// Environment variable selecting the configuration environment
pub const ENVIRONMENT_VAR: &str = "REGFLOW_ENV";

/// Prefix for environment variable configuration overrides (`REGFLOW__SECTION__KEY`)
pub const ENV_OVERRIDE_PREFIX: &str = "REGFLOW";

/// Separator between nested keys in environment overrides
pub const ENV_OVERRIDE_SEPARATOR: &str = "__";

/// Base name of the configuration files under the config directory
pub const CONFIG_FILE_STEM: &str = "regflow";

/// Longest topic display name accepted by configuration
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// Characters of the display name an SMS message shows
pub const SMS_DISPLAY_NAME_LENGTH: usize = 10;

/// Registration attempts before giving up on a contended version
pub const MAX_REGISTRATION_ATTEMPTS: usize = 5;

/// Registered activity type names
pub mod activity_names {
    pub const GET_CONTACT: &str = "get_contact_activity";
    pub const SUBSCRIBE_TOPIC: &str = "subscribe_topic_activity";
    pub const WAIT_FOR_CONFIRMATION: &str = "wait_for_confirmation_activity";
    pub const CONFIRM_EMAIL: &str = "confirm_email_activity";
    pub const CONFIRM_SMS: &str = "confirm_sms_activity";
    pub const SEND_RESULT: &str = "send_result_activity";
}

/// Failure reasons reported by activities and the decider
pub mod reasons {
    pub const NO_INPUT: &str = "no input";
    pub const MISSING_INPUT: &str = "missing input";
    pub const MALFORMED_INPUT: &str = "malformed input";
    pub const TOPIC_CREATION_FAILED: &str = "topic creation failed";
    pub const SUBSCRIPTION_FAILED: &str = "subscription failed";
    pub const NO_CONFIRMATION: &str = "no subscriptions could be confirmed";
    pub const CONFIRMATION_WAIT_EXCEEDED: &str = "confirmation wait exceeded";
    pub const HEARTBEAT_REJECTED: &str = "heartbeat rejected";
    pub const PUBLISH_FAILED: &str = "publish failed";
    pub const ACTIVITY_PANICKED: &str = "activity panicked";
    pub const MALFORMED_RESULT: &str = "malformed activity result";
}
