//! # External Interfaces
//!
//! Narrow traits for the collaborators activities talk to (the person
//! registering and the notification transport) with in-process
//! implementations.

pub mod notification;
pub mod user_input;

pub use notification::{
    InMemoryNotificationService, NotificationError, NotificationResult, NotificationService,
    Protocol, PublishedMessage, Subscription, SubscriptionRef, SubscriptionStatus,
};
pub use user_input::{ConsoleUserInput, ScriptedUserInput, UserInput, CANCEL_COMMAND};
