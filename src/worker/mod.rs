//! # Activity Workers
//!
//! Processes that poll an activity task list and run the registered
//! [`Activity`](crate::activities::Activity) implementations.

pub mod activity_worker;
pub mod handler_registry;

pub use activity_worker::{ActivityWorker, ActivityWorkerConfig, WorkerStats};
pub use handler_registry::ActivityHandlerRegistry;
