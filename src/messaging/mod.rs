//! # Messaging Module
//!
//! The orchestration service contract and its backends: an in-memory service
//! for single-process runs and a PostgreSQL service for durable,
//! multi-process deployments. Both share the bookkeeping in [`ledger`].

pub mod errors;
pub mod in_memory;
pub mod ledger;
pub mod message;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod service;

pub use errors::{MessagingError, MessagingResult};
pub use in_memory::{InMemoryOrchestrationService, InMemoryServiceConfig};
pub use ledger::{ActivityTaskRecord, DecisionSlot, ExecutionLedger};
pub use message::*;
#[cfg(feature = "postgres")]
pub use postgres::{PgOrchestrationService, PgServiceConfig};
pub use service::OrchestrationService;
