#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Registration Workflow
//!
//! A durable, externally orchestrated user-registration workflow: collect a
//! subscriber's contact details, subscribe them to a notification topic, wait
//! until they confirm, and send them a success message.
//!
//! ## Architecture
//!
//! An orchestration service owns every execution's event history and its task
//! queues. Two kinds of stateless processes work against it:
//!
//! - **Activity workers** poll an activity task list, run the matching
//!   [`activities::Activity`] and report the outcome
//! - **Coordinators** poll decision tasks and replay the history through the
//!   decider, which schedules the next pipeline step or closes the execution
//!
//! Neither keeps state that must survive a restart. Killing and restarting any
//! process mid-execution resumes from the history alone.
//!
//! ## Module Organization
//!
//! - [`models`] - definitions, pipelines, history events, decisions, payloads
//! - [`messaging`] - the orchestration service contract and its backends
//! - [`state_machine`] - the pure per-execution decider state machine
//! - [`orchestration`] - decider and coordinator poll loop
//! - [`activities`] - the registration activities
//! - [`worker`] - activity worker poll loop
//! - [`registry`] - versioned definition registration
//! - [`interfaces`] - user input and notification collaborators
//! - [`bootstrap`] - wiring a configuration into a running system
//! - [`config`] - layered configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use registration_workflow::bootstrap::{connect_service, RegistrationSystem};
//! use registration_workflow::config::WorkflowConfig;
//! use registration_workflow::interfaces::{ConsoleUserInput, InMemoryNotificationService};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkflowConfig::default();
//! let service = connect_service(&config).await?;
//! let system = RegistrationSystem::bootstrap(
//!     config,
//!     service,
//!     Arc::new(InMemoryNotificationService::new()),
//!     Arc::new(ConsoleUserInput::new()),
//! )
//! .await?;
//!
//! let shutdown = CancellationToken::new();
//! let worker = system.activity_worker()?;
//! let coordinator = system.coordinator();
//! let execution = system.start_execution("registration-1", None).await?;
//! tokio::join!(worker.run(shutdown.clone()), coordinator.run(shutdown.clone()));
//! println!("{}", system.describe(execution.run_id).await?.status);
//! # Ok(())
//! # }
//! ```

pub mod activities;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod worker;

pub use bootstrap::RegistrationSystem;
pub use config::{ConfigManager, WorkflowConfig};
pub use error::{Result, WorkflowError};
pub use messaging::OrchestrationService;
pub use models::{ExecutionStatus, Payload, WorkflowExecution};
