//! # Registry
//!
//! Versioned registration of activity and workflow definitions.
//!
//! ## Overview
//!
//! - **DefinitionRegistry**: registers definitions through the orchestration
//!   service, reusing equal ones and auto-incrementing versions otherwise
//! - **versioning**: version string arithmetic and ordering
//!
//! ## Usage
//!
//! ```rust
//! use registration_workflow::messaging::{
//!     DomainRegistration, InMemoryOrchestrationService, OrchestrationService,
//! };
//! use registration_workflow::models::ActivityOptions;
//! use registration_workflow::registry::DefinitionRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(InMemoryOrchestrationService::default());
//! service
//!     .register_domain(&DomainRegistration {
//!         name: "demo".to_string(),
//!         description: None,
//!         retention_days: 1,
//!     })
//!     .await?;
//!
//! let registry = DefinitionRegistry::new(service, "demo");
//! let options = ActivityOptions {
//!     timeouts: Default::default(),
//!     default_task_list: "demo-activities".to_string(),
//!     description: None,
//! };
//! let first = registry.register_activity("get_contact_activity", options.clone()).await?;
//! let again = registry.register_activity("get_contact_activity", options).await?;
//! assert_eq!(first.key, again.key);
//! # Ok(())
//! # }
//! ```

pub mod definition_registry;
pub mod versioning;

pub use definition_registry::{
    plan_registration, DefinitionRegistry, RegistrationPlan, RegistryError, RegistryResult,
};
pub use versioning::{compare_versions, next_version, split_version};
