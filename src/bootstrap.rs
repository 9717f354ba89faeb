//! # Registration System Bootstrap
//!
//! Wires one [`WorkflowConfig`] into a running system: registers the domain,
//! the activity types and the workflow type, builds the pipeline for the
//! configured variant, and hands out the decider, coordinator and worker that
//! operate on it.
//!
//! Registration is idempotent, so every process (decider, worker, starter)
//! bootstraps the same way and ends up with the same definition keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::activities::{
    Activity, ActivityKind, GetContactActivity, SendResultActivity, SubscribeTopicActivity,
    WaitForConfirmationActivity,
};
use crate::config::{BackendKind, ConfigurationError, PipelineVariant, WorkflowConfig};
use crate::error::{Result, WorkflowError};
use crate::interfaces::{NotificationService, Protocol, UserInput};
use crate::messaging::{
    DomainRegistration, InMemoryOrchestrationService, InMemoryServiceConfig,
    OrchestrationService, StartExecutionRequest,
};
use crate::models::{
    ActivityDefinition, ActivityRef, Combinator, DefinitionKey, ExecutionInfo, HistoryEvent,
    Payload, Pipeline, WorkflowDefinition, WorkflowExecution,
};
use crate::orchestration::{Decider, WorkflowCoordinator, WorkflowCoordinatorConfig};
use crate::registry::DefinitionRegistry;
use crate::worker::{ActivityWorker, ActivityWorkerConfig};

/// One pipeline step expressed in activity kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepLayout {
    Single(ActivityKind),
    Group(Vec<ActivityKind>, Combinator),
}

/// Pipeline shape for a variant
pub fn pipeline_layout(variant: PipelineVariant) -> Vec<StepLayout> {
    let confirmation = match variant {
        PipelineVariant::Sequential => StepLayout::Single(ActivityKind::WaitForConfirmation),
        PipelineVariant::FanOut => StepLayout::Group(
            vec![ActivityKind::ConfirmEmail, ActivityKind::ConfirmSms],
            Combinator::Any,
        ),
    };
    vec![
        StepLayout::Single(ActivityKind::GetContact),
        StepLayout::Single(ActivityKind::SubscribeTopic),
        confirmation,
        StepLayout::Single(ActivityKind::SendResult),
    ]
}

fn layout_kinds(layout: &[StepLayout]) -> Vec<ActivityKind> {
    layout
        .iter()
        .flat_map(|step| match step {
            StepLayout::Single(kind) => vec![*kind],
            StepLayout::Group(kinds, _) => kinds.clone(),
        })
        .collect()
}

/// Create the orchestration backend the configuration selects
pub async fn connect_service(config: &WorkflowConfig) -> Result<Arc<dyn OrchestrationService>> {
    match config.orchestrator.backend {
        BackendKind::Memory => Ok(Arc::new(InMemoryOrchestrationService::new(
            InMemoryServiceConfig {
                poll_timeout: config.orchestrator.poll_timeout(),
                timer_resolution: config.orchestrator.timer_resolution(),
            },
        ))),
        BackendKind::Postgres => connect_postgres(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &WorkflowConfig) -> Result<Arc<dyn OrchestrationService>> {
    use crate::messaging::{PgOrchestrationService, PgServiceConfig};

    let database_url = config.orchestrator.database_url.as_deref().ok_or_else(|| {
        ConfigurationError::missing_required_field("orchestrator.database_url", "postgres backend")
    })?;
    let service = PgOrchestrationService::connect(
        database_url,
        config.orchestrator.max_connections,
        PgServiceConfig {
            poll_timeout: config.orchestrator.poll_timeout(),
            poll_interval: config.orchestrator.timer_resolution().max(Duration::from_millis(50)),
        },
    )
    .await?;
    service.migrate().await?;
    Ok(Arc::new(service))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_config: &WorkflowConfig) -> Result<Arc<dyn OrchestrationService>> {
    Err(ConfigurationError::invalid_value(
        "orchestrator.backend",
        "postgres",
        "built without the postgres feature",
    )
    .into())
}

/// A registered, ready-to-run registration workflow
pub struct RegistrationSystem {
    config: Arc<WorkflowConfig>,
    service: Arc<dyn OrchestrationService>,
    notifications: Arc<dyn NotificationService>,
    user_input: Arc<dyn UserInput>,
    activity_definitions: HashMap<ActivityKind, ActivityDefinition>,
    workflow: WorkflowDefinition,
    pipeline: Arc<Pipeline>,
    decider: Arc<Decider>,
}

impl RegistrationSystem {
    /// Register everything the configured variant needs and build the decider
    pub async fn bootstrap(
        config: WorkflowConfig,
        service: Arc<dyn OrchestrationService>,
        notifications: Arc<dyn NotificationService>,
        user_input: Arc<dyn UserInput>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            domain = %config.domain,
            variant = ?config.pipeline_variant,
            environment = %config.environment,
            "🚀 Bootstrapping registration workflow"
        );

        service
            .register_domain(&DomainRegistration {
                name: config.domain.clone(),
                description: Some(format!("{} registration workflow domain", config.domain)),
                retention_days: config.orchestrator.retention_days,
            })
            .await?;

        let registry = DefinitionRegistry::new(Arc::clone(&service), config.domain.clone());
        let layout = pipeline_layout(config.pipeline_variant);

        let mut activity_definitions = HashMap::new();
        for kind in layout_kinds(&layout) {
            let mut options = config.activity_options(kind.name());
            if !config.activities.overrides.contains_key(kind.name()) {
                options.description = Some(kind.description().to_string());
            }
            let definition = registry.register_activity(kind.name(), options).await?;
            activity_definitions.insert(kind, definition);
        }

        let key_of = |kind: &ActivityKind| -> Result<ActivityRef> {
            activity_definitions
                .get(kind)
                .map(|definition| definition.key.clone())
                .ok_or_else(|| {
                    WorkflowError::RegistrationError(format!("activity {kind} was not registered"))
                })
        };
        let mut builder = Pipeline::builder();
        for step in &layout {
            builder = match step {
                StepLayout::Single(kind) => builder.single(key_of(kind)?),
                StepLayout::Group(kinds, combinator) => builder.group(
                    kinds.iter().map(key_of).collect::<Result<Vec<_>>>()?,
                    *combinator,
                ),
            };
        }
        let pipeline = Arc::new(builder.build()?);

        let workflow = registry
            .register_workflow(&config.workflow_name, config.workflow_options())
            .await?;
        let decider =
            Arc::new(Decider::new().with_pipeline(workflow.key.clone(), Arc::clone(&pipeline)));

        info!(
            workflow_type = %workflow.key,
            steps = pipeline.len(),
            "✅ Registration workflow ready"
        );
        Ok(Self {
            config: Arc::new(config),
            service,
            notifications,
            user_input,
            activity_definitions,
            workflow,
            pipeline,
            decider,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn service(&self) -> Arc<dyn OrchestrationService> {
        Arc::clone(&self.service)
    }

    pub fn workflow_type(&self) -> &DefinitionKey {
        &self.workflow.key
    }

    pub fn workflow_definition(&self) -> &WorkflowDefinition {
        &self.workflow
    }

    pub fn activity_definition(&self, kind: ActivityKind) -> Option<&ActivityDefinition> {
        self.activity_definitions.get(&kind)
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn decider(&self) -> Arc<Decider> {
        Arc::clone(&self.decider)
    }

    pub fn coordinator(&self) -> WorkflowCoordinator {
        WorkflowCoordinator::new(
            Arc::clone(&self.service),
            Arc::clone(&self.decider),
            WorkflowCoordinatorConfig {
                domain: self.config.domain.clone(),
                task_list: self.config.task_list.clone(),
                identity: self.config.coordinator.identity.clone(),
                poll_error_backoff: Duration::from_millis(
                    self.config.coordinator.poll_error_backoff_ms,
                ),
            },
        )
    }

    /// Activity implementations for every kind the pipeline schedules
    pub fn activities(&self) -> Vec<Arc<dyn Activity>> {
        let mut kinds: Vec<ActivityKind> = self.activity_definitions.keys().copied().collect();
        kinds.sort();
        kinds.into_iter().map(|kind| self.activity(kind)).collect()
    }

    fn activity(&self, kind: ActivityKind) -> Arc<dyn Activity> {
        let notifications = Arc::clone(&self.notifications);
        let confirmation = self.config.confirmation.clone();
        match kind {
            ActivityKind::GetContact => Arc::new(GetContactActivity::new(
                Arc::clone(&self.user_input),
                self.config.contact.max_prompt_attempts,
            )),
            ActivityKind::SubscribeTopic => Arc::new(SubscribeTopicActivity::new(
                notifications,
                self.config.notification.clone(),
            )),
            ActivityKind::WaitForConfirmation => {
                Arc::new(WaitForConfirmationActivity::any(notifications, confirmation))
            }
            ActivityKind::ConfirmEmail => Arc::new(WaitForConfirmationActivity::for_protocol(
                Protocol::Email,
                notifications,
                confirmation,
            )),
            ActivityKind::ConfirmSms => Arc::new(WaitForConfirmationActivity::for_protocol(
                Protocol::Sms,
                notifications,
                confirmation,
            )),
            ActivityKind::SendResult => Arc::new(SendResultActivity::new(
                notifications,
                self.config.notification.clone(),
            )),
        }
    }

    pub fn activity_worker(&self) -> Result<ActivityWorker> {
        ActivityWorker::register(
            Arc::clone(&self.service),
            self.activities(),
            ActivityWorkerConfig::from_workflow_config(&self.config),
        )
    }

    /// Start a run of the registered workflow
    pub async fn start_execution(
        &self,
        workflow_id: &str,
        input: Option<Payload>,
    ) -> Result<WorkflowExecution> {
        let input = input
            .map(|payload| payload.to_text())
            .transpose()
            .map_err(|e| WorkflowError::ValidationError(e.to_string()))?;
        let execution = self
            .service
            .start_workflow_execution(
                &self.config.domain,
                StartExecutionRequest {
                    workflow_id: workflow_id.to_string(),
                    workflow_type: self.workflow.key.clone(),
                    input,
                    task_list: None,
                },
            )
            .await?;
        info!(execution = %execution, "▶️ Workflow execution started");
        Ok(execution)
    }

    pub async fn describe(&self, run_id: Uuid) -> Result<ExecutionInfo> {
        Ok(self.service.describe_workflow_execution(run_id).await?)
    }

    pub async fn history(&self, run_id: Uuid) -> Result<Vec<HistoryEvent>> {
        Ok(self.service.get_workflow_execution_history(run_id).await?)
    }

    /// Poll the execution until it closes or `limit` elapses
    pub async fn wait_for_close(
        &self,
        run_id: Uuid,
        poll_interval: Duration,
        limit: Duration,
    ) -> Result<ExecutionInfo> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let info = self.describe(run_id).await?;
            if info.status.is_terminal() {
                return Ok(info);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(WorkflowError::ActivityError(format!(
                    "execution {} still {} after {}ms",
                    info.execution,
                    info.status,
                    limit.as_millis()
                )));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
