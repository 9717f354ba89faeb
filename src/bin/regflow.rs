//! # regflow
//!
//! Command-line entry point for the registration workflow: run the decider or
//! an activity worker against the configured backend, start and inspect
//! executions, or run the whole thing in one process with `demo`.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use registration_workflow::bootstrap::{connect_service, RegistrationSystem};
use registration_workflow::config::{BackendKind, ConfigManager, WorkflowConfig};
use registration_workflow::interfaces::{
    ConsoleUserInput, InMemoryNotificationService, NotificationService, ScriptedUserInput,
    UserInput,
};
use registration_workflow::logging::init_structured_logging;
use registration_workflow::models::{HistoryEvent, Payload};

#[derive(Parser)]
#[command(name = "regflow")]
#[command(about = "Durable user-registration workflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: $REGFLOW_CONFIG_DIR or ./config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Configuration environment (default: $REGFLOW_ENV or development)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run decider, worker and one execution in this process on the in-memory backend
    Demo {
        /// Answer the email prompt with this value instead of asking on the console
        #[arg(long)]
        email: Option<String>,

        /// Answer the phone prompt with this value instead of asking on the console
        #[arg(long)]
        phone: Option<String>,

        /// Confirm subscriptions automatically after this many milliseconds
        #[arg(long, default_value_t = 500)]
        confirm_after_ms: u64,

        #[arg(long, default_value = "regflow-demo")]
        workflow_id: String,
    },

    /// Poll decision tasks until interrupted
    Decider,

    /// Poll activity tasks until interrupted
    Worker,

    /// Start a new execution
    Start {
        #[arg(long)]
        workflow_id: String,

        /// JSON object passed to the first step as `execution_input`
        #[arg(long)]
        input: Option<String>,
    },

    /// Show an execution's status and history
    Status {
        #[arg(long)]
        run_id: Uuid,
    },

    /// Load and validate the configuration, then print it
    ValidateConfig,
}

fn load_config(cli: &Cli) -> anyhow::Result<WorkflowConfig> {
    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
        .context("loading configuration")?;
    Ok(manager.config().clone())
}

fn notifier(config: &WorkflowConfig) -> Arc<InMemoryNotificationService> {
    match config.notification.auto_confirm_after_ms {
        Some(ms) => Arc::new(InMemoryNotificationService::with_auto_confirm(
            Duration::from_millis(ms),
        )),
        None => Arc::new(InMemoryNotificationService::new()),
    }
}

async fn bootstrap(
    config: WorkflowConfig,
    notifications: Arc<dyn NotificationService>,
    user_input: Arc<dyn UserInput>,
) -> anyhow::Result<RegistrationSystem> {
    let service = connect_service(&config).await?;
    Ok(RegistrationSystem::bootstrap(config, service, notifications, user_input).await?)
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
        }
        token.cancel();
    });
    shutdown
}

fn print_history(history: &[HistoryEvent]) {
    for event in history {
        println!(
            "{:>4}  {}  {}",
            event.event_id,
            event.event_timestamp.format("%H:%M:%S%.3f"),
            event.event_type()
        );
    }
}

async fn run_demo(
    mut config: WorkflowConfig,
    email: Option<String>,
    phone: Option<String>,
    confirm_after_ms: u64,
    workflow_id: String,
) -> anyhow::Result<()> {
    config.orchestrator.backend = BackendKind::Memory;
    config.notification.auto_confirm_after_ms = Some(confirm_after_ms);

    let user_input: Arc<dyn UserInput> = if email.is_some() || phone.is_some() {
        Arc::new(ScriptedUserInput::new([
            email.unwrap_or_default(),
            phone.unwrap_or_default(),
        ]))
    } else {
        Arc::new(ConsoleUserInput::new())
    };
    let notifications = notifier(&config);
    let execution_limit = Duration::from_millis(config.workflow.execution_timeout_ms);
    let system = bootstrap(config, notifications, user_input).await?;

    let shutdown = shutdown_on_ctrl_c();
    let worker = system.activity_worker()?;
    let coordinator = system.coordinator();
    let worker_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };
    let coordinator_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { coordinator.run(shutdown).await })
    };

    let execution = system.start_execution(&workflow_id, None).await?;
    let closed = tokio::select! {
        _ = shutdown.cancelled() => None,
        closed = system.wait_for_close(execution.run_id, Duration::from_millis(100), execution_limit) => Some(closed),
    };
    shutdown.cancel();
    let worker_stats = worker_handle.await?;
    let coordinator_stats = coordinator_handle.await?;

    let Some(info) = closed.transpose()? else {
        warn!("Demo interrupted before the execution closed");
        return Ok(());
    };
    println!("Execution {} finished: {}", info.execution, info.status);
    print_history(&system.history(execution.run_id).await?);
    println!(
        "worker: {} completed, {} failed; coordinator: {} decision tasks",
        worker_stats.completed, worker_stats.failed, coordinator_stats.decision_tasks
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_structured_logging(&config.logging);

    match cli.command {
        Commands::Demo {
            email,
            phone,
            confirm_after_ms,
            workflow_id,
        } => run_demo(config, email, phone, confirm_after_ms, workflow_id).await?,
        Commands::Decider => {
            let notifications = notifier(&config);
            let system = bootstrap(config, notifications, Arc::new(ScriptedUserInput::default())).await?;
            let stats = system.coordinator().run(shutdown_on_ctrl_c()).await;
            info!(?stats, "Decider stopped");
        }
        Commands::Worker => {
            let notifications = notifier(&config);
            let system = bootstrap(config, notifications, Arc::new(ConsoleUserInput::new())).await?;
            let stats = system.activity_worker()?.run(shutdown_on_ctrl_c()).await;
            info!(?stats, "Worker stopped");
        }
        Commands::Start { workflow_id, input } => {
            let input = input
                .as_deref()
                .map(Payload::from_text)
                .transpose()
                .context("--input must be a JSON object")?;
            let notifications = notifier(&config);
            let system = bootstrap(config, notifications, Arc::new(ScriptedUserInput::default())).await?;
            let execution = system.start_execution(&workflow_id, input).await?;
            println!("{}", execution.run_id);
        }
        Commands::Status { run_id } => {
            if config.orchestrator.backend == BackendKind::Memory {
                bail!("status needs a shared backend; set orchestrator.backend to postgres");
            }
            let notifications = notifier(&config);
            let system = bootstrap(config, notifications, Arc::new(ScriptedUserInput::default())).await?;
            let info = system.describe(run_id).await?;
            println!(
                "{} {} {} (open activity tasks: {})",
                info.execution, info.workflow_type, info.status, info.open_activity_tasks
            );
            print_history(&system.history(run_id).await?);
        }
        Commands::ValidateConfig => {
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("✅ Configuration is valid");
        }
    }
    Ok(())
}
