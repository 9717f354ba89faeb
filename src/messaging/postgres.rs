//! # PostgreSQL Orchestration Service
//!
//! Durable backend: executions, history and activity tasks live in Postgres,
//! so deciders and workers in separate processes can be killed and restarted
//! freely. Every mutation runs in one transaction that locks the execution row
//! (`SELECT ... FOR UPDATE`), applies the shared [`ExecutionLedger`] rules and
//! writes the new history events. Pollers claim work with
//! `FOR UPDATE SKIP LOCKED`. An activity task row is always locked before its
//! execution row.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::errors::{MessagingError, MessagingResult};
use super::ledger::{ActivityTaskRecord, DecisionSlot, ExecutionLedger};
use super::message::{
    ActivityTask, DecisionTask, DomainRegistration, HeartbeatStatus, StartExecutionRequest,
    TaskToken,
};
use super::service::OrchestrationService;
use crate::models::{
    ActivityDefinition, Decision, DefinitionKey, DefinitionKind, EventKind, ExecutionInfo,
    HistoryEvent, RegisteredDefinition, WorkflowDefinition, WorkflowExecution,
};

const SCHEMA: &str = include_str!("../../migrations/20250101000000_orchestration_schema.sql");

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn has_error_code(err: &sqlx::Error, code: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|actual| actual == code)
}

#[derive(Debug, Clone)]
pub struct PgServiceConfig {
    pub poll_timeout: Duration,
    /// Delay between claim attempts while long-polling
    pub poll_interval: Duration,
}

impl Default for PgServiceConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
        }
    }
}

pub struct PgOrchestrationService {
    pool: PgPool,
    config: PgServiceConfig,
    last_sweep: Mutex<HashMap<String, Instant>>,
}

impl PgOrchestrationService {
    pub fn new(pool: PgPool, config: PgServiceConfig) -> Self {
        Self {
            pool,
            config,
            last_sweep: Mutex::new(HashMap::new()),
        }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        config: PgServiceConfig,
    ) -> MessagingResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| MessagingError::database_query("connect", e.to_string()))?;
        info!(max_connections, "Orchestration database pool initialized");
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the orchestration tables if they do not exist
    pub async fn migrate(&self) -> MessagingResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::database_query("migrate", e.to_string()))?;
        Ok(())
    }

    async fn lock_execution(
        conn: &mut PgConnection,
        run_id: Uuid,
    ) -> MessagingResult<ExecutionLedger> {
        let row = sqlx::query("SELECT ledger FROM regflow_executions WHERE run_id = $1 FOR UPDATE")
            .bind(run_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MessagingError::unknown_resource("workflow execution", run_id))?;
        let Json(ledger): Json<ExecutionLedger> = row.try_get("ledger")?;
        Ok(ledger)
    }

    async fn save_execution(
        conn: &mut PgConnection,
        ledger: &ExecutionLedger,
        events: &[HistoryEvent],
    ) -> MessagingResult<()> {
        for event in events {
            sqlx::query("INSERT INTO regflow_history (run_id, event_id, event) VALUES ($1, $2, $3)")
                .bind(ledger.run_id())
                .bind(event.event_id)
                .bind(Json(event))
                .execute(&mut *conn)
                .await?;
        }

        let decision_token = match &ledger.decision {
            DecisionSlot::Started { task_token, .. } => Some(task_token.as_uuid()),
            DecisionSlot::Idle | DecisionSlot::Scheduled { .. } => None,
        };
        sqlx::query(
            "UPDATE regflow_executions \
             SET status = $2, decision_state = $3, decision_token = $4, ledger = $5, updated_at = now() \
             WHERE run_id = $1",
        )
        .bind(ledger.run_id())
        .bind(ledger.status.to_string())
        .bind(ledger.decision.label())
        .bind(decision_token)
        .bind(Json(ledger))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn insert_activity_tasks(
        conn: &mut PgConnection,
        records: &[ActivityTaskRecord],
    ) -> MessagingResult<()> {
        for record in records {
            sqlx::query(
                "INSERT INTO regflow_activity_tasks \
                 (task_token, run_id, domain, task_list, started, record, scheduled_at) \
                 VALUES ($1, $2, $3, $4, false, $5, $6)",
            )
            .bind(record.task_token.as_uuid())
            .bind(record.run_id())
            .bind(&record.domain)
            .bind(&record.task_list)
            .bind(Json(record))
            .bind(record.scheduled_at)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn delete_activity_task(conn: &mut PgConnection, task_token: TaskToken) -> MessagingResult<()> {
        sqlx::query("DELETE FROM regflow_activity_tasks WHERE task_token = $1")
            .bind(task_token.as_uuid())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn load_history(conn: &mut PgConnection, run_id: Uuid) -> MessagingResult<Vec<HistoryEvent>> {
        let rows = sqlx::query("SELECT event FROM regflow_history WHERE run_id = $1 ORDER BY event_id")
            .bind(run_id)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter()
            .map(|row| -> MessagingResult<HistoryEvent> {
                let Json(event): Json<HistoryEvent> = row.try_get("event")?;
                Ok(event)
            })
            .collect()
    }

    async fn load_definitions(
        conn: &mut PgConnection,
        domain: &str,
        kind: Option<DefinitionKind>,
    ) -> MessagingResult<Vec<RegisteredDefinition>> {
        let rows = sqlx::query(
            "SELECT definition FROM regflow_definitions \
             WHERE domain = $1 AND ($2::TEXT IS NULL OR kind = $2) ORDER BY created_at, version",
        )
        .bind(domain)
        .bind(kind.map(|k| k.to_string()))
        .fetch_all(&mut *conn)
        .await?;
        rows.iter()
            .map(|row| -> MessagingResult<RegisteredDefinition> {
                let Json(definition): Json<RegisteredDefinition> = row.try_get("definition")?;
                Ok(definition)
            })
            .collect()
    }

    async fn insert_definition(&self, domain: &str, definition: RegisteredDefinition) -> MessagingResult<()> {
        let key = definition.key().clone();
        let kind = definition.kind();
        let result = sqlx::query(
            "INSERT INTO regflow_definitions (domain, kind, name, version, definition) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(domain)
        .bind(kind.to_string())
        .bind(&key.name)
        .bind(&key.version)
        .bind(Json(&definition))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if has_error_code(&err, UNIQUE_VIOLATION) => Err(
                MessagingError::type_already_exists(kind, key.name, key.version),
            ),
            Err(err) if has_error_code(&err, FOREIGN_KEY_VIOLATION) => {
                Err(MessagingError::domain_does_not_exist(domain))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn require_domain(&self, domain: &str) -> MessagingResult<()> {
        let exists = sqlx::query("SELECT 1 FROM regflow_domains WHERE name = $1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(MessagingError::domain_does_not_exist(domain))
        }
    }

    /// Record the timeout of an expired task; returns true if it had expired
    async fn expire_if_due(
        conn: &mut PgConnection,
        record: &ActivityTaskRecord,
    ) -> MessagingResult<bool> {
        let now = Utc::now();
        let Some(timeout_type) = record.expired_timeout(now) else {
            return Ok(false);
        };

        let mut ledger = Self::lock_execution(conn, record.run_id()).await?;
        if ledger.is_open() {
            let mut events = Vec::new();
            ledger.append(record.timed_out_event(timeout_type), now, &mut events);
            Self::save_execution(conn, &ledger, &events).await?;
            debug!(
                run_id = %record.run_id(),
                activity_id = %record.activity_id,
                timeout_type = %timeout_type,
                "Activity task timed out"
            );
        }
        Self::delete_activity_task(conn, record.task_token).await?;
        Ok(true)
    }

    /// Enforce timeouts for one domain, at most once per poll interval
    async fn sweep_timeouts(&self, domain: &str) -> MessagingResult<()> {
        {
            let mut last_sweep = self.last_sweep.lock();
            let now = Instant::now();
            if let Some(previous) = last_sweep.get(domain) {
                if now.duration_since(*previous) < self.config.poll_interval {
                    return Ok(());
                }
            }
            last_sweep.insert(domain.to_string(), now);
        }

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "SELECT t.record, e.status FROM regflow_activity_tasks t \
             JOIN regflow_executions e ON e.run_id = t.run_id \
             WHERE t.domain = $1 FOR UPDATE OF t SKIP LOCKED",
        )
        .bind(domain)
        .fetch_all(&mut *tx)
        .await?;
        for row in rows {
            let Json(record): Json<ActivityTaskRecord> = row.try_get("record")?;
            let status: String = row.try_get("status")?;
            if status != "OPEN" {
                Self::delete_activity_task(&mut tx, record.task_token).await?;
                continue;
            }
            Self::expire_if_due(&mut tx, &record).await?;
        }
        tx.commit().await?;

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "SELECT ledger FROM regflow_executions \
             WHERE domain = $1 AND status = 'OPEN' FOR UPDATE SKIP LOCKED",
        )
        .bind(domain)
        .fetch_all(&mut *tx)
        .await?;
        let now = Utc::now();
        for row in rows {
            let Json(mut ledger): Json<ExecutionLedger> = row.try_get("ledger")?;
            let mut events = Vec::new();
            if ledger.check_timeouts(now, &mut events) {
                Self::save_execution(&mut tx, &ledger, &events).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn try_take_decision(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> MessagingResult<Option<DecisionTask>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT ledger FROM regflow_executions \
             WHERE domain = $1 AND task_list = $2 AND status = 'OPEN' AND decision_state = 'scheduled' \
             ORDER BY updated_at LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .bind(domain)
        .bind(task_list)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let Json(mut ledger): Json<ExecutionLedger> = row.try_get("ledger")?;
        let mut events = Vec::new();
        let Some((task_token, started_event_id)) =
            ledger.start_decision(identity, Utc::now(), &mut events)
        else {
            return Ok(None);
        };
        Self::save_execution(&mut tx, &ledger, &events).await?;
        let history = Self::load_history(&mut tx, ledger.run_id()).await?;
        tx.commit().await?;

        Ok(Some(ledger.decision_task(task_token, started_event_id, history)))
    }

    async fn try_take_activity(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> MessagingResult<Option<ActivityTask>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT t.record FROM regflow_activity_tasks t \
             JOIN regflow_executions e ON e.run_id = t.run_id \
             WHERE t.domain = $1 AND t.task_list = $2 AND NOT t.started AND e.status = 'OPEN' \
             ORDER BY t.scheduled_at LIMIT 1 FOR UPDATE OF t SKIP LOCKED",
        )
        .bind(domain)
        .bind(task_list)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let Json(mut record): Json<ActivityTaskRecord> = row.try_get("record")?;
        if Self::expire_if_due(&mut tx, &record).await? {
            tx.commit().await?;
            return Ok(None);
        }

        let mut ledger = Self::lock_execution(&mut tx, record.run_id()).await?;
        let mut events = Vec::new();
        let task = record.start(&mut ledger, identity, Utc::now(), &mut events);
        Self::save_execution(&mut tx, &ledger, &events).await?;
        sqlx::query("UPDATE regflow_activity_tasks SET started = true, record = $2 WHERE task_token = $1")
            .bind(record.task_token.as_uuid())
            .bind(Json(&record))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(task))
    }

    /// Lock a started activity task, expiring it first if a timeout has passed
    async fn lock_live_activity(
        conn: &mut PgConnection,
        task_token: TaskToken,
    ) -> MessagingResult<Option<ActivityTaskRecord>> {
        let row = sqlx::query("SELECT record FROM regflow_activity_tasks WHERE task_token = $1 FOR UPDATE")
            .bind(task_token.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let Json(record): Json<ActivityTaskRecord> = row.try_get("record")?;
        if Self::expire_if_due(conn, &record).await? {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn resolve_activity(
        &self,
        task_token: TaskToken,
        outcome: impl FnOnce(&ActivityTaskRecord) -> MessagingResult<EventKind> + Send,
    ) -> MessagingResult<()> {
        let mut tx = self.pool.begin().await?;
        let Some(record) = Self::lock_live_activity(&mut tx, task_token).await? else {
            tx.commit().await?;
            return Err(MessagingError::unknown_resource("activity task", task_token));
        };

        let mut ledger = Self::lock_execution(&mut tx, record.run_id()).await?;
        if !ledger.is_open() {
            Self::delete_activity_task(&mut tx, task_token).await?;
            tx.commit().await?;
            return Err(MessagingError::execution_closed(record.run_id()));
        }

        let kind = outcome(&record)?;
        let mut events = Vec::new();
        ledger.append(kind, Utc::now(), &mut events);
        Self::save_execution(&mut tx, &ledger, &events).await?;
        Self::delete_activity_task(&mut tx, task_token).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrchestrationService for PgOrchestrationService {
    async fn register_domain(&self, domain: &DomainRegistration) -> MessagingResult<()> {
        sqlx::query(
            "INSERT INTO regflow_domains (name, description, retention_days) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&domain.name)
        .bind(&domain.description)
        .bind(domain.retention_days as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn register_activity_definition(
        &self,
        domain: &str,
        definition: &ActivityDefinition,
    ) -> MessagingResult<()> {
        self.insert_definition(domain, RegisteredDefinition::Activity(definition.clone()))
            .await
    }

    async fn register_workflow_definition(
        &self,
        domain: &str,
        definition: &WorkflowDefinition,
    ) -> MessagingResult<()> {
        self.insert_definition(domain, RegisteredDefinition::Workflow(definition.clone()))
            .await
    }

    async fn list_definitions(&self, domain: &str) -> MessagingResult<Vec<RegisteredDefinition>> {
        self.require_domain(domain).await?;
        let mut conn = self.pool.acquire().await?;
        Self::load_definitions(&mut conn, domain, None).await
    }

    #[instrument(skip(self, request), fields(workflow_id = %request.workflow_id))]
    async fn start_workflow_execution(
        &self,
        domain: &str,
        request: StartExecutionRequest,
    ) -> MessagingResult<WorkflowExecution> {
        self.require_domain(domain).await?;
        let mut tx = self.pool.begin().await?;

        let workflow_type: DefinitionKey = request.workflow_type.clone();
        let definition = Self::load_definitions(&mut tx, domain, Some(DefinitionKind::Workflow))
            .await?
            .into_iter()
            .filter_map(|d| d.as_workflow().cloned())
            .find(|d| d.key == workflow_type)
            .ok_or_else(|| {
                MessagingError::type_does_not_exist(
                    DefinitionKind::Workflow,
                    workflow_type.name.clone(),
                    workflow_type.version.clone(),
                )
            })?;

        let workflow_id = request.workflow_id.clone();
        let mut events = Vec::new();
        let ledger = ExecutionLedger::start(domain, &definition, request, Utc::now(), &mut events);

        let inserted = sqlx::query(
            "INSERT INTO regflow_executions \
             (run_id, domain, workflow_id, task_list, status, decision_state, ledger, started_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(ledger.run_id())
        .bind(domain)
        .bind(&workflow_id)
        .bind(&ledger.task_list)
        .bind(ledger.status.to_string())
        .bind(ledger.decision.label())
        .bind(Json(&ledger))
        .bind(ledger.started_at)
        .execute(&mut *tx)
        .await;
        match inserted {
            Ok(_) => {}
            Err(err) if has_error_code(&err, UNIQUE_VIOLATION) => {
                return Err(MessagingError::ExecutionAlreadyStarted { workflow_id });
            }
            Err(err) => return Err(err.into()),
        }

        Self::save_execution(&mut tx, &ledger, &events).await?;
        tx.commit().await?;
        debug!(run_id = %ledger.run_id(), "Workflow execution started");
        Ok(ledger.execution)
    }

    async fn describe_workflow_execution(&self, run_id: Uuid) -> MessagingResult<ExecutionInfo> {
        let row = sqlx::query(
            "SELECT e.ledger, \
             (SELECT count(*) FROM regflow_activity_tasks t WHERE t.run_id = e.run_id) AS open_tasks \
             FROM regflow_executions e WHERE e.run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MessagingError::unknown_resource("workflow execution", run_id))?;
        let Json(ledger): Json<ExecutionLedger> = row.try_get("ledger")?;
        let open_tasks: i64 = row.try_get("open_tasks")?;
        Ok(ledger.info(open_tasks.max(0) as usize))
    }

    async fn get_workflow_execution_history(
        &self,
        run_id: Uuid,
    ) -> MessagingResult<Vec<HistoryEvent>> {
        let mut conn = self.pool.acquire().await?;
        let history = Self::load_history(&mut conn, run_id).await?;
        if history.is_empty() {
            return Err(MessagingError::unknown_resource("workflow execution", run_id));
        }
        Ok(history)
    }

    async fn poll_for_decision_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> MessagingResult<Option<DecisionTask>> {
        let deadline = Instant::now() + self.config.poll_timeout;
        loop {
            self.sweep_timeouts(domain).await?;
            if let Some(task) = self.try_take_decision(domain, task_list, identity).await? {
                return Ok(Some(task));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep((deadline - now).min(self.config.poll_interval)).await;
        }
    }

    async fn respond_decision_task_completed(
        &self,
        task_token: TaskToken,
        decisions: Vec<Decision>,
    ) -> MessagingResult<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT run_id FROM regflow_executions WHERE decision_token = $1")
            .bind(task_token.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| MessagingError::unknown_resource("decision task", task_token))?;
        let run_id: Uuid = row.try_get("run_id")?;

        let mut ledger = Self::lock_execution(&mut tx, run_id).await?;
        let activities: HashMap<DefinitionKey, ActivityDefinition> =
            Self::load_definitions(&mut tx, &ledger.domain, Some(DefinitionKind::Activity))
                .await?
                .into_iter()
                .filter_map(|d| d.as_activity().cloned())
                .map(|d| (d.key.clone(), d))
                .collect();

        let mut events = Vec::new();
        let scheduled = ledger.respond_decision(
            task_token,
            decisions,
            |key| activities.get(key).cloned(),
            Utc::now(),
            &mut events,
        )?;
        Self::save_execution(&mut tx, &ledger, &events).await?;
        Self::insert_activity_tasks(&mut tx, &scheduled).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn poll_for_activity_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> MessagingResult<Option<ActivityTask>> {
        let deadline = Instant::now() + self.config.poll_timeout;
        loop {
            self.sweep_timeouts(domain).await?;
            if let Some(task) = self.try_take_activity(domain, task_list, identity).await? {
                return Ok(Some(task));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep((deadline - now).min(self.config.poll_interval)).await;
        }
    }

    async fn respond_activity_task_completed(
        &self,
        task_token: TaskToken,
        result: Option<String>,
    ) -> MessagingResult<()> {
        self.resolve_activity(task_token, |record| record.completed_event(result))
            .await
    }

    async fn respond_activity_task_failed(
        &self,
        task_token: TaskToken,
        reason: &str,
        details: &str,
    ) -> MessagingResult<()> {
        let reason = reason.to_string();
        let details = details.to_string();
        self.resolve_activity(task_token, move |record| {
            record.failed_event(&reason, &details)
        })
        .await
    }

    async fn record_activity_heartbeat(
        &self,
        task_token: TaskToken,
        details: Option<String>,
    ) -> MessagingResult<HeartbeatStatus> {
        let mut tx = self.pool.begin().await?;
        let Some(mut record) = Self::lock_live_activity(&mut tx, task_token).await? else {
            tx.commit().await?;
            return Err(MessagingError::unknown_resource("activity task", task_token));
        };
        record.heartbeat(details, Utc::now())?;
        sqlx::query("UPDATE regflow_activity_tasks SET record = $2 WHERE task_token = $1")
            .bind(task_token.as_uuid())
            .bind(Json(&record))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(HeartbeatStatus::default())
    }
}
