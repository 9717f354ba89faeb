//! # Decider
//!
//! Turns a decision task into decisions. The full history is replayed into a
//! fresh [`ExecutionStateMachine`] every time; decisions produced by events the
//! previous decision task already answered are dropped, so the result depends
//! only on the history, never on which decider process handles the task.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::messaging::DecisionTask;
use crate::models::{Decision, DefinitionKey, Pipeline};
use crate::state_machine::{
    DeciderState, ExecutionStateMachine, StateMachineError, StateMachineResult,
};

/// Decisions for one decision task plus where the execution stands
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub decisions: Vec<Decision>,
    pub state: DeciderState,
    pub cursor: usize,
    pub new_events: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Decider {
    pipelines: HashMap<DefinitionKey, Arc<Pipeline>>,
}

impl Decider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, workflow_type: DefinitionKey, pipeline: Arc<Pipeline>) -> Self {
        self.register(workflow_type, pipeline);
        self
    }

    pub fn register(&mut self, workflow_type: DefinitionKey, pipeline: Arc<Pipeline>) {
        self.pipelines.insert(workflow_type, pipeline);
    }

    pub fn pipeline(&self, workflow_type: &DefinitionKey) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(workflow_type)
    }

    pub fn decide(&self, task: &DecisionTask) -> StateMachineResult<DecisionOutcome> {
        let pipeline = self.pipelines.get(&task.workflow_type).ok_or_else(|| {
            StateMachineError::UnknownWorkflowType {
                workflow_type: task.workflow_type.clone(),
            }
        })?;

        let mut machine = ExecutionStateMachine::new(Arc::clone(pipeline));
        let mut decisions = Vec::new();
        let mut new_events = 0;

        for event in &task.events {
            let produced = machine.apply(event)?;
            if event.event_id > task.previous_started_event_id {
                new_events += 1;
                decisions.extend(produced);
            } else if !produced.is_empty() {
                debug!(
                    event_id = event.event_id,
                    discarded = produced.len(),
                    "Discarding decisions already made by an earlier decision task"
                );
            }
        }

        Ok(DecisionOutcome {
            decisions,
            state: machine.state(),
            cursor: machine.cursor(),
            new_events,
        })
    }
}
