//! # Pipeline
//!
//! The fixed, ordered sequence of steps a workflow execution walks through.
//! A step is a single activity or a parallel group with a success combinator.
//! Pipelines are validated once by [`PipelineBuilder`] and never mutated.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use super::definition::ActivityRef;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Pipeline must contain at least one step")]
    Empty,

    #[error("Parallel group at step {step} needs at least two members, found {members}")]
    GroupTooSmall { step: usize, members: usize },

    #[error("Activity {name} appears more than once in the pipeline")]
    DuplicateActivity { name: String },
}

/// Success condition for a parallel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    /// Every member must succeed
    All,
    /// The first success satisfies the group
    Any,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Any => write!(f, "ANY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Single(ActivityRef),
    Group {
        members: Vec<ActivityRef>,
        combinator: Combinator,
    },
}

impl PipelineStep {
    pub fn members(&self) -> &[ActivityRef] {
        match self {
            Self::Single(activity) => std::slice::from_ref(activity),
            Self::Group { members, .. } => members,
        }
    }

    pub fn member(&self, index: usize) -> Option<&ActivityRef> {
        self.members().get(index)
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(activity) => write!(f, "{activity}"),
            Self::Group {
                members,
                combinator,
            } => {
                let names: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "[{} {combinator}]", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&PipelineStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All activity references in pipeline order
    pub fn activities(&self) -> impl Iterator<Item = &ActivityRef> {
        self.steps.iter().flat_map(|step| step.members().iter())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
        write!(f, "{}", steps.join(" -> "))
    }
}

#[derive(Debug, Default)]
pub struct PipelineBuilder {
    steps: Vec<PipelineStep>,
}

impl PipelineBuilder {
    pub fn single(mut self, activity: ActivityRef) -> Self {
        self.steps.push(PipelineStep::Single(activity));
        self
    }

    pub fn group(mut self, members: Vec<ActivityRef>, combinator: Combinator) -> Self {
        self.steps.push(PipelineStep::Group {
            members,
            combinator,
        });
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if let PipelineStep::Group { members, .. } = step {
                if members.len() < 2 {
                    return Err(PipelineError::GroupTooSmall {
                        step: index,
                        members: members.len(),
                    });
                }
            }
            for activity in step.members() {
                if !seen.insert(activity.name.clone()) {
                    return Err(PipelineError::DuplicateActivity {
                        name: activity.name.clone(),
                    });
                }
            }
        }

        Ok(Pipeline { steps: self.steps })
    }
}
