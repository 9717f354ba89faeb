use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::activities::{Activity, ActivityKind};
use crate::error::{Result, WorkflowError};

/// Activity implementations a worker can dispatch to, fixed at startup
#[derive(Clone, Default)]
pub struct ActivityHandlerRegistry {
    handlers: HashMap<ActivityKind, Arc<dyn Activity>>,
}

impl ActivityHandlerRegistry {
    /// Build the map; two implementations of the same kind are rejected
    pub fn build(activities: impl IntoIterator<Item = Arc<dyn Activity>>) -> Result<Self> {
        let mut handlers: HashMap<ActivityKind, Arc<dyn Activity>> = HashMap::new();
        for activity in activities {
            let kind = activity.kind();
            if handlers.insert(kind, activity).is_some() {
                return Err(WorkflowError::ValidationError(format!(
                    "Activity {kind} is registered more than once"
                )));
            }
            debug!(activity = %kind, "Registered activity handler");
        }
        Ok(Self { handlers })
    }

    /// Resolve a registered activity type name
    pub fn resolve(&self, name: &str) -> Option<(ActivityKind, Arc<dyn Activity>)> {
        let kind = ActivityKind::from_name(name)?;
        self.handlers
            .get(&kind)
            .map(|activity| (kind, Arc::clone(activity)))
    }

    pub fn contains(&self, kind: ActivityKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds in declaration order
    pub fn kinds(&self) -> Vec<ActivityKind> {
        let mut kinds: Vec<ActivityKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ActivityHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityHandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
