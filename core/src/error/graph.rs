use thiserror::Error;

/// Configuration errors raised while resolving a crew's task graph.
///
/// All of these are fatal before an execution starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Dependency not found: task '{task_id}' depends on '{missing_dep}'")]
    DependencyNotFound { task_id: String, missing_dep: String },

    #[error("Circular dependency detected: {}", format_cycle(.0))]
    Cycle(Vec<String>),

    #[error("Task '{0}' has no assigned agent (only allowed in hierarchical mode)")]
    UnassignedTask(String),

    #[error("Task '{task_id}' is assigned to unknown agent '{agent_id}'")]
    UnknownAgent { task_id: String, agent_id: String },

    #[error("Hierarchical crew has no agent that can act as manager")]
    NoManager,
}

impl GraphError {
    /// Task ids on the detected cycle, in dependency order.
    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            Self::Cycle(ids) => Some(ids),
            _ => None,
        }
    }
}

fn format_cycle(ids: &[String]) -> String {
    ids.join(" -> ")
}
