use std::time::Duration;

use thiserror::Error;

/// Errors reported by an agent runner for one task call.
#[derive(Error, Debug, Clone)]
pub enum RunnerError {
    /// The agent produced no acceptable output.
    #[error("agent run failed: {0}")]
    Failed(String),

    /// A failure worth retrying inside the adapter (rate limit, 5xx, reset).
    #[error("transient agent failure: {0}")]
    Transient(String),

    /// The adapter itself is unusable (bad credentials, misconfiguration).
    #[error("fatal runner fault: {0}")]
    Fatal(String),

    #[error("task call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("invalid runner response: {0}")]
    InvalidResponse(String),

    #[error("runner not available for mode '{0}'")]
    Unavailable(String),
}

impl RunnerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Unavailable(_))
    }
}
