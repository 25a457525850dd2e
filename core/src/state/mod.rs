//! Execution state machine, lifecycle events and crew statistics.

pub mod stats;
pub mod transitions;
pub mod types;

pub use stats::{StatsAggregator, TerminalOutcome};
pub use transitions::{StateTransition, TransitionError};
pub use types::ExecutionEvent;
