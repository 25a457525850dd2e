//! Graph resolution and plan execution.
//!
//! ```text
//! Crew.tasks
//!   ↓
//! TaskGraph::build() → validate() (cycle with the ids on it)
//!   ↓
//! ExecutionPlan::resolve() → ProcessPlan::{Sequential, Hierarchical}
//!   ↓
//! TaskScheduler::drive() → runner call per task, rows into the metering sink
//! ```

mod context;
pub mod delegation;
mod graph;
mod plan;
mod scheduler;

pub use context::{interpolate, merge_context};
pub use delegation::{DelegationContext, DelegationDecision, DelegationPolicy, FirstReadyPolicy};
pub use graph::TaskGraph;
pub use plan::{select_manager, ExecutionPlan, PlanSummary, ProcessPlan};
pub use scheduler::TaskScheduler;
