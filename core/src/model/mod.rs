//! Crew definitions and execution records.
//!
//! `Crew`, `CrewAgent` and `CrewTask` are owned by the surrounding CRUD layer
//! and read-only to the engine (except the rolling statistics, which only the
//! stats aggregator writes). `CrewExecution` and `CrewExecutionLog` are the
//! durable records the engine produces.

pub mod crew;
pub mod execution;
pub mod log;

pub use crew::{
    Crew, CrewAgent, CrewConfiguration, CrewStats, CrewStatus, CrewTask, LlmConfig, ProcessType,
};
pub use execution::{CrewExecution, ExecutionStatus, RunMode, TaskResult};
pub use log::{CrewExecutionLog, LogEvent, LogLevel, NewLogEntry};
