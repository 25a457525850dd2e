//! Crew execution engine.
//!
//! Turns a crew definition (agents, tasks, dependency graph, process mode)
//! into a running, observable unit of work with durable logs and metering.

pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events_out;
pub mod executor;
pub mod metering;
pub mod model;
pub mod runner;
pub mod state;
pub mod store;
