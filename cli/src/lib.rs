//! crewline CLI library: command handlers and the HTTP surface, exposed for tests.

pub mod commands;
pub mod crews;
pub mod error;
pub mod http;
pub mod progress;
