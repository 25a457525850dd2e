//! Persistence seams. The engine only specifies what it records; the
//! in-memory store backs the CLI, the HTTP server and the tests.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{AppendOutcome, CrewStore, ExecutionMutation, ExecutionStore};
