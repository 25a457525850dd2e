#[allow(clippy::module_inception)]
pub mod error;
pub mod graph;
pub mod runner;
pub mod store;

pub use error::{EngineError, ErrorKind};
pub use graph::GraphError;
pub use runner::RunnerError;
pub use store::StoreError;
