use crewline_core::api::{EngineError, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),

    #[error("crew file error: {0}")]
    CrewFile(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// 0: success, 1: execution failed, 2: execution cancelled (returned as codes, not errors)
/// 11: config error, 12: invalid state, 20: runtime/IO error, 50: internal
pub fn exit_code_for_error(e: &CliError) -> i32 {
    match e {
        CliError::Config(_) | CliError::CrewFile(_) => 11,
        CliError::Engine(err) => match err.kind() {
            ErrorKind::Configuration | ErrorKind::NotFound => 11,
            ErrorKind::InvalidState => 12,
            ErrorKind::TaskExecution | ErrorKind::Cancelled => 20,
            ErrorKind::Internal => 50,
        },
        CliError::Io(_) | CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}
