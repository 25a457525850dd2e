//! Live progress for `crewline run`, fed by engine events.

use std::time::Duration;

use crewline_core::api::{ExecutionEvent, LogEvent};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

#[derive(Clone)]
pub struct ProgressDisplay {
    execution_id: Uuid,
    bar: ProgressBar,
}

impl ProgressDisplay {
    /// Draws on stderr when it is a terminal and `enabled`, otherwise stays hidden.
    pub fn new(execution_id: Uuid, planned_tasks: usize, enabled: bool) -> Self {
        let bar = if enabled && atty::is(atty::Stream::Stderr) {
            let bar = ProgressBar::new(planned_tasks as u64);
            if let Ok(style) =
                ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} tasks {wide_msg}")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_length(planned_tasks as u64);
        Self { execution_id, bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Apply one event; true once the execution reached a terminal status.
    pub fn apply(&self, event: &ExecutionEvent) -> bool {
        if event.execution_id() != self.execution_id {
            return false;
        }
        match event {
            ExecutionEvent::StatusChanged { status, .. } => {
                self.bar.set_message(status.to_string());
                status.is_terminal()
            }
            ExecutionEvent::Log(row) => {
                let task = row.task_id.as_deref().unwrap_or("-");
                match row.event {
                    LogEvent::TaskStarted => self.bar.set_message(format!("running {task}")),
                    LogEvent::TaskCompleted | LogEvent::TaskFailed | LogEvent::TaskSkipped => {
                        self.bar.inc(1);
                        if row.event != LogEvent::TaskCompleted {
                            self.bar.println(format!("  {}: {}", task, row.message));
                        }
                    }
                    LogEvent::ManagerDelegation => self.bar.set_message(row.message.clone()),
                    _ => {}
                }
                false
            }
        }
    }

    /// Consume events until the execution finishes or the channel closes.
    pub async fn follow(self, mut rx: broadcast::Receiver<ExecutionEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if self.apply(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "progress display lagged behind engine events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }
}
