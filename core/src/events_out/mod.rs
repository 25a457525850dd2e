//! Optional JSONL mirror of execution log rows.

pub mod writer;

pub use crate::config::EventsOutConfig;
pub use writer::{start_events_out, write_log_row, EventsOutTx};
