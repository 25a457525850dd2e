use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Local};
use crewline_core::api::CrewEngine;
use tokio::sync::broadcast;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub session_id: String,
    pub engine: CrewEngine,
    pub stats: Arc<RwLock<ServerStats>>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(session_id: String, engine: CrewEngine, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            session_id,
            engine,
            stats: Arc::new(RwLock::new(ServerStats::new())),
            shutdown_tx,
        }
    }

    pub fn stats(&self) -> RwLockReadGuard<'_, ServerStats> {
        self.stats.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn stats_mut(&self) -> RwLockWriteGuard<'_, ServerStats> {
        self.stats.write().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct ServerStats {
    pub requests_total: u64,
    pub requests_by_endpoint: HashMap<String, u64>,
    pub errors_total: u64,
    pub start_time: DateTime<Local>,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            requests_total: 0,
            requests_by_endpoint: HashMap::new(),
            errors_total: 0,
            start_time: Local::now(),
        }
    }

    pub fn increment_request(&mut self, endpoint: &str) {
        self.requests_total += 1;
        *self
            .requests_by_endpoint
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    pub fn increment_error(&mut self) {
        self.errors_total += 1;
    }

    pub fn uptime_seconds(&self) -> f64 {
        (Local::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}
