use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::RunMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub llm: LlmServiceConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "crewline_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Wall-clock ceiling for a single task call.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Budget per agent iteration; a task gets `max_iterations` of these, capped above.
    #[serde(default = "default_iteration_timeout_ms")]
    pub iteration_timeout_ms: u64,

    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,

    #[serde(default)]
    pub default_mode: RunMode,

    /// Role identifying the manager agent in hierarchical crews.
    #[serde(default)]
    pub manager_role: Option<String>,

    /// `first-ready` or `llm-manager`.
    #[serde(default = "default_delegation_policy")]
    pub delegation_policy: String,

    #[serde(default = "default_cancel_message")]
    pub cancel_message: String,

    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

fn default_task_timeout_ms() -> u64 {
    300_000
}

fn default_iteration_timeout_ms() -> u64 {
    60_000
}

fn default_lease_ttl_ms() -> u64 {
    600_000
}

fn default_delegation_policy() -> String {
    "first-ready".to_string()
}

fn default_cancel_message() -> String {
    "Cancelled by user".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            task_timeout_ms: default_task_timeout_ms(),
            iteration_timeout_ms: default_iteration_timeout_ms(),
            lease_ttl_ms: default_lease_ttl_ms(),
            default_mode: RunMode::default(),
            manager_role: None,
            delegation_policy: default_delegation_policy(),
            cancel_message: default_cancel_message(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

impl EngineSettings {
    /// Ceiling for one task call by an agent allowed `max_iterations` iterations.
    pub fn task_timeout(&self, max_iterations: u32) -> Duration {
        let per_agent = self
            .iteration_timeout_ms
            .saturating_mul(u64::from(max_iterations.max(1)));
        Duration::from_millis(per_agent.min(self.task_timeout_ms))
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmServiceConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Used when an agent does not name a model.
    #[serde(default = "default_llm_model")]
    pub default_model: String,

    #[serde(default = "default_llm_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_request_timeout_ms() -> u64 {
    120_000
}

impl Default for LlmServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            default_model: default_llm_model(),
            request_timeout_ms: default_llm_request_timeout_ms(),
        }
    }
}

/// USD per 1k tokens, by model name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub models: BTreeMap<String, f64>,

    #[serde(default)]
    pub default_usd_per_1k: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_events_path")]
    pub path: String,
    #[serde(default = "default_events_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_drop_when_full")]
    pub drop_when_full: bool,
}

fn default_events_path() -> String {
    "./crewline.events.jsonl".to_string()
}

fn default_events_capacity() -> usize {
    2048
}

fn default_drop_when_full() -> bool {
    true
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_events_path(),
            channel_capacity: default_events_capacity(),
            drop_when_full: default_drop_when_full(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}
