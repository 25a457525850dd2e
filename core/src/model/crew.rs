use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    #[default]
    Sequential,
    Hierarchical,
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Hierarchical => f.write_str("hierarchical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewStatus {
    Draft,
    #[default]
    Active,
    Archived,
}

impl fmt::Display for CrewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => f.write_str("draft"),
            Self::Active => f.write_str("active"),
            Self::Archived => f.write_str("archived"),
        }
    }
}

/// Free-form crew settings. Known flags are typed, anything else is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrewConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub memory: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Rolling statistics, mutated exactly once per terminal execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrewStats {
    #[serde(default)]
    pub total_executions: u64,
    #[serde(default)]
    pub successful_executions: u64,
    #[serde(default)]
    pub failed_executions: u64,
    /// Running mean over completed executions, in seconds.
    #[serde(default)]
    pub average_execution_time: f64,
}

impl CrewStats {
    pub fn record_completed(&mut self, duration_secs: f64) {
        self.total_executions += 1;
        self.successful_executions += 1;
        let n = self.successful_executions as f64;
        self.average_execution_time += (duration_secs - self.average_execution_time) / n;
    }

    pub fn record_failed(&mut self) {
        self.total_executions += 1;
        self.failed_executions += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.total_executions += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: None,
            max_tokens: None,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewAgent {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub backstory: String,
    /// Ordered tool capabilities.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Display / tie-break hint only.
    #[serde(default)]
    pub order: i32,
}

fn default_max_iterations() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewTask {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub expected_output: String,
    /// Task-specific input variables.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Ids of other tasks of the same crew.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crew {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub process_type: ProcessType,
    #[serde(default)]
    pub configuration: CrewConfiguration,
    #[serde(default)]
    pub status: CrewStatus,
    #[serde(default)]
    pub stats: CrewStats,
    #[serde(default)]
    pub agents: Vec<CrewAgent>,
    #[serde(default)]
    pub tasks: Vec<CrewTask>,
}

impl Crew {
    pub fn agent(&self, agent_id: &str) -> Option<&CrewAgent> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    pub fn agent_index(&self, agent_id: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.id == agent_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&CrewTask> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Agents sorted by their `order` hint, insertion order breaking ties.
    pub fn agents_by_order(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.agents.len()).collect();
        idx.sort_by_key(|&i| (self.agents[i].order, i));
        idx
    }
}
