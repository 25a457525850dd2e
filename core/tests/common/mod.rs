#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crewline_core::api::{
    AgentRunner, Crew, CrewAgent, CrewConfiguration, CrewEngine, CrewStats, CrewStatus, CrewTask,
    EngineSettings, InMemoryStore, LlmConfig, ProcessType, RunMode, RunOutput, RunRequest,
    RunnerError, RunnerSet, Services,
};
use tokio::sync::Notify;

pub struct CrewBuilder {
    crew: Crew,
}

impl CrewBuilder {
    pub fn new(id: &str, process_type: ProcessType) -> Self {
        Self {
            crew: Crew {
                id: id.to_string(),
                tenant_id: "tenant-1".to_string(),
                name: format!("{id} crew"),
                process_type,
                configuration: CrewConfiguration::default(),
                status: CrewStatus::Active,
                stats: CrewStats::default(),
                agents: vec![],
                tasks: vec![],
            },
        }
    }

    pub fn sequential(id: &str) -> Self {
        Self::new(id, ProcessType::Sequential)
    }

    pub fn hierarchical(id: &str) -> Self {
        Self::new(id, ProcessType::Hierarchical)
    }

    pub fn agent(mut self, id: &str, role: &str) -> Self {
        let order = self.crew.agents.len() as i32;
        self.crew.agents.push(CrewAgent {
            id: id.to_string(),
            name: id.to_string(),
            role: role.to_string(),
            goal: format!("be a good {role}"),
            backstory: String::new(),
            tools: vec![],
            llm: LlmConfig {
                model: "test-model".to_string(),
                ..LlmConfig::default()
            },
            max_iterations: 5,
            order,
        });
        self
    }

    pub fn task(mut self, id: &str, agent: Option<&str>, deps: &[&str]) -> Self {
        let order = self.crew.tasks.len() as i32;
        self.crew.tasks.push(CrewTask {
            id: id.to_string(),
            agent_id: agent.map(str::to_string),
            description: format!("Do {id}"),
            expected_output: format!("{id} result"),
            context: BTreeMap::new(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            order,
        });
        self
    }

    pub fn task_with(mut self, task: CrewTask) -> Self {
        self.crew.tasks.push(task);
        self
    }

    pub fn status(mut self, status: CrewStatus) -> Self {
        self.crew.status = status;
        self
    }

    pub fn build(self) -> Crew {
        self.crew
    }
}

/// The A -> B -> C chain used by most scenarios.
pub fn abc_crew(id: &str) -> Crew {
    CrewBuilder::sequential(id)
        .agent("writer", "writer")
        .task("A", Some("writer"), &[])
        .task("B", Some("writer"), &["A"])
        .task("C", Some("writer"), &["B"])
        .build()
}

pub struct Hold {
    pub entered: Notify,
    pub release: Notify,
}

/// Deterministic runner: every call returns `output` with `tokens` tokens
/// unless scripted otherwise.
pub struct ScriptedRunner {
    output: String,
    tokens: u64,
    attempts: u32,
    fail_on: Mutex<HashSet<String>>,
    fatal_on: HashSet<String>,
    fail_when: Option<(String, String)>,
    delay: Option<Duration>,
    holds: Mutex<BTreeMap<String, Arc<Hold>>>,
    calls: Mutex<Vec<RunRequest>>,
}

impl ScriptedRunner {
    pub fn new(output: &str, tokens: u64) -> Self {
        Self {
            output: output.to_string(),
            tokens,
            attempts: 1,
            fail_on: Mutex::new(HashSet::new()),
            fatal_on: HashSet::new(),
            fail_when: None,
            delay: None,
            holds: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(self, task_id: &str) -> Self {
        self.fail_on.lock().unwrap().insert(task_id.to_string());
        self
    }

    pub fn fatal_on(mut self, task_id: &str) -> Self {
        self.fatal_on.insert(task_id.to_string());
        self
    }

    /// Fail any task whose merged context has `key == value`.
    pub fn fail_when(mut self, key: &str, value: &str) -> Self {
        self.fail_when = Some((key.to_string(), value.to_string()));
        self
    }

    /// Report this many internal attempts per accepted result.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Block calls for `task_id` until the test releases them.
    pub fn hold(&self, task_id: &str) -> Arc<Hold> {
        let hold = Arc::new(Hold {
            entered: Notify::new(),
            release: Notify::new(),
        });
        self.holds
            .lock()
            .unwrap()
            .insert(task_id.to_string(), hold.clone());
        hold
    }

    pub fn clear_failures(&self) {
        self.fail_on.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<RunRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_tasks(&self) -> Vec<String> {
        self.calls().into_iter().map(|r| r.task_id).collect()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, request: &RunRequest) -> Result<RunOutput, RunnerError> {
        self.calls.lock().unwrap().push(request.clone());

        let hold = self.holds.lock().unwrap().get(&request.task_id).cloned();
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fatal_on.contains(&request.task_id) {
            return Err(RunnerError::Fatal("credentials rejected".into()));
        }
        if self.fail_on.lock().unwrap().contains(&request.task_id) {
            return Err(RunnerError::Failed(format!("{} exploded", request.task_id)));
        }
        if let Some((key, value)) = &self.fail_when {
            if request.context.get(key) == Some(value) {
                return Err(RunnerError::Failed(format!("{key} was {value}")));
            }
        }

        Ok(RunOutput {
            output: self.output.clone(),
            tokens_used: self.tokens,
            attempts: self.attempts,
        })
    }
}

pub fn services(runner: Arc<ScriptedRunner>) -> Services {
    Services::new(RunnerSet::new().with(RunMode::Mock, runner))
}

pub async fn engine_with(
    store: Arc<InMemoryStore>,
    services: Services,
    settings: EngineSettings,
) -> CrewEngine {
    CrewEngine::builder(store.clone(), store)
        .services(services)
        .settings(settings)
        .build()
}

/// Store seeded with `crews` and an engine over it with default settings.
pub async fn setup(crews: Vec<Crew>, runner: Arc<ScriptedRunner>) -> (Arc<InMemoryStore>, CrewEngine) {
    let store = Arc::new(InMemoryStore::new());
    for crew in crews {
        store.put_crew(crew).await;
    }
    let engine = engine_with(store.clone(), services(runner), EngineSettings::default()).await;
    (store, engine)
}

pub fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
