//! `real` mode runner: OpenAI-compatible chat completions over HTTP.

use std::{error::Error as StdError, fmt, time::Duration};

use async_trait::async_trait;
use crewline_core::api::{AgentRunner, LlmServiceConfig, RunOutput, RunRequest, RunnerError};
use serde::{Deserialize, Serialize};

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmHttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Unknown,
}

impl LlmHttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LlmHttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct LlmHttpError {
    kind: LlmHttpErrorKind,
    status: Option<u16>,
    url: String,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl LlmHttpError {
    pub fn kind(&self) -> LlmHttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        let kind = if err.is_timeout() {
            LlmHttpErrorKind::Timeout
        } else if err.is_connect() {
            LlmHttpErrorKind::Connect
        } else if err.is_request() {
            LlmHttpErrorKind::Request
        } else if err.is_body() {
            LlmHttpErrorKind::Body
        } else if err.is_decode() {
            LlmHttpErrorKind::Decode
        } else {
            LlmHttpErrorKind::Unknown
        };
        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: url.to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    fn status_error(status: u16, url: &str, preview: String) -> Self {
        Self {
            kind: LlmHttpErrorKind::Status,
            status: Some(status),
            url: url.to_string(),
            message: preview,
            source: None,
        }
    }

    fn decode_error(status: u16, url: &str, err: serde_json::Error, preview: String) -> Self {
        Self {
            kind: LlmHttpErrorKind::Decode,
            status: Some(status),
            url: url.to_string(),
            message: format!("failed to decode response body: {} | body={}", err, preview),
            source: Some(Box::new(err)),
        }
    }
}

impl fmt::Display for LlmHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "llm http error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        write!(f, " url={}: {}", self.url, self.message)
    }
}

impl StdError for LlmHttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

impl From<LlmHttpError> for RunnerError {
    fn from(err: LlmHttpError) -> Self {
        let msg = err.to_string();
        match (err.kind, err.status) {
            (LlmHttpErrorKind::Timeout | LlmHttpErrorKind::Connect, _) => Self::Transient(msg),
            (LlmHttpErrorKind::Status, Some(429)) => Self::Transient(msg),
            (LlmHttpErrorKind::Status, Some(s)) if s >= 500 => Self::Transient(msg),
            (LlmHttpErrorKind::Status, Some(401 | 403)) => Self::Fatal(msg),
            (LlmHttpErrorKind::Decode, _) => Self::InvalidResponse(msg),
            _ => Self::Failed(msg),
        }
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

fn system_prompt(request: &RunRequest) -> String {
    let agent = &request.agent;
    let mut prompt = format!("You are {}, acting as {}.", agent.name, agent.role);
    if !agent.goal.is_empty() {
        prompt.push_str(&format!("\nGoal: {}", agent.goal));
    }
    if !agent.backstory.is_empty() {
        prompt.push_str(&format!("\nBackstory: {}", agent.backstory));
    }
    if !agent.tools.is_empty() {
        prompt.push_str(&format!("\nTools: {}", agent.tools.join(", ")));
    }
    prompt
}

fn user_prompt(request: &RunRequest) -> String {
    let mut prompt = format!("Task: {}", request.description);
    if !request.expected_output.is_empty() {
        prompt.push_str(&format!("\nExpected output: {}", request.expected_output));
    }
    if !request.context.is_empty() {
        prompt.push_str("\n\nContext:");
        for (key, value) in &request.context {
            prompt.push_str(&format!("\n[{}]\n{}", key, value));
        }
    }
    prompt
}

#[derive(Clone)]
pub struct LlmAgentRunner {
    http: reqwest::Client,
    api_key: String,
    default_model: String,
    url_completions: String,
}

impl LlmAgentRunner {
    pub fn new(cfg: &LlmServiceConfig) -> Result<Self, RunnerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| RunnerError::Fatal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            default_model: cfg.default_model.clone(),
            url_completions: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
        })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn complete(&self, body: &ChatRequest<'_>) -> Result<ChatResponse, LlmHttpError> {
        let url = &self.url_completions;
        let resp = self
            .auth(self.http.post(url).json(body))
            .send()
            .await
            .map_err(|err| LlmHttpError::from_reqwest(err, url))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| LlmHttpError::from_reqwest(err, url))?;
        if !status.is_success() {
            return Err(LlmHttpError::status_error(
                status.as_u16(),
                url,
                preview_body(&text),
            ));
        }
        serde_json::from_str::<ChatResponse>(&text).map_err(|err| {
            LlmHttpError::decode_error(status.as_u16(), url, err, preview_body(&text))
        })
    }
}

#[async_trait]
impl AgentRunner for LlmAgentRunner {
    fn name(&self) -> &str {
        "llm"
    }

    async fn run(&self, request: &RunRequest) -> Result<RunOutput, RunnerError> {
        let llm = &request.agent.llm;
        let model = if llm.model.trim().is_empty() {
            self.default_model.as_str()
        } else {
            llm.model.as_str()
        };
        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(request),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(request),
                },
            ],
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        };
        tracing::debug!(
            target: "crewline.runner",
            stage = "llm.completion.in",
            url = %self.url_completions,
            model = %model,
            execution_id = %request.execution_id,
            task_id = %request.task_id
        );

        let resp = self.complete(&body).await?;
        let tokens_used = resp.usage.map(|u| u.total_tokens).unwrap_or(0);
        let output = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| RunnerError::InvalidResponse("completion has no content".to_string()))?;

        tracing::debug!(
            target: "crewline.runner",
            stage = "llm.completion.out",
            task_id = %request.task_id,
            tokens_used,
            output_len = output.len()
        );
        Ok(RunOutput::new(output, tokens_used))
    }
}
