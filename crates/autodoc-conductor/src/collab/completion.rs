use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::agent::retry::{retry, RetryPolicy};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("rate limited by completion service")]
    RateLimited,
    #[error("completion service error: HTTP {status}")]
    Server { status: u16 },
    #[error("completion request rejected: {0}")]
    InvalidRequest(String),
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("unexpected completion response: {0}")]
    Decode(String),
    #[error("no API key configured for completion service")]
    MissingApiKey,
}

impl CompletionError {
    /// Failures worth another attempt after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::RateLimited
                | CompletionError::Server { .. }
                | CompletionError::Transport(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Text generation and embeddings.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, CompletionError>;
}

// ── OpenRouter ──

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible chat and embeddings endpoints, as served by OpenRouter.
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
}

impl OpenRouterClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, CompletionError> {
        if api_key.trim().is_empty() {
            return Err(CompletionError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("autodoc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, CompletionError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| CompletionError::Decode(e.to_string()))
    }
}

fn classify_status(status: StatusCode, body: &str) -> CompletionError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        CompletionError::RateLimited
    } else if status.is_server_error() {
        CompletionError::Server {
            status: status.as_u16(),
        }
    } else {
        let detail: String = body.chars().take(300).collect();
        CompletionError::InvalidRequest(format!("HTTP {}: {detail}", status.as_u16()))
    }
}

#[async_trait::async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = ChatRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %request.model, prompt_chars = request.prompt.len(), "completion request");
        let response: ChatResponse = retry(&self.policy, CompletionError::is_retryable, || {
            self.post_json("chat/completions", &body)
        })
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| CompletionError::Decode("response has no choices".into()))
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, CompletionError> {
        let body = EmbeddingRequest { model, input: text };
        let response: EmbeddingResponse = retry(&self.policy, CompletionError::is_retryable, || {
            self.post_json("embeddings", &body)
        })
        .await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CompletionError::Decode("response has no embedding".into()))
    }
}

/// Strip a surrounding markdown code fence, if the model added one.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}
