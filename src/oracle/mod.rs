//! Language-model oracle abstraction and implementations.
//!
//! Defines the [`Oracle`] capability and concrete implementations:
//! - **[`DisabledOracle`]**: always fails; used when no provider is configured.
//! - **[`OpenAIOracle`]**: calls an OpenAI-compatible `/chat/completions`
//!   endpoint in JSON mode.
//! - **[`fake::FakeOracle`]**: scripted replies for deterministic tests.
//!
//! Oracle answers are never trusted blindly: an implementation only
//! guarantees that it returns a JSON value, and every caller validates
//! the shape it needs.
//!
//! # Retry Strategy
//!
//! [`complete_with_retry`] wraps any oracle with a caller-side timeout and
//! exponential backoff:
//! - timeout, network error, HTTP 429 and 5xx → retry
//! - HTTP 4xx (not 429), malformed JSON → fail immediately
//! - backoff: 2s, 4s, 8s with the default `backoff_base_secs = 2`
//!
//! A timeout is a transient failure, never a "not related" answer.

pub mod fake;

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::{OracleError, PipelineError, PipelineResult};

/// Which instruction contract a request follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleTask {
    Extract,
    Screen,
    Verify,
}

impl OracleTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleTask::Extract => "extract",
            OracleTask::Screen => "screen",
            OracleTask::Verify => "verify",
        }
    }
}

/// One oracle call: a fixed system prompt and the task-specific user text.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub task: OracleTask,
    pub system_prompt: String,
    pub user_text: String,
}

/// A fallible natural-language judgment service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Identifier for logs (e.g. the model name).
    fn name(&self) -> &str;

    /// Run one request and return the parsed JSON object it produced.
    async fn complete(&self, request: &OracleRequest) -> std::result::Result<Value, OracleError>;
}

/// Timeout and backoff settings for oracle calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.backoff_base_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Delay before retry number `retry` (1-based): base, 2×base, 4×base, …
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * (1u32 << (retry - 1).min(5))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Call `oracle` with a timeout per attempt, retrying transient failures.
///
/// Non-transient failures return at once. When retries run out the result
/// is [`PipelineError::TransientIo`] and the caller skips the unit.
pub async fn complete_with_retry(
    oracle: &dyn Oracle,
    request: &OracleRequest,
    policy: &RetryPolicy,
) -> PipelineResult<Value> {
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }

        debug!(
            oracle = oracle.name(),
            task = request.task.as_str(),
            attempt,
            chars = request.user_text.chars().count(),
            "oracle call"
        );

        let outcome = match tokio::time::timeout(policy.timeout, oracle.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(
                    task = request.task.as_str(),
                    attempt,
                    error = %e,
                    "transient oracle failure"
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(PipelineError::TransientIo {
        attempts: policy.max_retries + 1,
        source: last_err.unwrap_or_else(|| OracleError::Transport("no attempt made".to_string())),
    })
}

// ============ Disabled Oracle ============

/// An oracle that refuses every request.
///
/// Used when `oracle.provider = "disabled"`. Commands that need no oracle
/// (sweep, compact, index) still work.
pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &OracleRequest) -> std::result::Result<Value, OracleError> {
        Err(OracleError::Disabled)
    }
}

// ============ OpenAI Oracle ============

/// Oracle backed by an OpenAI-compatible chat completions API.
///
/// Requests JSON mode (`response_format = json_object`) at temperature 0
/// and parses the first choice's message content as JSON.
pub struct OpenAIOracle {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIOracle {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is not set or the API key variable is
    /// missing from the environment.
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("oracle.model required for OpenAI provider"))?;

        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) => key,
            Err(_) => bail!("{} environment variable not set", config.api_key_env),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Oracle for OpenAIOracle {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &OracleRequest) -> std::result::Result<Value, OracleError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_text },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(Duration::ZERO)
                } else {
                    OracleError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                code: status.as_u16(),
                body: body_text,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        parse_chat_response(&json)
    }
}

/// Pull the JSON object out of a chat completions response.
fn parse_chat_response(json: &Value) -> std::result::Result<Value, OracleError> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| OracleError::Malformed("missing choices[0].message.content".to_string()))?;

    parse_json_payload(content)
}

/// Parse model output as a JSON object, tolerating a surrounding code fence.
pub fn parse_json_payload(content: &str) -> std::result::Result<Value, OracleError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: Value = serde_json::from_str(unfenced)
        .map_err(|e| OracleError::Malformed(format!("invalid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(OracleError::Malformed(
            "top-level JSON value is not an object".to_string(),
        ));
    }
    Ok(value)
}

/// Build the oracle named by `config.provider`.
pub fn create_oracle(config: &OracleConfig) -> Result<Box<dyn Oracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledOracle)),
        "openai" => Ok(Box::new(OpenAIOracle::new(config)?)),
        other => bail!("Unknown oracle provider: {}", other),
    }
}
