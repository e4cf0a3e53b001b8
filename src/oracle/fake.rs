//! Scripted oracle for tests.
//!
//! Replies are matched by task and an optional substring of the user
//! text, first rule wins. `reply_once` rules are consumed after one use.
//! Requests with no matching rule get an empty-but-valid answer.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{parse_json_payload, Oracle, OracleRequest, OracleTask};
use crate::error::OracleError;

/// What the fake answers with.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// A well-formed JSON object.
    Json(Value),
    /// Raw model text, parsed the way a real provider's content is.
    Raw(String),
    /// A retryable server error (HTTP 503).
    Transient,
    /// Never answers; exercises the caller-side timeout.
    Hang,
}

struct Rule {
    task: OracleTask,
    needle: Option<String>,
    reply: FakeReply,
    once: bool,
    used: bool,
}

/// Deterministic stand-in for a language model.
#[derive(Default)]
pub struct FakeOracle {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<OracleRequest>>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every matching request with `reply`.
    pub fn reply(self, task: OracleTask, needle: Option<&str>, reply: FakeReply) -> Self {
        self.push(task, needle, reply, false)
    }

    /// Answer the next matching request with `reply`, then fall through.
    pub fn reply_once(self, task: OracleTask, needle: Option<&str>, reply: FakeReply) -> Self {
        self.push(task, needle, reply, true)
    }

    fn push(self, task: OracleTask, needle: Option<&str>, reply: FakeReply, once: bool) -> Self {
        self.rules.lock().unwrap().push(Rule {
            task,
            needle: needle.map(str::to_string),
            reply,
            once,
            used: false,
        });
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<OracleRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, task: OracleTask) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task == task)
            .count()
    }

    fn next_reply(&self, request: &OracleRequest) -> FakeReply {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if rule.task != request.task || (rule.once && rule.used) {
                continue;
            }
            if let Some(ref needle) = rule.needle {
                if !request.user_text.contains(needle.as_str()) {
                    continue;
                }
            }
            rule.used = true;
            return rule.reply.clone();
        }
        FakeReply::Json(default_reply(request.task))
    }
}

fn default_reply(task: OracleTask) -> Value {
    match task {
        OracleTask::Extract => json!({ "commitments": [] }),
        OracleTask::Screen => json!({ "related_ids": [] }),
        OracleTask::Verify => json!({
            "is_related": false,
            "relation_type": null,
            "summary": null,
            "is_fulfilled": false,
            "confidence": null
        }),
    }
}

#[async_trait]
impl Oracle for FakeOracle {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &OracleRequest) -> Result<Value, OracleError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.next_reply(request) {
            FakeReply::Json(v) => Ok(v),
            FakeReply::Raw(text) => parse_json_payload(&text),
            FakeReply::Transient => Err(OracleError::Status {
                code: 503,
                body: "service unavailable".to_string(),
            }),
            FakeReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(OracleError::Timeout(Duration::from_secs(3600)))
            }
        }
    }
}
