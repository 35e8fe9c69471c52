//! Scripted model client for tests: no network, deterministic replies.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{AdapterError, CompletionRequest, ModelClient};

enum MockBehavior {
    Reply(String),
    Upstream { status: u16, message: String },
    HangUntilCancelled,
}

struct MockRule {
    /// Vendor model id to match; `None` matches any.
    model: Option<String>,
    /// Substring of the joined message contents; `None` matches any.
    contains: Option<String>,
    behavior: MockBehavior,
}

/// One recorded call (each retry attempt records again).
#[derive(Clone, Debug)]
pub struct MockCall {
    pub model: String,
    pub text: String,
    pub streaming: bool,
}

/// Scripted [`ModelClient`]. Rules are checked in insertion order; the first
/// match wins. Calls without a matching rule fail loudly so a test never
/// silently exercises an unscripted path.
#[derive(Default)]
pub struct MockModelClient {
    rules: Mutex<Vec<MockRule>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a fixed reply for a vendor model id.
    pub fn reply(&self, model: &str, text: &str) {
        self.push(Some(model), None, MockBehavior::Reply(text.to_string()));
    }

    /// Scripts a reply used only when the joined message text contains `needle`.
    pub fn reply_when(&self, model: &str, needle: &str, text: &str) {
        self.push(
            Some(model),
            Some(needle),
            MockBehavior::Reply(text.to_string()),
        );
    }

    /// Scripts an upstream HTTP failure.
    pub fn fail(&self, model: &str, status: u16, message: &str) {
        self.push(
            Some(model),
            None,
            MockBehavior::Upstream {
                status,
                message: message.to_string(),
            },
        );
    }

    /// Scripts a call that emits one partial delta (when streaming) and then
    /// blocks until the request's cancel token fires.
    pub fn hang(&self, model: &str) {
        self.push(Some(model), None, MockBehavior::HangUntilCancelled);
    }

    fn push(&self, model: Option<&str>, contains: Option<&str>, behavior: MockBehavior) {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockRule {
                model: model.map(str::to_string),
                contains: contains.map(str::to_string),
                behavior,
            });
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of attempts recorded for one vendor model id.
    pub fn attempts_for(&self, model: &str) -> usize {
        self.calls().iter().filter(|c| c.model == model).count()
    }

    fn record_and_resolve(
        &self,
        req: &CompletionRequest,
        streaming: bool,
    ) -> Result<ResolvedBehavior, AdapterError> {
        let text = req
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                model: req.model.clone(),
                text: text.clone(),
                streaming,
            });
        let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        for rule in rules.iter() {
            let model_ok = rule.model.as_deref().map_or(true, |m| m == req.model);
            let contains_ok = rule.contains.as_deref().map_or(true, |n| text.contains(n));
            if model_ok && contains_ok {
                return Ok(match &rule.behavior {
                    MockBehavior::Reply(t) => ResolvedBehavior::Reply(t.clone()),
                    MockBehavior::Upstream { status, message } => ResolvedBehavior::Upstream {
                        status: *status,
                        message: message.clone(),
                    },
                    MockBehavior::HangUntilCancelled => ResolvedBehavior::Hang,
                });
            }
        }
        Err(AdapterError::Request(format!(
            "no scripted reply for model {}",
            req.model
        )))
    }
}

enum ResolvedBehavior {
    Reply(String),
    Upstream { status: u16, message: String },
    Hang,
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(&self, req: CompletionRequest) -> Result<String, AdapterError> {
        match self.record_and_resolve(&req, false)? {
            ResolvedBehavior::Reply(t) => Ok(t),
            ResolvedBehavior::Upstream { status, message } => Err(AdapterError::Status {
                status,
                snippet: message,
            }),
            ResolvedBehavior::Hang => {
                req.cancel.cancelled().await;
                Err(AdapterError::Cancelled)
            }
        }
    }

    async fn stream(
        &self,
        req: CompletionRequest,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<String, AdapterError> {
        match self.record_and_resolve(&req, true)? {
            ResolvedBehavior::Reply(t) => {
                let mid = t.chars().count() / 2;
                let split: usize = t
                    .char_indices()
                    .nth(mid)
                    .map(|(i, _)| i)
                    .unwrap_or(t.len());
                for part in [&t[..split], &t[split..]] {
                    if !part.is_empty() {
                        let _ = chunk_tx.send(part.to_string()).await;
                    }
                }
                Ok(t)
            }
            ResolvedBehavior::Upstream { status, message } => Err(AdapterError::Status {
                status,
                snippet: message,
            }),
            ResolvedBehavior::Hang => {
                let _ = chunk_tx.send("…".to_string()).await;
                req.cancel.cancelled().await;
                Err(AdapterError::Cancelled)
            }
        }
    }
}
