//! Anthropic messages wire protocol.
//!
//! The system prompt rides in a top-level `system` field, `max_tokens` is
//! mandatory (1024 when not enabled on the model), and streaming deltas
//! arrive as `content_block_delta` events.

use futures_util::StreamExt;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use super::sse::{parse_line, SseLineBuffer, SsePayload};
use super::{
    check_status, project_params, race_cancel, trim_base_url, AdapterError, ChatRole,
    CompletionRequest,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

fn request_body(req: &CompletionRequest, stream: bool) -> Value {
    let system = req
        .messages
        .iter()
        .find(|m| m.role == ChatRole::System)
        .map(|m| m.content.clone());
    let messages: Vec<Value> = req
        .messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    let mut body = Map::new();
    body.insert("model".to_string(), json!(req.model));
    if let Some(system) = system {
        body.insert("system".to_string(), json!(system));
    }
    body.insert("messages".to_string(), json!(messages));
    if stream {
        body.insert("stream".to_string(), json!(true));
    }
    for (k, v) in project_params(req.kind, &req.params) {
        body.insert(k, v);
    }
    body.entry("max_tokens".to_string())
        .or_insert_with(|| json!(DEFAULT_MAX_TOKENS));
    Value::Object(body)
}

async fn send(
    client: &reqwest::Client,
    req: &CompletionRequest,
    stream: bool,
) -> Result<reqwest::Response, AdapterError> {
    let url = format!("{}/v1/messages", trim_base_url(&req.base_url));
    let mut http = client
        .post(&url)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&request_body(req, stream));
    if let Some(ref key) = req.api_key {
        http = http.header("x-api-key", key);
    }
    let resp = race_cancel(&req.cancel, http.send())
        .await?
        .map_err(|e| AdapterError::Request(e.to_string()))?;
    check_status(resp).await
}

pub(super) async fn complete(
    client: &reqwest::Client,
    req: &CompletionRequest,
) -> Result<String, AdapterError> {
    let resp = send(client, req, false).await?;
    let body: Value = race_cancel(&req.cancel, resp.json())
        .await?
        .map_err(|e| AdapterError::Envelope(e.to_string()))?;
    body["content"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AdapterError::Envelope("no content[0].text".to_string()))
}

pub(super) async fn stream(
    client: &reqwest::Client,
    req: &CompletionRequest,
    chunk_tx: mpsc::Sender<String>,
) -> Result<String, AdapterError> {
    let resp = send(client, req, true).await?;
    let mut body = resp.bytes_stream();
    let mut lines = SseLineBuffer::new();
    let mut acc = String::new();
    loop {
        let Some(chunk) = race_cancel(&req.cancel, body.next()).await? else {
            break;
        };
        let chunk = chunk.map_err(|e| AdapterError::Request(e.to_string()))?;
        for line in lines.push(&chunk) {
            match parse_line(&line) {
                Some(SsePayload::Done) => return Ok(acc),
                Some(SsePayload::Json(v)) => {
                    if v["type"] == "content_block_delta" {
                        if let Some(delta) = v["delta"]["text"].as_str() {
                            if !delta.is_empty() {
                                acc.push_str(delta);
                                let _ = chunk_tx.send(delta.to_string()).await;
                            }
                        }
                    }
                }
                None => {}
            }
        }
    }
    Ok(acc)
}
