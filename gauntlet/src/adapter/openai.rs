//! OpenAI-compatible chat completions wire protocol. Also serves `custom`
//! providers, which overwhelmingly expose this shape.

use futures_util::StreamExt;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use super::sse::{parse_line, SseLineBuffer, SsePayload};
use super::{
    check_status, project_params, race_cancel, trim_base_url, AdapterError, CompletionRequest,
};

fn request_body(req: &CompletionRequest, stream: bool) -> Value {
    let messages: Vec<Value> = req
        .messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();
    let mut body = Map::new();
    body.insert("model".to_string(), json!(req.model));
    body.insert("messages".to_string(), json!(messages));
    if stream {
        body.insert("stream".to_string(), json!(true));
    }
    for (k, v) in project_params(req.kind, &req.params) {
        body.insert(k, v);
    }
    Value::Object(body)
}

async fn send(
    client: &reqwest::Client,
    req: &CompletionRequest,
    stream: bool,
) -> Result<reqwest::Response, AdapterError> {
    let url = format!("{}/chat/completions", trim_base_url(&req.base_url));
    let mut http = client.post(&url).json(&request_body(req, stream));
    if let Some(ref key) = req.api_key {
        http = http.bearer_auth(key);
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
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AdapterError::Envelope("no choices[0].message.content".to_string()))
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
                    if let Some(delta) = v["choices"][0]["delta"]["content"].as_str() {
                        if !delta.is_empty() {
                            acc.push_str(delta);
                            let _ = chunk_tx.send(delta.to_string()).await;
                        }
                    }
                }
                None => {}
            }
        }
    }
    Ok(acc)
}
