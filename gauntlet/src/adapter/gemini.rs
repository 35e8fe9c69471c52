//! Google Gemini REST wire protocol (non-streaming only).
//!
//! The conversation collapses into a single user turn: system then user
//! contents joined with blank lines. The credential rides in the query
//! string, not a header.

use serde_json::{json, Map, Value};

use super::{
    check_status, project_params, race_cancel, trim_base_url, AdapterError, CompletionRequest,
};

fn request_body(req: &CompletionRequest) -> Value {
    let prompt = req
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let mut body = Map::new();
    body.insert(
        "contents".to_string(),
        json!([{"role": "user", "parts": [{"text": prompt}]}]),
    );
    let config = project_params(req.kind, &req.params);
    if !config.is_empty() {
        body.insert("generationConfig".to_string(), Value::Object(config));
    }
    Value::Object(body)
}

pub(super) async fn complete(
    client: &reqwest::Client,
    req: &CompletionRequest,
) -> Result<String, AdapterError> {
    let mut url = format!(
        "{}/v1beta/models/{}:generateContent",
        trim_base_url(&req.base_url),
        req.model
    );
    if let Some(ref key) = req.api_key {
        url.push_str(&format!("?key={key}"));
    }
    let resp = race_cancel(&req.cancel, client.post(&url).json(&request_body(req)).send())
        .await?
        .map_err(|e| AdapterError::Request(e.to_string()))?;
    let resp = check_status(resp).await?;
    let body: Value = race_cancel(&req.cancel, resp.json())
        .await?
        .map_err(|e| AdapterError::Envelope(e.to_string()))?;
    body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AdapterError::Envelope("no candidates[0].content.parts[0].text".to_string()))
}
