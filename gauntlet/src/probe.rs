//! Provider connectivity probe.
//!
//! Tries a short sequence of GET endpoints until one answers 2xx. Success
//! stamps `last_checked` on the provider row; failure returns every attempt
//! with status, error snippet and a few response headers so the operator can
//! see what the endpoint actually said.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::adapter::AdapterKind;
use crate::entity::now_ms;
use crate::store::{Store, StoreError};

#[derive(Clone, Debug, Serialize)]
pub struct ProbeAttempt {
    pub url: String,
    pub status: Option<u16>,
    pub ok: bool,
    pub error: Option<String>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProbeReport {
    pub provider_id: String,
    pub ok: bool,
    pub attempts: Vec<ProbeAttempt>,
}

/// Probe URLs for a base: `/v1/models`, `/models`, then the base itself.
/// A trailing `/v1` is stripped first so both `…/v1` and bare bases produce
/// the same candidates.
fn candidate_urls(base_url: &str) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    vec![
        format!("{base}/v1/models"),
        format!("{base}/models"),
        base.to_string(),
    ]
}

fn selected_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    ["content-type", "server", "x-request-id"]
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

/// Probes a provider's endpoint. Auth follows the adapter kind: anthropic
/// sends `x-api-key`, gemini appends `?key=`, everything else uses a bearer
/// token. Reported attempt URLs never include the credential.
pub async fn test_provider(
    client: &reqwest::Client,
    store: &Store,
    provider_id: &str,
) -> Result<ProbeReport, StoreError> {
    let provider = store.get_provider(provider_id)?;

    if let Err(e) = url::Url::parse(&provider.base_url) {
        return Ok(ProbeReport {
            provider_id: provider_id.to_string(),
            ok: false,
            attempts: vec![ProbeAttempt {
                url: provider.base_url.clone(),
                status: None,
                ok: false,
                error: Some(format!("invalid base url: {e}")),
                headers: BTreeMap::new(),
            }],
        });
    }

    let mut attempts = Vec::new();
    for url in candidate_urls(&provider.base_url) {
        let request = match (provider.kind, provider.api_key.as_deref()) {
            (AdapterKind::Anthropic, Some(key)) => client.get(&url).header("x-api-key", key),
            (AdapterKind::Gemini, Some(key)) => client.get(format!("{url}?key={key}")),
            (_, Some(key)) => client.get(&url).bearer_auth(key),
            (_, None) => client.get(&url),
        };
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                let headers = selected_headers(resp.headers());
                if status.is_success() {
                    store.touch_provider_checked(provider_id, now_ms())?;
                    tracing::info!(provider_id, %url, "provider probe succeeded");
                    attempts.push(ProbeAttempt {
                        url,
                        status: Some(status.as_u16()),
                        ok: true,
                        error: None,
                        headers,
                    });
                    return Ok(ProbeReport {
                        provider_id: provider_id.to_string(),
                        ok: true,
                        attempts,
                    });
                }
                let snippet: String = resp
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(200)
                    .collect();
                attempts.push(ProbeAttempt {
                    url,
                    status: Some(status.as_u16()),
                    ok: false,
                    error: Some(snippet),
                    headers,
                });
            }
            Err(e) => attempts.push(ProbeAttempt {
                url,
                status: None,
                ok: false,
                error: Some(e.to_string()),
                headers: BTreeMap::new(),
            }),
        }
    }
    Ok(ProbeReport {
        provider_id: provider_id.to_string(),
        ok: false,
        attempts,
    })
}
