//! Projection of model parameter settings onto provider request bodies.
//!
//! Only parameters with `enabled = true` are sent, under the name the target
//! protocol expects. Unknown names and values of the wrong shape are dropped.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::AdapterKind;
use crate::entity::ParamSetting;

/// Wire name for one canonical parameter under a given kind; `None` when the
/// protocol does not support it.
fn wire_name(kind: AdapterKind, canonical: &str) -> Option<&'static str> {
    use AdapterKind::*;
    match (canonical, kind) {
        ("temperature", _) => Some("temperature"),
        ("top_p", _) => Some("top_p"),
        ("max_tokens", Gemini) => Some("max_output_tokens"),
        ("max_tokens", _) => Some("max_tokens"),
        ("top_k", Anthropic | Gemini) => Some("top_k"),
        ("top_k", _) => None,
        ("frequency_penalty", OpenAiCompat | Custom | Gemini) => Some("frequency_penalty"),
        ("frequency_penalty", _) => None,
        ("presence_penalty", OpenAiCompat | Custom | Gemini) => Some("presence_penalty"),
        ("presence_penalty", _) => None,
        ("stop_sequences", Anthropic) => Some("stop_sequences"),
        ("stop_sequences", _) => Some("stop"),
        _ => None,
    }
}

fn valid_value(canonical: &str, value: &Value) -> bool {
    match canonical {
        "temperature" | "top_p" | "frequency_penalty" | "presence_penalty" => value.is_number(),
        "max_tokens" | "top_k" => value.is_i64() || value.is_u64(),
        "stop_sequences" => value
            .as_array()
            .is_some_and(|a| a.iter().all(|v| v.is_string())),
        _ => false,
    }
}

/// Projects enabled parameters onto the wire names of `kind`. Disabled and
/// unsupported parameters are omitted; empty stop arrays are dropped.
pub fn project_params(
    kind: AdapterKind,
    params: &BTreeMap<String, ParamSetting>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, setting) in params {
        if !setting.enabled {
            continue;
        }
        let Some(wire) = wire_name(kind, name) else {
            tracing::debug!(param = %name, kind = kind.as_str(), "parameter not supported, dropping");
            continue;
        };
        if !valid_value(name, &setting.value) {
            tracing::debug!(param = %name, "parameter value has wrong shape, dropping");
            continue;
        }
        if name == "stop_sequences"
            && setting.value.as_array().is_some_and(|a| a.is_empty())
        {
            continue;
        }
        out.insert(wire.to_string(), setting.value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(enabled: bool, value: Value) -> ParamSetting {
        ParamSetting { enabled, value }
    }

    fn bag(entries: &[(&str, bool, Value)]) -> BTreeMap<String, ParamSetting> {
        entries
            .iter()
            .map(|(k, e, v)| (k.to_string(), param(*e, v.clone())))
            .collect()
    }

    #[test]
    fn disabled_params_are_omitted() {
        let params = bag(&[
            ("temperature", true, json!(0.2)),
            ("top_p", false, json!(0.9)),
        ]);
        let out = project_params(AdapterKind::OpenAiCompat, &params);
        assert_eq!(out.get("temperature"), Some(&json!(0.2)));
        assert!(!out.contains_key("top_p"));
    }

    #[test]
    fn support_matrix_per_kind() {
        let params = bag(&[
            ("top_k", true, json!(40)),
            ("frequency_penalty", true, json!(0.5)),
            ("stop_sequences", true, json!(["END"])),
        ]);

        let openai = project_params(AdapterKind::OpenAiCompat, &params);
        assert!(!openai.contains_key("top_k"));
        assert_eq!(openai.get("frequency_penalty"), Some(&json!(0.5)));
        assert_eq!(openai.get("stop"), Some(&json!(["END"])));

        let anthropic = project_params(AdapterKind::Anthropic, &params);
        assert_eq!(anthropic.get("top_k"), Some(&json!(40)));
        assert!(!anthropic.contains_key("frequency_penalty"));
        assert_eq!(anthropic.get("stop_sequences"), Some(&json!(["END"])));

        let gemini = project_params(AdapterKind::Gemini, &params);
        assert_eq!(gemini.get("top_k"), Some(&json!(40)));
        assert_eq!(gemini.get("stop"), Some(&json!(["END"])));
    }

    #[test]
    fn max_tokens_renamed_for_gemini() {
        let params = bag(&[("max_tokens", true, json!(2048))]);
        let gemini = project_params(AdapterKind::Gemini, &params);
        assert_eq!(gemini.get("max_output_tokens"), Some(&json!(2048)));
        let openai = project_params(AdapterKind::OpenAiCompat, &params);
        assert_eq!(openai.get("max_tokens"), Some(&json!(2048)));
    }

    #[test]
    fn empty_stop_arrays_and_bad_shapes_dropped() {
        let params = bag(&[
            ("stop_sequences", true, json!([])),
            ("temperature", true, json!("hot")),
            ("nonsense", true, json!(1)),
        ]);
        let out = project_params(AdapterKind::OpenAiCompat, &params);
        assert!(out.is_empty(), "{out:?}");
    }
}
