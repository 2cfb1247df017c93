use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::routing::ModelNormalizer;

/// Chat-completion body ready to forward.
#[derive(Debug, Clone)]
pub struct NormalizedChatRequest {
    pub body: Bytes,
    pub model: String,
    pub stream: bool,
}

/// Options applied to every chat-completion body.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequestPolicy<'a> {
    pub models: &'a ModelNormalizer,
    pub default_stream: bool,
    pub provider_hint: &'a Value,
}

/// Build the outbound chat-completion body.
///
/// Input that is not a JSON object is treated as `{}`. `model` is always
/// replaced by an allowed model, `stream` is made explicit and `provider` is
/// set to the configured hint; all other fields pass through in order.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] if the normalized body cannot be serialized.
pub fn normalize_chat_request(
    body: &[u8],
    policy: ChatRequestPolicy<'_>,
) -> Result<NormalizedChatRequest, GatewayError> {
    let mut object = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => object,
        Ok(_) | Err(_) => {
            if !body.is_empty() {
                tracing::debug!(
                    len = body.len(),
                    "chat request body is not a JSON object, forwarding defaults"
                );
            }
            Map::new()
        }
    };

    let model = policy
        .models
        .normalize(object.get("model").and_then(Value::as_str))
        .to_string();
    let stream = object
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(policy.default_stream);

    object.insert("model".to_string(), Value::String(model.clone()));
    object.insert("stream".to_string(), Value::Bool(stream));
    object.insert("provider".to_string(), policy.provider_hint.clone());

    let body = serde_json::to_vec(&Value::Object(object))
        .map_err(|e| GatewayError::Internal(format!("Failed to serialize request body: {e}")))?;
    Ok(NormalizedChatRequest {
        body: Bytes::from(body),
        model,
        stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelsConfig;
    use serde_json::json;

    fn normalize(body: &[u8], default_stream: bool) -> (Value, NormalizedChatRequest) {
        let models = ModelNormalizer::new(&ModelsConfig::default());
        let hint = json!({"name": "dragon"});
        let out = normalize_chat_request(
            body,
            ChatRequestPolicy {
                models: &models,
                default_stream,
                provider_hint: &hint,
            },
        )
        .expect("normalize");
        let value = serde_json::from_slice(&out.body).expect("json body");
        (value, out)
    }

    #[test]
    fn test_allowed_model_and_fields_preserved() {
        let (value, out) = normalize(
            br#"{"messages":[{"role":"user","content":"hi"}],"model":"gpt-4o","temperature":0.2,"stream":false}"#,
            true,
        );
        assert_eq!(out.model, "gpt-4o");
        assert!(!out.stream);
        assert_eq!(value["messages"][0]["content"], "hi");
        assert_eq!(value["temperature"], 0.2);
        assert_eq!(value["provider"], json!({"name": "dragon"}));
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["messages", "model", "temperature", "stream", "provider"]);
    }

    #[test]
    fn test_unknown_model_and_missing_stream_use_defaults() {
        let (value, out) = normalize(br#"{"model":"claude-3-opus","messages":[]}"#, true);
        assert_eq!(out.model, "gpt-4o-mini");
        assert_eq!(value["model"], "gpt-4o-mini");
        assert!(out.stream);
        assert_eq!(value["stream"], true);
    }

    #[test]
    fn test_non_boolean_stream_uses_default() {
        let (_, out) = normalize(br#"{"stream":"yes"}"#, false);
        assert!(!out.stream);
    }

    #[test]
    fn test_malformed_body_becomes_defaults() {
        for body in [&b"not json"[..], b"", b"[1,2]", b"\"text\""] {
            let (value, out) = normalize(body, true);
            assert_eq!(out.model, "gpt-4o-mini");
            assert_eq!(
                value,
                json!({"model": "gpt-4o-mini", "stream": true, "provider": {"name": "dragon"}})
            );
        }
    }

    #[test]
    fn test_client_provider_field_is_replaced() {
        let (value, _) = normalize(br#"{"provider":{"order":["other"]}}"#, true);
        assert_eq!(value["provider"], json!({"name": "dragon"}));
    }
}
