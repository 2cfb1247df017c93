use serde_json::Value;

use super::sanitizer::ContentSanitizer;

/// `choices[0].<container>.content`, if every step of the path exists.
fn first_choice_content_mut<'v>(payload: &'v mut Value, container: &str) -> Option<&'v mut Value> {
    payload
        .get_mut("choices")?
        .get_mut(0)?
        .get_mut(container)?
        .get_mut("content")
}

/// Sanitize `choices[0].delta.content` of a streaming chunk in place.
///
/// Returns `true` when the text changed. Every other field is untouched.
pub fn sanitize_chunk_delta(chunk: &mut Value, sanitizer: &ContentSanitizer) -> bool {
    let Some(content) = first_choice_content_mut(chunk, "delta") else {
        return false;
    };
    replace_text(content, |text| sanitizer.sanitize_fragment(text).into_owned())
}

/// Sanitize `choices[0].message.content` of a buffered completion in place.
pub fn sanitize_completion_message(response: &mut Value, sanitizer: &ContentSanitizer) -> bool {
    let Some(content) = first_choice_content_mut(response, "message") else {
        return false;
    };
    replace_text(content, |text| sanitizer.sanitize(text).into_owned())
}

fn replace_text<F>(content: &mut Value, clean: F) -> bool
where
    F: FnOnce(&str) -> String,
{
    let Value::String(text) = content else {
        return false;
    };
    if text.is_empty() {
        return false;
    }
    let cleaned = clean(text);
    if cleaned == *text {
        return false;
    }
    *text = cleaned;
    true
}

/// Result of rewriting a fully buffered upstream body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferedRewrite {
    /// Valid JSON whose message text was sanitized and re-serialized.
    Rewritten(Vec<u8>),
    /// Valid JSON with nothing to sanitize; the original bytes stand.
    Unchanged,
    /// Not JSON; the caller returns the original bytes and status.
    NotJson,
}

/// Rewrite a buffered chat-completion body.
#[must_use]
pub fn rewrite_buffered_body(body: &[u8], sanitizer: &ContentSanitizer) -> BufferedRewrite {
    let Ok(mut response) = serde_json::from_slice::<Value>(body) else {
        return BufferedRewrite::NotJson;
    };
    if !sanitize_completion_message(&mut response, sanitizer) {
        return BufferedRewrite::Unchanged;
    }
    match serde_json::to_vec(&response) {
        Ok(bytes) => BufferedRewrite::Rewritten(bytes),
        Err(err) => {
            tracing::warn!(error = %err, "failed to re-serialize sanitized response, passing through");
            BufferedRewrite::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delta_content_is_sanitized() {
        let mut chunk = json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": "```json\n{x}\n```Hello"}}]
        });
        assert!(sanitize_chunk_delta(&mut chunk, &ContentSanitizer::default()));
        assert_eq!(chunk["choices"][0]["delta"]["content"], "Hello");
        assert_eq!(chunk["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(chunk["id"], "chatcmpl-1");
    }

    #[test]
    fn test_missing_path_is_not_an_error() {
        let sanitizer = ContentSanitizer::default();
        for mut chunk in [
            json!({}),
            json!({"choices": []}),
            json!({"choices": [{"delta": {}}]}),
            json!({"choices": [{"delta": {"content": null}}]}),
            json!({"choices": [{"delta": {"content": 5}}]}),
            json!({"choices": {"0": {"delta": {"content": "```json x```"}}}}),
            json!([1, 2, 3]),
        ] {
            let before = chunk.clone();
            assert!(!sanitize_chunk_delta(&mut chunk, &sanitizer));
            assert_eq!(chunk, before);
        }
    }

    #[test]
    fn test_only_first_choice_is_touched() {
        let mut chunk = json!({
            "choices": [
                {"delta": {"content": "clean"}},
                {"delta": {"content": "```json x```dirty"}}
            ]
        });
        assert!(!sanitize_chunk_delta(&mut chunk, &ContentSanitizer::default()));
        assert_eq!(chunk["choices"][1]["delta"]["content"], "```json x```dirty");
    }

    #[test]
    fn test_buffered_rewrite_preserves_siblings_and_order() {
        let body = br#"{"id":"c1","object":"chat.completion","choices":[{"index":0,"message":{"role":"assistant","content":"```json\n{}\n```\nHi"},"finish_reason":"stop"}],"usage":{"total_tokens":7}}"#;
        let BufferedRewrite::Rewritten(out) =
            rewrite_buffered_body(body, &ContentSanitizer::default())
        else {
            panic!("expected rewrite");
        };
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"{"id":"c1","object":"chat.completion","choices":[{"index":0,"message":{"role":"assistant","content":"Hi"},"finish_reason":"stop"}],"usage":{"total_tokens":7}}"#
        );
    }

    #[test]
    fn test_buffered_rewrite_outcomes() {
        let sanitizer = ContentSanitizer::default();
        assert_eq!(
            rewrite_buffered_body(b"upstream exploded", &sanitizer),
            BufferedRewrite::NotJson
        );
        assert_eq!(
            rewrite_buffered_body(
                br#"{"choices":[{"message":{"content":"fine"}}]}"#,
                &sanitizer
            ),
            BufferedRewrite::Unchanged
        );
        assert_eq!(
            rewrite_buffered_body(br#"{"error":{"message":"bad key"}}"#, &sanitizer),
            BufferedRewrite::Unchanged
        );
    }
}
