//! Ollama unary response translation.

use crate::error::GatewayError;
use crate::protocol::upstream::{ChatCompletionsResponse, UpstreamToolCall};
use crate::util::rfc3339_from_epoch_secs;

pub(super) fn parse_response(body: &[u8]) -> Result<serde_json::Value, GatewayError> {
    let response: ChatCompletionsResponse = serde_json::from_slice(body)
        .map_err(|e| GatewayError::Parse(format!("Invalid upstream response: {e}")))?;

    let mut content = String::new();
    let mut tool_calls: Vec<serde_json::Value> = Vec::new();
    for choice in &response.choices {
        if let Some(text) = &choice.message.content {
            content.push_str(text);
        }
        if let Some(calls) = &choice.message.tool_calls {
            tool_calls.extend(calls.iter().map(tool_call_to_ollama));
        }
    }

    let mut message = serde_json::json!({
        "role": "assistant",
        "content": content,
    });
    if !tool_calls.is_empty() {
        message["tool_calls"] = serde_json::Value::Array(tool_calls);
    }

    let usage = response.usage.unwrap_or_default();
    Ok(serde_json::json!({
        "model": response.model.unwrap_or_default(),
        "created_at": rfc3339_from_epoch_secs(response.created),
        "message": message,
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": usage.prompt_tokens,
        "eval_count": usage.completion_tokens,
    }))
}

/// Ollama tool calls carry decoded argument objects, not JSON strings.
/// An undecodable argument string is preserved under an `arguments` key.
pub(super) fn tool_call_to_ollama(call: &UpstreamToolCall) -> serde_json::Value {
    serde_json::json!({
        "function": {
            "name": call.function.name,
            "arguments": decode_arguments(&call.function.arguments),
        }
    })
}

pub(super) fn decode_arguments(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::json!({ "arguments": raw }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unary_text_and_counts() {
        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-11-20",
            "created": 1_700_000_000,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello world." },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7 }
        });
        let out = parse_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(out["message"]["content"], "Hello world.");
        assert_eq!(out["done"], true);
        assert_eq!(out["prompt_eval_count"], 5);
        assert_eq!(out["eval_count"], 2);
        assert!(out["created_at"].as_str().unwrap().starts_with("2023-11-14T"));
    }

    #[test]
    fn test_unary_tool_call_arguments_are_decoded() {
        let body = serde_json::json!({
            "model": "m",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "get_weather", "arguments": "{\"city\":\"SF\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let out = parse_response(body.to_string().as_bytes()).unwrap();
        let call = &out["message"]["tool_calls"][0]["function"];
        assert_eq!(call["name"], "get_weather");
        assert_eq!(call["arguments"]["city"], "SF");
    }

    #[test]
    fn test_content_concatenated_across_choices() {
        let body = serde_json::json!({
            "model": "m",
            "choices": [
                { "index": 0, "message": { "content": "Hello " }, "finish_reason": "stop" },
                { "index": 1, "message": { "content": "world." }, "finish_reason": "stop" }
            ]
        });
        let out = parse_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(out["message"]["content"], "Hello world.");
    }

    #[test]
    fn test_undecodable_arguments_preserved_raw() {
        assert_eq!(
            decode_arguments("not json"),
            serde_json::json!({ "arguments": "not json" })
        );
    }

    #[test]
    fn test_invalid_body_is_parse_error() {
        let err = parse_response(b"not json").unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }
}
