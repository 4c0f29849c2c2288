//! Anthropic unary response translation.

use crate::error::GatewayError;
use crate::protocol::finish_reason_to_anthropic;
use crate::protocol::upstream::ChatCompletionsResponse;
use crate::util::next_message_id;

pub(super) fn parse_response(body: &[u8]) -> Result<serde_json::Value, GatewayError> {
    let response: ChatCompletionsResponse = serde_json::from_slice(body)
        .map_err(|e| GatewayError::Parse(format!("Invalid upstream response: {e}")))?;

    let mut text = String::new();
    let mut tool_blocks: Vec<serde_json::Value> = Vec::new();
    let mut finish_reason: Option<String> = None;

    for choice in &response.choices {
        if let Some(content) = &choice.message.content {
            text.push_str(content);
        }
        if let Some(calls) = &choice.message.tool_calls {
            for call in calls {
                tool_blocks.push(serde_json::json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.function.name,
                    "input": parse_tool_input(&call.function.arguments),
                }));
            }
        }
        if let Some(reason) = &choice.finish_reason {
            finish_reason = Some(reason.clone());
        }
    }

    let mut content = Vec::with_capacity(1 + tool_blocks.len());
    if !text.is_empty() {
        content.push(serde_json::json!({ "type": "text", "text": text }));
    }
    content.extend(tool_blocks);

    let usage = response.usage.unwrap_or_default();
    Ok(serde_json::json!({
        "id": next_message_id(),
        "type": "message",
        "role": "assistant",
        "model": response.model.unwrap_or_default(),
        "content": content,
        "stop_reason": finish_reason
            .as_deref()
            .map_or("end_turn", finish_reason_to_anthropic),
        "stop_sequence": null,
        "usage": {
            "input_tokens": usage.billable_input_tokens(),
            "output_tokens": usage.completion_tokens,
            "cache_read_input_tokens": usage.cached_tokens(),
            "cache_creation_input_tokens": 0,
        },
    }))
}

/// Tool-call arguments are JSON text; an undecodable string is preserved
/// under an `arguments` key instead of failing the response.
fn parse_tool_input(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({ "arguments": raw }))
}
