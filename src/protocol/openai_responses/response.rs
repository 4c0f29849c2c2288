//! Responses API unary translation.

use std::sync::atomic::AtomicU64;

use crate::error::GatewayError;
use crate::protocol::upstream::{ChatCompletionsResponse, UpstreamUsage};
use crate::util::{
    next_function_call_id, next_generated_id, next_message_id, next_response_id, unix_now_secs,
};

static REASONING_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(super) fn next_reasoning_id() -> String {
    next_generated_id("reasoning_", &REASONING_ID_COUNTER)
}

pub(super) fn parse_response(body: &[u8]) -> Result<serde_json::Value, GatewayError> {
    let response: ChatCompletionsResponse = serde_json::from_slice(body)
        .map_err(|e| GatewayError::Parse(format!("Invalid upstream response: {e}")))?;

    let mut output: Vec<serde_json::Value> = Vec::new();
    let mut output_text = String::new();
    let mut annotations: Vec<serde_json::Value> = Vec::new();
    let mut tool_items: Vec<serde_json::Value> = Vec::new();
    let mut finish_reason: Option<String> = None;

    for choice in &response.choices {
        if let Some(reasoning) = &choice.message.reasoning_content {
            output.push(serde_json::json!({
                "type": "reasoning",
                "id": next_reasoning_id(),
                "summary": [],
                "content": [{ "type": "reasoning_text", "text": reasoning }],
            }));
        }
        if let Some(content) = &choice.message.content {
            output_text.push_str(content);
        }
        if let Some(message_annotations) = &choice.message.annotations {
            annotations.extend(message_annotations.iter().filter_map(map_annotation));
        }
        if let Some(calls) = &choice.message.tool_calls {
            for call in calls {
                tool_items.push(serde_json::json!({
                    "type": "function_call",
                    "id": next_function_call_id(),
                    "call_id": call.id,
                    "name": call.function.name,
                    "arguments": call.function.arguments,
                    "status": "completed",
                }));
            }
        }
        if let Some(reason) = &choice.finish_reason {
            finish_reason = Some(reason.clone());
        }
    }

    // Ordering: reasoning items, then exactly one message, then the calls.
    if !output_text.is_empty() {
        output.push(serde_json::json!({
            "type": "message",
            "id": next_message_id(),
            "status": "completed",
            "role": "assistant",
            "content": [{
                "type": "output_text",
                "text": output_text,
                "annotations": annotations,
            }],
        }));
    }
    output.extend(tool_items);

    let (status, incomplete_details) = status_from_finish(finish_reason.as_deref());

    Ok(serde_json::json!({
        "id": next_response_id(),
        "object": "response",
        "created_at": response.created.unwrap_or_else(unix_now_secs),
        "status": status,
        "model": response.model.unwrap_or_default(),
        "output": output,
        "output_text": output_text,
        "incomplete_details": incomplete_details,
        "usage": response.usage.as_ref().map(usage_json),
    }))
}

/// Map the upstream finish reason onto a Responses status and its
/// `incomplete_details`.
pub(super) fn status_from_finish(
    finish_reason: Option<&str>,
) -> (&'static str, serde_json::Value) {
    match finish_reason {
        Some("length") => (
            "incomplete",
            serde_json::json!({ "reason": "max_tokens" }),
        ),
        Some("content_filter") => (
            "incomplete",
            serde_json::json!({ "reason": "content_filter" }),
        ),
        _ => ("completed", serde_json::Value::Null),
    }
}

pub(super) fn usage_json(usage: &UpstreamUsage) -> serde_json::Value {
    let cached = usage.cached_tokens();
    let prompt_details = usage.prompt_tokens_details.as_ref();
    let completion_details = usage.completion_tokens_details.as_ref();
    let mut out = serde_json::json!({
        "input_tokens": usage.prompt_tokens,
        "output_tokens": usage.completion_tokens,
        "total_tokens": usage
            .total_tokens
            .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
        "input_tokens_details": {
            "cached_tokens": cached,
            "text_tokens": prompt_details
                .and_then(|d| d.text_tokens)
                .unwrap_or_else(|| usage.prompt_tokens.saturating_sub(cached)),
            "audio_tokens": prompt_details.and_then(|d| d.audio_tokens).unwrap_or(0),
        },
        "output_tokens_details": {
            "reasoning_tokens": completion_details.map_or(0, |d| d.reasoning_tokens),
            "text_tokens": completion_details
                .and_then(|d| d.text_tokens)
                .unwrap_or(usage.completion_tokens),
        },
    });
    if let Some(cost) = usage.cost {
        out["cost"] = serde_json::json!(cost);
    }
    out
}

/// Keep only `url_citation` annotations, flattened to the Responses shape.
fn map_annotation(annotation: &serde_json::Value) -> Option<serde_json::Value> {
    if annotation.get("type").and_then(serde_json::Value::as_str) != Some("url_citation") {
        return None;
    }
    let citation = annotation.get("url_citation").unwrap_or(annotation);
    Some(serde_json::json!({
        "type": "url_citation",
        "start_index": citation.get("start_index"),
        "end_index": citation.get("end_index"),
        "url": citation.get("url"),
        "title": citation.get("title"),
    }))
}
