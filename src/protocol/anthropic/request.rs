//! Anthropic Messages request conversion into the upstream payload.

use crate::error::GatewayError;
use crate::protocol::upstream::{
    ChatCompletionsRequest, UpstreamFunctionCall, UpstreamMessage, UpstreamRequest,
    UpstreamToolCall,
};

use super::{AnthropicMessage, AnthropicMessagesRequest, AnthropicTool};

pub(super) fn convert_request(
    request: &AnthropicMessagesRequest,
) -> Result<UpstreamRequest, GatewayError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        if let Some(text) = system_text(system) {
            messages.push(UpstreamMessage::text("system", text));
        }
    }

    for message in &request.messages {
        messages.push(convert_message(message));
    }

    let mut upstream = ChatCompletionsRequest {
        model: request.model.clone(),
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        ..ChatCompletionsRequest::default()
    };

    if let Some(top_k) = request.top_k {
        upstream
            .extra
            .insert("top_k".to_string(), serde_json::Value::from(top_k));
    }
    if let Some(tools) = &request.tools {
        upstream.tools = Some(serde_json::Value::Array(
            tools.iter().map(convert_tool).collect(),
        ));
    }
    if let Some(tool_choice) = &request.tool_choice {
        upstream.tool_choice = Some(convert_tool_choice(tool_choice));
    }

    Ok(UpstreamRequest::Chat(Box::new(upstream)))
}

/// The top-level system prompt: a plain string, or an array of text blocks
/// joined with blank lines.
fn system_text(system: &serde_json::Value) -> Option<String> {
    match system {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Array(blocks) => {
            let joined = blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(serde_json::Value::as_str))
                .collect::<Vec<_>>()
                .join("\n\n");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}

fn convert_message(message: &AnthropicMessage) -> UpstreamMessage {
    let Some(blocks) = message.content.as_array() else {
        return UpstreamMessage {
            role: message.role.clone(),
            content: Some(message.content.clone()),
            ..UpstreamMessage::default()
        };
    };

    let mut text = String::new();
    let mut parts: Vec<serde_json::Value> = Vec::new();
    let mut has_image = false;
    let mut tool_calls: Vec<UpstreamToolCall> = Vec::new();

    for block in blocks {
        match block.get("type").and_then(serde_json::Value::as_str) {
            Some("text") => {
                if let Some(chunk) = block.get("text").and_then(serde_json::Value::as_str) {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    text.push_str(chunk);
                    parts.push(serde_json::json!({ "type": "text", "text": chunk }));
                }
            }
            Some("thinking") => {
                if let Some(chunk) = block.get("thinking").and_then(serde_json::Value::as_str) {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    text.push_str(chunk);
                    parts.push(serde_json::json!({ "type": "text", "text": chunk }));
                }
            }
            Some("image") => {
                has_image = true;
                parts.push(image_block_to_part(block));
            }
            Some("tool_use") => {
                if let Some(call) = tool_use_to_call(block) {
                    tool_calls.push(call);
                }
            }
            Some("tool_result") => {
                // The upstream expects OpenAI-style tool results; this
                // gateway encodes them as a tool-call-shaped entry on the
                // user message itself rather than a separate tool message.
                tool_calls.push(tool_result_to_call(block));
            }
            // Unknown block types are dropped.
            _ => {}
        }
    }

    let content = if has_image {
        Some(serde_json::Value::Array(parts))
    } else if text.is_empty() {
        None
    } else {
        Some(serde_json::Value::String(text))
    };

    UpstreamMessage {
        role: message.role.clone(),
        content,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        ..UpstreamMessage::default()
    }
}

/// `{source:{media_type, data}}` becomes an `image_url` data URL.
fn image_block_to_part(block: &serde_json::Value) -> serde_json::Value {
    let source = block.get("source");
    let media_type = source
        .and_then(|s| s.get("media_type"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("image/jpeg");
    let data = source
        .and_then(|s| s.get("data"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");
    serde_json::json!({
        "type": "image_url",
        "image_url": { "url": format!("data:{media_type};base64,{data}") },
    })
}

fn tool_use_to_call(block: &serde_json::Value) -> Option<UpstreamToolCall> {
    let id = block.get("id")?.as_str()?.to_string();
    let name = block.get("name")?.as_str()?.to_string();
    let arguments = block
        .get("input")
        .map_or_else(|| "{}".to_string(), serde_json::Value::to_string);
    Some(UpstreamToolCall {
        id,
        type_: "function".to_string(),
        function: UpstreamFunctionCall { name, arguments },
    })
}

fn tool_result_to_call(block: &serde_json::Value) -> UpstreamToolCall {
    let id = block
        .get("tool_use_id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let output = match block.get("content") {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(serde_json::Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    UpstreamToolCall {
        id,
        type_: "function".to_string(),
        function: UpstreamFunctionCall {
            name: "tool_result".to_string(),
            arguments: output,
        },
    }
}

fn convert_tool(tool: &AnthropicTool) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

fn convert_tool_choice(choice: &serde_json::Value) -> serde_json::Value {
    match choice.get("type").and_then(serde_json::Value::as_str) {
        Some("any") => serde_json::Value::String("required".to_string()),
        Some("tool") => match choice.get("name").and_then(serde_json::Value::as_str) {
            Some(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name },
            }),
            None => serde_json::Value::String("required".to_string()),
        },
        Some("none") => serde_json::Value::String("none".to_string()),
        _ => serde_json::Value::String("auto".to_string()),
    }
}
