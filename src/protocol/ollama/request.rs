//! Ollama chat request conversion into the upstream payload.

use crate::error::GatewayError;
use crate::protocol::upstream::{
    ChatCompletionsRequest, UpstreamFunctionCall, UpstreamMessage, UpstreamRequest,
    UpstreamToolCall,
};
use crate::util::next_call_id;

use super::{detect_image_mime, OllamaChatRequest, OllamaMessage};

pub(super) fn convert_request(
    request: &OllamaChatRequest,
) -> Result<UpstreamRequest, GatewayError> {
    let mut upstream = ChatCompletionsRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(convert_message).collect(),
        ..ChatCompletionsRequest::default()
    };

    if let Some(tools) = &request.tools {
        upstream.tools = Some(tools.clone());
    }

    // Generation options spread flat: temperature, num_predict and friends
    // land as top-level keys, exactly as the client wrote them.
    if let Some(options) = &request.options {
        for (key, value) in options {
            upstream.extra.insert(key.clone(), value.clone());
        }
    }

    Ok(UpstreamRequest::Chat(Box::new(upstream)))
}

fn convert_message(message: &OllamaMessage) -> UpstreamMessage {
    let mut upstream = UpstreamMessage {
        role: message.role.clone(),
        content: Some(serde_json::Value::String(message.content.clone())),
        ..UpstreamMessage::default()
    };

    // Tool results keep their correlation id and function name.
    if message.role == "tool" || message.role == "function" {
        upstream.tool_call_id = message.tool_call_id.clone();
        upstream.name = message.name.clone();
    }

    if let Some(images) = &message.images {
        if !images.is_empty() {
            upstream.content = Some(content_with_images(&message.content, images));
        }
    }

    if let Some(tool_calls) = &message.tool_calls {
        let normalized: Vec<UpstreamToolCall> =
            tool_calls.iter().filter_map(normalize_tool_call).collect();
        if !normalized.is_empty() {
            upstream.tool_calls = Some(normalized);
        }
    }

    upstream
}

/// Rewrite a message with images into the content-array form: the original
/// text first, then one `image_url` part per image as a base64 data URL.
fn content_with_images(text: &str, images: &[String]) -> serde_json::Value {
    let mut parts = Vec::with_capacity(1 + images.len());
    parts.push(serde_json::json!({ "type": "text", "text": text }));
    for image in images {
        let mime = detect_image_mime(image);
        parts.push(serde_json::json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{mime};base64,{image}") },
        }));
    }
    serde_json::Value::Array(parts)
}

/// Normalize one inbound tool call: `function.arguments` becomes a
/// JSON-encoded string (serializing when the client sent an object), and
/// a call id is minted when absent. Entries without a function name are
/// dropped.
fn normalize_tool_call(value: &serde_json::Value) -> Option<UpstreamToolCall> {
    let function = value.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let arguments = match function.get("arguments") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "{}".to_string(),
    };
    let id = value
        .get("id")
        .and_then(serde_json::Value::as_str)
        .map_or_else(next_call_id, str::to_string);
    Some(UpstreamToolCall {
        id,
        type_: "function".to_string(),
        function: UpstreamFunctionCall { name, arguments },
    })
}
