//! Responses API request conversion into the upstream payload.

use crate::error::GatewayError;
use crate::protocol::upstream::{
    ChatCompletionsRequest, UpstreamFunctionCall, UpstreamMessage, UpstreamRequest,
    UpstreamToolCall,
};
use crate::util::next_call_id;

use super::ResponsesRequest;

pub(super) fn convert_request(
    request: &ResponsesRequest,
) -> Result<UpstreamRequest, GatewayError> {
    let mut messages = Vec::new();

    if let Some(instructions) = &request.instructions {
        messages.push(UpstreamMessage::text("system", instructions.clone()));
    }

    match &request.input {
        serde_json::Value::String(text) => {
            messages.push(UpstreamMessage::text("user", text.clone()));
        }
        serde_json::Value::Array(items) => {
            for item in items {
                convert_input_item(item, &mut messages);
            }
        }
        _ => {}
    }

    let mut upstream = ChatCompletionsRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_output_tokens,
        ..ChatCompletionsRequest::default()
    };

    if let Some(effort) = request
        .reasoning
        .as_ref()
        .and_then(|r| r.get("effort"))
        .and_then(serde_json::Value::as_str)
    {
        upstream.reasoning_effort = Some(effort.to_string());
    }

    if let Some(format) = request.text.as_ref().and_then(|t| t.get("format")) {
        upstream.response_format = convert_text_format(format);
    }

    if let Some(tools) = &request.tools {
        let (converted, web_search_options) = convert_tools(tools);
        if !converted.is_empty() {
            upstream.tools = Some(serde_json::Value::Array(converted));
        }
        upstream.web_search_options = web_search_options;
    }

    if let Some(tool_choice) = &request.tool_choice {
        upstream.tool_choice = Some(flatten_tool_choice(tool_choice));
    }

    // Passed through by contract; everything else unrecognized is dropped.
    if let Some(metadata) = &request.metadata {
        upstream.extra.insert("metadata".to_string(), metadata.clone());
    }
    if let Some(user) = &request.user {
        upstream.extra.insert("user".to_string(), user.clone());
    }
    if let Some(truncation) = &request.truncation {
        upstream
            .extra
            .insert("truncation".to_string(), truncation.clone());
    }

    Ok(UpstreamRequest::Chat(Box::new(upstream)))
}

fn convert_input_item(item: &serde_json::Value, messages: &mut Vec<UpstreamMessage>) {
    let item_type = item.get("type").and_then(serde_json::Value::as_str);
    match item_type {
        Some("message") | None => {
            let Some(role) = item.get("role").and_then(serde_json::Value::as_str) else {
                return;
            };
            let content = item
                .get("content")
                .map_or(serde_json::Value::Null, normalize_content);
            messages.push(UpstreamMessage {
                role: role.to_string(),
                content: Some(content),
                ..UpstreamMessage::default()
            });
        }
        Some("function_call_output") => {
            let call_id = item
                .get("call_id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            let output = match item.get("output") {
                Some(serde_json::Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            messages.push(UpstreamMessage {
                role: "tool".to_string(),
                content: Some(serde_json::Value::String(output)),
                tool_call_id: Some(call_id.to_string()),
                ..UpstreamMessage::default()
            });
        }
        Some("function_call") => {
            // Tool-call history replays as an assistant message carrying
            // the original call.
            let Some(name) = item.get("name").and_then(serde_json::Value::as_str) else {
                return;
            };
            let call_id = item
                .get("call_id")
                .or_else(|| item.get("id"))
                .and_then(serde_json::Value::as_str)
                .map_or_else(next_call_id, str::to_string);
            let arguments = item
                .get("arguments")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("{}")
                .to_string();
            messages.push(UpstreamMessage {
                role: "assistant".to_string(),
                content: None,
                tool_calls: Some(vec![UpstreamToolCall {
                    id: call_id,
                    type_: "function".to_string(),
                    function: UpstreamFunctionCall {
                        name: name.to_string(),
                        arguments,
                    },
                }]),
                ..UpstreamMessage::default()
            });
        }
        // reasoning items and anything else unrecognized are dropped.
        _ => {}
    }
}

/// Normalize Responses content into Chat Completions content. A lone text
/// part collapses to a plain string.
fn normalize_content(content: &serde_json::Value) -> serde_json::Value {
    let Some(parts) = content.as_array() else {
        return content.clone();
    };

    let normalized: Vec<serde_json::Value> = parts.iter().map(normalize_content_part).collect();
    if normalized.len() == 1 {
        if let Some(text) = normalized[0].get("text").and_then(serde_json::Value::as_str) {
            if normalized[0].get("type").and_then(serde_json::Value::as_str) == Some("text") {
                return serde_json::Value::String(text.to_string());
            }
        }
    }
    serde_json::Value::Array(normalized)
}

fn normalize_content_part(part: &serde_json::Value) -> serde_json::Value {
    let text = |value: &serde_json::Value| {
        value
            .get("text")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    match part.get("type").and_then(serde_json::Value::as_str) {
        Some("input_text") | Some("output_text") | Some("tool_result") => {
            serde_json::json!({ "type": "text", "text": text(part) })
        }
        Some("input_image") => {
            let url = part
                .get("image_url")
                .or_else(|| part.get("url"))
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            serde_json::json!({ "type": "image_url", "image_url": { "url": url } })
        }
        Some("input_file") => {
            let file = part
                .get("file_id")
                .or_else(|| part.get("file_data"))
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            serde_json::json!({ "type": "file", "file": file })
        }
        Some("input_audio") => {
            let audio = part
                .get("audio")
                .or_else(|| part.get("input_audio"))
                .cloned()
                .unwrap_or_else(|| serde_json::json!({ "url": part.get("url") }));
            serde_json::json!({ "type": "input_audio", "input_audio": audio })
        }
        _ => part.clone(),
    }
}

fn convert_text_format(format: &serde_json::Value) -> Option<serde_json::Value> {
    match format.get("type").and_then(serde_json::Value::as_str) {
        Some("json_schema") => Some(serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": format.get("name"),
                "schema": format.get("schema"),
                "strict": format.get("strict"),
            },
        })),
        Some("json_object") => Some(serde_json::json!({ "type": "json_object" })),
        _ => None,
    }
}

/// Convert the tool list. `web_search` entries leave the list and fold
/// into the side-car `web_search_options`; `mcp` entries pass unchanged;
/// function tools get the nested Chat Completions shape.
fn convert_tools(
    tools: &[serde_json::Value],
) -> (Vec<serde_json::Value>, Option<serde_json::Value>) {
    let mut converted = Vec::with_capacity(tools.len());
    let mut web_search_options: Option<serde_json::Value> = None;

    for tool in tools {
        match tool.get("type").and_then(serde_json::Value::as_str) {
            Some("web_search") | Some("web_search_preview") => {
                let mut options = serde_json::Map::new();
                if let Some(size) = tool.get("search_context_size") {
                    options.insert("search_context_size".to_string(), size.clone());
                }
                if let Some(location) = tool.get("user_location") {
                    options.insert("user_location".to_string(), location.clone());
                }
                web_search_options = Some(serde_json::Value::Object(options));
            }
            Some("mcp") => converted.push(tool.clone()),
            Some("function") => converted.push(convert_function_tool(tool)),
            _ => converted.push(tool.clone()),
        }
    }

    (converted, web_search_options)
}

fn convert_function_tool(tool: &serde_json::Value) -> serde_json::Value {
    let mut parameters = tool
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    if let Some(object) = parameters.as_object_mut() {
        object
            .entry("type".to_string())
            .or_insert_with(|| serde_json::Value::String("object".to_string()));
    }

    let mut function = serde_json::Map::new();
    if let Some(name) = tool.get("name") {
        function.insert("name".to_string(), name.clone());
    }
    if let Some(description) = tool.get("description") {
        function.insert("description".to_string(), description.clone());
    }
    function.insert("parameters".to_string(), parameters);

    let mut entry = serde_json::Map::new();
    entry.insert(
        "type".to_string(),
        serde_json::Value::String("function".to_string()),
    );
    entry.insert("function".to_string(), serde_json::Value::Object(function));
    for key in ["cache_control", "defer_loading", "allowed_callers", "input_examples"] {
        if let Some(value) = tool.get(key) {
            entry.insert(key.to_string(), value.clone());
        }
    }
    serde_json::Value::Object(entry)
}

fn flatten_tool_choice(choice: &serde_json::Value) -> serde_json::Value {
    if choice.is_string() {
        return choice.clone();
    }
    match choice.get("type").and_then(serde_json::Value::as_str) {
        Some("auto") => serde_json::Value::String("auto".to_string()),
        Some("none") => serde_json::Value::String("none".to_string()),
        Some("required") | Some("tool") => serde_json::Value::String("required".to_string()),
        _ => choice.clone(),
    }
}
