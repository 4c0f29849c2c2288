//! Responses API streaming translation.
//!
//! Rebuilds the `response.*` event life-cycle from upstream deltas. Tool
//! calls accumulate keyed by the upstream tool-call index; their
//! `output_index` is the upstream index shifted by one when a text block
//! precedes them.

use rustc_hash::FxHashMap;

use crate::error::GatewayError;
use crate::protocol::upstream::{ChatCompletionsChunk, UpstreamUsage};
use crate::stream::sse::{drain_data_payloads, DataPayload};
use crate::stream::OutboundFrame;
use crate::util::{next_function_call_id, next_message_id, next_response_id, unix_now_secs};

use super::response::usage_json;

/// Per-request translation state.
#[derive(Debug, Default)]
pub struct ResponsesStreamState {
    initialized: bool,
    response_id: String,
    created_at: u64,
    model: String,
    output_text: String,
    usage: Option<UpstreamUsage>,
    tool_calls: FxHashMap<u32, ToolCallAccumulator>,
    tool_order: Vec<u32>,
    item_id: String,
    output_item_added: bool,
    content_part_added: bool,
    annotations_added: bool,
    current_annotations: Vec<serde_json::Value>,
    finished: bool,
}

#[derive(Debug)]
struct ToolCallAccumulator {
    output_index: u64,
    item_id: String,
    name: String,
    arguments: String,
}

pub(super) fn parse_stream_chunk(
    buffer: &mut String,
    state: &mut ResponsesStreamState,
    out: &mut Vec<OutboundFrame>,
) -> Result<(), GatewayError> {
    let mut payloads = Vec::new();
    drain_data_payloads(buffer, &mut payloads);
    for payload in payloads {
        match payload {
            DataPayload::Done => finalize(state, out),
            DataPayload::Json(json) => {
                let chunk: ChatCompletionsChunk = serde_json::from_str(&json)
                    .map_err(|e| GatewayError::Parse(format!("Invalid upstream frame: {e}")))?;
                handle_chunk(&chunk, state, out);
            }
        }
    }
    Ok(())
}

fn handle_chunk(
    chunk: &ChatCompletionsChunk,
    state: &mut ResponsesStreamState,
    out: &mut Vec<OutboundFrame>,
) {
    if !state.initialized {
        state.initialized = true;
        state.response_id = next_response_id();
        state.created_at = chunk.created.unwrap_or_else(unix_now_secs);
        state.model = chunk.model.clone().unwrap_or_default();
        out.push(envelope_event(state, "response.created", "in_progress"));
        out.push(envelope_event(state, "response.in_progress", "in_progress"));
    }

    if let Some(usage) = &chunk.usage {
        state.usage = Some(usage.clone());
    }

    for choice in &chunk.choices {
        let has_content = choice
            .delta
            .content
            .as_deref()
            .is_some_and(|content| !content.is_empty());
        let has_tool_calls = choice
            .delta
            .tool_calls
            .as_ref()
            .is_some_and(|calls| !calls.is_empty());

        if (has_content || has_tool_calls) && !state.output_item_added {
            state.output_item_added = true;
            state.item_id = next_message_id();
            out.push(OutboundFrame::json(&serde_json::json!({
                "type": "response.output_item.added",
                "output_index": 0,
                "item": {
                    "type": "message",
                    "id": state.item_id,
                    "status": "in_progress",
                    "role": "assistant",
                    "content": [],
                },
            })));
        }

        if has_content {
            let content = choice.delta.content.as_deref().unwrap_or_default();
            if !state.content_part_added {
                state.content_part_added = true;
                out.push(OutboundFrame::json(&serde_json::json!({
                    "type": "response.content_part.added",
                    "item_id": state.item_id,
                    "output_index": 0,
                    "content_index": 0,
                    "part": { "type": "output_text", "text": "", "annotations": [] },
                })));
            }
            state.output_text.push_str(content);
            out.push(OutboundFrame::json(&serde_json::json!({
                "type": "response.output_text.delta",
                "item_id": state.item_id,
                "output_index": 0,
                "content_index": 0,
                "delta": content,
            })));
        }

        if let Some(annotations) = &choice.delta.annotations {
            if !state.annotations_added && !annotations.is_empty() {
                state.annotations_added = true;
                state.current_annotations = annotations.clone();
                for (index, annotation) in annotations.iter().enumerate() {
                    out.push(OutboundFrame::json(&serde_json::json!({
                        "type": "response.output_text.annotation_added",
                        "item_id": state.item_id,
                        "output_index": 0,
                        "content_index": 0,
                        "annotation_index": index,
                        "annotation": annotation,
                    })));
                }
            }
        }

        if let Some(tool_calls) = &choice.delta.tool_calls {
            for tool_delta in tool_calls {
                let index = tool_delta.index.unwrap_or(0);
                if !state.tool_calls.contains_key(&index) {
                    // Assumes at most one leading message block; with
                    // reasoning items in the same stream these indices can
                    // drift from the unary output ordering.
                    let output_index =
                        u64::from(index) + u64::from(!state.output_text.is_empty());
                    let item_id = tool_delta
                        .id
                        .clone()
                        .unwrap_or_else(next_function_call_id);
                    state.tool_calls.insert(
                        index,
                        ToolCallAccumulator {
                            output_index,
                            item_id,
                            name: String::new(),
                            arguments: String::new(),
                        },
                    );
                    state.tool_order.push(index);
                }
                let Some(accumulator) = state.tool_calls.get_mut(&index) else {
                    continue;
                };
                if let Some(function) = &tool_delta.function {
                    if let Some(name) = &function.name {
                        accumulator.name.push_str(name);
                    }
                    if let Some(arguments) = &function.arguments {
                        accumulator.arguments.push_str(arguments);
                        out.push(OutboundFrame::json(&serde_json::json!({
                            "type": "response.function_call_arguments.delta",
                            "output_index": accumulator.output_index,
                            "item_id": accumulator.item_id,
                            "delta": arguments,
                        })));
                    }
                }
            }
        }
    }
}

/// Close open parts, flush tool-call accumulators, and emit the terminal
/// `response.completed` envelope. Idempotent.
pub(super) fn finalize(state: &mut ResponsesStreamState, out: &mut Vec<OutboundFrame>) {
    if state.finished || !state.initialized {
        state.finished = true;
        return;
    }
    state.finished = true;

    if state.content_part_added {
        out.push(OutboundFrame::json(&serde_json::json!({
            "type": "response.content_part.done",
            "item_id": state.item_id,
            "output_index": 0,
            "content_index": 0,
            "part": {
                "type": "output_text",
                "text": state.output_text,
                "annotations": state.current_annotations,
            },
        })));
    }

    if state.output_item_added {
        out.push(OutboundFrame::json(&serde_json::json!({
            "type": "response.output_item.done",
            "output_index": 0,
            "item": completed_message_item(state),
        })));
    }

    if !state.output_text.is_empty() {
        out.push(OutboundFrame::json(&serde_json::json!({
            "type": "response.output_text.done",
            "item_id": state.item_id,
            "output_index": 0,
            "content_index": 0,
            "text": state.output_text,
        })));
    }

    for index in &state.tool_order {
        let Some(accumulator) = state.tool_calls.get(index) else {
            continue;
        };
        out.push(OutboundFrame::json(&serde_json::json!({
            "type": "response.function_call_arguments.done",
            "output_index": accumulator.output_index,
            "item_id": accumulator.item_id,
            "arguments": accumulator.arguments,
        })));
    }

    out.push(envelope_event(state, "response.completed", "completed"));
}

fn completed_message_item(state: &ResponsesStreamState) -> serde_json::Value {
    serde_json::json!({
        "type": "message",
        "id": state.item_id,
        "status": "completed",
        "role": "assistant",
        "content": [{
            "type": "output_text",
            "text": state.output_text,
            "annotations": state.current_annotations,
        }],
    })
}

fn envelope_event(
    state: &ResponsesStreamState,
    event_type: &str,
    status: &str,
) -> OutboundFrame {
    let mut output: Vec<serde_json::Value> = Vec::new();
    if status == "completed" {
        if state.output_item_added {
            output.push(completed_message_item(state));
        }
        for index in &state.tool_order {
            if let Some(accumulator) = state.tool_calls.get(index) {
                output.push(serde_json::json!({
                    "type": "function_call",
                    "id": accumulator.item_id,
                    "call_id": accumulator.item_id,
                    "name": accumulator.name,
                    "arguments": accumulator.arguments,
                    "status": "completed",
                }));
            }
        }
    }

    OutboundFrame::json(&serde_json::json!({
        "type": event_type,
        "response": {
            "id": state.response_id,
            "object": "response",
            "created_at": state.created_at,
            "status": status,
            "model": state.model,
            "output": output,
            "output_text": state.output_text,
            "usage": state.usage.as_ref().map(usage_json),
        },
    }))
}
