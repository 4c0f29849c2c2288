//! Ollama streaming translation.
//!
//! Text deltas map one-to-one onto NDJSON frames. Tool-call deltas are
//! accumulated per function name and held back until the upstream stream
//! terminates, then flushed as one frame with decoded arguments followed
//! by a separate terminal `done:true` frame.

use crate::error::GatewayError;
use crate::protocol::upstream::ChatCompletionsChunk;
use crate::stream::sse::{drain_data_payloads, DataPayload};
use crate::stream::OutboundFrame;
use crate::util::rfc3339_from_epoch_secs;

use super::response::decode_arguments;

/// Per-request translation state.
#[derive(Debug, Default)]
pub struct OllamaStreamState {
    /// Tool accumulators keyed by function name, in first-seen order. A
    /// repeated name replaces its earlier accumulator, so two calls to the
    /// same function in one turn collapse into one.
    tools: Vec<ToolAccumulator>,
    current_tool: Option<usize>,
    model: String,
    created: Option<u64>,
    done_reason: Option<&'static str>,
    prompt_eval_count: u64,
    eval_count: u64,
    finished: bool,
}

#[derive(Debug)]
struct ToolAccumulator {
    name: String,
    arguments: String,
}

pub(super) fn parse_stream_chunk(
    buffer: &mut String,
    state: &mut OllamaStreamState,
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
    state: &mut OllamaStreamState,
    out: &mut Vec<OutboundFrame>,
) {
    if let Some(model) = &chunk.model {
        state.model = model.clone();
    }
    if chunk.created.is_some() {
        state.created = chunk.created;
    }
    if let Some(usage) = &chunk.usage {
        state.prompt_eval_count = usage.prompt_tokens;
        state.eval_count = usage.completion_tokens;
    }

    for choice in &chunk.choices {
        if let Some(content) = &choice.delta.content {
            if !content.is_empty() {
                out.push(content_frame(state, content));
            }
        }

        if let Some(tool_calls) = &choice.delta.tool_calls {
            for tool_delta in tool_calls {
                let function = tool_delta.function.as_ref();
                if let Some(name) = function.and_then(|f| f.name.as_deref()) {
                    upsert_accumulator(state, name);
                }
                if let Some(arguments) = function.and_then(|f| f.arguments.as_deref()) {
                    // An arguments delta before any named call has nowhere
                    // to go; skip it rather than kill the stream.
                    if let Some(index) = state.current_tool {
                        state.tools[index].arguments.push_str(arguments);
                    }
                }
            }
        }

        if choice.finish_reason.is_some() {
            state.done_reason = Some("stop");
        }
    }
}

fn upsert_accumulator(state: &mut OllamaStreamState, name: &str) {
    if let Some(index) = state.tools.iter().position(|tool| tool.name == name) {
        state.tools[index].arguments.clear();
        state.current_tool = Some(index);
    } else {
        state.tools.push(ToolAccumulator {
            name: name.to_string(),
            arguments: String::new(),
        });
        state.current_tool = Some(state.tools.len() - 1);
    }
}

/// Flush accumulated tool calls and emit the terminal frame. Idempotent:
/// the `[DONE]` sentinel and the end-of-stream drain both land here.
pub(super) fn finalize(state: &mut OllamaStreamState, out: &mut Vec<OutboundFrame>) {
    if state.finished {
        return;
    }
    state.finished = true;

    if !state.tools.is_empty() {
        let calls: Vec<serde_json::Value> = state
            .tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "function": {
                        "name": tool.name,
                        "arguments": decode_arguments(&tool.arguments),
                    }
                })
            })
            .collect();
        out.push(OutboundFrame::json(&serde_json::json!({
            "model": state.model,
            "created_at": rfc3339_from_epoch_secs(state.created),
            "message": { "role": "assistant", "content": "", "tool_calls": calls },
            "done": false,
        })));
    }

    out.push(OutboundFrame::json(&serde_json::json!({
        "model": state.model,
        "created_at": rfc3339_from_epoch_secs(state.created),
        "message": { "role": "assistant", "content": "" },
        "done": true,
        "done_reason": state.done_reason.unwrap_or("stop"),
        "prompt_eval_count": state.prompt_eval_count,
        "eval_count": state.eval_count,
    })));
}

fn content_frame(state: &OllamaStreamState, content: &str) -> OutboundFrame {
    OutboundFrame::json(&serde_json::json!({
        "model": state.model,
        "created_at": rfc3339_from_epoch_secs(state.created),
        "message": { "role": "assistant", "content": content },
        "done": false,
    }))
}
