//! Anthropic streaming translation.
//!
//! Rebuilds the `message_start` / `content_block_*` / `message_delta` /
//! `message_stop` life-cycle from the upstream's flat choice deltas. Block
//! indices are assigned as blocks open; tool-call accumulators are keyed
//! by function name, so a repeated name in one turn reuses its block.

use crate::error::GatewayError;
use crate::protocol::finish_reason_to_anthropic;
use crate::protocol::upstream::{ChatCompletionsChunk, UpstreamUsage};
use crate::stream::sse::{drain_data_payloads, DataPayload};
use crate::stream::OutboundFrame;
use crate::util::{next_call_id, next_message_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

/// Per-request translation state.
#[derive(Debug)]
pub struct AnthropicStreamState {
    started: bool,
    block_open: bool,
    current_kind: Option<BlockKind>,
    /// Index of the open (or last opened) content block; -1 before any.
    current_index: i64,
    tools: Vec<ToolAccumulator>,
    current_tool: Option<usize>,
    message_id: String,
    model: String,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    stop_reason: Option<&'static str>,
    finished: bool,
}

impl Default for AnthropicStreamState {
    fn default() -> Self {
        Self {
            started: false,
            block_open: false,
            current_kind: None,
            current_index: -1,
            tools: Vec::new(),
            current_tool: None,
            message_id: String::new(),
            model: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            stop_reason: None,
            finished: false,
        }
    }
}

#[derive(Debug)]
struct ToolAccumulator {
    name: String,
    arguments: String,
}

pub(super) fn parse_stream_chunk(
    buffer: &mut String,
    state: &mut AnthropicStreamState,
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
    state: &mut AnthropicStreamState,
    out: &mut Vec<OutboundFrame>,
) {
    if !state.started {
        state.started = true;
        state.message_id = next_message_id();
        state.model = chunk.model.clone().unwrap_or_default();
        if let Some(usage) = &chunk.usage {
            merge_usage(state, usage);
        }
        out.push(message_start(state));
    } else if let Some(usage) = &chunk.usage {
        merge_usage(state, usage);
    }

    for choice in &chunk.choices {
        if let Some(content) = &choice.delta.content {
            if !content.is_empty() {
                if !state.block_open {
                    state.current_index += 1;
                    state.block_open = true;
                    state.current_kind = Some(BlockKind::Text);
                    out.push(OutboundFrame::json(&serde_json::json!({
                        "type": "content_block_start",
                        "index": state.current_index,
                        "content_block": { "type": "text", "text": "" },
                    })));
                }
                out.push(OutboundFrame::json(&serde_json::json!({
                    "type": "content_block_delta",
                    "index": state.current_index,
                    "delta": { "type": "text", "text": content },
                })));
            }
        }

        if let Some(tool_calls) = &choice.delta.tool_calls {
            for tool_delta in tool_calls {
                let function = tool_delta.function.as_ref();
                if let Some(name) = function.and_then(|f| f.name.as_deref()) {
                    open_tool_block(state, name, tool_delta.id.as_deref(), out);
                }
                if let Some(arguments) = function.and_then(|f| f.arguments.as_deref()) {
                    // A dangling arguments delta has no block; drop it
                    // rather than kill the stream.
                    let Some(index) = state.current_tool else {
                        continue;
                    };
                    state.tools[index].arguments.push_str(arguments);
                    out.push(OutboundFrame::json(&serde_json::json!({
                        "type": "content_block_delta",
                        "index": state.current_index,
                        "delta": { "type": "input_json_delta", "partial_json": arguments },
                    })));
                }
            }
        }

        if let Some(reason) = &choice.finish_reason {
            state.stop_reason = Some(finish_reason_to_anthropic(reason));
            if let Some(usage) = &chunk.usage {
                state.output_tokens = usage.completion_tokens;
            }
        }
    }
}

fn open_tool_block(
    state: &mut AnthropicStreamState,
    name: &str,
    call_id: Option<&str>,
    out: &mut Vec<OutboundFrame>,
) {
    if let Some(index) = state.tools.iter().position(|tool| tool.name == name) {
        state.current_tool = Some(index);
        return;
    }

    // An open text block ends before the tool block starts.
    if state.block_open && state.current_kind == Some(BlockKind::Text) {
        out.push(OutboundFrame::json(&serde_json::json!({
            "type": "content_block_stop",
            "index": state.current_index,
        })));
        state.block_open = false;
    }

    let id = call_id.map_or_else(next_call_id, str::to_string);
    state.tools.push(ToolAccumulator {
        name: name.to_string(),
        arguments: String::new(),
    });
    state.current_tool = Some(state.tools.len() - 1);
    state.current_index += 1;
    state.block_open = true;
    state.current_kind = Some(BlockKind::ToolUse);
    out.push(OutboundFrame::json(&serde_json::json!({
        "type": "content_block_start",
        "index": state.current_index,
        "content_block": { "type": "tool_use", "id": id, "name": name, "input": {} },
    })));
}

fn merge_usage(state: &mut AnthropicStreamState, usage: &UpstreamUsage) {
    state.input_tokens = usage.billable_input_tokens();
    state.cache_read_tokens = usage.cached_tokens();
    if usage.completion_tokens > 0 {
        state.output_tokens = usage.completion_tokens;
    }
}

fn message_start(state: &AnthropicStreamState) -> OutboundFrame {
    OutboundFrame::json(&serde_json::json!({
        "type": "message_start",
        "message": {
            "id": state.message_id,
            "type": "message",
            "role": "assistant",
            "content": [],
            "model": state.model,
            "stop_reason": null,
            "stop_sequence": null,
            "usage": {
                "input_tokens": state.input_tokens,
                "output_tokens": 0,
                "cache_read_input_tokens": state.cache_read_tokens,
                "cache_creation_input_tokens": 0,
            },
        },
    }))
}

/// Close any open block and emit the terminal `message_delta` +
/// `message_stop` pair. Idempotent across the `[DONE]` sentinel and the
/// end-of-stream drain.
pub(super) fn finalize(state: &mut AnthropicStreamState, out: &mut Vec<OutboundFrame>) {
    if state.finished || !state.started {
        state.finished = true;
        return;
    }
    state.finished = true;

    if state.block_open {
        out.push(OutboundFrame::json(&serde_json::json!({
            "type": "content_block_stop",
            "index": state.current_index,
        })));
        state.block_open = false;
    }

    out.push(OutboundFrame::json(&serde_json::json!({
        "type": "message_delta",
        "delta": {
            "stop_reason": state.stop_reason.unwrap_or("end_turn"),
            "stop_sequence": null,
        },
        "usage": {
            "input_tokens": state.input_tokens,
            "output_tokens": state.output_tokens,
            "cache_read_input_tokens": state.cache_read_tokens,
            "cache_creation_input_tokens": 0,
        },
    })));
    out.push(OutboundFrame::json(
        &serde_json::json!({ "type": "message_stop" }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut AnthropicStreamState, sse: &str) -> Vec<serde_json::Value> {
        let mut buffer = sse.to_string();
        let mut out = Vec::new();
        parse_stream_chunk(&mut buffer, state, &mut out).unwrap();
        out.iter()
            .map(|frame| serde_json::from_str(&frame.data).unwrap())
            .collect()
    }

    fn event_types(events: &[serde_json::Value]) -> Vec<String> {
        events
            .iter()
            .map(|e| e["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_text_stream_life_cycle() {
        let mut state = AnthropicStreamState::default();
        let events = feed(
            &mut state,
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n\
             data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n\
             data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}\n\n\
             data: [DONE]\n\n",
        );
        assert_eq!(
            event_types(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(events[0]["message"]["model"], "gpt-4o");
        assert_eq!(events[1]["index"], 0);
        assert_eq!(events[1]["content_block"]["type"], "text");
        assert_eq!(events[2]["delta"]["type"], "text");
        assert_eq!(events[2]["delta"]["text"], "Hel");
        assert_eq!(events[5]["delta"]["stop_reason"], "end_turn");
        assert_eq!(events[5]["usage"]["input_tokens"], 5);
        assert_eq!(events[5]["usage"]["output_tokens"], 2);
    }

    #[test]
    fn test_tool_use_stream_life_cycle() {
        let mut state = AnthropicStreamState::default();
        let events = feed(
            &mut state,
            "data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"get_weather\",\"arguments\":\"{\\\"location\\\":\\\"Beijing\\\"}\"}}]}}]}\n\n\
             data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}],\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":20}}\n\n\
             data: [DONE]\n\n",
        );
        assert_eq!(
            event_types(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        let start = &events[1];
        assert_eq!(start["index"], 0);
        assert_eq!(start["content_block"]["type"], "tool_use");
        assert_eq!(start["content_block"]["name"], "get_weather");
        assert!(start["content_block"]["id"]
            .as_str()
            .unwrap()
            .starts_with("call_"));
        assert_eq!(start["content_block"]["input"], serde_json::json!({}));
        assert_eq!(
            events[2]["delta"]["partial_json"],
            "{\"location\":\"Beijing\"}"
        );
        assert_eq!(events[4]["delta"]["stop_reason"], "tool_use");
        assert_eq!(events[4]["usage"]["input_tokens"], 100);
        assert_eq!(events[4]["usage"]["output_tokens"], 20);
        assert_eq!(events[4]["usage"]["cache_read_input_tokens"], 0);
        assert_eq!(events[4]["usage"]["cache_creation_input_tokens"], 0);
    }

    #[test]
    fn test_text_block_closes_before_tool_block() {
        let mut state = AnthropicStreamState::default();
        let events = feed(
            &mut state,
            "data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"thinking\"}}]}\n\n\
             data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_9\",\"function\":{\"name\":\"f\",\"arguments\":\"{}\"}}]}}]}\n\n\
             data: [DONE]\n\n",
        );
        let types = event_types(&events);
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",  // text, index 0
                "content_block_delta",
                "content_block_stop",   // text closes
                "content_block_start",  // tool_use, index 1
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(events[1]["index"], 0);
        assert_eq!(events[3]["index"], 0);
        assert_eq!(events[4]["index"], 1);
        assert_eq!(events[4]["content_block"]["id"], "call_9");
        assert_eq!(events[6]["index"], 1);
    }

    #[test]
    fn test_same_name_tool_reuses_block() {
        let mut state = AnthropicStreamState::default();
        let events = feed(
            &mut state,
            "data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"f\",\"arguments\":\"{\\\"a\\\":1}\"}}]}}]}\n\n\
             data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"name\":\"f\",\"arguments\":\"{\\\"a\\\":2}\"}}]}}]}\n\n\
             data: [DONE]\n\n",
        );
        // One content_block_start only: the repeated name lands in the
        // same accumulator.
        let starts = events
            .iter()
            .filter(|e| e["type"] == "content_block_start")
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_cached_tokens_in_message_start_and_delta() {
        let mut state = AnthropicStreamState::default();
        let events = feed(
            &mut state,
            "data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":8,\"prompt_tokens_details\":{\"cached_tokens\":80}}}\n\n\
             data: [DONE]\n\n",
        );
        let start_usage = &events[0]["message"]["usage"];
        assert_eq!(start_usage["input_tokens"], 20);
        assert_eq!(start_usage["cache_read_input_tokens"], 80);
        assert_eq!(start_usage["output_tokens"], 0);

        let delta_usage = events
            .iter()
            .find(|e| e["type"] == "message_delta")
            .map(|e| &e["usage"])
            .unwrap();
        assert_eq!(delta_usage["input_tokens"], 20);
        assert_eq!(delta_usage["cache_read_input_tokens"], 80);
        assert_eq!(delta_usage["output_tokens"], 8);
        // input + cache_read reassembles the upstream prompt count.
        assert_eq!(
            delta_usage["input_tokens"].as_u64().unwrap()
                + delta_usage["cache_read_input_tokens"].as_u64().unwrap(),
            100
        );
    }

    #[test]
    fn test_eof_without_sentinel_still_closes_message() {
        let mut state = AnthropicStreamState::default();
        feed(
            &mut state,
            "data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n",
        );
        let mut out = Vec::new();
        finalize(&mut state, &mut out);
        let types: Vec<_> = out
            .iter()
            .map(|f| {
                serde_json::from_str::<serde_json::Value>(&f.data).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(
            types,
            vec!["content_block_stop", "message_delta", "message_stop"]
        );

        // Draining again emits nothing.
        let mut again = Vec::new();
        finalize(&mut state, &mut again);
        assert!(again.is_empty());
    }

    #[test]
    fn test_empty_stream_emits_nothing() {
        let mut state = AnthropicStreamState::default();
        let mut out = Vec::new();
        finalize(&mut state, &mut out);
        assert!(out.is_empty());
    }
}
