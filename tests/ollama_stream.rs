//! Fixture-driven tests for the Ollama streaming translation.

use copilot_gateway::protocol::ollama::OllamaAdapter;
use copilot_gateway::protocol::ChatAdapter;
use copilot_gateway::stream::OutboundFrame;

fn drive_single_pass(upstream_sse: &str) -> Vec<serde_json::Value> {
    let adapter = OllamaAdapter;
    let mut buffer = upstream_sse.to_string();
    let mut state = Default::default();
    let mut out = Vec::new();
    adapter
        .parse_stream_chunk(&mut buffer, &mut state, &mut out)
        .expect("stream parse");
    adapter.finish_stream(&mut state, &mut out);
    decode_frames(&out)
}

fn decode_frames(frames: &[OutboundFrame]) -> Vec<serde_json::Value> {
    frames
        .iter()
        .map(|frame| serde_json::from_str(&frame.data).expect("frame json"))
        .collect()
}

/// Scrub minted identifiers so independent runs compare structurally.
fn scrub_ids(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            for prefix in ["call_", "msg_", "fc_", "resp_", "reasoning_"] {
                if s.starts_with(prefix) {
                    *s = format!("{prefix}<id>");
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(scrub_ids),
        serde_json::Value::Object(map) => {
            // created_at is clock-derived on frames without upstream time.
            map.remove("created_at");
            map.values_mut().for_each(scrub_ids);
        }
        _ => {}
    }
}

const SIMPLE_TEXT_SSE: &str = "data: {\"model\":\"gpt-4o\",\"created\":1700000000,\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hello \"}}]}\n\n\
data: {\"model\":\"gpt-4o\",\"created\":1700000000,\"choices\":[{\"index\":0,\"delta\":{\"content\":\"world.\"}}]}\n\n\
data: {\"model\":\"gpt-4o\",\"created\":1700000000,\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}\n\n\
data: [DONE]\n\n";

#[test]
fn test_simple_text_scenario() {
    let frames = drive_single_pass(SIMPLE_TEXT_SSE);
    assert_eq!(frames.len(), 3);

    assert_eq!(frames[0]["message"]["content"], "Hello ");
    assert_eq!(frames[0]["message"]["role"], "assistant");
    assert_eq!(frames[0]["done"], false);
    assert_eq!(frames[0]["model"], "gpt-4o");

    assert_eq!(frames[1]["message"]["content"], "world.");

    assert_eq!(frames[2]["done"], true);
    assert_eq!(frames[2]["prompt_eval_count"], 5);
    assert_eq!(frames[2]["eval_count"], 2);
    assert!(frames[2]["created_at"]
        .as_str()
        .unwrap()
        .starts_with("2023-11-14T"));
}

#[test]
fn test_tool_call_arguments_reconstitute_decoded_object() {
    // Arguments split into many fragments must come out as one decoded
    // object, never the concatenated string.
    let fragments = ["{\"lo", "cation\"", ":\"Be", "ijing\"", "}"];
    let mut sse = String::from(
        "data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"\"}}]}}]}\n\n",
    );
    for fragment in fragments {
        let escaped = serde_json::to_string(fragment).unwrap();
        sse.push_str(&format!(
            "data: {{\"model\":\"m\",\"choices\":[{{\"index\":0,\"delta\":{{\"tool_calls\":[{{\"index\":0,\"function\":{{\"arguments\":{escaped}}}}}]}}}}]}}\n\n"
        ));
    }
    sse.push_str("data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}],\"usage\":{\"prompt_tokens\":11,\"completion_tokens\":6}}\n\n");
    sse.push_str("data: [DONE]\n\n");

    let frames = drive_single_pass(&sse);
    assert_eq!(frames.len(), 2);

    let tool_frame = &frames[0];
    assert_eq!(tool_frame["done"], false);
    let function = &tool_frame["message"]["tool_calls"][0]["function"];
    assert_eq!(function["name"], "get_weather");
    assert_eq!(
        function["arguments"],
        serde_json::json!({ "location": "Beijing" })
    );

    let terminal = &frames[1];
    assert_eq!(terminal["done"], true);
    assert_eq!(terminal["done_reason"], "stop");
    assert_eq!(terminal["prompt_eval_count"], 11);
    assert_eq!(terminal["eval_count"], 6);
}

#[test]
fn test_rechunk_invariance_at_every_boundary() {
    let adapter = OllamaAdapter;
    let mut expected = drive_single_pass(SIMPLE_TEXT_SSE);
    expected.iter_mut().for_each(scrub_ids);

    let bytes = SIMPLE_TEXT_SSE.as_bytes();
    for split in 1..bytes.len() {
        let mut state = Default::default();
        let mut out = Vec::new();
        let mut buffer = String::from_utf8(bytes[..split].to_vec()).unwrap();
        adapter
            .parse_stream_chunk(&mut buffer, &mut state, &mut out)
            .expect("first half");
        buffer.push_str(std::str::from_utf8(&bytes[split..]).unwrap());
        adapter
            .parse_stream_chunk(&mut buffer, &mut state, &mut out)
            .expect("second half");
        adapter.finish_stream(&mut state, &mut out);

        let mut frames = decode_frames(&out);
        frames.iter_mut().for_each(scrub_ids);
        assert_eq!(frames, expected, "split at byte {split} diverged");
    }
}

#[test]
fn test_fresh_state_processes_new_stream_independently() {
    // No cross-frame leakage: a finished stream does not taint the next
    // request's fresh state.
    let first = drive_single_pass(SIMPLE_TEXT_SSE);
    let second = drive_single_pass(SIMPLE_TEXT_SSE);
    assert_eq!(first.len(), second.len());
    assert_eq!(first[0]["message"], second[0]["message"]);
}

#[test]
fn test_upstream_without_sentinel_still_terminates() {
    let sse = "data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"partial\"}}]}\n\n";
    let frames = drive_single_pass(sse);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["done"], true);
}
