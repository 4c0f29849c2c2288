//! OpenAI Chat Completions pass-through adapter.
//!
//! The inbound protocol already matches the upstream one, so requests and
//! unary responses pass through unchanged. Streaming validates each frame
//! and re-emits it as-is; the `[DONE]` sentinel is stripped here and
//! re-appended by the pipeline's framing.

use crate::error::GatewayError;
use crate::protocol::upstream::UpstreamRequest;
use crate::protocol::{ChatAdapter, IngressProtocol};
use crate::stream::sse::{drain_data_payloads, DataPayload};
use crate::stream::{OutboundFrame, StreamFraming};

/// Adapter for the OpenAI Chat Completions protocol.
pub struct OpenAiChatAdapter;

/// Pass-through keeps no state beyond the terminator flag.
#[derive(Debug, Default)]
pub struct OpenAiChatStreamState {
    finished: bool,
}

impl ChatAdapter for OpenAiChatAdapter {
    type Request = serde_json::Value;
    type StreamState = OpenAiChatStreamState;

    const INGRESS: IngressProtocol = IngressProtocol::OpenAiChat;
    const FRAMING: StreamFraming = StreamFraming::SseWithDone;

    fn convert_request(&self, request: &Self::Request) -> Result<UpstreamRequest, GatewayError> {
        Ok(UpstreamRequest::Passthrough(request.clone()))
    }

    fn detect_vision_request(&self, request: &Self::Request) -> bool {
        let Some(messages) = request.get("messages").and_then(serde_json::Value::as_array) else {
            return false;
        };
        messages.iter().any(|message| {
            message
                .get("content")
                .and_then(serde_json::Value::as_array)
                .is_some_and(|parts| {
                    parts.iter().any(|part| {
                        part.get("type").and_then(serde_json::Value::as_str) == Some("image_url")
                    })
                })
        })
    }

    fn wants_stream(&self, request: &Self::Request) -> bool {
        request
            .get("stream")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    fn parse_response(&self, body: &[u8]) -> Result<serde_json::Value, GatewayError> {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::Parse(format!("Invalid upstream response: {e}")))
    }

    fn parse_stream_chunk(
        &self,
        buffer: &mut String,
        state: &mut Self::StreamState,
        out: &mut Vec<OutboundFrame>,
    ) -> Result<(), GatewayError> {
        let mut payloads = Vec::new();
        drain_data_payloads(buffer, &mut payloads);
        for payload in payloads {
            match payload {
                DataPayload::Done => state.finished = true,
                DataPayload::Json(json) => {
                    if state.finished {
                        continue;
                    }
                    // Validate before re-emitting; a corrupt frame is fatal.
                    serde_json::from_str::<serde::de::IgnoredAny>(&json)
                        .map_err(|e| GatewayError::Parse(format!("Invalid upstream frame: {e}")))?;
                    out.push(OutboundFrame::raw(json));
                }
            }
        }
        Ok(())
    }

    fn finish_stream(&self, state: &mut Self::StreamState, _out: &mut Vec<OutboundFrame>) {
        state.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_passes_through_unchanged() {
        let request = serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "metadata": {"trace": "t-1"},
            "logit_bias": {"50256": -100},
        });
        let upstream = OpenAiChatAdapter.convert_request(&request).unwrap();
        let body: serde_json::Value =
            serde_json::from_slice(&upstream.to_body().unwrap()).unwrap();
        assert_eq!(body, request);
    }

    #[test]
    fn test_response_passes_through_unchanged() {
        let body = br#"{"id":"chatcmpl-1","choices":[{"message":{"content":null}}],"x":1}"#;
        let out = OpenAiChatAdapter.parse_response(body).unwrap();
        assert_eq!(out["x"], 1);
        assert!(out["choices"][0]["message"]["content"].is_null());
    }

    #[test]
    fn test_vision_detection() {
        let request = serde_json::json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "what?"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBOR"}}
                ]
            }]
        });
        assert!(OpenAiChatAdapter.detect_vision_request(&request));

        let plain = serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}]
        });
        assert!(!OpenAiChatAdapter.detect_vision_request(&plain));
    }

    #[test]
    fn test_stream_frames_re_emitted_done_stripped() {
        let mut state = OpenAiChatStreamState::default();
        let mut buffer = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n"
            .to_string();
        let mut out = Vec::new();
        OpenAiChatAdapter
            .parse_stream_chunk(&mut buffer, &mut state, &mut out)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, "{\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}");
        assert!(state.finished);
    }

    #[test]
    fn test_corrupt_frame_is_fatal() {
        let mut state = OpenAiChatStreamState::default();
        let mut buffer = "data: {not json}\n\n".to_string();
        let mut out = Vec::new();
        let err = OpenAiChatAdapter
            .parse_stream_chunk(&mut buffer, &mut state, &mut out)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }
}
