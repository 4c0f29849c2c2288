//! Protocol adapters.
//!
//! Each public protocol has one adapter implementing [`ChatAdapter`]:
//! request conversion into the upstream payload, vision detection, unary
//! response translation, and incremental stream translation. Adapters are
//! stateless; all mutable parsing state lives in the per-request
//! `StreamState` owned by the pipeline.

pub mod anthropic;
pub mod ollama;
pub mod openai_chat;
pub mod openai_responses;
pub mod upstream;

use crate::error::GatewayError;
use crate::stream::{OutboundFrame, StreamFraming};
use self::upstream::UpstreamRequest;

/// Which public protocol the request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngressProtocol {
    Ollama,
    OpenAiChat,
    Anthropic,
    OpenAiResponses,
}

/// Capability contract shared by the four protocol adapters.
pub trait ChatAdapter {
    /// Decoded inbound request.
    type Request: serde::de::DeserializeOwned + Send;
    /// Per-request stream translation state. Fresh per request, never
    /// shared; the adapter itself holds nothing between calls.
    type StreamState: Default + Send;

    const INGRESS: IngressProtocol;
    const FRAMING: StreamFraming;

    /// Convert the inbound request into a self-contained upstream payload.
    ///
    /// Pure apart from identifier minting. Malformed content is converted
    /// where possible and dropped silently otherwise; the model field may
    /// be left blank for the pipeline to fill.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] only when nothing usable
    /// can be converted.
    fn convert_request(&self, request: &Self::Request) -> Result<UpstreamRequest, GatewayError>;

    /// True iff any message carries an image content part native to the
    /// protocol. The pipeline sets `Copilot-Vision-Request: true` then.
    fn detect_vision_request(&self, request: &Self::Request) -> bool;

    /// Whether the client asked for a streaming response.
    fn wants_stream(&self, request: &Self::Request) -> bool;

    /// Translate a complete upstream unary body into the protocol-native
    /// response.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Parse`] when the body is not decodable.
    fn parse_response(&self, body: &[u8]) -> Result<serde_json::Value, GatewayError>;

    /// Consume buffered upstream bytes, draining complete SSE frames and
    /// appending protocol-native events to `out`. The incomplete tail
    /// stays in `buffer` for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Parse`] when a complete `data:` payload is
    /// not valid JSON; this is fatal for the request.
    fn parse_stream_chunk(
        &self,
        buffer: &mut String,
        state: &mut Self::StreamState,
        out: &mut Vec<OutboundFrame>,
    ) -> Result<(), GatewayError>;

    /// Drain pass at end of stream: close any open state. Must be
    /// idempotent with the `[DONE]` sentinel handling.
    fn finish_stream(&self, state: &mut Self::StreamState, out: &mut Vec<OutboundFrame>);
}

/// Map an upstream `finish_reason` onto Anthropic's stop-reason vocabulary.
#[must_use]
pub(crate) fn finish_reason_to_anthropic(reason: &str) -> &'static str {
    match reason {
        "length" => "max_tokens",
        "tool_calls" => "tool_use",
        "content_filter" => "refusal",
        _ => "end_turn",
    }
}
