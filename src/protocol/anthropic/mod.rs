pub mod request;
pub mod response;
pub mod stream;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::protocol::upstream::UpstreamRequest;
use crate::protocol::{ChatAdapter, IngressProtocol};
use crate::stream::{OutboundFrame, StreamFraming};

pub use self::stream::AnthropicStreamState;

/// Anthropic Messages API request wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessagesRequest {
    #[serde(default)]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// String, or an array of text blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<serde_json::Value>,
    #[serde(default)]
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Anthropic message wire type. `content` is a string or a block array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: serde_json::Value,
}

/// Anthropic tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Adapter for the Anthropic Messages protocol.
pub struct AnthropicAdapter;

impl ChatAdapter for AnthropicAdapter {
    type Request = AnthropicMessagesRequest;
    type StreamState = AnthropicStreamState;

    const INGRESS: IngressProtocol = IngressProtocol::Anthropic;
    const FRAMING: StreamFraming = StreamFraming::Sse;

    fn convert_request(&self, request: &Self::Request) -> Result<UpstreamRequest, GatewayError> {
        request::convert_request(request)
    }

    fn detect_vision_request(&self, request: &Self::Request) -> bool {
        request.messages.iter().any(|message| {
            message
                .content
                .as_array()
                .is_some_and(|blocks| {
                    blocks.iter().any(|block| {
                        block.get("type").and_then(serde_json::Value::as_str) == Some("image")
                    })
                })
        })
    }

    fn wants_stream(&self, request: &Self::Request) -> bool {
        // Absent means non-streaming for Anthropic clients.
        request.stream.unwrap_or(false)
    }

    fn parse_response(&self, body: &[u8]) -> Result<serde_json::Value, GatewayError> {
        response::parse_response(body)
    }

    fn parse_stream_chunk(
        &self,
        buffer: &mut String,
        state: &mut Self::StreamState,
        out: &mut Vec<OutboundFrame>,
    ) -> Result<(), GatewayError> {
        stream::parse_stream_chunk(buffer, state, out)
    }

    fn finish_stream(&self, state: &mut Self::StreamState, out: &mut Vec<OutboundFrame>) {
        stream::finalize(state, out);
    }
}
