pub mod request;
pub mod response;
pub mod stream;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::protocol::upstream::UpstreamRequest;
use crate::protocol::{ChatAdapter, IngressProtocol};
use crate::stream::{OutboundFrame, StreamFraming};

pub use self::stream::ResponsesStreamState;

/// OpenAI Responses API request wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default)]
    pub model: String,
    /// A plain string or an array of input items.
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Adapter for the OpenAI Responses protocol.
pub struct ResponsesAdapter;

impl ChatAdapter for ResponsesAdapter {
    type Request = ResponsesRequest;
    type StreamState = ResponsesStreamState;

    const INGRESS: IngressProtocol = IngressProtocol::OpenAiResponses;
    const FRAMING: StreamFraming = StreamFraming::Sse;

    fn convert_request(&self, request: &Self::Request) -> Result<UpstreamRequest, GatewayError> {
        request::convert_request(request)
    }

    fn detect_vision_request(&self, request: &Self::Request) -> bool {
        let Some(items) = request.input.as_array() else {
            return false;
        };
        items.iter().any(|item| {
            item.get("content")
                .and_then(serde_json::Value::as_array)
                .is_some_and(|parts| {
                    parts.iter().any(|part| {
                        part.get("type").and_then(serde_json::Value::as_str)
                            == Some("input_image")
                    })
                })
        })
    }

    fn wants_stream(&self, request: &Self::Request) -> bool {
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
