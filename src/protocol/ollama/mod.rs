pub mod request;
pub mod response;
pub mod stream;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::protocol::upstream::UpstreamRequest;
use crate::protocol::{ChatAdapter, IngressProtocol};
use crate::stream::{OutboundFrame, StreamFraming};

pub use self::stream::OllamaStreamState;

/// Ollama chat request wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
    /// Generation options, spread flat into the upstream payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Ollama message wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    /// Base64 image payloads without data-URL prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Adapter for the Ollama chat protocol.
pub struct OllamaAdapter;

impl ChatAdapter for OllamaAdapter {
    type Request = OllamaChatRequest;
    type StreamState = OllamaStreamState;

    const INGRESS: IngressProtocol = IngressProtocol::Ollama;
    const FRAMING: StreamFraming = StreamFraming::Ndjson;

    fn convert_request(&self, request: &Self::Request) -> Result<UpstreamRequest, GatewayError> {
        request::convert_request(request)
    }

    fn detect_vision_request(&self, request: &Self::Request) -> bool {
        request
            .messages
            .iter()
            .any(|message| message.images.as_ref().is_some_and(|images| !images.is_empty()))
    }

    fn wants_stream(&self, request: &Self::Request) -> bool {
        // Ollama streams unless the client opts out.
        request.stream.unwrap_or(true)
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

/// Detect an image MIME type from the base64 payload prefix.
#[must_use]
pub(crate) fn detect_image_mime(base64: &str) -> &'static str {
    if base64.starts_with("/9j/") {
        "image/jpeg"
    } else if base64.starts_with("iVBOR") {
        "image/png"
    } else if base64.starts_with("R0lGO") {
        "image/gif"
    } else if base64.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
