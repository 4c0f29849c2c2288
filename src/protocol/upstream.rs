//! Wire model of the upstream Chat Completions protocol.
//!
//! Every adapter converts into [`ChatCompletionsRequest`] and parses
//! [`ChatCompletionsResponse`] (unary) or [`ChatCompletionsChunk`] (one
//! decoded SSE frame) back out. Unknown fields ride along in the flattened
//! `extra` maps so pass-through traffic survives untouched.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

// ---------------------------------------------------------------------------
// Request side
// ---------------------------------------------------------------------------

/// Upstream Chat Completions request payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionsRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<UpstreamMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A message in the upstream request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<UpstreamToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl UpstreamMessage {
    #[must_use]
    pub fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(serde_json::Value::String(content)),
            ..Self::default()
        }
    }
}

/// A complete tool call. `arguments` is always a JSON-encoded string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub function: UpstreamFunctionCall,
}

/// The function part of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// The payload sent to the upstream.
///
/// Converted requests are typed; the OpenAI Chat ingress passes the client
/// body through as raw JSON so explicit nulls and extension fields survive
/// byte-for-byte.
#[derive(Debug, Clone)]
pub enum UpstreamRequest {
    Chat(Box<ChatCompletionsRequest>),
    Passthrough(serde_json::Value),
}

impl UpstreamRequest {
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            UpstreamRequest::Chat(request) => &request.model,
            UpstreamRequest::Passthrough(value) => {
                value.get("model").and_then(serde_json::Value::as_str).unwrap_or("")
            }
        }
    }

    pub fn set_model(&mut self, model: &str) {
        match self {
            UpstreamRequest::Chat(request) => request.model = model.to_string(),
            UpstreamRequest::Passthrough(value) => {
                if let Some(object) = value.as_object_mut() {
                    object.insert(
                        "model".to_string(),
                        serde_json::Value::String(model.to_string()),
                    );
                }
            }
        }
    }

    pub fn set_stream(&mut self, stream: bool) {
        match self {
            UpstreamRequest::Chat(request) => request.stream = Some(stream),
            UpstreamRequest::Passthrough(value) => {
                if let Some(object) = value.as_object_mut() {
                    object.insert("stream".to_string(), serde_json::Value::Bool(stream));
                }
            }
        }
    }

    /// Serialize into the upstream request body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when serialization fails.
    pub fn to_body(&self) -> Result<Bytes, GatewayError> {
        let encoded = match self {
            UpstreamRequest::Chat(request) => serde_json::to_vec(request),
            UpstreamRequest::Passthrough(value) => serde_json::to_vec(value),
        };
        encoded
            .map(Bytes::from)
            .map_err(|e| GatewayError::Internal(format!("Failed to encode upstream body: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Response side
// ---------------------------------------------------------------------------

/// Upstream unary Chat Completions response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionsResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub choices: Vec<UpstreamChoice>,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

/// A single choice in the unary response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamChoice {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub message: UpstreamChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The assistant message within a choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<UpstreamToolCall>>,
    #[serde(default)]
    pub annotations: Option<Vec<serde_json::Value>>,
}

/// One decoded SSE frame of the upstream stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionsChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub choices: Vec<UpstreamStreamChoice>,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

/// A choice within a stream chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamStreamChoice {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub delta: UpstreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta content within a stream choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<UpstreamToolCallDelta>>,
    #[serde(default)]
    pub annotations: Option<Vec<serde_json::Value>>,
}

/// A tool call fragment in a stream delta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamToolCallDelta {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub function: Option<UpstreamFunctionDelta>,
}

/// Function fragment within a streaming tool call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Usage block, including Copilot's cached-token accounting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
    #[serde(default)]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub text_tokens: Option<u64>,
    #[serde(default)]
    pub audio_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub text_tokens: Option<u64>,
}

impl UpstreamUsage {
    /// Tokens served out of the prompt cache.
    #[must_use]
    pub fn cached_tokens(&self) -> u64 {
        self.prompt_tokens_details
            .as_ref()
            .map_or(0, |details| details.cached_tokens)
    }

    /// Billable input tokens: prompt tokens minus the cached portion.
    #[must_use]
    pub fn billable_input_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_sub(self.cached_tokens())
    }
}
