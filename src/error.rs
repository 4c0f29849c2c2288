use crate::protocol::IngressProtocol;

/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Stream parse error: {0}")]
    Parse(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    ServerError,
}

impl GatewayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            GatewayError::Auth(_) => ErrorCategory::Authentication,
            // An upstream 401 means our bearer token was rejected.
            GatewayError::Upstream { status: 401, .. } => ErrorCategory::Authentication,
            GatewayError::Config(_)
            | GatewayError::Transport(_)
            | GatewayError::Parse(_)
            | GatewayError::Internal(_)
            | GatewayError::Upstream { .. } => ErrorCategory::ServerError,
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Protocol-native error payload shapes
// ---------------------------------------------------------------------------

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::ServerError => "server_error",
    }
}

fn anthropic_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::ServerError => "api_error",
    }
}

#[must_use]
pub(crate) fn openai_error_payload(cat: ErrorCategory, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": openai_error_type(cat),
            "code": null,
            "param": null,
        }
    })
}

#[must_use]
pub(crate) fn anthropic_error_payload(cat: ErrorCategory, message: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "error",
        "error": {
            "type": anthropic_error_type(cat),
            "message": message,
        }
    })
}

#[must_use]
pub(crate) fn ollama_error_payload(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Format an error for a given ingress protocol, returning (status, JSON body).
#[must_use]
pub fn format_error(
    err: &GatewayError,
    ingress: IngressProtocol,
) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    let message = err.to_string();

    let body = match ingress {
        IngressProtocol::OpenAiChat | IngressProtocol::OpenAiResponses => {
            openai_error_payload(cat, &message)
        }
        IngressProtocol::Anthropic => anthropic_error_payload(cat, &message),
        IngressProtocol::Ollama => ollama_error_payload(&message),
    };

    (status, body)
}

/// The payload written as a final frame when a stream fails after bytes
/// were already written to the client.
#[must_use]
pub(crate) fn stream_error_payload(
    err: &GatewayError,
    ingress: IngressProtocol,
) -> serde_json::Value {
    let cat = err.category();
    let message = err.to_string();
    match ingress {
        IngressProtocol::OpenAiChat | IngressProtocol::OpenAiResponses => {
            openai_error_payload(cat, &message)
        }
        IngressProtocol::Anthropic => anthropic_error_payload(cat, &message),
        IngressProtocol::Ollama => ollama_error_payload(&message),
    }
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

/// Convert a `GatewayError` into an axum response for a specific ingress.
#[must_use]
pub fn into_axum_response(err: &GatewayError, ingress: IngressProtocol) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err, ingress);
    (status, axum::Json(body)).into_response()
}

/// Default `IntoResponse` implementation uses `OpenAiChat` as the fallback
/// ingress. Real handlers call [`into_axum_response`] with the correct one.
impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self, IngressProtocol::OpenAiChat)
    }
}
