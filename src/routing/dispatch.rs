use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{anthropic, health, models, ollama, openai_chat, openai_responses};
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

enum RouteMatch {
    Health,
    OllamaTags,
    OllamaVersion,
    OllamaShow,
    OllamaChat,
    OpenAiModels,
    OpenAiChat,
    OpenAiResponses,
    AnthropicMessages,
    AnthropicCountTokens,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching ingress handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path());

    let response = match route {
        RouteMatch::Health => health::health_handler(),
        RouteMatch::OllamaTags => ollama::tags_handler(&state),
        RouteMatch::OllamaVersion => ollama::version_handler(),
        RouteMatch::OpenAiModels => models::openai_models_handler(&state),
        RouteMatch::OllamaShow => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            ollama::show_handler(&state, &body_bytes)
        }
        RouteMatch::OllamaChat => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            ollama::chat_handler(state, body_bytes).await
        }
        RouteMatch::OpenAiChat => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            openai_chat::handler(state, body_bytes).await
        }
        RouteMatch::OpenAiResponses => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            openai_responses::handler(state, body_bytes).await
        }
        RouteMatch::AnthropicMessages => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            anthropic::handler(state, body_bytes).await
        }
        RouteMatch::AnthropicCountTokens => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            anthropic::count_tokens_handler(&body_bytes)
        }
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    Ok(response)
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 16MiB)",
            )
                .into_response()
        })
}

fn match_route(method: &Method, path: &str) -> RouteMatch {
    match path {
        "/" => expect(method, Method::GET, RouteMatch::Health),
        "/api/tags" => expect(method, Method::GET, RouteMatch::OllamaTags),
        "/api/version" => expect(method, Method::GET, RouteMatch::OllamaVersion),
        "/api/show" => expect(method, Method::POST, RouteMatch::OllamaShow),
        "/api/chat" => expect(method, Method::POST, RouteMatch::OllamaChat),
        "/v1/models" => expect(method, Method::GET, RouteMatch::OpenAiModels),
        "/v1/chat/completions" => expect(method, Method::POST, RouteMatch::OpenAiChat),
        "/v1/responses" | "/v1/responses/compact" | "/v1/response" | "/v1/response/compact" => {
            expect(method, Method::POST, RouteMatch::OpenAiResponses)
        }
        "/v1/messages" => expect(method, Method::POST, RouteMatch::AnthropicMessages),
        "/v1/messages/count_tokens" => {
            expect(method, Method::POST, RouteMatch::AnthropicCountTokens)
        }
        _ => RouteMatch::NotFound,
    }
}

fn expect(method: &Method, wanted: Method, matched: RouteMatch) -> RouteMatch {
    if *method == wanted {
        matched
    } else {
        RouteMatch::MethodNotAllowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(method: Method, path: &str) -> &'static str {
        match match_route(&method, path) {
            RouteMatch::Health => "health",
            RouteMatch::OllamaTags => "tags",
            RouteMatch::OllamaVersion => "version",
            RouteMatch::OllamaShow => "show",
            RouteMatch::OllamaChat => "ollama_chat",
            RouteMatch::OpenAiModels => "models",
            RouteMatch::OpenAiChat => "openai_chat",
            RouteMatch::OpenAiResponses => "responses",
            RouteMatch::AnthropicMessages => "anthropic",
            RouteMatch::AnthropicCountTokens => "count_tokens",
            RouteMatch::MethodNotAllowed => "method_not_allowed",
            RouteMatch::NotFound => "not_found",
        }
    }

    #[test]
    fn test_route_table() {
        assert_eq!(kind(Method::GET, "/"), "health");
        assert_eq!(kind(Method::GET, "/api/tags"), "tags");
        assert_eq!(kind(Method::POST, "/api/chat"), "ollama_chat");
        assert_eq!(kind(Method::POST, "/v1/chat/completions"), "openai_chat");
        assert_eq!(kind(Method::POST, "/v1/messages"), "anthropic");
        assert_eq!(
            kind(Method::POST, "/v1/messages/count_tokens"),
            "count_tokens"
        );
        assert_eq!(kind(Method::POST, "/v1/responses"), "responses");
        assert_eq!(kind(Method::POST, "/v1/responses/compact"), "responses");
        assert_eq!(kind(Method::POST, "/v1/response"), "responses");
        assert_eq!(kind(Method::POST, "/v1/response/compact"), "responses");
        assert_eq!(kind(Method::GET, "/v1/models"), "models");
    }

    #[test]
    fn test_wrong_method_is_rejected() {
        assert_eq!(kind(Method::GET, "/api/chat"), "method_not_allowed");
        assert_eq!(kind(Method::POST, "/api/tags"), "method_not_allowed");
    }

    #[test]
    fn test_unknown_path_not_found() {
        assert_eq!(kind(Method::GET, "/v2/unknown"), "not_found");
    }
}
