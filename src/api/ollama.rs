use std::sync::Arc;

use axum::response::Response;
use bytes::Bytes;

use crate::api::common::{handle_chat, ok_json_response};
use crate::error::into_axum_response;
use crate::protocol::ollama::OllamaAdapter;
use crate::protocol::IngressProtocol;
use crate::state::AppState;
use crate::util::rfc3339_from_epoch_secs;
use crate::util::unix_now_secs;

const INGRESS: IngressProtocol = IngressProtocol::Ollama;

/// `POST /api/chat`
pub(crate) async fn chat_handler(state: Arc<AppState>, body: Bytes) -> Response {
    match handle_chat(OllamaAdapter, state, body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, INGRESS),
    }
}

/// `GET /api/tags`: model listing Ollama clients probe before chatting.
pub(crate) fn tags_handler(state: &Arc<AppState>) -> Response {
    ok_json_response(state.models.ollama_tags_body())
}

/// `GET /api/version`
pub(crate) fn version_handler() -> Response {
    ok_json_response(Bytes::from(
        serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }).to_string(),
    ))
}

/// `POST /api/show`: minimal model details so `ollama run`-style clients
/// proceed past their preflight.
pub(crate) fn show_handler(state: &Arc<AppState>, body: &Bytes) -> Response {
    let requested = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("model")
                .or_else(|| v.get("name"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| state.models.current().model_id);

    ok_json_response(Bytes::from(
        serde_json::json!({
            "modelfile": "",
            "parameters": "",
            "template": "",
            "details": {
                "parent_model": "",
                "format": "gguf",
                "family": "copilot",
                "families": ["copilot"],
                "parameter_size": "",
                "quantization_level": "",
            },
            "model_info": { "general.basename": requested },
            "modified_at": rfc3339_from_epoch_secs(Some(unix_now_secs())),
        })
        .to_string(),
    ))
}
