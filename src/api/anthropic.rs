use std::sync::Arc;

use axum::response::Response;
use bytes::Bytes;

use crate::api::common::{handle_chat, ok_json_response};
use crate::error::{into_axum_response, GatewayError};
use crate::protocol::anthropic::AnthropicAdapter;
use crate::protocol::IngressProtocol;
use crate::state::AppState;

const INGRESS: IngressProtocol = IngressProtocol::Anthropic;

/// `POST /v1/messages`
pub(crate) async fn handler(state: Arc<AppState>, body: Bytes) -> Response {
    match handle_chat(AnthropicAdapter, state, body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, INGRESS),
    }
}

/// `POST /v1/messages/count_tokens`
///
/// Heuristic estimate: serialized request length over four. No upstream
/// round trip.
pub(crate) fn count_tokens_handler(body: &Bytes) -> Response {
    match count_tokens(body) {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, INGRESS),
    }
}

fn count_tokens(body: &Bytes) -> Result<Response, GatewayError> {
    serde_json::from_slice::<serde_json::Value>(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("Malformed request body: {e}")))?;
    let input_tokens = (body.len() as u64).div_ceil(4).max(1);
    Ok(ok_json_response(Bytes::from(
        serde_json::json!({ "input_tokens": input_tokens }).to_string(),
    )))
}
