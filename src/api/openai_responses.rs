use std::sync::Arc;

use axum::response::Response;
use bytes::Bytes;

use crate::api::common::handle_chat;
use crate::error::into_axum_response;
use crate::protocol::openai_responses::ResponsesAdapter;
use crate::protocol::IngressProtocol;
use crate::state::AppState;

const INGRESS: IngressProtocol = IngressProtocol::OpenAiResponses;

/// `POST /v1/responses`
pub(crate) async fn handler(state: Arc<AppState>, body: Bytes) -> Response {
    match handle_chat(ResponsesAdapter, state, body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, INGRESS),
    }
}
