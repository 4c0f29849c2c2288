use std::sync::Arc;

use axum::response::Response;
use bytes::Bytes;

use crate::api::common::handle_chat;
use crate::error::into_axum_response;
use crate::protocol::openai_chat::OpenAiChatAdapter;
use crate::protocol::IngressProtocol;
use crate::state::AppState;

const INGRESS: IngressProtocol = IngressProtocol::OpenAiChat;

/// `POST /v1/chat/completions`
pub(crate) async fn handler(state: Arc<AppState>, body: Bytes) -> Response {
    match handle_chat(OpenAiChatAdapter, state, body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, INGRESS),
    }
}
