use std::sync::Arc;

use axum::response::Response;

use crate::api::common::ok_json_response;
use crate::state::AppState;

/// `GET /v1/models`: OpenAI-format model listing.
pub(crate) fn openai_models_handler(state: &Arc<AppState>) -> Response {
    ok_json_response(state.models.openai_models_body())
}
