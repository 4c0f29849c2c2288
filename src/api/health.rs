use axum::response::{IntoResponse, Response};

pub(crate) fn health_handler() -> Response {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}
