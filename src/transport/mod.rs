//! Upstream HTTP transport.
//!
//! One pooled client shared by every request. The pipeline hands over a
//! fully-formed upstream body; this module owns URL construction, the
//! identification headers, and error mapping for connection failures.

use bytes::Bytes;
use std::time::Duration;

use crate::auth::CopilotToken;
use crate::config::{EditorConfig, ServerConfig};
use crate::error::GatewayError;

const VISION_HEADER: &str = "Copilot-Vision-Request";

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the shared client.
    ///
    /// The configured timeout caps the whole exchange, streaming included;
    /// a stalled upstream read aborts rather than hanging the request.
    #[must_use]
    pub fn new(server: &ServerConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(server.timeout))
            .pool_max_idle_per_host(16)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// POST the payload to `<endpoint>/chat/completions`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] on connection or TLS failure.
    /// Non-2xx statuses are returned as responses for the caller to map.
    pub async fn send_chat(
        &self,
        token: &CopilotToken,
        editor: &EditorConfig,
        vision: bool,
        body: Bytes,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!(
            "{}/chat/completions",
            token.endpoint.trim_end_matches('/')
        );
        let mut request = self
            .client
            .post(&url)
            .header(http::header::AUTHORIZATION, format!("Bearer {}", token.token))
            .header(http::header::CONTENT_TYPE, "application/json")
            .header("Copilot-Integration-Id", &editor.integration_id)
            .header("Editor-Version", &editor.version)
            .header("Editor-Plugin-Version", &editor.plugin_version)
            .body(body);
        if vision {
            request = request.header(VISION_HEADER, "true");
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Transport(format!("Upstream timeout: {e}"))
            } else {
                GatewayError::Transport(format!("Upstream request failed: {e}"))
            }
        })
    }
}

/// Read a non-2xx upstream body into a short excerpt for error surfaces.
pub(crate) async fn error_excerpt(response: reqwest::Response) -> String {
    const EXCERPT_LIMIT: usize = 512;
    match response.bytes().await {
        Ok(body) => {
            let text = String::from_utf8_lossy(&body);
            let mut excerpt = text.trim().to_string();
            if excerpt.len() > EXCERPT_LIMIT {
                let mut cut = EXCERPT_LIMIT;
                while !excerpt.is_char_boundary(cut) {
                    cut -= 1;
                }
                excerpt.truncate(cut);
            }
            excerpt
        }
        Err(e) => format!("<unreadable body: {e}>"),
    }
}
