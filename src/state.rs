use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::config::AppConfig;
use crate::models::ModelRegistry;
use crate::transport::HttpTransport;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub auth: Arc<dyn AuthProvider>,
    pub models: ModelRegistry,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: HttpTransport,
        auth: Arc<dyn AuthProvider>,
        models: ModelRegistry,
    ) -> Self {
        Self {
            config,
            transport,
            auth,
            models,
        }
    }

    /// Correlation id attached to per-request tracing spans.
    #[must_use]
    pub fn request_id(&self) -> uuid::Uuid {
        uuid::Uuid::new_v4()
    }
}
