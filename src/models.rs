use bytes::Bytes;
use parking_lot::RwLock;

use crate::config::AppConfig;
use crate::util::unix_now_secs;

/// Fallback used when the registry has no active selection and the config
/// default is unusable.
pub const FALLBACK_MODEL_ID: &str = "gpt-4o-2024-11-20";
pub const FALLBACK_MODEL_NAME: &str = "GPT-4o";

/// The currently selected upstream model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model_id: String,
    pub model_name: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            model_id: FALLBACK_MODEL_ID.to_string(),
            model_name: FALLBACK_MODEL_NAME.to_string(),
        }
    }
}

/// Model registry: the active selection plus the inventory surfaced by the
/// listing endpoints. Selection changes come from outside the request path
/// (the supervisor CLI), so a plain lock suffices.
pub struct ModelRegistry {
    current: RwLock<Option<ModelSelection>>,
    default_model: ModelSelection,
    ollama_tags_body: Bytes,
    openai_models_body: Bytes,
}

impl ModelRegistry {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        let default_model = if config.chat.default_model.trim().is_empty() {
            ModelSelection::default()
        } else {
            ModelSelection {
                model_id: config.chat.default_model.clone(),
                model_name: config.chat.default_model.clone(),
            }
        };
        let ollama_tags_body = build_ollama_tags_body(&default_model);
        let openai_models_body = build_openai_models_body(&default_model);
        Self {
            current: RwLock::new(None),
            default_model,
            ollama_tags_body,
            openai_models_body,
        }
    }

    /// The model the pipeline fills in when an inbound request leaves
    /// `model` blank.
    #[must_use]
    pub fn current(&self) -> ModelSelection {
        if let Some(selection) = self.current.read().as_ref() {
            return selection.clone();
        }
        self.default_model.clone()
    }

    pub fn set_current(&self, selection: ModelSelection) {
        *self.current.write() = Some(selection);
    }

    /// Cached `GET /api/tags` response body.
    #[must_use]
    pub fn ollama_tags_body(&self) -> Bytes {
        self.ollama_tags_body.clone()
    }

    /// Cached `GET /v1/models` response body.
    #[must_use]
    pub fn openai_models_body(&self) -> Bytes {
        self.openai_models_body.clone()
    }
}

fn build_ollama_tags_body(model: &ModelSelection) -> Bytes {
    let modified_at = crate::util::rfc3339_from_epoch_secs(Some(unix_now_secs()));
    let body = serde_json::json!({
        "models": [{
            "name": model.model_id,
            "model": model.model_id,
            "modified_at": modified_at,
            "size": 0,
            "digest": format!("{:064}", 0),
            "details": {
                "parent_model": "",
                "format": "gguf",
                "family": "copilot",
                "families": ["copilot"],
                "parameter_size": "",
                "quantization_level": "",
            },
        }]
    });
    Bytes::from(body.to_string())
}

fn build_openai_models_body(model: &ModelSelection) -> Bytes {
    let body = serde_json::json!({
        "object": "list",
        "data": [{
            "id": model.model_id,
            "object": "model",
            "created": unix_now_secs(),
            "owned_by": "github-copilot",
        }]
    });
    Bytes::from(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_falls_back_to_config_default() {
        let config = AppConfig::default();
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.current().model_id, "gpt-4o-2024-11-20");
    }

    #[test]
    fn test_set_current_overrides_default() {
        let registry = ModelRegistry::new(&AppConfig::default());
        registry.set_current(ModelSelection {
            model_id: "gpt-4.1".to_string(),
            model_name: "GPT-4.1".to_string(),
        });
        assert_eq!(registry.current().model_id, "gpt-4.1");
    }

    #[test]
    fn test_ollama_tags_body_lists_default_model() {
        let registry = ModelRegistry::new(&AppConfig::default());
        let body: serde_json::Value =
            serde_json::from_slice(&registry.ollama_tags_body()).unwrap();
        let models = body["models"].as_array().unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0]["name"], "gpt-4o-2024-11-20");
        assert!(models[0]["details"]["family"].as_str().is_some());
    }

    #[test]
    fn test_openai_models_body_shape() {
        let registry = ModelRegistry::new(&AppConfig::default());
        let body: serde_json::Value =
            serde_json::from_slice(&registry.openai_models_body()).unwrap();
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["object"], "model");
    }
}
