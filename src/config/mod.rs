use serde::{Deserialize, Serialize};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upstream read timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
// Ollama's own port, so stock Ollama clients connect unchanged.
fn default_port() -> u16 {
    11434
}
fn default_timeout() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout: default_timeout(),
            runtime_worker_threads: None,
        }
    }
}

/// Upstream credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path of the token state persisted by the external sign-in flow.
    #[serde(default = "default_token_file")]
    pub token_file: String,
}

fn default_token_file() -> String {
    "~/.local/share/copilot-gateway/token.json".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
        }
    }
}

/// Chat defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model used when an inbound request leaves `model` blank and no
    /// active selection exists.
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_model() -> String {
    "gpt-4o-2024-11-20".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
        }
    }
}

/// Editor identification headers sent verbatim to the upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default = "default_editor_version")]
    pub version: String,
    #[serde(default = "default_plugin_version")]
    pub plugin_version: String,
    #[serde(default = "default_integration_id")]
    pub integration_id: String,
}

fn default_editor_version() -> String {
    "vscode/1.98.1".to_string()
}
fn default_plugin_version() -> String {
    "copilot-chat/0.26.7".to_string()
}
fn default_integration_id() -> String {
    "vscode-chat".to_string()
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            version: default_editor_version(),
            plugin_version: default_plugin_version(),
            integration_id: default_integration_id(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server.host must not be empty".to_string(),
        ));
    }
    if config.server.timeout == 0 {
        return Err(ConfigError::Validation(
            "server.timeout must be greater than zero".to_string(),
        ));
    }
    if config.auth.token_file.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.token_file must not be empty".to_string(),
        ));
    }
    if config.chat.default_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.default_model must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Expand a leading `~/` in a configured path against `$HOME`.
#[must_use]
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{rest}", home.trim_end_matches('/'));
        }
    }
    path.to_string()
}
