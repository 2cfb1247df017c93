pub mod validation;

use std::path::Path;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

pub const DEFAULT_DRAGON_BASE: &str = "https://dragon-api2.vercel.app/api";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const CONFIG_PATH_ENV: &str = "DRAGON_GATEWAY_CONFIG";

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
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Prefix in front of `/{provider}/{...path}`.
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Total budget in seconds for a buffered upstream exchange.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub http_use_env_proxy: bool,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_base_path() -> String {
    "/api".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_max_request_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: default_base_path(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            http_use_env_proxy: false,
            max_request_body_bytes: default_max_request_body_bytes(),
            runtime_worker_threads: None,
        }
    }
}

/// The single Dragon upstream every request is forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// There is no default credential; an empty key is a configuration fault.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Appended as `provider` to normalized chat-completion bodies.
    #[serde(default = "default_provider_hint")]
    pub provider_hint: serde_json::Value,
}

fn default_base_url() -> String {
    DEFAULT_DRAGON_BASE.to_string()
}
fn default_key_header() -> String {
    "x-api-key".to_string()
}
fn default_provider_hint() -> serde_json::Value {
    serde_json::json!({ "name": "dragon" })
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            key_header: default_key_header(),
            provider_hint: default_provider_hint(),
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Model allow-set and request defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_allowed_models")]
    pub allowed: Vec<String>,
    #[serde(default = "default_fallback_model")]
    pub fallback: String,
    #[serde(default = "default_true")]
    pub default_stream: bool,
}

fn default_allowed_models() -> Vec<String> {
    vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()]
}
fn default_fallback_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            allowed: default_allowed_models(),
            fallback: default_fallback_model(),
            default_stream: true,
        }
    }
}

/// Content sanitizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// `"id"` value prefixes that mark a leaked upstream debug object.
    #[serde(default = "default_internal_id_prefixes")]
    pub internal_id_prefixes: Vec<String>,
}

fn default_internal_id_prefixes() -> Vec<String> {
    vec!["dragon_".to_string()]
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            internal_id_prefixes: default_internal_id_prefixes(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from the process environment.
///
/// The YAML file named by `DRAGON_GATEWAY_CONFIG` (or `config.yaml`) is read
/// when present, then environment variables are layered on top.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_from_env() -> Result<AppConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).ok();
    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    if explicit || Path::new(&path).exists() {
        load_config(Some(&path), |key| std::env::var(key).ok())
    } else {
        load_config(None, |key| std::env::var(key).ok())
    }
}

/// Load configuration from an optional YAML file plus an environment lookup,
/// then validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config<F>(path: Option<&str>, env: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str::<AppConfig>(&contents)?
        }
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut config, env)?;
    validate_config(&config)?;
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut AppConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    if let Some(base_url) = var("DRAGON_API_BASE") {
        config.upstream.base_url = base_url.trim().to_string();
    }
    if let Some(api_key) = var("DRAGON_API_KEY") {
        config.upstream.api_key = api_key.trim().to_string();
    }
    if let Some(key_header) = var("DRAGON_KEY_HEADER") {
        config.upstream.key_header = key_header.trim().to_ascii_lowercase();
    }
    if let Some(allowed) = var("DRAGON_ALLOWED_MODELS") {
        config.models.allowed = allowed
            .split(',')
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    if let Some(fallback) = var("DRAGON_FALLBACK_MODEL") {
        config.models.fallback = fallback.trim().to_string();
    }
    if let Some(host) = var("HOST") {
        config.server.host = host.trim().to_string();
    }
    if let Some(port) = var("PORT") {
        config.server.port = port.trim().parse().map_err(|_| {
            ConfigError::Validation(format!("PORT must be a valid port number, got '{port}'"))
        })?;
    }
    if let Some(log_level) = var("LOG_LEVEL") {
        config.features.log_level = log_level.trim().to_string();
    }
    if let Some(log_format) = var("LOG_FORMAT") {
        config.features.log_format = match log_format.trim().to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Validation(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )))
            }
        };
    }
    Ok(())
}
