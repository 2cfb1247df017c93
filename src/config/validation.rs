use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// A missing upstream credential is deliberately not rejected here: it is
/// reported per request as a configuration fault.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_models(config)?;
    validate_sanitizer(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.connect_timeout == 0 {
        return Err(validation_err(
            "server.connect_timeout must be greater than 0",
        ));
    }
    if server.max_request_body_bytes == 0 {
        return Err(validation_err(
            "server.max_request_body_bytes must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    url::Url::parse(&upstream.base_url)
        .map_err(|e| validation_err(format!("upstream.base_url is not a valid URL: {e}")))?;
    http::HeaderName::from_bytes(upstream.key_header.as_bytes()).map_err(|_| {
        validation_err(format!(
            "upstream.key_header '{}' is not a valid header name",
            upstream.key_header
        ))
    })?;
    if upstream.has_credential() {
        let key = upstream.api_key.trim();
        if http::HeaderValue::from_str(&format!("Bearer {key}")).is_err() {
            return Err(validation_err(
                "upstream.api_key contains characters not allowed in a header value",
            ));
        }
    }
    if !upstream.provider_hint.is_object() {
        return Err(validation_err("upstream.provider_hint must be a JSON object"));
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    let models = &config.models;
    if models.allowed.is_empty() {
        return Err(validation_err("models.allowed cannot be empty"));
    }
    let mut seen = HashSet::new();
    for model in &models.allowed {
        if model.trim().is_empty() {
            return Err(validation_err("models.allowed contains an empty model"));
        }
        if !seen.insert(model.as_str()) {
            return Err(validation_err(format!(
                "models.allowed contains duplicate model '{model}'"
            )));
        }
    }
    if !models.allowed.iter().any(|model| model == &models.fallback) {
        return Err(validation_err(format!(
            "models.fallback '{}' must be one of models.allowed",
            models.fallback
        )));
    }
    Ok(())
}

fn validate_sanitizer(config: &AppConfig) -> Result<(), ConfigError> {
    if config
        .sanitizer
        .internal_id_prefixes
        .iter()
        .any(|prefix| prefix.is_empty())
    {
        return Err(validation_err(
            "sanitizer.internal_id_prefixes contains an empty prefix",
        ));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED", "TRACE",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level must be one of: {}",
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_missing_credential_is_not_a_load_error() {
        let mut config = valid();
        config.upstream.api_key = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let mut config = valid();
        config.upstream.base_url = "ftp://dragon.example".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_key_header() {
        let mut config = valid();
        config.upstream.key_header = "x api key".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_credential_with_newline() {
        let mut config = valid();
        config.upstream.api_key = "abc\ndef".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_non_object_provider_hint() {
        let mut config = valid();
        config.upstream.provider_hint = serde_json::json!("dragon");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_empty_and_duplicate_models() {
        let mut config = valid();
        config.models.allowed = vec![];
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.models.allowed = vec!["gpt-4o-mini".into(), " ".into()];
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.models.allowed = vec!["gpt-4o-mini".into(), "gpt-4o-mini".into()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = valid();
        config.features.log_level = "LOUD".into();
        assert!(validate_config(&config).is_err());
        config.features.log_level = "warning".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_empty_sanitizer_prefix() {
        let mut config = valid();
        config.sanitizer.internal_id_prefixes = vec![String::new()];
        assert!(validate_config(&config).is_err());
    }
}
