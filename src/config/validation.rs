use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.connect_timeout_secs == 0 {
        return Err(validation_err(
            "server.connect_timeout_secs must be greater than 0",
        ));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.outbound_buffer_frames == 0 {
        return Err(validation_err(
            "server.outbound_buffer_frames must be greater than 0",
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
    if let Err(err) = url::Url::parse(&upstream.base_url) {
        return Err(validation_err(format!(
            "upstream.base_url is not a valid URL: {err}"
        )));
    }
    if let Some(api_key) = upstream.api_key.as_deref() {
        if api_key.trim().is_empty() {
            return Err(validation_err(
                "upstream.api_key cannot be blank; omit it for no-auth upstreams",
            ));
        }
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    let models = &config.models;
    if models.slots.is_empty() {
        return Err(validation_err("models.slots cannot be empty"));
    }
    for (slot, model) in &models.slots {
        if model.trim().is_empty() {
            return Err(validation_err(format!(
                "models.slots.{slot} cannot be empty"
            )));
        }
    }
    if !models.slots.contains_key(&models.default) {
        return Err(validation_err(format!(
            "models.default '{}' must be present in models.slots",
            models.default
        )));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "Invalid log_level '{}'. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ModelSlot;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "ftp://localhost".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_blank_api_key() {
        let mut config = AppConfig::default();
        config.upstream.api_key = Some("  ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_unmapped_default_slot() {
        let mut config = AppConfig::default();
        config.models.slots.remove(&ModelSlot::Claude);
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("models.default"), "{err}");
    }

    #[test]
    fn test_rejects_blank_model_id() {
        let mut config = AppConfig::default();
        config
            .models
            .slots
            .insert(ModelSlot::Gemini, String::new());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_slot_table_is_valid() {
        let mut config = AppConfig::default();
        config.models.slots.remove(&ModelSlot::Gpt);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = AppConfig::default();
        config.features.log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
        config.features.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_outbound_buffer() {
        let mut config = AppConfig::default();
        config.server.outbound_buffer_frames = 0;
        assert!(validate_config(&config).is_err());
    }
}
