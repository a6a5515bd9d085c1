use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Save queue has at least one worker and a non-zero warning depth
/// - A bounded save queue has room for at least one entry
/// - Poll interval is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.save_queue.workers == 0 {
        return Err(ConfigError::ValidationError(
            "save_queue.workers cannot be 0".to_string(),
        ));
    }

    if config.save_queue.warn_depth == 0 {
        return Err(ConfigError::ValidationError(
            "save_queue.warn_depth cannot be 0".to_string(),
        ));
    }

    if config.save_queue.capacity == Some(0) {
        return Err(ConfigError::ValidationError(
            "save_queue.capacity cannot be 0".to_string(),
        ));
    }

    if config.polling.interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "polling.interval_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}
