//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BusSettings, LogOutput, LoggingConfig, PlexusConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &PlexusConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bus_settings(&config.bus)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter target: '{module}'"
            )));
        }
    }

    Ok(())
}

fn validate_bus_settings(bus: &BusSettings) -> ConfigResult<()> {
    if bus.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "bus.queue_capacity must be greater than 0",
        ));
    }

    if bus.request_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "bus.request_timeout_ms must be greater than 0",
        ));
    }

    if bus.max_concurrent_dispatch == Some(0) {
        return Err(ConfigError::validation(
            "bus.max_concurrent_dispatch must be greater than 0",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&PlexusConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = PlexusConfig::default();
        config.bus.queue_capacity = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = PlexusConfig::default();
        config.bus.request_timeout_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_without_path() {
        let mut config = PlexusConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some("plexus.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
