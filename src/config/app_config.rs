use crate::bus::{BusOptions, DEFAULT_MAX_QUEUED_EVENTS};
use crate::errors::ConfigError;
use crate::infrastructure::container::{ContainerOptions, DEFAULT_MAX_RESOLUTION_DEPTH};
use crate::logging::{LogFormat, LoggingConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::Level;

use super::loader::ConfigLoader;

// Configuration location constants
pub const USER_CONFIG_PATH: &str = "~/.config/wiring";
pub const CONFIG_FILE_NAME: &str = "config.toml";

// Environment overrides
pub const ENV_LOG_LEVEL: &str = "WIRING_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "WIRING_LOG_FORMAT";
pub const ENV_MAX_RESOLUTION_DEPTH: &str = "WIRING_MAX_RESOLUTION_DEPTH";
pub const ENV_MAX_QUEUED_EVENTS: &str = "WIRING_MAX_QUEUED_EVENTS";

/// Main Application Configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    pub logging: LoggingSettings,
    pub container: ContainerSettings,
    pub bus: BusSettings,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: Level,
    pub format: LogFormat,
    pub show_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            show_target: false,
        }
    }
}

/// `[container]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    pub max_resolution_depth: usize,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
        }
    }
}

/// `[bus]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSettings {
    pub max_queued_events: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            max_queued_events: DEFAULT_MAX_QUEUED_EVENTS,
        }
    }
}

/// Partial Application Configuration for loading from files
#[derive(Deserialize, Debug, Default)]
pub struct PartialAppConfig {
    logging: Option<PartialLoggingSettings>,
    container: Option<PartialContainerSettings>,
    bus: Option<PartialBusSettings>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PartialLoggingSettings {
    level: Option<String>,
    format: Option<String>,
    show_target: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PartialContainerSettings {
    max_resolution_depth: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PartialBusSettings {
    max_queued_events: Option<usize>,
}

impl AppConfig {
    /// Load configuration from the default file and environment
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load_config()
    }

    /// Load configuration from an explicit file path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::new()
            .with_config_path(path.as_ref())
            .load_config()
    }

    /// Create AppConfig from partial config and environment (environment wins)
    pub fn from_partial_and_env(
        partial: Option<PartialAppConfig>,
        env_map: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let partial = partial.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();
        let container = partial.container.unwrap_or_default();
        let bus = partial.bus.unwrap_or_default();
        let defaults = AppConfig::default();

        let level = match env_map.get(ENV_LOG_LEVEL).or(logging.level.as_ref()) {
            Some(raw) => parse_value::<Level>("logging.level", raw)?,
            None => defaults.logging.level,
        };
        let format = match env_map.get(ENV_LOG_FORMAT).or(logging.format.as_ref()) {
            Some(raw) => parse_value::<LogFormat>("logging.format", raw)?,
            None => defaults.logging.format,
        };
        let max_resolution_depth = match env_map.get(ENV_MAX_RESOLUTION_DEPTH) {
            Some(raw) => parse_value::<usize>("container.max_resolution_depth", raw)?,
            None => container
                .max_resolution_depth
                .unwrap_or(defaults.container.max_resolution_depth),
        };
        let max_queued_events = match env_map.get(ENV_MAX_QUEUED_EVENTS) {
            Some(raw) => parse_value::<usize>("bus.max_queued_events", raw)?,
            None => bus
                .max_queued_events
                .unwrap_or(defaults.bus.max_queued_events),
        };

        let config = AppConfig {
            logging: LoggingSettings {
                level,
                format,
                show_target: logging.show_target.unwrap_or(defaults.logging.show_target),
            },
            container: ContainerSettings {
                max_resolution_depth,
            },
            bus: BusSettings { max_queued_events },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.container.max_resolution_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "container.max_resolution_depth".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn container_options(&self) -> ContainerOptions {
        ContainerOptions {
            max_resolution_depth: self.container.max_resolution_depth,
        }
    }

    pub fn bus_options(&self) -> BusOptions {
        BusOptions {
            max_queued_events: self.bus.max_queued_events,
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_settings(&self.logging)
    }
}

fn parse_value<T: FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
    })
}
