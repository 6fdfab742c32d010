pub mod app_config;
pub mod loader;

// Re-export commonly used types
pub use app_config::{AppConfig, BusSettings, ContainerSettings, LoggingSettings};
pub use loader::ConfigLoader;

// Re-export constants
pub use app_config::{
    CONFIG_FILE_NAME, ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_MAX_QUEUED_EVENTS,
    ENV_MAX_RESOLUTION_DEPTH, USER_CONFIG_PATH,
};
