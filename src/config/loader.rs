use std::{collections::HashMap, env, fs, path::Path, path::PathBuf};
use crate::errors::ConfigError;

use super::app_config::{
    AppConfig, PartialAppConfig, CONFIG_FILE_NAME, ENV_LOG_FORMAT, ENV_LOG_LEVEL,
    ENV_MAX_QUEUED_EVENTS, ENV_MAX_RESOLUTION_DEPTH, USER_CONFIG_PATH,
};

const ENV_KEYS: [&str; 4] = [
    ENV_LOG_LEVEL,
    ENV_LOG_FORMAT,
    ENV_MAX_RESOLUTION_DEPTH,
    ENV_MAX_QUEUED_EVENTS,
];

/// Configuration loader responsible for loading config from files and environment
pub struct ConfigLoader {
    base_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    env_override: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Create a new config loader with default paths
    pub fn new() -> Self {
        Self {
            base_path: None,
            config_path: None,
            env_override: None,
        }
    }

    /// Create a config loader with custom base path (for testing)
    pub fn with_base_path(base_path: PathBuf) -> Self {
        Self {
            base_path: Some(base_path),
            ..Self::new()
        }
    }

    /// Use an explicit config file; a missing file is an error
    pub fn with_config_path(mut self, path: &Path) -> Self {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        self.config_path = Some(PathBuf::from(expanded));
        self
    }

    /// Replace the process environment (for testing)
    pub fn with_env(mut self, env_map: HashMap<String, String>) -> Self {
        self.env_override = Some(env_map);
        self
    }

    /// Load complete application configuration
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let config_path = self.config_file_path();
        let partial_config = self.load_partial_config(&config_path)?;
        let env_map = self.collect_env_vars();

        tracing::debug!(
            path = %config_path.display(),
            from_file = partial_config.is_some(),
            env_overrides = env_map.len(),
            "Loading configuration"
        );
        AppConfig::from_partial_and_env(partial_config, &env_map)
    }

    /// Resolve the config file path with tilde expansion and base path override
    pub fn config_file_path(&self) -> PathBuf {
        if let Some(path) = &self.config_path {
            return path.clone();
        }
        let base_dir = if let Some(base_path) = &self.base_path {
            base_path.join(USER_CONFIG_PATH.trim_start_matches("~/"))
        } else {
            PathBuf::from(shellexpand::tilde(USER_CONFIG_PATH).as_ref())
        };
        base_dir.join(CONFIG_FILE_NAME)
    }

    /// Load partial configuration from TOML file
    fn load_partial_config(&self, config_path: &Path) -> Result<Option<PartialAppConfig>, ConfigError> {
        if self.config_path.is_none() && !config_path.exists() {
            return Ok(None);
        }

        let display = config_path.to_string_lossy().to_string();
        let content = fs::read_to_string(config_path)
            .map_err(|e| ConfigError::FileRead(display.clone(), e))?;
        let partial_config: PartialAppConfig =
            toml::from_str(&content).map_err(|e| ConfigError::TomlParse(display, e))?;

        Ok(Some(partial_config))
    }

    /// Collect relevant environment variables
    fn collect_env_vars(&self) -> HashMap<String, String> {
        if let Some(env_map) = &self.env_override {
            return env_map.clone();
        }

        let mut env_map = HashMap::new();
        for key in ENV_KEYS {
            if let Ok(value) = env::var(key) {
                env_map.insert(key.to_string(), value);
            }
        }
        env_map
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_loader() -> (ConfigLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let loader =
            ConfigLoader::with_base_path(temp_dir.path().to_path_buf()).with_env(HashMap::new());
        (loader, temp_dir)
    }

    #[test]
    fn test_config_file_path_under_base() {
        let (loader, temp_dir) = create_test_loader();
        let path = loader.config_file_path();
        assert_eq!(path, temp_dir.path().join(".config/wiring/config.toml"));
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let (loader, _temp_dir) = create_test_loader();
        assert_eq!(loader.load_config().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_reads_file_under_base() {
        let (loader, temp_dir) = create_test_loader();
        let config_path = temp_dir.path().join(".config/wiring/config.toml");
        fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        fs::write(&config_path, "[bus]\nmax_queued_events = 4\n").unwrap();

        let config = loader.load_config().unwrap();
        assert_eq!(config.bus.max_queued_events, 4);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new()
            .with_config_path(&temp_dir.path().join("absent.toml"))
            .with_env(HashMap::new());

        assert!(matches!(loader.load_config(), Err(ConfigError::FileRead(..))));
    }

    #[test]
    fn test_malformed_toml_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[bus\nmax_queued_events = ").unwrap();

        let loader = ConfigLoader::new().with_config_path(&path).with_env(HashMap::new());
        assert!(matches!(loader.load_config(), Err(ConfigError::TomlParse(..))));
    }
}
