//! Configuration management

use crate::error::{EgControlError, EgControlResult};
use crate::logging::LoggingConfig;
use crate::types::{
    DuplicateEmailPolicy, EgControlConfig, RecordsConfig, SessionConfig, StoreBackend,
    StoreConfig,
};

use std::path::{Path, PathBuf};

/// Prefix of environment variables overriding configuration values
pub const ENV_PREFIX: &str = "EGCONTROL";

/// Base directory for persisted application data
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("egcontrol")
}

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("egcontrol")
        .join("config.toml")
}

impl Default for EgControlConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            store: StoreConfig {
                backend: StoreBackend::Sqlite,
                database_url: Some(format!(
                    "sqlite://{}?mode=rwc",
                    data_dir.join("egcontrol.db").display()
                )),
            },
            session: SessionConfig {
                storage_dir: data_dir.join("session"),
                ttl_hours: 24 * 30,
                signing_secret: "egcontrol-default-secret-change-in-production".to_string(),
                duplicate_email_policy: DuplicateEmailPolicy::Reject,
            },
            records: RecordsConfig { recent_limit: 3 },
            logging: LoggingConfig::default(),
        }
    }
}

impl EgControlConfig {
    /// Configuration for tests and throwaway runs: in-memory store, session files under `dir`
    pub fn ephemeral<P: AsRef<Path>>(dir: P) -> Self {
        let mut config = Self::default();
        config.store = StoreConfig {
            backend: StoreBackend::Memory,
            database_url: None,
        };
        config.session.storage_dir = dir.as_ref().join("session");
        config
    }

    /// Load configuration from defaults, an optional TOML file and `EGCONTROL__*` variables
    pub fn load(path: Option<&Path>) -> EgControlResult<Self> {
        let defaults = ::config::Config::try_from(&Self::default()).map_err(|e| {
            EgControlError::Config {
                message: format!("Failed to build default config: {}", e),
                source: Some(Box::new(e)),
                context: crate::ErrorContext::new("config").with_operation("defaults"),
            }
        })?;

        let mut builder = ::config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        } else {
            builder = builder.add_source(::config::File::from(default_config_path()).required(false));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| EgControlError::Config {
                message: format!("Failed to load config: {}", e),
                source: Some(Box::new(e)),
                context: crate::ErrorContext::new("config")
                    .with_operation("load")
                    .with_suggestion("Check TOML syntax in config file")
                    .with_suggestion("Check EGCONTROL__* environment variables"),
            })?;

        let loaded: EgControlConfig =
            settings
                .try_deserialize()
                .map_err(|e| EgControlError::Config {
                    message: format!("Failed to parse config: {}", e),
                    source: Some(Box::new(e)),
                    context: crate::ErrorContext::new("config").with_operation("deserialize"),
                })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> EgControlResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EgControlError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: EgControlConfig =
            toml::from_str(&content).map_err(|e| EgControlError::Config {
                message: format!("Failed to parse config: {}", e),
                source: Some(Box::new(e)),
                context: crate::ErrorContext::new("config")
                    .with_operation("parse_toml")
                    .with_suggestion("Check TOML syntax in config file"),
            })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> EgControlResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| EgControlError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| EgControlError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> EgControlResult<()> {
        if self.records.recent_limit == 0 {
            return Err(EgControlError::Config {
                message: "records.recent_limit must be greater than 0".to_string(),
                source: None,
                context: crate::ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set records.recent_limit to a positive value"),
            });
        }

        if self.session.ttl_hours == 0 {
            return Err(EgControlError::Config {
                message: "session.ttl_hours must be greater than 0".to_string(),
                source: None,
                context: crate::ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set session.ttl_hours to a positive value"),
            });
        }

        if self.session.signing_secret.trim().is_empty() {
            return Err(EgControlError::Config {
                message: "session.signing_secret must not be empty".to_string(),
                source: None,
                context: crate::ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set EGCONTROL__SESSION__SIGNING_SECRET"),
            });
        }

        let missing_url = self
            .store
            .database_url
            .as_deref()
            .map_or(true, |url| url.trim().is_empty());
        if self.store.backend == StoreBackend::Sqlite && missing_url {
            return Err(EgControlError::Config {
                message: "store.database_url is required for the sqlite backend".to_string(),
                source: None,
                context: crate::ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set store.database_url or use backend = \"memory\""),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EgControlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.records.recent_limit, 3);
        assert_eq!(
            config.session.duplicate_email_policy,
            DuplicateEmailPolicy::Reject
        );
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = EgControlConfig::default();
        config.records.recent_limit = 0;
        assert!(matches!(
            config.validate(),
            Err(EgControlError::Config { .. })
        ));
    }

    #[test]
    fn test_validate_requires_database_url_for_sqlite() {
        let mut config = EgControlConfig::default();
        config.store.database_url = None;
        assert!(config.validate().is_err());

        config.store.backend = StoreBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ephemeral_uses_memory_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = EgControlConfig::ephemeral(dir.path());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.session.storage_dir.starts_with(dir.path()));
    }
}
