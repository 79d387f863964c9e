//! Configuration loader with layered sources.

use crate::AppConfig;
use adpulse_core::AdpulseError;
use config::{Config, ConfigError, Environment, File};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Sources, later ones overriding earlier ones:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml`
    /// 3. `config/local.toml`
    /// 4. Environment variables with the `ADPULSE__` prefix
    pub fn new(config_dir: impl Into<String>) -> Result<Self, AdpulseError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, AdpulseError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), AdpulseError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    fn load_config(config_dir: &str) -> Result<AppConfig, AdpulseError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("ADPULSE_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!(environment = %environment, config_dir = %config_dir, "Loading configuration");

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ADPULSE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_adpulse_error)?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_adpulse_error)?;

        app_config.app.environment = environment;

        validate_config(&app_config)?;

        Ok(app_config)
    }
}

/// Validates a loaded configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), AdpulseError> {
    if config.database.url.is_empty() {
        return Err(AdpulseError::Configuration("Database URL is required".to_string()));
    }

    if config.redis.url.is_empty() {
        return Err(AdpulseError::Configuration("Redis URL is required".to_string()));
    }

    if config.database.min_connections > config.database.max_connections {
        return Err(AdpulseError::Configuration(
            "database.min_connections must not exceed database.max_connections".to_string(),
        ));
    }

    if config.jobs.sweep.enabled
        && (config.jobs.sweep.max_idle_secs == 0 || config.jobs.sweep.queued_max_idle_secs == 0)
    {
        return Err(AdpulseError::Configuration(
            "jobs.sweep.max_idle_secs and jobs.sweep.queued_max_idle_secs must be greater than zero"
                .to_string(),
        ));
    }

    if config.worker.concurrency == 0 {
        return Err(AdpulseError::Configuration(
            "worker.concurrency must be greater than zero".to_string(),
        ));
    }

    if config.jobs.channel_namespace.contains(':') {
        return Err(AdpulseError::Configuration(
            "jobs.channel_namespace must not contain ':'".to_string(),
        ));
    }

    if config.app.environment == "production" && config.server.cors_origins.iter().any(|o| o == "*") {
        warn!("CORS allows any origin in production");
    }

    Ok(())
}

fn config_error_to_adpulse_error(err: ConfigError) -> AdpulseError {
    AdpulseError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use std::io::Write;

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.jobs.queue_prefix, "rq:queue");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_server_address() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_validate_rejects_empty_database_url() {
        let mut config = AppConfig::default();
        config.database.url = String::new();
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_validate_rejects_zero_idle_deadline() {
        let mut config = AppConfig::default();
        config.jobs.sweep.max_idle_secs = 0;
        assert!(validate_config(&config).is_err());

        config.jobs.sweep.max_idle_secs = 60;
        config.jobs.sweep.queued_max_idle_secs = 0;
        assert!(validate_config(&config).is_err());

        config.jobs.sweep.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_namespace_with_separator() {
        let mut config = AppConfig::default();
        config.jobs.channel_namespace = "job:v2".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_loads_default_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            "[server]\nport = 9191\n\n[jobs.sweep]\nmax_idle_secs = 120\n"
        )
        .unwrap();

        let loader = ConfigLoader::new(dir.path().to_string_lossy().to_string()).unwrap();
        let config = loader.get().await;
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.jobs.sweep.max_idle_secs, 120);
        assert_eq!(config.jobs.sweep.interval_secs, 60);
        assert_eq!(config.jobs.sweep.queued_max_idle_secs, 21600);
    }
}
