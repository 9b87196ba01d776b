/// Configuration utilities - loading and access helpers
///
/// The loaded `Config` lives in a process-wide cell and is read with
/// [`with_config`]. Runtime components (hub, connector) receive their section
/// by value at construction time.
use std::path::Path;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use super::schemas::Config;
use crate::errors::ConfigError;
use crate::logger::{self, LogTag};

/// Global configuration instance
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Read a configuration file, apply environment overrides and validate
///
/// A missing file yields the defaults.
pub fn read_config_file(path: &str) -> Result<Config, ConfigError> {
    let mut config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        toml::from_str::<Config>(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?
    } else {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path),
        );
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Load configuration from a file path into the global CONFIG
pub fn load_config_from_path(path: &str) -> Result<(), ConfigError> {
    let config = read_config_file(path)?;

    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| ConfigError::AlreadyInitialized)?;

    logger::debug(LogTag::Config, &format!("Configuration loaded from '{}'", path));
    Ok(())
}

/// Run a closure against the loaded configuration (defaults if not loaded)
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    match CONFIG.get() {
        Some(lock) => f(&lock.read()),
        None => f(&Config::default()),
    }
}

/// Clone of the loaded configuration
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

/// Apply `ENVHUB_*` overrides on top of file values
///
/// The lookup is injected so tests do not depend on process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("ENVHUB_HOST").filter(|h| !h.is_empty()) {
        config.server.host = host;
    }
    if let Some(port) = lookup("ENVHUB_PORT") {
        match port.parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(_) => logger::warning(
                LogTag::Config,
                &format!("Ignoring invalid ENVHUB_PORT '{}'", port),
            ),
        }
    }
    if let Some(origins) = lookup("ENVHUB_ALLOWED_ORIGINS") {
        config.server.allowed_origins = origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
    }
}
