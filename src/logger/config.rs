/// Logger configuration derived from command-line flags
///
/// Recognized flags:
/// - `--debug-<tag>`: enable debug lines for one tag
/// - `--verbose` / `-v`: enable debug and verbose lines for every tag
/// - `--verbose-<tag>`: enable debug and verbose lines for one tag
/// - `--quiet` / `-q`: only warnings and errors
use std::collections::HashSet;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Threshold for Warning/Info lines (Info or Warning)
    pub min_level: LogLevel,

    /// `--verbose` was given
    pub verbose_all: bool,

    /// Tags with `--debug-<tag>` set
    pub debug_tags: HashSet<String>,

    /// Tags with `--verbose-<tag>` set
    pub verbose_tags: HashSet<String>,

    /// If non-empty, only these tags print (errors always print)
    pub enabled_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            verbose_all: false,
            debug_tags: HashSet::new(),
            verbose_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

/// Get a copy of the active logger configuration
pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

/// Replace the logger configuration
pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

/// Mutate the logger configuration in place
pub fn update_logger_config<F: FnOnce(&mut LoggerConfig)>(f: F) {
    f(&mut LOGGER_CONFIG.write());
}

/// Build the logger configuration from the process arguments
pub fn init_from_args() {
    set_logger_config(config_from_args(&arguments::get_cmd_args()));
}

/// Parse flags into a logger configuration
pub fn config_from_args(args: &[String]) -> LoggerConfig {
    let mut config = LoggerConfig::default();

    for arg in args {
        if arg == "--verbose" || arg == "-v" {
            config.verbose_all = true;
        } else if arg == "--quiet" || arg == "-q" {
            config.min_level = LogLevel::Warning;
        } else if let Some(tag) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(tag.to_lowercase());
        } else if let Some(tag) = arg.strip_prefix("--verbose-") {
            config.verbose_tags.insert(tag.to_lowercase());
        }
    }

    config
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read();
    if config.verbose_all {
        return true;
    }
    let key = tag.to_debug_key();
    config.debug_tags.contains(&key) || config.verbose_tags.contains(&key)
}

pub fn is_verbose_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read();
    config.verbose_all || config.verbose_tags.contains(&tag.to_debug_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_debug_flags_collected() {
        let config = config_from_args(&args(&["envhub", "--debug-hub", "--debug-Client"]));
        assert!(config.debug_tags.contains("hub"));
        assert!(config.debug_tags.contains("client"));
        assert!(!config.verbose_all);
        assert_eq!(config.min_level, LogLevel::Info);
    }

    #[test]
    fn test_quiet_and_verbose() {
        let config = config_from_args(&args(&["envhub", "--quiet", "--verbose-connector"]));
        assert_eq!(config.min_level, LogLevel::Warning);
        assert!(config.verbose_tags.contains("connector"));

        let config = config_from_args(&args(&["envhub", "-v"]));
        assert!(config.verbose_all);
    }
}
