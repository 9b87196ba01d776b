/// Core logging implementation with automatic filtering
///
/// Decides whether a line is printed, then hands it to the formatter.
use super::config::{get_logger_config, is_debug_enabled_for_tag, is_verbose_enabled_for_tag};
use super::levels::LogLevel;
use super::tags::LogTag;

/// Check if a log message should be displayed
///
/// Filtering rules:
/// 1. Errors are always shown
/// 2. Debug requires --debug-<tag>, --verbose-<tag> or --verbose
/// 3. Verbose requires --verbose or --verbose-<tag>
/// 4. Warning/Info must be within the minimum level threshold
/// 5. If enabled_tags is non-empty, tag must be in the set
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    match level {
        LogLevel::Error => true,
        LogLevel::Debug => is_debug_enabled_for_tag(tag),
        LogLevel::Verbose => is_verbose_enabled_for_tag(tag),
        LogLevel::Warning | LogLevel::Info => {
            let config = get_logger_config();
            if level > config.min_level {
                return false;
            }
            config.enabled_tags.is_empty() || config.enabled_tags.contains(&tag.to_debug_key())
        }
    }
}

/// Internal logging function with automatic filtering
pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }

    super::format::format_and_log(&tag, level, message);
}
