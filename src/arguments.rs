/// Centralized argument handling for envhub
///
/// Flags are read from a process-wide copy of the command line so that tests
/// and tool binaries can override them with [`set_cmd_args`].
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "data/envhub.toml";

/// Sets the global command-line arguments
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

// =============================================================================
// RUN MODES
// =============================================================================

/// Start the synthetic status/operation source
pub fn is_demo_enabled() -> bool {
    has_arg("--demo")
}

/// Configuration file path (`--config <path>`)
pub fn get_config_path() -> String {
    get_arg_value("--config").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Bind port override (`--port <port>`)
pub fn get_port_override() -> Option<u16> {
    get_arg_value("--port").and_then(|p| p.parse().ok())
}

// =============================================================================
// DEBUG FLAG CHECKING FUNCTIONS
// =============================================================================

pub fn is_debug_hub_enabled() -> bool {
    has_arg("--debug-hub")
}

pub fn is_debug_client_enabled() -> bool {
    has_arg("--debug-client")
}

pub fn is_debug_webserver_enabled() -> bool {
    has_arg("--debug-webserver")
}

pub fn is_debug_connector_enabled() -> bool {
    has_arg("--debug-connector")
}

/// Gets a list of all enabled debug modes
pub fn get_enabled_debug_modes() -> Vec<&'static str> {
    let mut modes = Vec::new();

    if is_debug_hub_enabled() {
        modes.push("hub");
    }
    if is_debug_client_enabled() {
        modes.push("client");
    }
    if is_debug_webserver_enabled() {
        modes.push("webserver");
    }
    if is_debug_connector_enabled() {
        modes.push("connector");
    }
    if is_demo_enabled() {
        modes.push("demo");
    }

    modes
}

/// Prints the enabled debug modes
pub fn print_debug_info() {
    let enabled_modes = get_enabled_debug_modes();
    if !enabled_modes.is_empty() {
        println!("Enabled debug modes: {:?}", enabled_modes);
    }
}

pub fn print_help() {
    println!("envhub - real-time environment notification hub");
    println!();
    println!("USAGE:");
    println!("    envhub [FLAGS]");
    println!();
    println!("FLAGS:");
    println!("    --config <PATH>           Configuration file (default: {})", DEFAULT_CONFIG_PATH);
    println!("    --port <PORT>             Override the configured bind port");
    println!("    --demo                    Publish synthetic status and operation updates");
    println!("    --quiet, -q               Only print warnings and errors");
    println!("    --verbose, -v             Print debug and verbose output for every subsystem");
    println!("    --help, -h                Show this help message");
    println!();
    println!("DEBUG FLAGS:");
    println!("    --debug-hub               Registry and broadcast fan-out");
    println!("    --debug-client            Per-connection read/write loops");
    println!("    --debug-webserver         Upgrade endpoint");
    println!("    --debug-connector         Reconnecting connector");
}

/// Common argument parsing patterns used across binaries
pub mod patterns {
    use super::*;

    /// Checks for help flags
    pub fn is_help_requested() -> bool {
        has_arg("--help") || has_arg("-h")
    }

    /// Checks for quiet/silent mode
    pub fn is_quiet_mode() -> bool {
        has_arg("--quiet") || has_arg("-q")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // CMD_ARGS is process-wide; keep every assertion in one test
    #[test]
    fn test_args_access() {
        let test_args = vec![
            "envhub".to_string(),
            "--debug-hub".to_string(),
            "--config".to_string(),
            "/tmp/envhub.toml".to_string(),
            "--port".to_string(),
            "9000".to_string(),
        ];

        set_cmd_args(test_args.clone());
        assert_eq!(get_cmd_args(), test_args);

        assert!(has_arg("--debug-hub"));
        assert!(!has_arg("--debug-client"));
        assert!(is_debug_hub_enabled());
        assert_eq!(get_config_path(), "/tmp/envhub.toml");
        assert_eq!(get_port_override(), Some(9000));
        assert_eq!(get_enabled_debug_modes(), vec!["hub"]);

        set_cmd_args(vec!["envhub".to_string(), "--port".to_string()]);
        assert_eq!(get_arg_value("--port"), None);
        assert_eq!(get_config_path(), DEFAULT_CONFIG_PATH);
    }
}
