/// Configuration system
///
/// - `macros`: the `config_struct!` declaration macro
/// - `schemas`: every configuration section with its defaults and validation
/// - `utils`: TOML loading, environment overrides, global access
pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::{
    BackoffConfig, Config, ConnectorConfig, DemoConfig, HubConfig, ServerConfig,
};
pub use utils::{
    apply_env_overrides, get_config_clone, load_config_from_path, read_config_file, with_config,
};
