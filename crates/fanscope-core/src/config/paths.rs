//! Standard locations for Fanscope files

use std::path::PathBuf;

/// Base directory for Fanscope configuration
///
/// Returns: `{platform config dir}/fanscope` (e.g. `~/.config/fanscope`)
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fanscope")
}

/// Default config file path: `{config_dir}/config.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.yaml")
}

/// Default spectrum model directory: `{platform cache dir}/fanscope/spectrum`
pub fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(config_dir)
        .join("fanscope")
        .join("spectrum")
}
