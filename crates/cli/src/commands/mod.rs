pub mod ask;
pub mod doctor;
pub mod init;
pub mod serve;
pub mod status;
pub mod tools;

use shopbot_config::AppConfig;
use std::path::{Path, PathBuf};

/// Config file location: `--config` if given, else the default.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load, apply environment overrides and validate.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = config_path(path);
    AppConfig::load_with_env(&path).map_err(|e| format!("Failed to load config: {e}").into())
}
