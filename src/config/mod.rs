// Configuration management module
// TOML settings, environment secrets and the interactive editor

pub mod interactive;
pub mod settings;


use std::path::{Path, PathBuf};

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    AppDescriptionConfig, ChatConfig, Config, ConfigError, DataConfig, OpenAiConfig, ServerConfig,
    VectorIndexConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    Config::config_dir()
}

/// Resolve the config directory from an optional override.
#[inline]
pub fn resolve_config_dir(override_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
    override_dir.map_or_else(get_config_dir, |dir| Ok(dir.to_path_buf()))
}

/// Load `.env` from the working directory, if one exists.
#[inline]
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Failed to load .env file: {}", e),
    }
}
