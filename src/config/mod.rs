// Configuration management module
// TOML settings for the embedding model, the completion backend and retrieval

pub mod report;
pub mod settings;

pub use report::{init_config, show_config};
pub use settings::{CompletionConfig, Config, ConfigError, OllamaConfig, RetrievalConfig};

/// Get the default data directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}
