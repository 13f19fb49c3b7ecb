
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use super::Config;

/// Write a default `config.toml` into `data_dir` unless one already exists
#[inline]
pub fn init_config(data_dir: &Path) -> Result<Config> {
    let config = Config::load(data_dir).context("Failed to load configuration")?;

    if config.config_file_path().exists() {
        eprintln!(
            "{}",
            style("Found existing configuration, leaving it untouched.").yellow()
        );
    } else {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Default configuration written").green());
    }

    eprintln!(
        "Configuration file: {}",
        style(config.config_file_path().display()).cyan()
    );
    Ok(config)
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding (Ollama):").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Completion:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.completion.base_url).cyan());
    eprintln!("  Model: {}", style(&config.completion.model).cyan());
    eprintln!(
        "  API Key: {} ({})",
        style(&config.completion.api_key_env).cyan(),
        api_key_status(&config.completion.api_key_env)
    );
    eprintln!(
        "  Temperature: {}  Top P: {}  Max Tokens: {}",
        style(config.completion.temperature).cyan(),
        style(config.completion.top_p).cyan(),
        style(config.completion.max_tokens).cyan()
    );
    eprintln!(
        "  Timeout: {}s",
        style(config.completion.timeout_secs).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!("  Record Cap: {}", style(config.retrieval.max_records).cyan());
    eprintln!(
        "  Store Timeout: {}s",
        style(config.retrieval.store_timeout_secs).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

pub(crate) fn api_key_status(variable: &str) -> &'static str {
    match std::env::var(variable) {
        Ok(value) if !value.trim().is_empty() => "set",
        _ => "missing",
    }
}
