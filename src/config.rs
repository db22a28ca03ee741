use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Logger configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    // debug, info, warn, error
    pub log_level: String,
    /// Append structured records to `log_file_path`
    pub log_to_file: bool,
    /// Required when `log_to_file` is set
    pub log_file_path: Option<PathBuf>,
    /// Write records to standard output
    pub log_to_console: bool,
    /// Human-oriented console encoding instead of JSON
    pub dev_mode: bool,
    /// Logger name used by the `Logger` emission methods
    pub name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_to_file: false,
            log_file_path: None,
            log_to_console: false,
            dev_mode: false,
            name: String::new(),
        }
    }
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<LogConfig> {
    let mut config = LogConfig::default();

    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
        config = parse_config(&content).context("Failed to parse configuration file")?;
    }

    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

/// Parse a configuration document, JSON first and YAML second
pub fn parse_config(content: &str) -> Result<LogConfig> {
    let config: LogConfig =
        serde_json::from_str(content).or_else(|_| serde_yaml::from_str(content))?;
    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// `lookup` resolves a variable name to its value, normally `std::env::var`.
pub fn apply_env_overrides<F>(mut config: LogConfig, lookup: F) -> LogConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup("LOG_LEVEL") {
        config.log_level = level;
    }
    if let Some(to_file) = lookup("LOG_TO_FILE") {
        config.log_to_file = to_file.parse().unwrap_or(false);
    }
    if let Some(file_path) = lookup("LOG_FILE_PATH") {
        config.log_file_path = Some(PathBuf::from(file_path));
    }
    if let Some(to_console) = lookup("LOG_TO_CONSOLE") {
        config.log_to_console = to_console.parse().unwrap_or(false);
    }
    if let Some(dev_mode) = lookup("LOG_DEV_MODE") {
        config.dev_mode = dev_mode.parse().unwrap_or(false);
    }
    if let Some(name) = lookup("LOG_NAME") {
        config.name = name;
    }

    config
}
