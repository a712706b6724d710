//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AgentConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read configuration from a TOML file. Not validated; see [`resolve`].
pub fn load_config(path: &Path) -> Result<AgentConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration from TOML text. Not validated; see [`resolve`].
pub fn parse_config(content: &str) -> Result<AgentConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub retry_times: Option<u32>,
    pub buffer_length: Option<usize>,
    pub port: Option<u16>,
    pub out_parallel: Option<usize>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl Overrides {
    fn apply(self, config: &mut AgentConfig) {
        if let Some(retry_times) = self.retry_times {
            config.retry_times = retry_times;
        }
        if let Some(buffer_length) = self.buffer_length {
            config.buffer_length = buffer_length;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(out_parallel) = self.out_parallel {
            config.out_parallel = out_parallel;
        }
        if let Some(log_level) = self.log_level {
            config.observability.log_level = log_level;
        }
        if self.json_logs {
            config.observability.json = true;
        }
    }
}

/// Build the effective configuration: defaults, then the optional file, then
/// `overrides`. Validation runs once on the merged result.
pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<AgentConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
