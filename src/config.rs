use std::path::PathBuf;
use std::time::Duration;

use crate::{
    constants::{
        DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MEMORY_MB, DEFAULT_NODE_PATH, DEFAULT_TIMEOUT_MS,
        MAX_OUTPUT_BYTES_VAR, MEMORY_MB_VAR, NODE_PATH_VAR, TIMEOUT_MS_VAR,
    },
    core::domain::EvaluationLimits,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: String, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraderConfig {
    pub node_path: PathBuf,
    pub timeout: Duration,
    pub memory_mb: u64,
    pub max_output_bytes: u64,
}

impl Default for GraderConfig {
    fn default() -> Self {
        GraderConfig {
            node_path: PathBuf::from(DEFAULT_NODE_PATH),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            memory_mb: DEFAULT_MEMORY_MB,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl GraderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = GraderConfig::default();
        let number = |var: &str, default: u64| -> Result<u64, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|number| *number > 0)
                    .ok_or(ConfigError::InvalidNumber {
                        var: var.to_string(),
                        value,
                    }),
            }
        };

        Ok(GraderConfig {
            node_path: lookup(NODE_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.node_path),
            timeout: Duration::from_millis(number(TIMEOUT_MS_VAR, DEFAULT_TIMEOUT_MS)?),
            memory_mb: number(MEMORY_MB_VAR, defaults.memory_mb)?,
            max_output_bytes: number(MAX_OUTPUT_BYTES_VAR, defaults.max_output_bytes)?,
        })
    }

    pub fn limits(&self) -> EvaluationLimits {
        EvaluationLimits {
            wall_time: self.timeout,
            memory_bytes: Some(self.memory_mb.saturating_mul(1024 * 1024)),
            output_bytes: self.max_output_bytes,
        }
    }
}
