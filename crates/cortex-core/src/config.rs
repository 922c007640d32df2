use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CortexError, Result};

/// Top-level Cortex configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Per-capability parameter renames applied to shorthand plans,
    /// e.g. `[aliases.write_file] file_name = "filename"`.
    #[serde(default)]
    pub aliases: HashMap<String, HashMap<String, String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            session: SessionConfig::default(),
            jobs: JobsConfig::default(),
            log: LogConfig::default(),
            aliases: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Re-plan rounds allowed after the initial pass.
    #[serde(default = "default_max_replans")]
    pub max_replans: usize,
    /// Planner capability used when the state does not name one.
    #[serde(default = "default_planner")]
    pub planner: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_replans: default_max_replans(),
            planner: default_planner(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle for longer than this are evicted.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// How often the reaper looks for idle sessions.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Finished jobs are dropped this long after their last update.
    #[serde(default = "default_job_retention_secs")]
    pub retention_secs: u64,
    /// How often the job reaper runs.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_job_retention_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_max_replans() -> usize {
    3
}

fn default_planner() -> String {
    crate::state::DEFAULT_PLANNER.into()
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_job_retention_secs() -> u64 {
    3600
}

fn default_log_filter() -> String {
    "cortex=info,warn".into()
}

impl AppConfig {
    /// Load configuration from a TOML file, expanding `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| CortexError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| CortexError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables are left as written
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.executor.max_replans, 3);
        assert_eq!(config.executor.planner, "planner");
        assert_eq!(config.session.idle_timeout_secs, 1800);
        assert_eq!(config.jobs.retention_secs, 3600);
        assert_eq!(config.jobs.reaper_interval_secs, 60);
        assert_eq!(config.log.filter, "cortex=info,warn");
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn test_unset_env_var_kept() {
        let out = expand_env_vars("key = \"${CORTEX_SURELY_UNSET_VAR}\"");
        assert_eq!(out, "key = \"${CORTEX_SURELY_UNSET_VAR}\"");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::parse("executor = 3").unwrap_err();
        assert!(matches!(err, CortexError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/cortex.toml")).unwrap_err();
        assert!(matches!(err, CortexError::ConfigNotFound(_)));
    }
}
