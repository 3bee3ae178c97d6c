//! Process-wide configuration: default executor sizing and the swallowed
//! failure report format.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set on a [`ConvergeConfig`] by the caller
//! 2. **Environment variables**: values from `CONVERGE_*` env vars
//! 3. **Config file**: the TOML file named by `CONVERGE_CONFIG_FILE`
//!    (requires the `config-file` feature)
//! 4. **Defaults**: [`ConvergeConfig::default()`]
//!
//! Both consumers read their configuration exactly once: the default
//! executor on first use, the default reporter on the first swallowed
//! failure.
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `CONVERGE_POOL_MIN_THREADS` | `usize` | `executor.min_threads` |
//! | `CONVERGE_POOL_MAX_THREADS` | `usize` | `executor.max_threads` |
//! | `CONVERGE_POOL_IDLE_TIMEOUT_MS` | `u64` | `executor.idle_timeout` |
//! | `CONVERGE_POOL_THREAD_NAME` | `String` | `executor.thread_name_prefix` |
//! | `CONVERGE_SWALLOWED_FAILURE_FORMAT` | `full`/`short`/`none` | `report_format` |

use std::time::Duration;

use crate::report::ReportFormat;

/// Environment variable name for the pool's minimum thread count.
pub const ENV_POOL_MIN_THREADS: &str = "CONVERGE_POOL_MIN_THREADS";
/// Environment variable name for the pool's maximum thread count.
pub const ENV_POOL_MAX_THREADS: &str = "CONVERGE_POOL_MAX_THREADS";
/// Environment variable name for the idle timeout of excess pool threads.
pub const ENV_POOL_IDLE_TIMEOUT_MS: &str = "CONVERGE_POOL_IDLE_TIMEOUT_MS";
/// Environment variable name for the pool thread name prefix.
pub const ENV_POOL_THREAD_NAME: &str = "CONVERGE_POOL_THREAD_NAME";
/// Environment variable name for the swallowed failure report format.
pub const ENV_SWALLOWED_FAILURE_FORMAT: &str = "CONVERGE_SWALLOWED_FAILURE_FORMAT";
/// Environment variable naming a TOML config file.
pub const ENV_CONFIG_FILE: &str = "CONVERGE_CONFIG_FILE";

/// Default idle timeout before retiring excess threads.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default upper bound on pool threads.
const DEFAULT_MAX_THREADS: usize = 64;

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting had an unparseable or out-of-range value.
    #[error("invalid value for {name}: {detail}")]
    InvalidValue {
        /// The setting (env var or TOML key).
        name: String,
        /// What was wrong with it.
        detail: String,
    },
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file was not valid TOML for this schema.
    #[error("failed to parse TOML config: {0}")]
    Toml(String),
}

impl From<ConfigError> for crate::error::Error {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();
        Self::new(crate::error::ErrorKind::Validation)
            .with_message(message)
            .with_source(err)
    }
}

/// Sizing of the default executor's thread pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Threads kept alive even when idle.
    pub min_threads: usize,
    /// Upper bound on live threads.
    pub max_threads: usize,
    /// How long a thread above `min_threads` may idle before retiring.
    pub idle_timeout: Duration,
    /// Thread name prefix; threads are named `{prefix}-{n}`.
    pub thread_name_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_threads: 0,
            max_threads: DEFAULT_MAX_THREADS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            thread_name_prefix: "converge-worker".to_string(),
        }
    }
}

/// Complete crate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvergeConfig {
    /// Default executor settings.
    pub executor: ExecutorConfig,
    /// How the default reporter formats swallowed failures.
    pub report_format: ReportFormat,
}

impl ConvergeConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overridden by the config file (when the `config-file`
    /// feature is enabled and `CONVERGE_CONFIG_FILE` is set), overridden by
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        #[allow(unused_mut)]
        let mut config = Self::default();
        #[cfg(feature = "config-file")]
        if let Some(path) = read_env(ENV_CONFIG_FILE) {
            let toml = parse_toml_file(std::path::Path::new(&path))?;
            apply_toml_config(&mut config, &toml)?;
        }
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_threads == 0 {
            return Err(ConfigError::InvalidValue {
                name: "executor.max_threads".to_string(),
                detail: "must be at least 1".to_string(),
            });
        }
        if self.executor.min_threads > self.executor.max_threads {
            return Err(ConfigError::InvalidValue {
                name: "executor.min_threads".to_string(),
                detail: format!(
                    "{} exceeds max_threads {}",
                    self.executor.min_threads, self.executor.max_threads
                ),
            });
        }
        Ok(())
    }
}

/// Apply environment variable overrides to a [`ConvergeConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut ConvergeConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_POOL_MIN_THREADS) {
        config.executor.min_threads = parse_usize(ENV_POOL_MIN_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_POOL_MAX_THREADS) {
        config.executor.max_threads = parse_usize(ENV_POOL_MAX_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_POOL_IDLE_TIMEOUT_MS) {
        config.executor.idle_timeout =
            Duration::from_millis(parse_u64(ENV_POOL_IDLE_TIMEOUT_MS, &val)?);
    }
    if let Some(val) = read_env(ENV_POOL_THREAD_NAME) {
        config.executor.thread_name_prefix = val;
    }
    if let Some(val) = read_env(ENV_SWALLOWED_FAILURE_FORMAT) {
        config.report_format = parse_format(ENV_SWALLOWED_FAILURE_FORMAT, &val)?;
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(name: &str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            detail: format!("expected unsigned integer, got {val:?} ({e})"),
        })
}

fn parse_u64(name: &str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            detail: format!("expected u64, got {val:?} ({e})"),
        })
}

fn parse_format(name: &str, val: &str) -> Result<ReportFormat, ConfigError> {
    val.parse::<ReportFormat>()
        .map_err(|detail| ConfigError::InvalidValue {
            name: name.to_string(),
            detail,
        })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable configuration.
///
/// ```toml
/// [executor]
/// min_threads = 1
/// max_threads = 32
/// idle_timeout_ms = 5000
/// thread_name_prefix = "myapp-converge"
///
/// [report]
/// format = "short"
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct TomlConfig {
    /// Executor settings.
    #[serde(default)]
    pub executor: ExecutorToml,
    /// Reporter settings.
    #[serde(default)]
    pub report: ReportToml,
}

/// Executor section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct ExecutorToml {
    /// Minimum pool threads.
    pub min_threads: Option<usize>,
    /// Maximum pool threads.
    pub max_threads: Option<usize>,
    /// Idle timeout in milliseconds.
    pub idle_timeout_ms: Option<u64>,
    /// Thread name prefix.
    pub thread_name_prefix: Option<String>,
}

/// Report section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct ReportToml {
    /// `full`, `short` or `none`.
    pub format: Option<String>,
}

/// Apply a parsed TOML config to a [`ConvergeConfig`].
///
/// Only fields present in the file override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut ConvergeConfig, toml: &TomlConfig) -> Result<(), ConfigError> {
    if let Some(v) = toml.executor.min_threads {
        config.executor.min_threads = v;
    }
    if let Some(v) = toml.executor.max_threads {
        config.executor.max_threads = v;
    }
    if let Some(v) = toml.executor.idle_timeout_ms {
        config.executor.idle_timeout = Duration::from_millis(v);
    }
    if let Some(ref v) = toml.executor.thread_name_prefix {
        config.executor.thread_name_prefix.clone_from(v);
    }
    if let Some(ref v) = toml.report.format {
        config.report_format = parse_format("report.format", v)?;
    }
    Ok(())
}

/// Parse a TOML string into a [`TomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<TomlConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Toml(e.to_string()))
}

/// Read and parse a TOML file into a [`TomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<TomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml_str(&content)
}
