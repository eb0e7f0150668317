//! Engine configuration
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: fields set on the returned [`EngineConfig`]
//! 2. **Environment variables**: values from `ORC_*` env vars
//! 3. **Config document**: values from a JSON document
//! 4. **Defaults**: [`EngineConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `ORC_WORKERS` | `usize` | `worker_count` |
//! | `ORC_MAX_TASKS` | `usize` (0 = unbounded) | `max_outstanding_tasks` |
//! | `ORC_SPAWN_INLINING` | `bool` | `allow_spawn_inlining` |
//! | `ORC_INLINE_ALL` | `bool` | `allow_all_spawn_inlining` |
//! | `ORC_MAX_INLINE_DEPTH` | `usize` | `max_inline_depth` |
//! | `ORC_INLINE_TIME_LIMIT_US` | `u64` | `inline_time_limit_us` |
//! | `ORC_CALL_CACHE_BOUND` | `usize` | `call_cache_bound` |
//! | `ORC_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |

use serde::Deserialize;
use std::time::Duration;

/// Environment variable name for worker thread count.
pub const ENV_WORKERS: &str = "ORC_WORKERS";
/// Environment variable name for the outstanding-task bound.
pub const ENV_MAX_TASKS: &str = "ORC_MAX_TASKS";
/// Environment variable name for the spawn inlining toggle.
pub const ENV_SPAWN_INLINING: &str = "ORC_SPAWN_INLINING";
/// Environment variable name for inlining must-spawn code as well.
pub const ENV_INLINE_ALL: &str = "ORC_INLINE_ALL";
/// Environment variable name for the inline stack-depth limit.
pub const ENV_MAX_INLINE_DEPTH: &str = "ORC_MAX_INLINE_DEPTH";
/// Environment variable name for the inline time-per-call limit.
pub const ENV_INLINE_TIME_LIMIT_US: &str = "ORC_INLINE_TIME_LIMIT_US";
/// Environment variable name for the polymorphic call-cache bound.
pub const ENV_CALL_CACHE_BOUND: &str = "ORC_CALL_CACHE_BOUND";
/// Environment variable name for the worker thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "ORC_THREAD_NAME_PREFIX";

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds an unparseable value
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Expected type
        expected: &'static str,
        /// Raw value
        value: String,
    },

    /// The JSON document is malformed
    #[error("invalid config document: {0}")]
    Document(String),
}

/// Tuning knobs of the execution core
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker threads (0 = number of CPUs)
    pub worker_count: usize,

    /// Bound on queued fresh spawns (None = unbounded)
    pub max_outstanding_tasks: Option<usize>,

    /// Run statistically cheap spawns on the spawning thread
    pub allow_spawn_inlining: bool,

    /// Also inline code marked must-spawn
    pub allow_all_spawn_inlining: bool,

    /// Maximum nesting of inlined spawns and calls on one stack
    pub max_inline_depth: usize,

    /// A spawn is cheap when its average time per call is below this
    pub inline_time_limit_us: u64,

    /// Maximum entries of a polymorphic call-site cache
    pub call_cache_bound: usize,

    /// Name prefix for worker threads
    pub thread_name_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            max_outstanding_tasks: None,
            allow_spawn_inlining: true,
            allow_all_spawn_inlining: false,
            max_inline_depth: 64,
            inline_time_limit_us: 10,
            call_cache_bound: 4,
            thread_name_prefix: "orc-worker".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(document).map_err(|e| ConfigError::Document(e.to_string()))
    }

    /// Resolve a configuration: JSON document (if any), then the environment
    pub fn load(document: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match document {
            Some(document) => Self::from_json(document)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `ORC_*` environment variable overrides.
    ///
    /// Only variables that are set are applied.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup(ENV_WORKERS) {
            self.worker_count = parse_usize(ENV_WORKERS, &val)?;
        }
        if let Some(val) = lookup(ENV_MAX_TASKS) {
            let limit = parse_usize(ENV_MAX_TASKS, &val)?;
            self.max_outstanding_tasks = (limit > 0).then_some(limit);
        }
        if let Some(val) = lookup(ENV_SPAWN_INLINING) {
            self.allow_spawn_inlining = parse_bool(ENV_SPAWN_INLINING, &val)?;
        }
        if let Some(val) = lookup(ENV_INLINE_ALL) {
            self.allow_all_spawn_inlining = parse_bool(ENV_INLINE_ALL, &val)?;
        }
        if let Some(val) = lookup(ENV_MAX_INLINE_DEPTH) {
            self.max_inline_depth = parse_usize(ENV_MAX_INLINE_DEPTH, &val)?;
        }
        if let Some(val) = lookup(ENV_INLINE_TIME_LIMIT_US) {
            self.inline_time_limit_us = parse_u64(ENV_INLINE_TIME_LIMIT_US, &val)?;
        }
        if let Some(val) = lookup(ENV_CALL_CACHE_BOUND) {
            self.call_cache_bound = parse_usize(ENV_CALL_CACHE_BOUND, &val)?;
        }
        if let Some(val) = lookup(ENV_THREAD_NAME_PREFIX) {
            self.thread_name_prefix = val;
        }
        Ok(())
    }

    /// Worker threads to start, resolving 0 to the number of CPUs
    pub fn effective_workers(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get()
        } else {
            self.worker_count
        }
    }

    /// Inline time-per-call limit as a duration
    pub fn inline_time_limit(&self) -> Duration {
        Duration::from_micros(self.inline_time_limit_us)
    }
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, ConfigError> {
    val.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnv {
        var,
        expected: "unsigned integer",
        value: val.to_string(),
    })
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
        var,
        expected: "unsigned integer",
        value: val.to_string(),
    })
}

fn parse_bool(var: &'static str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            expected: "bool (true/false/1/0/yes/no)",
            value: val.to_string(),
        }),
    }
}
