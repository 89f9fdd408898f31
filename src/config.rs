//! Async execution configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`.scoped-async.toml`)
//! 2. Environment variables (with `SCOPED_ASYNC_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [async]
//! max_threads = 64
//! thread_name = "request-async"
//! keep_alive_ms = 10000
//! shutdown_timeout_ms = 5000
//! default_race_timeout_ms = 30000
//!
//! [async.propagation]
//! cache = true
//! access = true
//! interceptors = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".scoped-async.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SCOPED_ASYNC_";

/// Main async execution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncConfig {
    /// Maximum number of worker threads running task bodies.
    pub max_threads: usize,

    /// Name given to worker threads.
    pub thread_name: String,

    /// How long an idle worker thread is kept before it exits.
    pub keep_alive_ms: u64,

    /// How long shutdown waits for running tasks.
    pub shutdown_timeout_ms: u64,

    /// Race timeout used when the caller does not pass one.
    /// `None` waits until every party has reported.
    pub default_race_timeout_ms: Option<u64>,

    /// Log task start and finish at debug level.
    pub log_task_lifecycle: bool,

    /// Which context fields are propagated by default.
    pub propagation: PropagationConfig,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self {
            max_threads: 64,
            thread_name: "scoped-async-worker".to_string(),
            keep_alive_ms: 10_000,
            shutdown_timeout_ms: 5_000,
            default_race_timeout_ms: None,
            log_task_lifecycle: true,
            propagation: PropagationConfig::default(),
        }
    }
}

impl AsyncConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML configuration file
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default, rename = "async")]
            async_config: AsyncConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(full.async_config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("MAX_THREADS").and_then(|v| v.parse().ok()) {
            self.max_threads = v;
        }
        if let Some(name) = var("THREAD_NAME") {
            self.thread_name = name;
        }
        if let Some(v) = var("KEEP_ALIVE_MS").and_then(|v| v.parse().ok()) {
            self.keep_alive_ms = v;
        }
        if let Some(v) = var("SHUTDOWN_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.shutdown_timeout_ms = v;
        }
        if let Some(v) = var("DEFAULT_RACE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.default_race_timeout_ms = Some(v);
        }
        if let Some(v) = var("LOG_TASK_LIFECYCLE").and_then(|v| v.parse().ok()) {
            self.log_task_lifecycle = v;
        }

        // Propagation overrides
        if let Some(v) = var("PROPAGATE_CACHE").and_then(|v| v.parse().ok()) {
            self.propagation.cache = v;
        }
        if let Some(v) = var("PROPAGATE_ACCESS").and_then(|v| v.parse().ok()) {
            self.propagation.access = v;
        }
        if let Some(v) = var("PROPAGATE_INTERCEPTORS").and_then(|v| v.parse().ok()) {
            self.propagation.interceptors = v;
        }
    }

    /// Reject values the worker runtime cannot be built with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "max_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "thread_name",
                reason: "must not be blank".to_string(),
            });
        }
        Ok(())
    }

    /// Idle worker keep-alive.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Shutdown wait.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Default race timeout.
    pub fn default_race_timeout(&self) -> Option<Duration> {
        self.default_race_timeout_ms.map(Duration::from_millis)
    }

    /// Create a development configuration: small pool, chatty lifecycle logs.
    pub fn development() -> Self {
        Self {
            max_threads: 8,
            log_task_lifecycle: true,
            ..Default::default()
        }
    }

    /// Create a configuration with exactly one worker thread.
    ///
    /// Tasks run one after another on the same thread, which makes thread
    /// reuse observable.
    pub fn single_worker() -> Self {
        Self {
            max_threads: 1,
            ..Default::default()
        }
    }
}

/// Which context fields are captured when a task is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Propagate the cache map.
    pub cache: bool,

    /// Propagate the access context.
    pub access: bool,

    /// Propagate the interceptor chain.
    pub interceptors: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            cache: true,
            access: true,
            interceptors: true,
        }
    }
}

impl PropagationConfig {
    /// Propagate nothing.
    pub fn none() -> Self {
        Self {
            cache: false,
            access: false,
            interceptors: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading configuration file.
    #[error("Failed to read config file '{path}': {error}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Error message.
        error: String,
    },

    /// Parse error in configuration.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A field holds a value that cannot be used.
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
