//! Configuration types.
//!
//! Every knob reads from an `AGENT_RELAY_*` environment variable with a
//! sensible default; invalid values are configuration errors rather than
//! silent fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Parse an environment variable, falling back to `default` when unset.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Consumer loop and admission control configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Admission gate capacity — maximum concurrently-executing tasks.
    pub max_concurrent_tasks: usize,
    /// Upper bound on a single receive batch.
    pub receive_batch_cap: usize,
    /// How long a claimed-but-unacknowledged message stays hidden.
    pub visibility_window: Duration,
    /// Sleep between polls when the queue is empty or the gate is saturated.
    pub idle_backoff: Duration,
    /// Pause after a failed poll cycle before resuming.
    pub error_backoff: Duration,
    /// How long shutdown waits for the consumer loop to exit before aborting it.
    pub stop_timeout: Duration,
    /// How long shutdown waits for in-flight tasks to drain.
    pub drain_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            receive_batch_cap: 16,
            visibility_window: Duration::from_secs(30),
            idle_backoff: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_concurrent_tasks: env_parse(
                "AGENT_RELAY_MAX_CONCURRENT_TASKS",
                defaults.max_concurrent_tasks,
            )?,
            receive_batch_cap: env_parse("AGENT_RELAY_BATCH_CAP", defaults.receive_batch_cap)?,
            visibility_window: Duration::from_secs(env_parse(
                "AGENT_RELAY_VISIBILITY_SECS",
                defaults.visibility_window.as_secs(),
            )?),
            idle_backoff: Duration::from_millis(env_parse(
                "AGENT_RELAY_IDLE_BACKOFF_MS",
                defaults.idle_backoff.as_millis() as u64,
            )?),
            error_backoff: Duration::from_millis(env_parse(
                "AGENT_RELAY_ERROR_BACKOFF_MS",
                defaults.error_backoff.as_millis() as u64,
            )?),
            stop_timeout: Duration::from_secs(env_parse(
                "AGENT_RELAY_STOP_TIMEOUT_SECS",
                defaults.stop_timeout.as_secs(),
            )?),
            drain_timeout: Duration::from_secs(env_parse(
                "AGENT_RELAY_DRAIN_TIMEOUT_SECS",
                defaults.drain_timeout.as_secs(),
            )?),
        })
    }
}

/// Topic layout for the message broker.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Topic the worker consumes task requests from.
    pub request_topic: String,
    /// Topic outcomes are published to.
    pub result_topic: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            request_topic: "task.requests".to_string(),
            result_topic: "task.results".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_topic: env_string("AGENT_RELAY_REQUEST_TOPIC", &defaults.request_topic),
            result_topic: env_string("AGENT_RELAY_RESULT_TOPIC", &defaults.result_topic),
        }
    }
}

/// Status store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// TTL applied to every status/result write.
    pub status_ttl: Duration,
    /// When set, statuses persist to a libSQL database at this path instead
    /// of the in-memory backend.
    pub db_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            status_ttl: Duration::from_secs(3600),
            db_path: None,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            status_ttl: Duration::from_secs(env_parse(
                "AGENT_RELAY_STATUS_TTL_SECS",
                defaults.status_ttl.as_secs(),
            )?),
            db_path: std::env::var("AGENT_RELAY_DB_PATH").ok().map(PathBuf::from),
        })
    }
}

/// Agent capability settings.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Simulated processing latency of the baseline profile capability.
    pub profile_latency: Duration,
    /// Endpoint for the remote HTTP capability; disabled when unset.
    pub remote_endpoint: Option<String>,
    /// Request timeout for the remote capability.
    pub remote_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            profile_latency: Duration::from_secs(3),
            remote_endpoint: None,
            remote_timeout: Duration::from_secs(30),
        }
    }
}

impl AgentSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            profile_latency: Duration::from_millis(env_parse(
                "AGENT_RELAY_PROFILE_LATENCY_MS",
                defaults.profile_latency.as_millis() as u64,
            )?),
            remote_endpoint: std::env::var("AGENT_RELAY_REMOTE_ENDPOINT").ok(),
            remote_timeout: Duration::from_secs(env_parse(
                "AGENT_RELAY_REMOTE_TIMEOUT_SECS",
                defaults.remote_timeout.as_secs(),
            )?),
        })
    }
}

/// HTTP front door configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: env_parse("AGENT_RELAY_API_PORT", Self::default().port)?,
        })
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub agents: AgentSettings,
    pub api: ApiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            worker: WorkerConfig::from_env()?,
            queue: QueueConfig::from_env(),
            store: StoreConfig::from_env()?,
            agents: AgentSettings::from_env()?,
            api: ApiConfig::from_env()?,
        })
    }
}
