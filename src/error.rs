//! Error types for Agent Relay.

/// Top-level error type for the worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Status-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Message queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Acknowledge failed for receipt {receipt}: {reason}")]
    Acknowledge { receipt: String, reason: String },

    #[error("Unknown or expired receipt: {0}")]
    UnknownReceipt(String),

    #[error("Publish to topic {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// Agent capability errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Unknown agent type: {0}")]
    UnknownType(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Agent {agent_type} execution failed: {reason}")]
    ExecutionFailed { agent_type: String, reason: String },

    #[error("Invalid agent response: {0}")]
    InvalidResponse(String),
}

impl AgentError {
    /// Stable error code carried by failure outcomes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownType(_) => "UNKNOWN_AGENT_TYPE",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }
}

/// Worker lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker already started")]
    AlreadyStarted,

    #[error("Worker is not running")]
    NotRunning,

    #[error("Admission gate closed")]
    GateClosed,
}

/// Result type alias for the worker.
pub type Result<T> = std::result::Result<T, Error>;
