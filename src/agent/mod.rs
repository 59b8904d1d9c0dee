//! Agent capabilities — pluggable task execution strategies.
//!
//! A capability is a three-step contract: a pure input transform, the
//! substantive (potentially slow) processing step, and a pure response
//! normalization. The processor resolves capabilities through a registry
//! assembled at startup; an unknown type is a dispatch error, never a
//! silent fallback.

pub mod profile;
pub mod remote;

pub use profile::ProfileAgent;
pub use remote::RemoteAgent;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::AgentError;
use crate::task::{Outcome, TaskMessage};

/// Agent type a task falls back to when the message names none.
pub const DEFAULT_AGENT_TYPE: &str = "profile";

/// One pluggable task execution strategy.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Stable identifier used for dispatch.
    fn agent_type(&self) -> &str;

    /// Pure transform of the submitted payload into this capability's input.
    /// Must not perform I/O.
    fn prepare_input(&self, payload: &str) -> Result<String, AgentError>;

    /// The substantive unit of work. May be slow; failures raise rather
    /// than returning partial data.
    async fn process(&self, task_id: &str, input: &str) -> Result<serde_json::Value, AgentError>;

    /// Normalize the raw processing result into the published data payload.
    fn parse_response(&self, raw: serde_json::Value) -> Result<serde_json::Value, AgentError>;
}

/// Run the full prepare → process → parse pipeline for one task, capturing
/// every error into a failure [`Outcome`]. Never propagates.
pub async fn run_capability(agent: &dyn AgentCapability, task: &TaskMessage) -> Outcome {
    let input = match agent.prepare_input(&task.payload) {
        Ok(input) => input,
        Err(e) => return failure(task, &e),
    };

    let raw = match agent.process(&task.task_id, &input).await {
        Ok(raw) => raw,
        Err(e) => return failure(task, &e),
    };

    match agent.parse_response(raw) {
        Ok(data) => Outcome::success(&task.task_id, &task.user_id, data),
        Err(e) => failure(task, &e),
    }
}

fn failure(task: &TaskMessage, error: &AgentError) -> Outcome {
    debug!(task_id = %task.task_id, agent_type = %task.agent_type, error = %error, "Capability reported failure");
    Outcome::failure(&task.task_id, &task.user_id, error.code(), error.to_string())
}

/// Fixed dispatch table of capabilities, keyed by agent type.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AgentCapability>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its own type identifier.
    pub fn register(&mut self, agent: Arc<dyn AgentCapability>) {
        self.agents.insert(agent.agent_type().to_string(), agent);
    }

    /// Resolve the capability for an agent type.
    pub fn resolve(&self, agent_type: &str) -> Result<Arc<dyn AgentCapability>, AgentError> {
        self.agents
            .get(agent_type)
            .cloned()
            .ok_or_else(|| AgentError::UnknownType(agent_type.to_string()))
    }

    pub fn count(&self) -> usize {
        self.agents.len()
    }

    /// Registered agent types, for the startup banner.
    pub fn agent_types(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAgent;

    #[async_trait]
    impl AgentCapability for EchoAgent {
        fn agent_type(&self) -> &str {
            "echo"
        }

        fn prepare_input(&self, payload: &str) -> Result<String, AgentError> {
            Ok(payload.to_uppercase())
        }

        async fn process(
            &self,
            _task_id: &str,
            input: &str,
        ) -> Result<serde_json::Value, AgentError> {
            Ok(serde_json::json!({"echo": input}))
        }

        fn parse_response(&self, raw: serde_json::Value) -> Result<serde_json::Value, AgentError> {
            Ok(raw)
        }
    }

    struct BrokenAgent;

    #[async_trait]
    impl AgentCapability for BrokenAgent {
        fn agent_type(&self) -> &str {
            "broken"
        }

        fn prepare_input(&self, _payload: &str) -> Result<String, AgentError> {
            Ok(String::new())
        }

        async fn process(
            &self,
            _task_id: &str,
            _input: &str,
        ) -> Result<serde_json::Value, AgentError> {
            Err(AgentError::ExecutionFailed {
                agent_type: "broken".to_string(),
                reason: "backend unavailable".to_string(),
            })
        }

        fn parse_response(&self, raw: serde_json::Value) -> Result<serde_json::Value, AgentError> {
            Ok(raw)
        }
    }

    fn task(agent_type: &str) -> TaskMessage {
        TaskMessage {
            task_id: "t1".to_string(),
            user_id: "u1".to_string(),
            payload: "hello".to_string(),
            agent_type: agent_type.to_string(),
        }
    }

    #[tokio::test]
    async fn run_capability_success() {
        let outcome = run_capability(&EchoAgent, &task("echo")).await;
        assert!(outcome.success);
        assert_eq!(outcome.result.unwrap()["echo"], "HELLO");
    }

    #[tokio::test]
    async fn run_capability_captures_process_error() {
        let outcome = run_capability(&BrokenAgent, &task("broken")).await;
        assert!(!outcome.success);
        let err = outcome.error.unwrap();
        assert_eq!(err.code, "EXECUTION_FAILED");
        assert!(err.message.contains("backend unavailable"));
    }

    #[test]
    fn registry_resolves_registered_types() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(EchoAgent));
        assert_eq!(registry.count(), 1);
        assert!(registry.resolve("echo").is_ok());
    }

    #[test]
    fn registry_rejects_unknown_type() {
        let registry = AgentRegistry::new();
        let err = registry.resolve("nope").err().unwrap();
        assert!(matches!(err, AgentError::UnknownType(_)));
        assert_eq!(err.code(), "UNKNOWN_AGENT_TYPE");
    }
}
