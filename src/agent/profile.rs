//! Baseline profile capability — the default `agent_type`.
//!
//! Simulates a slow enrichment call and derives an interest profile from
//! the submitted content. The latency is configurable so tests can run it
//! at zero.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::agent::AgentCapability;
use crate::error::AgentError;

/// Interest profile derived from one task's content.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub tags: Vec<String>,
    pub score: u32,
    pub reason: String,
}

/// Default capability: payload in, profile summary out.
pub struct ProfileAgent {
    latency: Duration,
}

impl ProfileAgent {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for ProfileAgent {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl AgentCapability for ProfileAgent {
    fn agent_type(&self) -> &str {
        crate::agent::DEFAULT_AGENT_TYPE
    }

    fn prepare_input(&self, payload: &str) -> Result<String, AgentError> {
        let trimmed = payload.trim();
        if trimmed.is_empty() {
            return Err(AgentError::InvalidPayload("empty payload".to_string()));
        }
        Ok(trimmed.to_string())
    }

    async fn process(&self, _task_id: &str, input: &str) -> Result<serde_json::Value, AgentError> {
        // Stand-in for the real enrichment call.
        tokio::time::sleep(self.latency).await;

        let summary = ProfileSummary {
            tags: vec!["electronics".to_string(), "price-sensitive".to_string()],
            score: 95,
            reason: format!("Derived from submitted content: {input}"),
        };
        serde_json::to_value(summary).map_err(|e| AgentError::ExecutionFailed {
            agent_type: self.agent_type().to_string(),
            reason: e.to_string(),
        })
    }

    fn parse_response(&self, raw: serde_json::Value) -> Result<serde_json::Value, AgentError> {
        if !raw.is_object() {
            return Err(AgentError::InvalidResponse(
                "profile summary must be an object".to_string(),
            ));
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::run_capability;
    use crate::task::TaskMessage;

    fn task(payload: &str) -> TaskMessage {
        TaskMessage {
            task_id: "t1".to_string(),
            user_id: "u1".to_string(),
            payload: payload.to_string(),
            agent_type: "profile".to_string(),
        }
    }

    #[tokio::test]
    async fn produces_profile_summary() {
        let agent = ProfileAgent::new(Duration::ZERO);
        let outcome = run_capability(&agent, &task("watch price drop")).await;

        assert!(outcome.success);
        let data = outcome.result.unwrap();
        assert_eq!(data["score"], 95);
        assert!(data["reason"].as_str().unwrap().contains("watch price drop"));
        assert!(data["tags"].as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn rejects_empty_payload() {
        let agent = ProfileAgent::new(Duration::ZERO);
        let outcome = run_capability(&agent, &task("   ")).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().code, "INVALID_PAYLOAD");
    }
}
