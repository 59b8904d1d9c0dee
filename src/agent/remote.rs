//! Remote HTTP capability — delegates processing to an inference endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::agent::AgentCapability;
use crate::error::AgentError;

/// Capability that POSTs the prepared input to a remote endpoint and
/// normalizes the JSON reply.
pub struct RemoteAgent {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteAgent {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::ExecutionFailed {
                agent_type: "remote".to_string(),
                reason: format!("client construction failed: {e}"),
            })?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl AgentCapability for RemoteAgent {
    fn agent_type(&self) -> &str {
        "remote"
    }

    fn prepare_input(&self, payload: &str) -> Result<String, AgentError> {
        let trimmed = payload.trim();
        if trimmed.is_empty() {
            return Err(AgentError::InvalidPayload("empty payload".to_string()));
        }
        Ok(trimmed.to_string())
    }

    async fn process(&self, task_id: &str, input: &str) -> Result<serde_json::Value, AgentError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "task_id": task_id, "input": input }))
            .send()
            .await
            .map_err(|e| AgentError::ExecutionFailed {
                agent_type: self.agent_type().to_string(),
                reason: format!("request failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| AgentError::ExecutionFailed {
                agent_type: self.agent_type().to_string(),
                reason: format!("endpoint returned error status: {e}"),
            })?;

        response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(format!("undecodable reply: {e}")))
    }

    fn parse_response(&self, raw: serde_json::Value) -> Result<serde_json::Value, AgentError> {
        match raw {
            serde_json::Value::Object(mut fields) => {
                // Endpoints that wrap their payload in a `data` field are
                // unwrapped; anything else passes through as-is.
                Ok(fields
                    .remove("data")
                    .unwrap_or(serde_json::Value::Object(fields)))
            }
            other => Err(AgentError::InvalidResponse(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> RemoteAgent {
        RemoteAgent::new("http://localhost:9/unreachable", Duration::from_millis(100)).unwrap()
    }

    #[test]
    fn parse_response_unwraps_data_field() {
        let raw = serde_json::json!({"data": {"score": 1}});
        let data = agent().parse_response(raw).unwrap();
        assert_eq!(data["score"], 1);
    }

    #[test]
    fn parse_response_passes_plain_object_through() {
        let raw = serde_json::json!({"score": 2});
        let data = agent().parse_response(raw).unwrap();
        assert_eq!(data["score"], 2);
    }

    #[test]
    fn parse_response_rejects_non_object() {
        let err = agent().parse_response(serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, AgentError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn process_surfaces_connection_errors() {
        let err = agent().process("t1", "input").await.unwrap_err();
        assert!(matches!(err, AgentError::ExecutionFailed { .. }));
    }
}
