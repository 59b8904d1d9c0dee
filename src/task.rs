//! Task model — queue message, status state machine, and outcome shapes.

use serde::{Deserialize, Serialize};

/// Queue envelope body for one task request.
///
/// `task_id` is generated by the submitter and doubles as the idempotency
/// and correlation key everywhere downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: String,
    pub user_id: String,
    #[serde(default)]
    pub payload: String,
    /// Selects the capability that handles this task.
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
}

fn default_agent_type() -> String {
    crate::agent::DEFAULT_AGENT_TYPE.to_string()
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created by the submitter, waiting in the queue.
    Queued,
    /// Claimed by a task processor.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
    /// Canceled externally before it was claimed.
    Canceled,
}

impl TaskStatus {
    /// Check if this status allows transitioning to another status.
    ///
    /// Terminal statuses admit no transition at all — a redelivered task that
    /// already reached one is absorbed as a no-op by the processor.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Queued, Running) | (Queued, Canceled) | (Running, Done) | (Running, Failed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }

    /// Parse the store's string representation.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// Normalized result of running one task, destined for the result topic.
///
/// Either success with agent-defined `result` data, or failure with a coded
/// error. Always carries `task_id`/`user_id` for correlation, and is
/// published exactly once per processed task — never on an idempotent skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub task_id: String,
    pub user_id: String,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

/// Structured error carried by a failure outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeError {
    pub code: String,
    pub message: String,
}

impl Outcome {
    /// Build a success outcome with agent-defined data.
    pub fn success(task_id: &str, user_id: &str, data: serde_json::Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            success: true,
            result: Some(data),
            error: None,
        }
    }

    /// Build a failure outcome with a coded error.
    pub fn failure(
        task_id: &str,
        user_id: &str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            success: false,
            result: None,
            error: Some(OutcomeError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}
