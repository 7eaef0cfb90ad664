use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::AsRefStr;

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// Status only moves forward: queued -> running -> completed | failed.
    /// A queued run may also fail before it starts.
    pub fn can_transition_to(
        &self,
        next: ExecutionStatus,
    ) -> bool {
        matches!(
            (self, next),
            (ExecutionStatus::Queued, ExecutionStatus::Running)
                | (ExecutionStatus::Queued, ExecutionStatus::Failed)
                | (ExecutionStatus::Running, ExecutionStatus::Completed)
                | (ExecutionStatus::Running, ExecutionStatus::Failed)
        )
    }
}

/// One run of a workflow.
#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub parent_id: Option<String>,
    pub status: ExecutionStatus,
    pub trigger_data: Value,
    pub result_data: Value,
    pub error_message: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_ms: i64,
    pub timestamp: i64,
}

impl DbCollectionIden for Execution {
    fn iden() -> StoreIden {
        StoreIden::Executions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_moves_forward_only() {
        assert!(ExecutionStatus::Queued.can_transition_to(ExecutionStatus::Running));
        assert!(ExecutionStatus::Running.can_transition_to(ExecutionStatus::Completed));
        assert!(ExecutionStatus::Running.can_transition_to(ExecutionStatus::Failed));
        assert!(!ExecutionStatus::Completed.can_transition_to(ExecutionStatus::Failed));
        assert!(!ExecutionStatus::Failed.can_transition_to(ExecutionStatus::Running));
        assert!(!ExecutionStatus::Running.can_transition_to(ExecutionStatus::Queued));
    }
}
