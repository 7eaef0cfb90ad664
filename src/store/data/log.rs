use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::AsRefStr;

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogStatus {
    #[default]
    Running,
    Success,
    Failed,
}

impl LogStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LogStatus::Running)
    }
}

/// Per-node record of one execution step.
#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct ExecutionLog {
    pub id: String,
    pub execution_id: String,
    pub node_id: String,
    pub node_type: String,
    pub status: LogStatus,
    pub input_data: Value,
    pub output_data: Value,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub start_time: i64,
    pub timestamp: i64,
}

impl DbCollectionIden for ExecutionLog {
    fn iden() -> StoreIden {
        StoreIden::Logs
    }
}
