use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// type-specific settings; `data` is accepted for editor-exported graphs
    #[serde(default, alias = "data")]
    pub config: Value,
}
