use serde_json::Value;

#[derive(Debug, Clone)]
pub enum NodeEvent {
    Running(i64),
    Succeeded(NodeSucceededEvent),
    Failed(String),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "running",
            NodeEvent::Succeeded(_) => "success",
            NodeEvent::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeSucceededEvent {
    pub output: Value,
    /// finish time in milliseconds
    pub time: i64,
}
