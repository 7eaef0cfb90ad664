use crate::workflow::node::NodeId;

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    Start(WorkflowStartEvent),
    Succeeded,
    Failed(WorkflowFailedEvent),
}

impl WorkflowEvent {
    pub fn str(&self) -> &str {
        match self {
            WorkflowEvent::Start(_) => "running",
            WorkflowEvent::Succeeded => "completed",
            WorkflowEvent::Failed(_) => "failed",
        }
    }
}

/// Event emitted when an execution starts
#[derive(Debug, Clone)]
pub struct WorkflowStartEvent {
    /// All node IDs in the workflow
    pub node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct WorkflowFailedEvent {
    pub error: String,
}
