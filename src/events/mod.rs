//! Event types for workflow execution.
//!
//! Events are emitted while an execution runs to notify subscribers
//! about node progress, completions and failures.

mod node;
mod workflow;

pub use node::*;
pub use workflow::*;

use serde_json::{Value, json};

use crate::workflow::node::NodeId;

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type for workflow graph events.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// Execution-level events (start, succeeded, failed).
    Workflow(WorkflowEvent),
    /// Node-level events (running, succeeded, failed).
    Node(NodeEvent),
}

/// Event message carrying execution and node context.
#[derive(Debug, Clone)]
pub struct Message {
    /// Execution that generated this event.
    pub execution_id: String,
    /// Workflow the execution belongs to.
    pub workflow_id: String,
    /// Node that generated this event (empty for workflow events).
    pub node_id: NodeId,
    /// The actual event data.
    pub event: GraphEvent,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl GraphEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, GraphEvent::Workflow(WorkflowEvent::Succeeded))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Workflow(WorkflowEvent::Failed(_)))
    }
}

impl Message {
    /// Realtime payload: `{nodeId, nodeStatus, outputData?, error?}` for nodes,
    /// `{status, error?}` for the execution itself.
    pub fn payload(&self) -> Value {
        match &self.event {
            GraphEvent::Node(e) => {
                let mut payload = json!({
                    "nodeId": self.node_id,
                    "nodeStatus": e.str(),
                });
                match e {
                    NodeEvent::Succeeded(s) => payload["outputData"] = s.output.clone(),
                    NodeEvent::Failed(reason) => payload["error"] = json!(reason),
                    NodeEvent::Running(_) => {}
                }
                payload
            }
            GraphEvent::Workflow(e) => {
                let mut payload = json!({
                    "workflowId": self.workflow_id,
                    "status": e.str(),
                });
                if let WorkflowEvent::Failed(f) = e {
                    payload["error"] = json!(f.error);
                }
                payload
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_payload() {
        let msg = Message {
            execution_id: "e1".to_string(),
            workflow_id: "w1".to_string(),
            node_id: "n1".to_string(),
            event: GraphEvent::Node(NodeEvent::Succeeded(NodeSucceededEvent {
                output: json!({"ok": true}),
                time: 1,
            })),
        };
        assert_eq!(msg.payload(), json!({"nodeId": "n1", "nodeStatus": "success", "outputData": {"ok": true}}));

        let msg = Message {
            event: GraphEvent::Node(NodeEvent::Failed("boom".to_string())),
            ..msg
        };
        assert_eq!(msg.payload(), json!({"nodeId": "n1", "nodeStatus": "failed", "error": "boom"}));
    }

    #[test]
    fn test_workflow_payload() {
        let msg = Message {
            execution_id: "e1".to_string(),
            workflow_id: "w1".to_string(),
            node_id: String::new(),
            event: GraphEvent::Workflow(WorkflowEvent::Failed(WorkflowFailedEvent {
                error: "bad".to_string(),
            })),
        };
        assert!(msg.event.is_error());
        assert_eq!(msg.payload(), json!({"workflowId": "w1", "status": "failed", "error": "bad"}));
    }
}
