//! Runtime edge definitions for connecting nodes.
//!
//! Source handles pick a named output of a control node (`true`, `loop`, `catch`, `done`, ...).
//! Target handles mark sentinel edges: an edge back to the owning control node that closes
//! a branch, loop body or try scope.

use serde::{Deserialize, Serialize};

use crate::{
    model::EdgeModel,
    workflow::{consts, node::NodeId},
};

/// Unique identifier for an edge within a workflow.
pub type EdgeId = String;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
    /// guard expression; the edge is skipped when it evaluates falsy
    pub condition: Option<String>,
}

impl Edge {
    pub fn new(
        model: &EdgeModel,
        index: usize,
    ) -> Self {
        let id = if model.id.is_empty() { format!("e{}", index) } else { model.id.clone() };
        Self {
            id,
            source: model.source.clone(),
            target: model.target.clone(),
            source_handle: model.source_handle.clone().filter(|h| !h.is_empty()),
            target_handle: model.target_handle.clone().filter(|h| !h.is_empty()),
            condition: model.condition.clone().filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn has_source_handle(
        &self,
        handle: &str,
    ) -> bool {
        self.source_handle.as_deref() == Some(handle)
    }

    /// Whether this edge ends any scope. Such edges are never followed as plain transitions.
    pub fn is_sentinel(&self) -> bool {
        self.target_handle.as_deref().map(|h| consts::SENTINELS.contains(&h)).unwrap_or(false)
    }
}
