//! Compiled workflow representation using a directed graph.
//!
//! Wraps the workflow model in a petgraph `DiGraph`. Nodes are parsed and validated
//! when the graph is built, so a definition error never happens mid-run.

use std::collections::HashMap;

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::{
    HookflowError, Result, WorkflowModel,
    workflow::{
        edge::Edge,
        node::{Node, NodeId, NodeType},
    },
};

pub struct Graph {
    /// definition snapshot this graph was compiled from
    pub definition: WorkflowModel,
    graph: DiGraph<Node, Edge>,
    index: HashMap<NodeId, NodeIndex>,
}

impl Graph {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn node(
        &self,
        id: &str,
    ) -> Option<&Node> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.node_indices().map(|idx| self.graph[idx].id.clone()).collect()
    }

    /// Outgoing edges of `id` in definition order.
    pub fn outgoing(
        &self,
        id: &str,
    ) -> Vec<&Edge> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges = self.graph.edges_directed(*idx, Direction::Outgoing).map(|e| (e.id().index(), e.weight())).collect::<Vec<_>>();
        edges.sort_by_key(|(i, _)| *i);
        edges.into_iter().map(|(_, e)| e).collect()
    }

    /// Outgoing edges of `id` leaving through `handle`.
    pub fn outgoing_by_handle(
        &self,
        id: &str,
        handle: &str,
    ) -> Vec<&Edge> {
        self.outgoing(id).into_iter().filter(|e| e.has_source_handle(handle)).collect()
    }

    /// The entry node: the first trigger node, else the first node without incoming edges.
    pub fn start_node(&self) -> Option<&Node> {
        self.graph
            .node_indices()
            .find(|idx| self.graph[*idx].node_type == NodeType::Trigger)
            .or_else(|| {
                self.graph.node_indices().find(|idx| {
                    self.graph
                        .edges_directed(*idx, Direction::Incoming)
                        .all(|e| e.weight().is_sentinel())
                })
            })
            .map(|idx| &self.graph[idx])
    }

    /// Output a human-readable representation of the graph
    pub fn schema(&self) -> String {
        let mut lines = vec![format!("=== {} ({} nodes, {} edges) ===", self.id(), self.graph.node_count(), self.graph.edge_count())];
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let outgoing = self
                .outgoing(&node.id)
                .iter()
                .map(|e| match (&e.source_handle, &e.target_handle) {
                    (_, Some(t)) => format!("{}[{}]", e.target, t),
                    (Some(s), None) => format!("{}({})", e.target, s),
                    (None, None) => e.target.clone(),
                })
                .collect::<Vec<_>>();
            if outgoing.is_empty() {
                lines.push(format!("{}:{} -> (end)", node.id, node.node_type.as_ref()));
            } else {
                lines.push(format!("{}:{} -> {}", node.id, node.node_type.as_ref(), outgoing.join(", ")));
            }
        }
        lines.join("\n")
    }
}

impl TryFrom<&WorkflowModel> for Graph {
    type Error = HookflowError;

    fn try_from(model: &WorkflowModel) -> Result<Self> {
        let mut graph: DiGraph<Node, Edge> = DiGraph::new();
        let mut index = HashMap::new();

        for node in model.flow.nodes.iter() {
            let node = Node::new(node)?;
            if index.contains_key(&node.id) {
                return Err(HookflowError::Definition(format!("duplicate node id '{}'", node.id)));
            }
            let nid = node.id.clone();
            let idx = graph.add_node(node);
            index.insert(nid, idx);
        }
        for (i, edge) in model.flow.edges.iter().enumerate() {
            let edge = Edge::new(edge, i);
            let source = index.get(&edge.source).ok_or(HookflowError::Definition(format!("edge '{}' has unknown source '{}'", edge.id, edge.source)))?;
            let target = index.get(&edge.target).ok_or(HookflowError::Definition(format!("edge '{}' has unknown target '{}'", edge.id, edge.target)))?;
            graph.add_edge(*source, *target, edge);
        }

        let compiled = Self {
            definition: model.clone(),
            graph,
            index,
        };
        if compiled.graph.node_count() > 0 && compiled.start_node().is_none() {
            return Err(HookflowError::Definition(format!("workflow '{}' has no start node", model.id)));
        }
        Ok(compiled)
    }
}
