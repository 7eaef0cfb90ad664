//! Graph interpreter.
//!
//! Runs a start node and recursively follows its edges. Control nodes (condition,
//! loop, try) run their own bodies through the scoped branch walker and hand back
//! only their `done` edges as continuation.

use std::{collections::HashSet, sync::Arc};

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::{
    Result,
    events::{GraphEvent, NodeEvent, NodeSucceededEvent},
    runtime::Context,
    store::data::LogStatus,
    utils,
    workflow::{
        Graph,
        consts::HANDLE_DONE,
        edge::Edge,
        node::{Node, NodeAction},
        template,
    },
};

/// Interpreter bound to one compiled graph.
pub struct Dispatcher {
    graph: Arc<Graph>,
}

impl Dispatcher {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Runs `node`, then every selected outgoing edge in definition order with the same context.
    pub fn execute_node<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.execute_single(node, ctx).await?;
            for edge in self.continuation(node) {
                if !guard_passes(edge, ctx) {
                    continue;
                }
                match self.graph.node(&edge.target) {
                    Some(next) => self.execute_node(next, ctx).await?,
                    None => warn!(edge = %edge.id, "edge target missing"),
                }
            }
            Ok(())
        })
    }

    /// Runs exactly one node with its own log entry and returns its output without following edges.
    pub fn execute_single<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let executor = ctx.executor();
            let store = executor.store();
            ctx.emit(&node.id, GraphEvent::Node(NodeEvent::Running(utils::time::time_millis())));
            debug!(execution = ctx.execution_id(), node = %node.id, kind = node.node_type.as_ref(), "node started");

            let log_id = if ctx.record_logs() {
                let input = json!({"config": ctx.render(&node.config), "lastOutput": ctx.last_output()});
                match store.start_log(ctx.execution_id(), &node.id, node.node_type.as_ref(), &input) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!(node = %node.id, "failed to open execution log: {}", e);
                        None
                    }
                }
            } else {
                None
            };

            let result = match &node.action {
                NodeAction::Leaf(action) => {
                    trace!(node = %node.id, processor = action.action_type().as_ref(), "running processor");
                    action.run(ctx, &node.id).await.map_err(|e| e.in_processor(action.action_type().as_ref()))
                }
                NodeAction::Condition(config) => self.run_condition(node, config, ctx).await,
                NodeAction::Loop(config) => self.run_loop(node, config, ctx).await,
                NodeAction::Try => self.run_try(node, ctx).await,
            };

            match result {
                Ok(output) => {
                    ctx.add_output(&node.id, output.clone());
                    if let Some(log_id) = &log_id
                        && let Err(e) = store.finalize_log(log_id, LogStatus::Success, &output, None)
                    {
                        warn!(node = %node.id, "failed to finalize execution log: {}", e);
                    }
                    ctx.emit(
                        &node.id,
                        GraphEvent::Node(NodeEvent::Succeeded(NodeSucceededEvent {
                            output: output.clone(),
                            time: utils::time::time_millis(),
                        })),
                    );
                    Ok(output)
                }
                Err(e) => {
                    let err = e.at_node(&node.id);
                    if let Some(log_id) = &log_id
                        && let Err(e) = store.finalize_log(log_id, LogStatus::Failed, &Value::Null, Some(&err.message()))
                    {
                        warn!(node = %node.id, "failed to finalize execution log: {}", e);
                    }
                    ctx.emit(&node.id, GraphEvent::Node(NodeEvent::Failed(err.message())));
                    debug!(execution = ctx.execution_id(), node = %node.id, "node failed: {}", err);
                    Err(err)
                }
            }
        })
    }

    /// Walks a branch from `entry` until an edge closes the scope of `owner`.
    ///
    /// `visited` is owned by the caller's branch entry, so each node runs at most
    /// once per entry even across diamonds.
    pub fn execute_branch<'a>(
        &'a self,
        entry: &'a Node,
        owner: &'a str,
        ctx: &'a Context,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !visited.insert(entry.id.clone()) {
                return Ok(());
            }
            self.execute_single(entry, ctx).await?;
            for edge in self.continuation(entry) {
                if edge.target == owner || !guard_passes(edge, ctx) {
                    continue;
                }
                if let Some(next) = self.graph.node(&edge.target) {
                    self.execute_branch(next, owner, ctx, &mut *visited).await?;
                }
            }
            Ok(())
        })
    }

    /// Runs every edge leaving `node` through `handle` as one scoped branch.
    pub(crate) async fn run_handle(
        &self,
        node: &Node,
        handle: &str,
        ctx: &Context,
    ) -> Result<usize> {
        let mut visited = HashSet::new();
        for edge in self.graph.outgoing_by_handle(&node.id, handle) {
            if edge.is_sentinel() || edge.target == node.id {
                continue;
            }
            if let Some(entry) = self.graph.node(&edge.target) {
                self.execute_branch(entry, &node.id, ctx, &mut visited).await?;
            }
        }
        Ok(visited.len())
    }

    /// Edges that may follow `node`. Sentinel edges end a scope and are never
    /// followed; control nodes continue only through `done`. Guards are evaluated by the
    /// caller when each edge is reached.
    fn continuation(
        &self,
        node: &Node,
    ) -> Vec<&Edge> {
        self.graph
            .outgoing(&node.id)
            .into_iter()
            .filter(|e| !e.is_sentinel())
            .filter(|e| !node.node_type.is_control() || e.has_source_handle(HANDLE_DONE))
            .collect()
    }
}

/// Evaluates an edge's guard expression; edges without one always pass.
fn guard_passes(
    edge: &Edge,
    ctx: &Context,
) -> bool {
    let Some(condition) = &edge.condition else {
        return true;
    };
    let value = if condition.contains("{{") {
        Some(ctx.render(&Value::String(condition.clone())))
    } else {
        ctx.evaluate(condition)
    };
    let passes = value.map(|v| template::truthy(&v)).unwrap_or(false);
    if !passes {
        debug!(edge = %edge.id, guard = %condition, "edge guard not satisfied");
    }
    passes
}
