//! Condition, loop and try nodes.

use serde_json::{Value, json};
use tracing::debug;

use crate::{
    HookflowError, Result,
    runtime::Context,
    workflow::{
        condition,
        consts::{HANDLE_CATCH, HANDLE_FALSE, HANDLE_LOOP, HANDLE_TRUE, HANDLE_TRY},
        control::{ConditionConfig, LoopConfig, LoopType},
        node::Node,
    },
};

use super::Dispatcher;

impl Dispatcher {
    /// Evaluates the conditions and runs exactly the winning branch.
    pub(crate) async fn run_condition(
        &self,
        node: &Node,
        config: &ConditionConfig,
        ctx: &Context,
    ) -> Result<Value> {
        let results = config.conditions.iter().map(|c| c.evaluate(ctx)).collect::<Vec<_>>();
        let met = condition::combine(config.combinator, &results);
        let branch = if met { HANDLE_TRUE } else { HANDLE_FALSE };
        debug!(node = %node.id, branch, "condition evaluated");

        self.run_handle(node, branch, ctx).await?;

        let per_condition = config
            .conditions
            .iter()
            .zip(&results)
            .map(|(c, r)| json!({"field": c.field, "operator": c.operator.as_ref(), "result": r}))
            .collect::<Vec<_>>();
        Ok(json!({
            "conditionMet": met,
            "perConditionResults": per_condition,
            "branch": branch,
        }))
    }

    /// Re-walks the loop body once per item. Any failure aborts the whole node.
    pub(crate) async fn run_loop(
        &self,
        node: &Node,
        config: &LoopConfig,
        ctx: &Context,
    ) -> Result<Value> {
        let ceiling = ctx.executor().config().engine.max_loop_iterations;
        let cap = config.max_iterations.unwrap_or(ceiling).min(ceiling);

        let mut items = match config.loop_type {
            LoopType::Array => {
                let source = config.array_source.as_deref().unwrap_or_default();
                let resolved = if source.contains("{{") { Some(ctx.render(&Value::String(source.to_string()))) } else { ctx.evaluate(source) };
                let all = match resolved {
                    Some(Value::Array(items)) => items,
                    None | Some(Value::Null) => Vec::new(),
                    Some(other) => return Err(HookflowError::Action(format!("loop source '{}' is not an array: {}", source, other))),
                };
                let start = config.start_index.unwrap_or(0).min(all.len());
                let end = config.end_index.unwrap_or(all.len()).clamp(start, all.len());
                all[start..end].to_vec()
            }
            LoopType::Count => {
                let count = config.count.as_ref().map(|c| ctx.render(c)).and_then(|c| condition::to_number(&c)).unwrap_or(0.0);
                let count = if count.is_finite() && count > 0.0 { count as usize } else { 0 };
                let start = config.start_index.unwrap_or(0);
                (0..count.min(cap))
                    .map(|i| start.checked_add(i).map(|n| json!(n)).ok_or_else(|| HookflowError::Action(format!("loop index overflows past start index {}", start))))
                    .collect::<Result<Vec<_>>>()?
            }
        };
        items.truncate(cap);

        let total = items.len();
        let mut results = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            let scope = ctx.for_iteration(index, item.clone(), total);
            let ran = self.run_handle(node, HANDLE_LOOP, &scope).await?;
            results.push(if ran > 0 { scope.last_output() } else { item });
        }
        debug!(node = %node.id, iterations = total, "loop finished");

        Ok(json!({"items": results, "count": total}))
    }

    /// Runs the `try` branch; on failure exposes the error to the `catch` branch only.
    pub(crate) async fn run_try(
        &self,
        node: &Node,
        ctx: &Context,
    ) -> Result<Value> {
        match self.run_handle(node, HANDLE_TRY, ctx).await {
            Ok(_) => Ok(json!({"success": true, "branch": HANDLE_TRY, "error": null})),
            Err(e) => {
                let error = json!({
                    "message": e.message(),
                    "stack": e.to_string(),
                    "nodeId": e.node_id().unwrap_or(&node.id),
                });
                debug!(node = %node.id, "try body failed, running catch: {}", e);
                let scope = ctx.for_catch(error.clone());
                self.run_handle(node, HANDLE_CATCH, &scope).await?;
                Ok(json!({"success": true, "branch": HANDLE_CATCH, "error": error}))
            }
        }
    }
}

