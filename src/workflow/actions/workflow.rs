use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    HookflowError, Result,
    runtime::Context,
    store::data::ExecutionStatus,
    workflow::{
        actions::{Action, parse_config},
        node::{NodeId, NodeType},
    },
};

/// Starts a child execution, optionally waiting for it.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAction {
    workflow_id: String,
    /// `{field: expr}` trigger payload of the child; the last output when absent
    #[serde(default, alias = "input")]
    mapping: Option<Map<String, Value>>,
    #[serde(default, alias = "wait")]
    wait_for_completion: bool,
    /// bound of the wait in milliseconds, engine default when absent
    #[serde(default)]
    timeout: Option<u64>,
}

impl WorkflowAction {
    fn payload(
        &self,
        ctx: &Context,
    ) -> Value {
        let Some(mapping) = &self.mapping else {
            return ctx.last_output();
        };
        let payload = mapping
            .iter()
            .map(|(field, expr)| {
                let value = match expr {
                    Value::String(path) if !path.contains("{{") => ctx.evaluate(path).unwrap_or(Value::Null),
                    other => ctx.render(other),
                };
                (field.clone(), value)
            })
            .collect::<Map<_, _>>();
        Value::Object(payload)
    }
}

#[async_trait]
impl Action for WorkflowAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["workflowId"],
            "properties": {
                "workflowId": {"type": "string", "minLength": 1},
                "mapping": {"type": "object"},
                "input": {"type": "object"},
                "waitForCompletion": {"type": "boolean"},
                "wait": {"type": "boolean"},
                "timeout": {"type": "integer", "minimum": 0}
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Workflow
    }

    async fn run(
        &self,
        ctx: &Context,
        nid: &NodeId,
    ) -> Result<Value> {
        let executor = ctx.executor();
        let workflow_id = ctx.render_string(&self.workflow_id);
        let execution_id = executor.spawn(&workflow_id, self.payload(ctx), ctx.identity().cloned(), Some(ctx))?;
        debug!(node = %nid, child = %execution_id, workflow = %workflow_id, "child workflow started");

        if !self.wait_for_completion {
            return Ok(json!({"executionId": execution_id, "workflowId": workflow_id, "status": ExecutionStatus::Queued.as_ref()}));
        }

        let timeout = Duration::from_millis(self.timeout.unwrap_or(executor.config().engine.child_timeout_ms));
        let execution = executor.wait_for(&execution_id, timeout).await?;
        if execution.status == ExecutionStatus::Failed {
            return Err(HookflowError::ChildWorkflow(execution.error_message.unwrap_or_else(|| "unknown error".to_string())));
        }
        Ok(json!({
            "executionId": execution_id,
            "workflowId": workflow_id,
            "status": execution.status.as_ref(),
            "result": execution.result_data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Config,
        runtime::executor_testing::{context, fixture},
    };

    fn child() -> Value {
        json!({
            "id": "child",
            "flow": {
                "nodes": [
                    {"id": "t", "type": "trigger"},
                    {"id": "v", "type": "variable", "config": {"variables": {"doubled": "{{trigger.n}}{{trigger.n}}"}}}
                ],
                "edges": [{"source": "t", "target": "v"}]
            }
        })
    }

    fn broken() -> Value {
        json!({
            "id": "broken",
            "flow": {
                "nodes": [
                    {"id": "t", "type": "trigger"},
                    {"id": "s", "type": "script", "config": {"code": "throw new Error('nope');"}}
                ],
                "edges": [{"source": "t", "target": "s"}]
            }
        })
    }

    #[tokio::test]
    async fn test_waits_for_child() {
        let mut config = Config::default();
        config.engine.child_poll_interval_ms = 5;
        let fx = fixture(config, &[child()]);
        let ctx = context(&fx.executor, json!({"value": 4}));

        let action = WorkflowAction::create(json!({"workflowId": "child", "mapping": {"n": "trigger.value"}, "waitForCompletion": true})).unwrap();
        let output = action.run(&ctx, &"call".to_string()).await.unwrap();
        assert_eq!(output["status"], json!("completed"));
        assert_eq!(output["result"]["v"], json!({"doubled": "44"}));

        let execution = fx.executor.store().execution(output["executionId"].as_str().unwrap()).unwrap();
        assert_eq!(execution.parent_id.as_deref(), Some(ctx.execution_id()));
        assert_eq!(execution.trigger_data, json!({"n": 4}));
    }

    #[tokio::test]
    async fn test_fire_and_forget() {
        let fx = fixture(Config::default(), &[child()]);
        let ctx = context(&fx.executor, json!({}));
        ctx.add_output("prev", json!({"n": 1}));

        let output = WorkflowAction::create(json!({"workflowId": "child"})).unwrap().run(&ctx, &"call".to_string()).await.unwrap();
        assert_eq!(output["status"], json!("queued"));

        let id = output["executionId"].as_str().unwrap().to_string();
        let execution = fx.executor.wait_for(&id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.trigger_data, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_child_failure_is_rethrown() {
        let mut config = Config::default();
        config.engine.child_poll_interval_ms = 5;
        let fx = fixture(config, &[broken()]);
        let ctx = context(&fx.executor, json!({}));

        let err = WorkflowAction::create(json!({"workflowId": "broken", "wait": true})).unwrap().run(&ctx, &"call".to_string()).await.unwrap_err();
        assert_eq!(err, HookflowError::ChildWorkflow("node 's' failed: script failed: nope".to_string()));
        assert_eq!(err.to_string(), "Child workflow failed: node 's' failed: script failed: nope");
    }

    #[tokio::test]
    async fn test_unknown_child_is_definition_error() {
        let fx = fixture(Config::default(), &[]);
        let ctx = context(&fx.executor, json!({}));
        let err = WorkflowAction::create(json!({"workflowId": "ghost"})).unwrap().run(&ctx, &"call".to_string()).await.unwrap_err();
        assert!(matches!(err, HookflowError::Definition(_)));
    }
}
