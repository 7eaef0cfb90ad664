use std::sync::{Arc, RwLock};

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    ShareLock,
    events::{GraphEvent, Message},
    runtime::Executor,
    services::Identity,
    workflow::{node::NodeId, template::{self, Scope}},
};

/// Mutable state of one execution.
///
/// Clones share `variables`, `outputs` and the last output, so writes made in a
/// branch or loop body stay visible to the rest of the run. `loop`, `error` and
/// `current` belong to the scope that set them and never leak outward.
#[derive(Clone)]
pub struct Context {
    execution_id: String,
    workflow_id: String,
    trigger: Arc<Value>,
    variables: ShareLock<Map<String, Value>>,
    outputs: ShareLock<Map<String, Value>>,
    last_output: ShareLock<Value>,

    loop_scope: Option<Value>,
    error: Option<Value>,
    current: Option<Value>,

    identity: Option<Identity>,
    depth: usize,
    record_logs: bool,
    executor: Arc<Executor>,
}

impl Context {
    pub fn new(
        executor: Arc<Executor>,
        execution_id: &str,
        workflow_id: &str,
        trigger: Value,
        variables: Map<String, Value>,
        identity: Option<Identity>,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.to_string(),
            trigger: Arc::new(trigger),
            variables: Arc::new(RwLock::new(variables)),
            outputs: Arc::new(RwLock::new(Map::new())),
            last_output: Arc::new(RwLock::new(Value::Null)),
            loop_scope: None,
            error: None,
            current: None,
            identity,
            depth: 0,
            record_logs: true,
            executor,
        }
    }

    pub fn with_depth(
        mut self,
        depth: usize,
    ) -> Self {
        self.depth = depth;
        self
    }

    /// Disables execution log records, used by isolated single-node runs.
    pub fn without_logs(mut self) -> Self {
        self.record_logs = false;
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn executor(&self) -> Arc<Executor> {
        self.executor.clone()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn record_logs(&self) -> bool {
        self.record_logs
    }

    pub fn trigger(&self) -> &Value {
        &self.trigger
    }

    pub fn variables(&self) -> Map<String, Value> {
        self.variables.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn set_variable(
        &self,
        name: &str,
        value: Value,
    ) {
        if let Ok(mut variables) = self.variables.write() {
            variables.insert(name.to_string(), value);
        }
    }

    pub fn outputs(&self) -> Map<String, Value> {
        self.outputs.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn output(
        &self,
        nid: &str,
    ) -> Option<Value> {
        self.outputs.read().ok().and_then(|o| o.get(nid).cloned())
    }

    /// Records `output` as the result of `nid` and as the most recent output.
    pub fn add_output(
        &self,
        nid: &str,
        output: Value,
    ) {
        if let Ok(mut outputs) = self.outputs.write() {
            outputs.insert(nid.to_string(), output.clone());
        }
        if let Ok(mut last) = self.last_output.write() {
            *last = output;
        }
    }

    pub fn last_output(&self) -> Value {
        self.last_output.read().map(|v| v.clone()).unwrap_or(Value::Null)
    }

    pub fn loop_scope(&self) -> Option<&Value> {
        self.loop_scope.as_ref()
    }

    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref()
    }

    /// Child scope for one loop iteration.
    pub fn for_iteration(
        &self,
        index: usize,
        item: Value,
        total: usize,
    ) -> Self {
        let mut scope = self.clone();
        scope.loop_scope = Some(json!({"index": index, "item": item, "total": total}));
        scope
    }

    /// Child scope for a catch branch.
    pub fn for_catch(
        &self,
        error: Value,
    ) -> Self {
        let mut scope = self.clone();
        scope.error = Some(error);
        scope
    }

    /// Child scope binding `current` to one element, used by per-element evaluation.
    pub fn for_element(
        &self,
        item: Value,
    ) -> Self {
        let mut scope = self.clone();
        scope.current = Some(item);
        scope
    }

    /// Snapshot handed to scripts and transforms.
    pub fn snapshot(&self) -> Value {
        json!({
            "executionId": self.execution_id,
            "workflowId": self.workflow_id,
            "trigger": self.trigger.as_ref(),
            "outputs": self.outputs(),
            "variables": self.variables(),
            "loop": self.loop_scope,
            "error": self.error,
            "lastOutput": self.last_output(),
        })
    }

    /// Publishes a graph event for this execution.
    pub fn emit(
        &self,
        nid: &NodeId,
        event: GraphEvent,
    ) {
        self.executor.channel().emit(&Message {
            execution_id: self.execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            node_id: nid.clone(),
            event,
        });
    }

    /// Renders `{{expr}}` templates in `value` against this scope.
    pub fn render(
        &self,
        value: &Value,
    ) -> Value {
        template::render(value, self)
    }

    pub fn render_string(
        &self,
        value: &str,
    ) -> String {
        template::render_string(value, self)
    }

    pub fn evaluate(
        &self,
        path: &str,
    ) -> Option<Value> {
        template::evaluate(path, self)
    }
}

impl Scope for Context {
    fn resolve(
        &self,
        root: &str,
        segments: &[String],
    ) -> Option<Value> {
        match root {
            "trigger" => template::walk(&self.trigger, segments),
            "variables" => {
                let variables = self.variables.read().ok()?;
                match segments.split_first() {
                    Some((first, rest)) => template::walk(variables.get(first)?, rest),
                    None => Some(Value::Object(variables.clone())),
                }
            }
            "outputs" => {
                let outputs = self.outputs.read().ok()?;
                match segments.split_first() {
                    Some((first, rest)) => template::walk(outputs.get(first)?, rest),
                    None => Some(Value::Object(outputs.clone())),
                }
            }
            "loop" => template::walk(self.loop_scope.as_ref()?, segments),
            "error" => template::walk(self.error.as_ref()?, segments),
            "current" => template::walk(self.current.as_ref()?, segments),
            "lastOutput" => template::walk(&self.last_output(), segments),
            other => {
                debug!(root = other, "unknown expression root");
                None
            }
        }
    }
}
