use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Result,
    runtime::Context,
    workflow::{
        actions::{Action, parse_config, script::sandbox},
        node::{NodeId, NodeType},
        template,
    },
};

/// Reshapes data, either declaratively or through a sandboxed script.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransformAction {
    /// `{target: sourceExpr}`; plain paths read from the last output
    #[serde(default)]
    mapping: Option<Map<String, Value>>,
    /// script body, same bindings as a script node without modules
    #[serde(default, alias = "code")]
    script: Option<String>,
}

impl TransformAction {
    fn resolve(
        ctx: &Context,
        source: &Value,
        last_output: &Value,
    ) -> Value {
        match source {
            Value::String(expr) if expr.contains("{{") => ctx.render(source),
            Value::String(path) => template::walk(last_output, &template::tokenize(path))
                .or_else(|| ctx.evaluate(path))
                .unwrap_or(Value::Null),
            other => ctx.render(other),
        }
    }
}

/// Writes `value` at a dotted `target` path, creating intermediate objects.
fn assign(
    out: &mut Map<String, Value>,
    target: &str,
    value: Value,
) {
    let mut segments = target.split('.').peekable();
    let mut current = out;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
}

#[async_trait]
impl Action for TransformAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "mapping": {"type": "object"},
                "script": {"type": "string"},
                "code": {"type": "string"}
            },
            "anyOf": [{"required": ["mapping"]}, {"required": ["script"]}, {"required": ["code"]}]
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Transform
    }

    async fn run(
        &self,
        ctx: &Context,
        _nid: &NodeId,
    ) -> Result<Value> {
        if let Some(script) = &self.script {
            let executor = ctx.executor();
            let outcome = sandbox::run(script.clone(), ctx.snapshot(), Vec::new(), executor.config().script.clone()).await?;
            return Ok(outcome.result);
        }

        let last_output = ctx.last_output();
        let mut out = Map::new();
        for (target, source) in self.mapping.iter().flatten() {
            assign(&mut out, target, Self::resolve(ctx, source, &last_output));
        }
        Ok(Value::Object(out))
    }
}
