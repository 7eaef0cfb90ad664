use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
    Result,
    runtime::Context,
    workflow::{
        actions::{Action, parse_config},
        node::{NodeId, NodeType},
    },
};

/// Writes rendered values into the execution variables.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VariableAction {
    variables: Map<String, Value>,
}

#[async_trait]
impl Action for VariableAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["variables"],
            "properties": {
                "variables": {"type": "object"}
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Variable
    }

    async fn run(
        &self,
        ctx: &Context,
        _nid: &NodeId,
    ) -> Result<Value> {
        let mut written = Map::new();
        for (name, value) in &self.variables {
            let value = ctx.render(value);
            ctx.set_variable(name, value.clone());
            written.insert(name.clone(), value);
        }
        Ok(Value::Object(written))
    }
}
