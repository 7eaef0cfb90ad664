use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Result,
    runtime::Context,
    workflow::{
        actions::{Action, parse_config},
        node::{NodeId, NodeType},
    },
};

use super::sandbox;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScriptAction {
    /// function body; `return` sets the node output
    #[serde(alias = "script")]
    code: String,
    /// restricts the injected modules to these names
    #[serde(default)]
    modules: Option<Vec<String>>,
}

#[async_trait]
impl Action for ScriptAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Function body receiving ctx, trigger, outputs, variables, loop, error, lastOutput, modules and require"
                },
                "script": {"type": "string"},
                "modules": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Names of the registered modules this script may use"
                }
            },
            "anyOf": [{"required": ["code"]}, {"required": ["script"]}]
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Script
    }

    async fn run(
        &self,
        ctx: &Context,
        _nid: &NodeId,
    ) -> Result<Value> {
        let executor = ctx.executor();
        let modules = executor.modules().select(self.modules.as_deref())?;
        let outcome = sandbox::run(self.code.clone(), ctx.snapshot(), modules, executor.config().script.clone()).await?;

        let before = ctx.variables();
        for (name, value) in outcome.variables {
            if before.get(&name) != Some(&value) {
                ctx.set_variable(&name, value);
            }
        }
        Ok(outcome.result)
    }
}
