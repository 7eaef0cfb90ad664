use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Result,
    runtime::Context,
    workflow::{
        actions::{Action, parse_config, source_array},
        condition::{self, Combinator, Condition},
        node::{NodeId, NodeType},
    },
};

/// Keeps the elements matching every (or any) condition. Conditions address the
/// element under test as `current`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FilterAction {
    /// path or template of the array, last output when absent
    #[serde(default, alias = "arraySource")]
    source: Option<String>,
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default, alias = "logic", alias = "logicalOperator")]
    combinator: Combinator,
}

#[async_trait]
impl Action for FilterAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": {"type": "string"},
                "arraySource": {"type": "string"},
                "conditions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "field": {"type": "string"},
                            "operator": {"type": "string"}
                        },
                        "required": ["field", "operator"]
                    }
                }
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Filter
    }

    async fn run(
        &self,
        ctx: &Context,
        _nid: &NodeId,
    ) -> Result<Value> {
        let items = source_array(ctx, self.source.as_deref())?;
        let matches = items
            .into_iter()
            .filter(|item| {
                let scope = ctx.for_element(item.clone());
                let results = self.conditions.iter().map(|c| c.evaluate(&scope)).collect::<Vec<_>>();
                condition::combine(self.combinator, &results)
            })
            .collect::<Vec<_>>();
        let count = matches.len();
        Ok(json!({"items": matches, "count": count}))
    }
}
