use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Result,
    runtime::Context,
    workflow::{
        actions::{Action, parse_config, source_array},
        condition,
        node::{NodeId, NodeType},
        template,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AggregateOperation {
    Count,
    Sum,
    #[serde(alias = "avg")]
    Average,
    Min,
    Max,
    First,
    Last,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AggregateAction {
    operation: AggregateOperation,
    /// path or template of the array, last output when absent
    #[serde(default, alias = "arraySource")]
    source: Option<String>,
    /// projects each element onto this path first
    #[serde(default)]
    field: Option<String>,
}

/// Folds `values` with `op`. Numeric folds skip nulls and non-numeric values; an empty input
/// yields `0` for count and sum, `null` for everything else.
pub fn aggregate(
    op: AggregateOperation,
    values: &[Value],
) -> Value {
    let numbers = || values.iter().filter(|v| !v.is_null()).filter_map(condition::to_number).filter(|n| n.is_finite()).collect::<Vec<f64>>();
    match op {
        AggregateOperation::Count => json!(values.len()),
        AggregateOperation::Sum => json!(numbers().iter().sum::<f64>()),
        AggregateOperation::Average => {
            let nums = numbers();
            if nums.is_empty() { Value::Null } else { json!(nums.iter().sum::<f64>() / nums.len() as f64) }
        }
        AggregateOperation::Min => numbers().into_iter().reduce(f64::min).map(|v| json!(v)).unwrap_or(Value::Null),
        AggregateOperation::Max => numbers().into_iter().reduce(f64::max).map(|v| json!(v)).unwrap_or(Value::Null),
        AggregateOperation::First => values.first().cloned().unwrap_or(Value::Null),
        AggregateOperation::Last => values.last().cloned().unwrap_or(Value::Null),
    }
}

#[async_trait]
impl Action for AggregateAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["operation"],
            "properties": {
                "operation": {"type": "string", "enum": ["count", "sum", "average", "avg", "min", "max", "first", "last"]},
                "source": {"type": "string"},
                "arraySource": {"type": "string"},
                "field": {"type": "string"}
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Aggregate
    }

    async fn run(
        &self,
        ctx: &Context,
        _nid: &NodeId,
    ) -> Result<Value> {
        let items = source_array(ctx, self.source.as_deref())?;
        let values = match &self.field {
            Some(field) => {
                let path = template::tokenize(field);
                items.iter().map(|item| template::walk(item, &path).unwrap_or(Value::Null)).collect::<Vec<_>>()
            }
            None => items,
        };
        Ok(json!({
            "operation": self.operation.as_ref(),
            "result": aggregate(self.operation, &values),
            "count": values.len(),
        }))
    }
}
