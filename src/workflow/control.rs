//! Configs of the control nodes (condition, loop). Their execution lives in the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Result,
    workflow::condition::{Combinator, Condition},
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConditionConfig {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, alias = "logic", alias = "logicalOperator")]
    pub combinator: Combinator,
}

impl ConditionConfig {
    pub fn create(params: Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        Ok(serde_json::from_value::<Self>(params)?)
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
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
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    #[default]
    Array,
    Count,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    #[serde(default)]
    pub loop_type: LoopType,
    /// path or template resolving to the array to iterate
    pub array_source: Option<String>,
    /// number of iterations in count mode; may be a template
    pub count: Option<Value>,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub max_iterations: Option<usize>,
}

impl LoopConfig {
    pub fn create(params: Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &params)?;
        Ok(serde_json::from_value::<Self>(params)?)
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "loopType": {"type": "string", "enum": ["array", "count"]},
                "arraySource": {"type": "string"},
                "count": {"type": ["integer", "string"]},
                "startIndex": {"type": "integer", "minimum": 0},
                "endIndex": {"type": "integer", "minimum": 0},
                "maxIterations": {"type": "integer", "minimum": 1}
            }
        })
    }
}
