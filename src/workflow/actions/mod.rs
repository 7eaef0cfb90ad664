mod aggregate;
mod delay;
mod email;
mod file;
mod filter;
pub mod http;
mod notification;
pub mod script;
mod service;
mod stats;
mod transform;
mod trigger;
mod variable;
mod workflow;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    HookflowError, Result,
    runtime::Context,
    workflow::node::{NodeId, NodeType},
};

pub use aggregate::AggregateAction;
pub use delay::DelayAction;
pub use email::EmailAction;
pub use file::FileAction;
pub use filter::FilterAction;
pub use http::HttpAction;
pub use notification::NotificationAction;
pub use script::{Capability, ModuleInfo, ModuleOptions, ModuleRegistry, ScriptAction};
pub use service::ServiceAction;
pub use stats::StatsAction;
pub use transform::TransformAction;
pub use trigger::TriggerAction;
pub use variable::VariableAction;
pub use workflow::WorkflowAction;

#[async_trait]
pub trait Action: Send + Sync {
    /// Creates a new instance of the action from the given inputs.
    ///
    /// # Arguments
    ///
    /// * `params` - The [`serde_json::Value`] containing the node config.
    ///
    /// # Returns
    ///
    /// Returns a [`Result`] containing the created action instance.
    fn create(params: Value) -> Result<Self>
    where
        Self: Sized;

    /// Returns the JSON schema the node config is validated against.
    fn schema() -> Value
    where
        Self: Sized;

    /// Returns the node type this action implements.
    fn action_type(&self) -> NodeType;

    /// Executes the node's action against the execution context.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The [`Context`] of the execution.
    /// * `nid` - The id of the node.
    ///
    /// # Returns
    ///
    /// Returns the node output, stored under `outputs.<nid>`.
    async fn run(
        &self,
        ctx: &Context,
        nid: &NodeId,
    ) -> Result<Value>;
}

/// Validates `params` against `schema` and deserializes it.
pub(crate) fn parse_config<T: DeserializeOwned>(
    params: Value,
    schema: &Value,
) -> Result<T> {
    jsonschema::validate(schema, &params)?;
    Ok(serde_json::from_value::<T>(params)?)
}

/// Resolves the array a node works on. Without a source the last output is used; an
/// `{items: [...]}` result of a loop or filter node counts as its items.
pub(crate) fn source_array(
    ctx: &Context,
    source: Option<&str>,
) -> Result<Vec<Value>> {
    let value = match source {
        Some(s) if s.contains("{{") => Some(ctx.render(&Value::String(s.to_string()))),
        Some(s) => ctx.evaluate(s),
        None => Some(ctx.last_output()),
    };
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Object(mut map)) if map.get("items").map(Value::is_array).unwrap_or(false) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            _ => Ok(Vec::new()),
        },
        Some(other) => Err(HookflowError::Action(format!("expected an array from '{}', got {}", source.unwrap_or("lastOutput"), other))),
    }
}

/// Recipients may be configured as one string, a comma separated string or a list.
pub(crate) fn recipients(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
        Value::Array(items) => items.iter().flat_map(recipients).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_recipients() {
        assert_eq!(recipients(&json!("a@x.io, b@x.io")), vec!["a@x.io", "b@x.io"]);
        assert_eq!(recipients(&json!(["a@x.io", "b@x.io,c@x.io"])), vec!["a@x.io", "b@x.io", "c@x.io"]);
        assert!(recipients(&Value::Null).is_empty());
        assert_eq!(recipients(&json!(42)), vec!["42"]);
    }
}
