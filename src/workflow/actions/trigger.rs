use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Result,
    runtime::Context,
    workflow::node::{NodeId, NodeType},
};

use super::Action;

/// Entry node; its output is the trigger payload.
#[derive(Debug, Clone)]
pub struct TriggerAction;

#[async_trait]
impl Action for TriggerAction {
    fn create(_: Value) -> Result<Self> {
        Ok(TriggerAction)
    }

    fn schema() -> Value {
        json!({})
    }

    fn action_type(&self) -> NodeType {
        NodeType::Trigger
    }

    async fn run(
        &self,
        ctx: &Context,
        _: &NodeId,
    ) -> Result<Value> {
        Ok(ctx.trigger().clone())
    }
}
