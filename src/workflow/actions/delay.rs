use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    HookflowError, Result,
    runtime::Context,
    workflow::{
        actions::{Action, parse_config},
        condition,
        node::{NodeId, NodeType},
    },
};

/// Suspends only this execution path.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DelayAction {
    /// milliseconds, or a template resolving to them
    duration: Value,
}

#[async_trait]
impl Action for DelayAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["duration"],
            "properties": {
                "duration": {
                    "type": ["integer", "string"],
                    "description": "Delay in milliseconds, templates allowed"
                }
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Delay
    }

    async fn run(
        &self,
        ctx: &Context,
        nid: &NodeId,
    ) -> Result<Value> {
        let resolved = ctx.render(&self.duration);
        let ms = condition::to_number(&resolved)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .ok_or_else(|| HookflowError::Action(format!("invalid delay duration {}", resolved)))?;
        let max = ctx.executor().config().engine.max_delay_ms;
        let ms = (ms as u64).min(max);

        debug!(node = %nid, ms, "delaying");
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({"delayed": ms}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Config,
        runtime::executor_testing::{context, executor},
    };

    #[tokio::test]
    async fn test_resolved_duration() {
        let mut config = Config::default();
        config.engine.max_delay_ms = 20;
        let executor = executor(config, &[]);
        let ctx = context(&executor, json!({"ms": 5, "long": 10_000, "bad": "soon"}));

        let output = DelayAction::create(json!({"duration": "{{trigger.ms}}"})).unwrap().run(&ctx, &"d".to_string()).await.unwrap();
        assert_eq!(output, json!({"delayed": 5}));

        let output = DelayAction::create(json!({"duration": "{{trigger.long}}"})).unwrap().run(&ctx, &"d".to_string()).await.unwrap();
        assert_eq!(output, json!({"delayed": 20}));

        let err = DelayAction::create(json!({"duration": "{{trigger.bad}}"})).unwrap().run(&ctx, &"d".to_string()).await.unwrap_err();
        assert!(matches!(err, HookflowError::Action(_)));
    }
}
