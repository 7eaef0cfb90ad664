use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    HookflowError, Result,
    runtime::Context,
    services::StatsQuery,
    workflow::{
        actions::{Action, parse_config},
        node::{NodeId, NodeType},
    },
};

/// Delegates grouped aggregation to the host.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatsAction {
    #[serde(flatten)]
    query: StatsQuery,
}

#[async_trait]
impl Action for StatsAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["collection"],
            "properties": {
                "collection": {"type": "string", "minLength": 1},
                "groupBy": {"type": "array", "items": {"type": "string"}},
                "aggregate": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["op"],
                        "properties": {
                            "op": {"type": "string"},
                            "field": {"type": "string"}
                        }
                    }
                },
                "filter": {}
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Stats
    }

    async fn run(
        &self,
        ctx: &Context,
        _nid: &NodeId,
    ) -> Result<Value> {
        let query = StatsQuery {
            collection: ctx.render_string(&self.query.collection),
            filter: ctx.render(&self.query.filter),
            ..self.query.clone()
        };
        let stats = ctx.executor().stats();
        let data = stats.get_stats(&query).await.map_err(|e| HookflowError::Action(format!("stats on '{}' failed: {}", query.collection, e)))?;
        Ok(json!({"collection": query.collection, "stats": data}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Config,
        runtime::executor_testing::{context, fixture},
        services::{AccessOptions, ItemStore},
    };

    #[tokio::test]
    async fn test_delegates_to_aggregator() {
        let fx = fixture(Config::default(), &[]);
        let opts = AccessOptions::default();
        for (status, price) in [("open", 10), ("open", 20), ("closed", 5)] {
            fx.items.create_one("orders", json!({"status": status, "price": price}), &opts).await.unwrap();
        }
        let ctx = context(&fx.executor, json!({"collection": "orders"}));

        let action = StatsAction::create(json!({
            "collection": "{{trigger.collection}}",
            "groupBy": ["status"],
            "aggregate": [{"op": "count"}, {"op": "sum", "field": "price"}]
        }))
        .unwrap();
        let output = action.run(&ctx, &"stats".to_string()).await.unwrap();
        assert_eq!(output["collection"], json!("orders"));
        assert_eq!(output["stats"][0], json!({"status": "open", "count": {"*": 2}, "sum": {"price": 30.0}}));
        assert_eq!(output["stats"][1]["count"], json!({"*": 1}));
    }

    #[test]
    fn test_requires_collection() {
        assert!(StatsAction::create(json!({"groupBy": ["a"]})).is_err());
    }
}
