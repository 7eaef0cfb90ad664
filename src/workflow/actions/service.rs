use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    HookflowError, Result,
    runtime::Context,
    services::AccessOptions,
    workflow::{
        actions::{Action, parse_config},
        node::{NodeId, NodeType},
        template,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceOperation {
    Create,
    Read,
    Update,
    Delete,
}

/// CRUD against the item store.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAction {
    operation: ServiceOperation,
    collection: String,
    /// item id; reads without one list by `query`
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
    /// `{filter, limit}` for list reads
    #[serde(default)]
    query: Option<Value>,
    #[serde(default)]
    bypass_permissions: bool,
    /// run without the triggering identity
    #[serde(default)]
    as_anonymous: bool,
}

impl ServiceAction {
    fn options(
        &self,
        ctx: &Context,
    ) -> AccessOptions {
        AccessOptions {
            bypass_permissions: self.bypass_permissions,
            identity: if self.as_anonymous { None } else { ctx.identity().cloned() },
        }
    }

    fn item_id(
        &self,
        ctx: &Context,
    ) -> Option<String> {
        match self.id.as_ref().map(|id| ctx.render(id)) {
            None | Some(Value::Null) => None,
            Some(v) => Some(template::stringify(&v)).filter(|s| !s.is_empty()),
        }
    }

    fn required_id(
        &self,
        ctx: &Context,
    ) -> Result<String> {
        self.item_id(ctx).ok_or_else(|| HookflowError::Action(format!("{} on '{}' needs an item id", self.operation.as_ref(), self.collection)))
    }
}

#[async_trait]
impl Action for ServiceAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["operation", "collection"],
            "properties": {
                "operation": {"type": "string", "enum": ["create", "read", "update", "delete"]},
                "collection": {"type": "string", "minLength": 1},
                "id": {"type": ["string", "integer", "null"]},
                "data": {},
                "query": {"type": ["object", "string", "null"]},
                "bypassPermissions": {"type": "boolean"},
                "asAnonymous": {"type": "boolean"}
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Service
    }

    async fn run(
        &self,
        ctx: &Context,
        nid: &NodeId,
    ) -> Result<Value> {
        let items = ctx.executor().items();
        let opts = self.options(ctx);
        let collection = ctx.render_string(&self.collection);
        debug!(node = %nid, operation = self.operation.as_ref(), collection = %collection, "service call");

        let data = self.data.as_ref().map(|d| ctx.render(d)).unwrap_or(Value::Null);
        let result = match self.operation {
            ServiceOperation::Create => items.create_one(&collection, data, &opts).await,
            ServiceOperation::Read => match self.item_id(ctx) {
                Some(id) => items.read_one(&collection, &id, &opts).await,
                None => {
                    let query = self.query.as_ref().map(|q| ctx.render(q)).unwrap_or_else(|| json!({}));
                    items.read_by_query(&collection, &query, &opts).await.map(Value::Array)
                }
            },
            ServiceOperation::Update => {
                let id = self.required_id(ctx)?;
                items.update_one(&collection, &id, data, &opts).await
            }
            ServiceOperation::Delete => {
                let id = self.required_id(ctx)?;
                items.delete_one(&collection, &id, &opts).await.map(|_| json!({"id": id, "deleted": true}))
            }
        };

        result.map_err(|e| e.in_processor(&format!("service {} on '{}'", self.operation.as_ref(), collection)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Config,
        runtime::executor_testing::{context, fixture},
    };

    #[test]
    fn test_create() {
        let action = ServiceAction::create(json!({
            "operation": "update",
            "collection": "articles",
            "id": "{{trigger.id}}",
            "data": {"status": "published"},
            "bypassPermissions": true
        }))
        .unwrap();
        assert_eq!(action.operation, ServiceOperation::Update);
        assert!(action.bypass_permissions);
        assert!(!action.as_anonymous);
    }

    #[test]
    fn test_unknown_operation_rejected() {
        assert!(ServiceAction::create(json!({"operation": "upsert", "collection": "a"})).is_err());
        assert!(ServiceAction::create(json!({"operation": "read"})).is_err());
    }

    #[tokio::test]
    async fn test_crud_against_item_store() {
        let fx = fixture(Config::default(), &[]);
        let ctx = context(&fx.executor, json!({"title": "Hello", "id": "a1"}));
        let nid = "svc".to_string();

        let created = ServiceAction::create(json!({
            "operation": "create",
            "collection": "articles",
            "data": {"id": "{{trigger.id}}", "title": "{{trigger.title}}", "status": "draft"}
        }))
        .unwrap()
        .run(&ctx, &nid)
        .await
        .unwrap();
        assert_eq!(created, json!({"id": "a1", "title": "Hello", "status": "draft"}));

        let updated = ServiceAction::create(json!({
            "operation": "update", "collection": "articles", "id": "{{trigger.id}}", "data": {"status": "published"}
        }))
        .unwrap()
        .run(&ctx, &nid)
        .await
        .unwrap();
        assert_eq!(updated["status"], json!("published"));

        let listed = ServiceAction::create(json!({
            "operation": "read", "collection": "articles", "query": {"filter": {"status": "published"}}
        }))
        .unwrap()
        .run(&ctx, &nid)
        .await
        .unwrap();
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let deleted = ServiceAction::create(json!({"operation": "delete", "collection": "articles", "id": "a1"}))
            .unwrap()
            .run(&ctx, &nid)
            .await
            .unwrap();
        assert_eq!(deleted, json!({"id": "a1", "deleted": true}));
        assert!(fx.items.items("articles").is_empty());

        let err = ServiceAction::create(json!({"operation": "read", "collection": "articles", "id": "a1"}))
            .unwrap()
            .run(&ctx, &nid)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("service read on 'articles' failed"));
    }

    #[tokio::test]
    async fn test_update_without_id_fails() {
        let fx = fixture(Config::default(), &[]);
        let ctx = context(&fx.executor, json!({}));
        let err = ServiceAction::create(json!({"operation": "update", "collection": "articles", "data": {"a": 1}}))
            .unwrap()
            .run(&ctx, &"svc".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, HookflowError::Action(_)));
    }

    #[tokio::test]
    async fn test_permissions() {
        let fx = fixture(Config::default(), &[]);
        fx.items.protect("secrets");
        let ctx = context(&fx.executor, json!({}));
        let denied = ServiceAction::create(json!({"operation": "create", "collection": "secrets", "data": {"k": 1}})).unwrap();
        assert!(denied.run(&ctx, &"svc".to_string()).await.is_err());

        let bypass = ServiceAction::create(json!({"operation": "create", "collection": "secrets", "data": {"k": 1}, "bypassPermissions": true})).unwrap();
        assert!(bypass.run(&ctx, &"svc".to_string()).await.is_ok());
        assert_eq!(fx.items.items("secrets").len(), 1);
    }
}
