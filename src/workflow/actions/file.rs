use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

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

const FILES_COLLECTION: &str = "files";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileOperation {
    Info,
    Delete,
    List,
}

/// Reads or removes stored file metadata.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileAction {
    operation: FileOperation,
    #[serde(default, alias = "fileId")]
    id: Option<Value>,
    /// `{filter, limit}` for list
    #[serde(default)]
    query: Option<Value>,
    #[serde(default)]
    bypass_permissions: bool,
}

#[async_trait]
impl Action for FileAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["operation"],
            "properties": {
                "operation": {"type": "string", "enum": ["info", "delete", "list"]},
                "id": {"type": ["string", "integer"]},
                "fileId": {"type": ["string", "integer"]},
                "query": {"type": "object"},
                "bypassPermissions": {"type": "boolean"}
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::File
    }

    async fn run(
        &self,
        ctx: &Context,
        _nid: &NodeId,
    ) -> Result<Value> {
        let items = ctx.executor().items();
        let opts = AccessOptions {
            bypass_permissions: self.bypass_permissions,
            identity: ctx.identity().cloned(),
        };
        let id = self.id.as_ref().map(|id| template::stringify(&ctx.render(id))).filter(|id| !id.is_empty());
        let required_id = || id.clone().ok_or_else(|| HookflowError::Action(format!("file {} needs a file id", self.operation.as_ref())));

        let result = match self.operation {
            FileOperation::Info => items.read_one(FILES_COLLECTION, &required_id()?, &opts).await,
            FileOperation::Delete => {
                let id = required_id()?;
                items.delete_one(FILES_COLLECTION, &id, &opts).await.map(|_| json!({"id": id, "deleted": true}))
            }
            FileOperation::List => {
                let query = self.query.as_ref().map(|q| ctx.render(q)).unwrap_or_else(|| json!({}));
                items.read_by_query(FILES_COLLECTION, &query, &opts).await.map(|files| {
                    let count = files.len();
                    json!({"files": files, "count": count})
                })
            }
        };
        result.map_err(|e| HookflowError::Action(format!("file {} failed: {}", self.operation.as_ref(), e)))
    }
}
