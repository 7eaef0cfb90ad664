use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    Result,
    runtime::Context,
    services::AccessOptions,
    utils,
    workflow::{
        actions::{Action, parse_config, recipients},
        node::{NodeId, NodeType},
    },
};

const NOTIFICATIONS_COLLECTION: &str = "notifications";

/// Creates one notification record per recipient.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationAction {
    /// user id(s); a string, comma list or array, templates allowed
    recipients: Value,
    subject: String,
    #[serde(default)]
    message: String,
    /// related collection and item, stored with the record
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    item: Option<Value>,
}

#[async_trait]
impl Action for NotificationAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["recipients", "subject"],
            "properties": {
                "recipients": {"type": ["string", "array"]},
                "subject": {"type": "string"},
                "message": {"type": "string"},
                "collection": {"type": "string"},
                "item": {"type": ["string", "integer", "null"]}
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Notification
    }

    async fn run(
        &self,
        ctx: &Context,
        nid: &NodeId,
    ) -> Result<Value> {
        let items = ctx.executor().items();
        let opts = AccessOptions {
            bypass_permissions: true,
            identity: ctx.identity().cloned(),
        };
        let sender = ctx.identity().and_then(|i| i.user.clone());
        let subject = ctx.render_string(&self.subject);
        let message = ctx.render_string(&self.message);
        let item = self.item.as_ref().map(|i| ctx.render(i)).unwrap_or(Value::Null);

        let mut sent = 0;
        let mut failed = Vec::new();
        for recipient in recipients(&ctx.render(&self.recipients)) {
            let record = json!({
                "recipient": recipient,
                "sender": sender,
                "subject": subject,
                "message": message,
                "collection": self.collection,
                "item": item,
                "status": "inbox",
                "timestamp": utils::time::time_millis(),
            });
            match items.create_one(NOTIFICATIONS_COLLECTION, record, &opts).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    warn!(node = %nid, recipient = %recipient, "notification failed: {}", e);
                    failed.push(json!({"recipient": recipient, "error": e.to_string()}));
                }
            }
        }
        Ok(json!({"sent": sent, "failed": failed.len(), "errors": failed}))
    }
}
