use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    Result,
    runtime::Context,
    services::MailMessage,
    workflow::{
        actions::{Action, parse_config, recipients},
        node::{NodeId, NodeType},
    },
};

/// Sends one message per recipient through the mail transport.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmailAction {
    to: Value,
    #[serde(default)]
    from: Option<String>,
    subject: String,
    #[serde(default)]
    body: String,
}

#[async_trait]
impl Action for EmailAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["to", "subject"],
            "properties": {
                "to": {"type": ["string", "array"]},
                "from": {"type": "string"},
                "subject": {"type": "string"},
                "body": {"type": "string"}
            }
        })
    }

    fn action_type(&self) -> NodeType {
        NodeType::Email
    }

    async fn run(
        &self,
        ctx: &Context,
        nid: &NodeId,
    ) -> Result<Value> {
        let mailer = ctx.executor().mailer();
        let from = self.from.as_ref().map(|f| ctx.render_string(f));
        let subject = ctx.render_string(&self.subject);
        let body = ctx.render_string(&self.body);

        let mut sent = 0;
        let mut failed = Vec::new();
        for to in recipients(&ctx.render(&self.to)) {
            let message = MailMessage {
                to: to.clone(),
                from: from.clone(),
                subject: subject.clone(),
                body: body.clone(),
            };
            match mailer.send(&message).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(node = %nid, to = %to, "email failed: {}", e);
                    failed.push(json!({"recipient": to, "error": e.to_string()}));
                }
            }
        }
        Ok(json!({"sent": sent, "failed": failed.len(), "errors": failed}))
    }
}
