use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    HookflowError, Result,
    model::{EdgeModel, NodeModel},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerType {
    Hook,
    Schedule,
    #[default]
    Manual,
}

/// Node and edge lists of a workflow graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowModel {
    #[serde(default)]
    pub nodes: Vec<NodeModel>,
    #[serde(default)]
    pub edges: Vec<EdgeModel>,
}

/// Admin-defined workflow. Read-only snapshot during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub trigger_type: TriggerType,
    /// collection name or `*`
    #[serde(default)]
    pub trigger_hook_collection: Option<String>,
    /// hook event, e.g. `items.create` or `items.update.after`
    #[serde(default)]
    pub trigger_hook_action: Option<String>,
    #[serde(default)]
    pub trigger_cron: Option<String>,
    /// default variables seeded into every execution
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub flow: FlowModel,
    /// roles allowed to trigger through hooks; empty means unrestricted
    #[serde(default)]
    pub allowed_roles: Vec<String>,
}

impl WorkflowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let workflow = serde_json::from_str::<WorkflowModel>(s);
        match workflow {
            Ok(v) => Ok(v),
            Err(e) => Err(HookflowError::Definition(format!("{}", e))),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkflowStatus::Active
    }

    /// Whether the definition listens to `action` on `collection`.
    pub fn matches_hook(
        &self,
        collection: &str,
        action: &str,
    ) -> bool {
        if self.trigger_type != TriggerType::Hook || !self.is_active() {
            return false;
        }
        let collection_matches = match self.trigger_hook_collection.as_deref() {
            Some("*") => true,
            Some(c) => c == collection,
            None => false,
        };
        collection_matches && self.trigger_hook_action.as_deref() == Some(action)
    }

    /// Whether an identity with `role` may trigger this workflow.
    /// Identities without a role are rejected whenever a restriction exists.
    pub fn allows_role(
        &self,
        role: Option<&str>,
    ) -> bool {
        if self.allowed_roles.is_empty() {
            return true;
        }
        match role {
            Some(role) => self.allowed_roles.iter().any(|r| r == role),
            None => false,
        }
    }

    pub fn cron(&self) -> Option<&str> {
        if self.trigger_type != TriggerType::Schedule || !self.is_active() {
            return None;
        }
        self.trigger_cron.as_deref().filter(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn hook_workflow(roles: Vec<&str>) -> WorkflowModel {
        serde_json::from_value(json!({
            "id": "wf1",
            "trigger_type": "hook",
            "trigger_hook_collection": "articles",
            "trigger_hook_action": "items.create",
            "allowed_roles": roles,
        }))
        .unwrap()
    }

    #[test]
    fn test_matches_hook() {
        let wf = hook_workflow(vec![]);
        assert!(wf.matches_hook("articles", "items.create"));
        assert!(!wf.matches_hook("articles", "items.update"));
        assert!(!wf.matches_hook("users", "items.create"));

        let mut wildcard = wf.clone();
        wildcard.trigger_hook_collection = Some("*".to_string());
        assert!(wildcard.matches_hook("users", "items.create"));

        let mut inactive = wf.clone();
        inactive.status = WorkflowStatus::Inactive;
        assert!(!inactive.matches_hook("articles", "items.create"));
    }

    #[test]
    fn test_allows_role() {
        assert!(hook_workflow(vec![]).allows_role(None));
        let restricted = hook_workflow(vec!["editor"]);
        assert!(restricted.allows_role(Some("editor")));
        assert!(!restricted.allows_role(Some("viewer")));
        assert!(!restricted.allows_role(None));
    }

    #[test]
    fn test_cron_only_for_active_schedule() {
        let mut wf = WorkflowModel {
            id: "wf".to_string(),
            trigger_type: TriggerType::Schedule,
            trigger_cron: Some("*/5 * * * *".to_string()),
            ..Default::default()
        };
        assert_eq!(wf.cron(), Some("*/5 * * * *"));
        wf.status = WorkflowStatus::Inactive;
        assert_eq!(wf.cron(), None);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(WorkflowModel::from_json("{"), Err(HookflowError::Definition(_))));
    }
}
