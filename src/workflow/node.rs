use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    HookflowError, Result,
    model::NodeModel,
    workflow::{
        actions::{self, Action},
        control::{ConditionConfig, LoopConfig},
    },
};

/// node id
pub type NodeId = String;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Http,
    Transform,
    Condition,
    Service,
    Loop,
    Filter,
    Aggregate,
    Delay,
    Notification,
    Email,
    Workflow,
    Stats,
    File,
    Variable,
    Script,
    Try,
}

impl NodeType {
    /// Control nodes consume their own edges.
    pub fn is_control(&self) -> bool {
        matches!(self, NodeType::Condition | NodeType::Loop | NodeType::Try)
    }
}

/// What running a node does.
pub enum NodeAction {
    Condition(ConditionConfig),
    Loop(LoopConfig),
    Try,
    Leaf(Box<dyn Action>),
}

pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// raw config as authored
    pub config: Value,
    pub action: NodeAction,
}

impl std::fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Node").field("id", &self.id).field("node_type", &self.node_type).finish()
    }
}

impl Node {
    /// Parses and validates a node. Every config error surfaces here, before any side effect.
    pub fn new(model: &NodeModel) -> Result<Self> {
        if model.id.is_empty() {
            return Err(HookflowError::Definition("node without id".to_string()));
        }
        let node_type = model
            .node_type
            .parse::<NodeType>()
            .map_err(|_| HookflowError::Definition(format!("unknown node type '{}' on node '{}'", model.node_type, model.id)))?;
        let config = if model.config.is_null() { Value::Object(Default::default()) } else { model.config.clone() };

        let action = Self::create_action(node_type, config.clone()).map_err(|e| match e {
            HookflowError::Definition(msg) => HookflowError::Definition(format!("invalid config on node '{}': {}", model.id, msg)),
            other => HookflowError::Definition(format!("invalid config on node '{}': {}", model.id, other)),
        })?;

        Ok(Self {
            id: model.id.clone(),
            node_type,
            config,
            action,
        })
    }

    fn create_action(
        node_type: NodeType,
        params: Value,
    ) -> Result<NodeAction> {
        let leaf = |action: Box<dyn Action>| Ok(NodeAction::Leaf(action));
        match node_type {
            NodeType::Condition => Ok(NodeAction::Condition(ConditionConfig::create(params)?)),
            NodeType::Loop => Ok(NodeAction::Loop(LoopConfig::create(params)?)),
            NodeType::Try => Ok(NodeAction::Try),
            NodeType::Trigger => leaf(Box::new(actions::TriggerAction::create(params)?)),
            NodeType::Http => leaf(Box::new(actions::HttpAction::create(params)?)),
            NodeType::Transform => leaf(Box::new(actions::TransformAction::create(params)?)),
            NodeType::Service => leaf(Box::new(actions::ServiceAction::create(params)?)),
            NodeType::Filter => leaf(Box::new(actions::FilterAction::create(params)?)),
            NodeType::Aggregate => leaf(Box::new(actions::AggregateAction::create(params)?)),
            NodeType::Delay => leaf(Box::new(actions::DelayAction::create(params)?)),
            NodeType::Notification => leaf(Box::new(actions::NotificationAction::create(params)?)),
            NodeType::Email => leaf(Box::new(actions::EmailAction::create(params)?)),
            NodeType::Workflow => leaf(Box::new(actions::WorkflowAction::create(params)?)),
            NodeType::Stats => leaf(Box::new(actions::StatsAction::create(params)?)),
            NodeType::File => leaf(Box::new(actions::FileAction::create(params)?)),
            NodeType::Variable => leaf(Box::new(actions::VariableAction::create(params)?)),
            NodeType::Script => leaf(Box::new(actions::ScriptAction::create(params)?)),
        }
    }
}
