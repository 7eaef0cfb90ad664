mod collect;
mod r#impl;

use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*},
};
use collect::Collect;

/// Process-local storage; contents are lost when the engine stops.
#[derive(Debug, Clone)]
pub struct MemStore {
    workflows: Arc<Collect<Workflow>>,
    executions: Arc<Collect<Execution>>,
    logs: Arc<Collect<ExecutionLog>>,
}

trait DbDocument: Serialize + DeserializeOwned {
    /// Document field backed by a lookup index, matched by equality filters.
    const INDEX: Option<&'static str> = None;

    fn id(&self) -> &str;
    fn doc(&self) -> Result<HashMap<String, JsonValue>>;

    /// Value of the [`DbDocument::INDEX`] field.
    fn index_value(&self) -> Option<&str> {
        None
    }
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) {
        s.register(self.workflows());
        s.register(self.executions());
        s.register(self.logs());
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(Collect::new("workflows")),
            executions: Arc::new(Collect::new("executions")),
            logs: Arc::new(Collect::new("logs")),
        }
    }

    pub fn workflows(&self) -> Arc<dyn DbCollection<Item = Workflow> + Send + Sync> {
        self.workflows.clone()
    }

    pub fn executions(&self) -> Arc<dyn DbCollection<Item = Execution> + Send + Sync> {
        self.executions.clone()
    }

    pub fn logs(&self) -> Arc<dyn DbCollection<Item = ExecutionLog> + Send + Sync> {
        self.logs.clone()
    }
}
