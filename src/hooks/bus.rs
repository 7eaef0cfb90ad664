use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::{HookflowError, Result, ShareLock, services::Identity};

/// Suffix of lifecycle events fired once the guarded operation has completed.
pub const AFTER_SUFFIX: &str = ".after";

/// Before events, in the order the item store fires them.
pub const BEFORE_ACTIONS: [&str; 5] = ["items.create", "items.read", "items.read.one", "items.update", "items.delete"];

/// One CRUD lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    /// e.g. `items.create` or `items.create.after`
    pub action: String,
    pub collection: String,
    /// item data for writes, query for reads
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub identity: Option<Identity>,
}

impl HookEvent {
    pub fn new(
        action: &str,
        collection: &str,
        payload: Value,
    ) -> Self {
        Self {
            action: action.to_string(),
            collection: collection.to_string(),
            payload,
            identity: None,
        }
    }

    pub fn with_identity(
        mut self,
        identity: Identity,
    ) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn is_after(&self) -> bool {
        self.action.ends_with(AFTER_SUFFIX)
    }
}

/// Receives lifecycle events and returns the (possibly modified) event.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(
        &self,
        event: HookEvent,
    ) -> Result<HookEvent>;
}

/// Lifecycle event bus of the host platform.
pub trait HookBus: Send + Sync {
    /// `pattern` is a collection name or `*`.
    fn register_hook(
        &self,
        pattern: &str,
        action: &str,
        handler: Arc<dyn HookHandler>,
    );
}

struct Registration {
    pattern: String,
    action: String,
    handler: Arc<dyn HookHandler>,
}

/// In-process [`HookBus`]; the item store calls [`MemHookBus::emit`] around each operation.
#[derive(Clone, Default)]
pub struct MemHookBus {
    hooks: ShareLock<Vec<Registration>>,
}

impl MemHookBus {
    pub fn new() -> Self {
        Self {
            hooks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Runs every matching handler in registration order, threading the event through.
    /// The first failing handler aborts the chain.
    pub async fn emit(
        &self,
        event: HookEvent,
    ) -> Result<HookEvent> {
        let handlers = {
            let hooks = self.hooks.read().map_err(|e| HookflowError::Hook(e.to_string()))?;
            hooks
                .iter()
                .filter(|h| h.action == event.action && (h.pattern == "*" || h.pattern == event.collection))
                .map(|h| h.handler.clone())
                .collect::<Vec<_>>()
        };
        trace!(action = %event.action, collection = %event.collection, handlers = handlers.len(), "hook emit");

        let mut event = event;
        for handler in handlers {
            event = handler.handle(event).await?;
        }
        Ok(event)
    }

    pub fn len(&self) -> usize {
        self.hooks.read().map(|h| h.len()).unwrap_or_default()
    }
}

impl HookBus for MemHookBus {
    fn register_hook(
        &self,
        pattern: &str,
        action: &str,
        handler: Arc<dyn HookHandler>,
    ) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.push(Registration {
                pattern: pattern.to_string(),
                action: action.to_string(),
                handler,
            });
        }
    }
}
