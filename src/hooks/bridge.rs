use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::{
    HookflowError, Result,
    common::{Queue, Shutdown},
    config::HooksConfig,
    hooks::bus::{AFTER_SUFFIX, BEFORE_ACTIONS, HookBus, HookEvent, HookHandler},
    model::WorkflowModel,
    runtime::Executor,
    workflow::node::NodeType,
};

/// Output keys a before-hook workflow may set to rewrite the pending operation.
const MERGE_KEYS: [&str; 3] = ["document", "data", "query"];

/// Binds CRUD lifecycle events to hook-triggered workflows.
///
/// Before events run matching workflows inline and may rewrite or veto the operation.
/// After events are queued and run in the background; their failures are only logged.
pub struct HookBridge {
    executor: Arc<Executor>,
    config: HooksConfig,
    after_queue: Arc<Queue<HookEvent>>,
    accepting: AtomicBool,
}

impl HookBridge {
    pub fn new(executor: Arc<Executor>) -> Arc<Self> {
        let config = executor.config().hooks.clone();
        let after_queue = Queue::new(config.after_queue_size.max(1));
        Arc::new(Self {
            executor,
            config,
            after_queue,
            accepting: AtomicBool::new(true),
        })
    }

    /// Registers the bridge on `bus` for every before and after action.
    pub fn install(
        self: &Arc<Self>,
        bus: &dyn HookBus,
    ) {
        for action in BEFORE_ACTIONS {
            bus.register_hook("*", action, self.clone());
            bus.register_hook("*", &format!("{}{}", action, AFTER_SUFFIX), self.clone());
        }
    }

    /// System collections never trigger workflows.
    pub fn is_reserved(
        &self,
        collection: &str,
    ) -> bool {
        self.config.reserved_collections.iter().any(|c| c == collection) || self.config.reserved_prefixes.iter().any(|p| collection.starts_with(p.as_str()))
    }

    /// Active hook workflows listening to `event` that its identity may trigger.
    fn matching(
        &self,
        event: &HookEvent,
    ) -> Result<Vec<WorkflowModel>> {
        if self.is_reserved(&event.collection) {
            return Ok(Vec::new());
        }
        let role = event.identity.as_ref().and_then(|i| i.role.as_deref());
        let definitions = self.executor.store().definitions()?;
        Ok(definitions
            .into_iter()
            .filter(|wf| wf.matches_hook(&event.collection, &event.action))
            .filter(|wf| {
                let allowed = wf.allows_role(role);
                if !allowed {
                    debug!(workflow = %wf.id, action = %event.action, "hook skipped for role {:?}", role);
                }
                allowed
            })
            .collect())
    }

    /// Runs every matching workflow in order and waits for each.
    ///
    /// Returns the `document`/`data`/`query` values set by their nodes; for each key
    /// the last node to set it wins. The first failing workflow aborts with its error.
    pub async fn before(
        &self,
        event: &HookEvent,
    ) -> Result<Map<String, Value>> {
        let mut merged = Map::new();
        for workflow in self.matching(event)? {
            info!(workflow = %workflow.id, action = %event.action, collection = %event.collection, "running before hook");
            let (ctx, graph) = self.executor.prepare(&workflow.id, trigger_data(event), event.identity.clone(), None)?;
            let execution_id = ctx.execution_id().to_string();
            self.executor.run(ctx, graph).await?;

            for log in self.executor.store().logs_of(&execution_id)? {
                if log.node_type == NodeType::Trigger.as_ref() {
                    continue;
                }
                if let Value::Object(output) = &log.output_data {
                    for key in MERGE_KEYS {
                        if let Some(value) = output.get(key) {
                            merged.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }
        Ok(merged)
    }

    /// Queues an after event. Dropped with a warning when the queue is full or closed.
    pub fn after(
        &self,
        event: HookEvent,
    ) {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!(action = %event.action, "after hook dropped: intake closed");
            return;
        }
        if let Err(e) = self.after_queue.try_send(event) {
            warn!("after hook dropped: {}", e);
        }
    }

    /// Starts the background worker that drains the after queue until `shutdown`.
    pub fn start_worker(
        self: &Arc<Self>,
        shutdown: Arc<Shutdown>,
    ) {
        let bridge = self.clone();
        self.executor.runtime().spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(event) = bridge.after_queue.next_async() => bridge.dispatch_after(&event),
                }
            }
            debug!("after hook worker stopped");
        });
    }

    fn dispatch_after(
        &self,
        event: &HookEvent,
    ) {
        let workflows = match self.matching(event) {
            Ok(workflows) => workflows,
            Err(e) => {
                error!(action = %event.action, "failed to resolve after hooks: {}", e);
                return;
            }
        };
        for workflow in workflows {
            if let Err(e) = self.executor.spawn(&workflow.id, trigger_data(event), event.identity.clone(), None) {
                error!(workflow = %workflow.id, action = %event.action, "after hook failed to start: {}", e);
            }
        }
    }

    /// Stops accepting after events.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.after_queue.len()
    }
}

#[async_trait]
impl HookHandler for HookBridge {
    async fn handle(
        &self,
        event: HookEvent,
    ) -> Result<HookEvent> {
        if event.is_after() {
            self.after(event.clone());
            return Ok(event);
        }
        let merged = self.before(&event).await.map_err(|e| match e {
            HookflowError::Definition(_) | HookflowError::Store(_) => HookflowError::Hook(e.to_string()),
            other => other,
        })?;
        Ok(apply(event, merged))
    }
}

/// Trigger payload of a hook-started execution.
fn trigger_data(event: &HookEvent) -> Value {
    json!({
        "event": event.action,
        "collection": event.collection,
        "payload": event.payload,
    })
}

/// Splices merged workflow output into the pending operation:
/// `data` and `document` are shallow-merged into the payload, `query` replaces it.
pub fn apply(
    mut event: HookEvent,
    merged: Map<String, Value>,
) -> HookEvent {
    for key in ["data", "document"] {
        if let Some(Value::Object(fields)) = merged.get(key) {
            match &mut event.payload {
                Value::Object(payload) => {
                    for (k, v) in fields {
                        payload.insert(k.clone(), v.clone());
                    }
                }
                payload => *payload = Value::Object(fields.clone()),
            }
        }
    }
    if let Some(query) = merged.get("query") {
        event.payload = query.clone();
    }
    event
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        Config,
        hooks::MemHookBus,
        runtime::executor_testing::executor,
        services::{AccessOptions, Identity, ItemStore},
        store::data::ExecutionStatus,
    };

    fn hook_workflow(
        id: &str,
        action: &str,
        code: &str,
    ) -> Value {
        json!({
            "id": id,
            "trigger_type": "hook",
            "trigger_hook_collection": "articles",
            "trigger_hook_action": action,
            "flow": {
                "nodes": [
                    {"id": "t", "type": "trigger"},
                    {"id": "s", "type": "script", "config": {"code": code}}
                ],
                "edges": [{"source": "t", "target": "s"}]
            }
        })
    }

    #[tokio::test]
    async fn test_before_create_rewrites_payload() {
        let executor = executor(Config::default(), &[hook_workflow("activate", "items.create", "return {data: {status: 'active'}};")]);
        let bridge = HookBridge::new(executor.clone());
        let bus = MemHookBus::new();
        bridge.install(&bus);

        let event = bus.emit(HookEvent::new("items.create", "articles", json!({"title": "t", "status": "pending"}))).await.unwrap();
        assert_eq!(event.payload, json!({"title": "t", "status": "active"}));

        let items = executor.items();
        let opts = AccessOptions {
            bypass_permissions: true,
            identity: None,
        };
        let created = items.create_one("articles", event.payload.clone(), &opts).await.unwrap();
        assert_eq!(created["status"], json!("active"));

        let executions = executor.store().executions_of("activate").unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].trigger_data["payload"]["status"], json!("pending"));
    }

    #[tokio::test]
    async fn test_last_setter_wins_across_workflows() {
        let executor = executor(
            Config::default(),
            &[
                hook_workflow("first", "items.update", "return {data: {status: 'one', first: true}, query: {limit: 1}};"),
                hook_workflow("second", "items.update", "return {data: {status: 'two'}};"),
            ],
        );
        let bridge = HookBridge::new(executor);

        let merged = bridge.before(&HookEvent::new("items.update", "articles", json!({}))).await.unwrap();
        assert_eq!(merged.get("data"), Some(&json!({"status": "two"})));
        assert_eq!(merged.get("query"), Some(&json!({"limit": 1})));
    }

    #[tokio::test]
    async fn test_before_failure_aborts() {
        let executor = executor(Config::default(), &[hook_workflow("guard", "items.delete", "throw new Error('locked');")]);
        let bridge = HookBridge::new(executor.clone());
        let bus = MemHookBus::new();
        bridge.install(&bus);

        let err = bus.emit(HookEvent::new("items.delete", "articles", json!({"id": 1}))).await.unwrap_err();
        assert_eq!(err.message(), "locked");
        assert_eq!(executor.store().executions_of("guard").unwrap()[0].status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_reserved_and_role_restricted_events_are_skipped() {
        let mut restricted = hook_workflow("editors", "items.create", "return {data: {by: 'editor'}};");
        restricted["allowed_roles"] = json!(["editor"]);
        restricted["trigger_hook_collection"] = json!("*");
        let executor = executor(Config::default(), &[restricted]);
        let bridge = HookBridge::new(executor.clone());

        assert!(bridge.is_reserved("workflows"));
        assert!(bridge.is_reserved("system_users"));
        assert!(!bridge.is_reserved("articles"));

        let merged = bridge.before(&HookEvent::new("items.create", "system_users", json!({}))).await.unwrap();
        assert!(merged.is_empty());
        let merged = bridge.before(&HookEvent::new("items.create", "articles", json!({}))).await.unwrap();
        assert!(merged.is_empty());
        let viewer = HookEvent::new("items.create", "articles", json!({})).with_identity(Identity::user("u1", "viewer"));
        assert!(bridge.before(&viewer).await.unwrap().is_empty());

        let editor = HookEvent::new("items.create", "articles", json!({})).with_identity(Identity::user("u2", "editor"));
        assert_eq!(bridge.before(&editor).await.unwrap().get("data"), Some(&json!({"by": "editor"})));
        assert_eq!(executor.store().executions_of("editors").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_after_hook_runs_in_background_and_swallows_failures() {
        let executor = executor(
            Config::default(),
            &[
                hook_workflow("audit", "items.create.after", "return {seen: trigger.payload.title};"),
                hook_workflow("broken", "items.create.after", "throw new Error('ignored');"),
            ],
        );
        let bridge = HookBridge::new(executor.clone());
        let bus = MemHookBus::new();
        bridge.install(&bus);
        let shutdown = Arc::new(Shutdown::new());
        bridge.start_worker(shutdown.clone());

        let event = HookEvent::new("items.create.after", "articles", json!({"title": "hello"}));
        let returned = bus.emit(event.clone()).await.unwrap();
        assert_eq!(returned, event);

        let mut done = false;
        for _ in 0..200 {
            let audit = executor.store().executions_of("audit").unwrap();
            let broken = executor.store().executions_of("broken").unwrap();
            if audit.first().map(|e| e.status.is_terminal()).unwrap_or(false) && broken.first().map(|e| e.status.is_terminal()).unwrap_or(false) {
                assert_eq!(audit[0].status, ExecutionStatus::Completed);
                assert_eq!(audit[0].result_data["s"], json!({"seen": "hello"}));
                assert_eq!(broken[0].status, ExecutionStatus::Failed);
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(done);

        shutdown.shutdown();
        bridge.close();
        bridge.after(event);
        assert_eq!(bridge.pending(), 0);
    }

    #[test]
    fn test_apply_merges_data_and_replaces_query() {
        let event = HookEvent::new("items.read", "articles", json!({"filter": {"a": 1}}));
        let mut merged = Map::new();
        merged.insert("query".to_string(), json!({"filter": {"b": 2}}));
        assert_eq!(apply(event, merged).payload, json!({"filter": {"b": 2}}));

        let event = HookEvent::new("items.create", "articles", Value::Null);
        let mut merged = Map::new();
        merged.insert("document".to_string(), json!({"x": 1}));
        assert_eq!(apply(event, merged).payload, json!({"x": 1}));
    }
}
