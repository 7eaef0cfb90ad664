use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use serde_json::{Value, json};
use tokio::{runtime::Handle, sync::Notify};
use tracing::{debug, error, info, trace, warn};

use crate::{
    Config, HookflowError, Result,
    common::MemCache,
    dispatcher::Dispatcher,
    events::{GraphEvent, WorkflowEvent, WorkflowFailedEvent, WorkflowStartEvent},
    runtime::{Channel, Context},
    services::{Identity, ItemStore, Mailer, StatsAggregator},
    store::{
        Store,
        data::{Execution, ExecutionStatus},
    },
    utils,
    workflow::{Graph, actions::ModuleRegistry},
};

/// Maximum number of compiled graphs kept in memory.
const GRAPH_CACHE_SIZE: usize = 512;

/// Shared services every execution runs against.
pub struct Executor {
    config: Config,
    store: Arc<Store>,
    graphs: MemCache<String, Arc<Graph>>,
    channel: Arc<Channel>,
    items: Arc<dyn ItemStore>,
    mailer: Arc<dyn Mailer>,
    stats: Arc<dyn StatsAggregator>,
    modules: Arc<ModuleRegistry>,
    http: reqwest::Client,
    runtime: Handle,

    running: AtomicUsize,
    idle: Notify,
}

/// Collaborators wired into an [`Executor`].
pub struct ExecutorParts {
    pub config: Config,
    pub store: Arc<Store>,
    pub channel: Arc<Channel>,
    pub items: Arc<dyn ItemStore>,
    pub mailer: Arc<dyn Mailer>,
    pub stats: Arc<dyn StatsAggregator>,
    pub modules: Arc<ModuleRegistry>,
    pub runtime: Handle,
}

/// Decrements the in-flight counter when an execution ends, however it ends.
struct RunGuard<'a>(&'a Executor);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.0.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Executor {
    pub fn new(parts: ExecutorParts) -> Self {
        Self {
            config: parts.config,
            store: parts.store,
            graphs: MemCache::new(GRAPH_CACHE_SIZE),
            channel: parts.channel,
            items: parts.items,
            mailer: parts.mailer,
            stats: parts.stats,
            modules: parts.modules,
            http: reqwest::Client::new(),
            runtime: parts.runtime,
            running: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn items(&self) -> Arc<dyn ItemStore> {
        self.items.clone()
    }

    pub fn mailer(&self) -> Arc<dyn Mailer> {
        self.mailer.clone()
    }

    pub fn stats(&self) -> Arc<dyn StatsAggregator> {
        self.stats.clone()
    }

    pub fn modules(&self) -> Arc<ModuleRegistry> {
        self.modules.clone()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Number of executions currently running.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Compiled graph of a deployed workflow, cached until the definition changes.
    pub fn graph(
        &self,
        workflow_id: &str,
    ) -> Result<Arc<Graph>> {
        if let Some(graph) = self.graphs.get(&workflow_id.to_string()) {
            return Ok(graph);
        }
        let definition = self.store.definition(workflow_id).map_err(|e| match e {
            HookflowError::NotFound(_) => HookflowError::Definition(format!("workflow '{}' not found", workflow_id)),
            other => other,
        })?;
        let graph = Arc::new(Graph::try_from(&definition)?);
        trace!("compiled graph\n{}", graph.schema());
        self.graphs.set(workflow_id.to_string(), graph.clone());
        Ok(graph)
    }

    pub fn invalidate(
        &self,
        workflow_id: &str,
    ) {
        self.graphs.remove(&workflow_id.to_string());
    }

    /// Validates the definition, creates a queued execution record and seeds its context.
    /// Nothing observable happens when this fails.
    pub fn prepare(
        self: &Arc<Self>,
        workflow_id: &str,
        trigger: Value,
        identity: Option<Identity>,
        parent: Option<&Context>,
    ) -> Result<(Context, Arc<Graph>)> {
        let graph = self.graph(workflow_id)?;
        if !graph.definition.is_active() {
            return Err(HookflowError::Definition(format!("workflow '{}' is inactive", workflow_id)));
        }
        let depth = parent.map(|p| p.depth() + 1).unwrap_or(0);
        if depth > self.config.engine.max_workflow_depth {
            return Err(HookflowError::Runtime(format!(
                "workflow '{}' exceeds the maximum nesting depth of {}",
                workflow_id, self.config.engine.max_workflow_depth
            )));
        }

        let execution_id = self.store.create_execution(workflow_id, parent.map(|p| p.execution_id()), &trigger)?;
        let ctx = Context::new(self.clone(), &execution_id, workflow_id, trigger, graph.definition.variables.clone(), identity).with_depth(depth);
        Ok((ctx, graph))
    }

    /// Runs a prepared execution to its end and records the outcome.
    pub async fn run(
        &self,
        ctx: Context,
        graph: Arc<Graph>,
    ) -> Result<Value> {
        self.running.fetch_add(1, Ordering::SeqCst);
        let _guard = RunGuard(self);
        let workflow_id = ctx.workflow_id().to_string();
        let outcome = self.walk(ctx, graph).await;
        self.prune(&workflow_id);
        outcome
    }

    fn prune(
        &self,
        workflow_id: &str,
    ) {
        let keep = self.config.engine.history_limit;
        if keep == 0 {
            return;
        }
        match self.store.prune_history(workflow_id, keep) {
            Ok(0) => {}
            Ok(removed) => debug!(workflow = workflow_id, removed, "pruned execution history"),
            Err(e) => warn!(workflow = workflow_id, "failed to prune execution history: {}", e),
        }
    }

    async fn walk(
        &self,
        ctx: Context,
        graph: Arc<Graph>,
    ) -> Result<Value> {
        let execution_id = ctx.execution_id().to_string();
        if let Err(e) = self.store.transition_execution(&execution_id, ExecutionStatus::Running, None, None) {
            warn!(execution = %execution_id, "failed to mark execution running: {}", e);
        }
        ctx.emit(
            &String::new(),
            GraphEvent::Workflow(WorkflowEvent::Start(WorkflowStartEvent {
                node_ids: graph.node_ids(),
            })),
        );
        info!(execution = %execution_id, workflow = graph.id(), "execution started");

        let dispatcher = Dispatcher::new(graph.clone());
        let walk = async {
            match graph.start_node() {
                Some(start) => dispatcher.execute_node(start, &ctx).await,
                None => Ok(()),
            }
        };
        let outcome = match self.config.engine.execution_timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), walk)
                .await
                .unwrap_or_else(|_| Err(HookflowError::Timeout(format!("execution exceeded {}ms", ms)))),
            None => walk.await,
        };

        match outcome {
            Ok(()) => {
                let result = Value::Object(ctx.outputs());
                if let Err(e) = self.store.transition_execution(&execution_id, ExecutionStatus::Completed, Some(&result), None) {
                    warn!(execution = %execution_id, "failed to mark execution completed: {}", e);
                }
                ctx.emit(&String::new(), GraphEvent::Workflow(WorkflowEvent::Succeeded));
                info!(execution = %execution_id, "execution completed");
                Ok(result)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(store_err) = self.store.transition_execution(&execution_id, ExecutionStatus::Failed, None, Some(&message)) {
                    warn!(execution = %execution_id, "failed to mark execution failed: {}", store_err);
                }
                ctx.emit(
                    &String::new(),
                    GraphEvent::Workflow(WorkflowEvent::Failed(WorkflowFailedEvent {
                        error: message.clone(),
                    })),
                );
                info!(execution = %execution_id, "execution failed: {}", message);
                Err(e)
            }
        }
    }

    /// Runs a workflow and waits for it. Fails with the execution's error.
    pub async fn execute(
        self: &Arc<Self>,
        workflow_id: &str,
        trigger: Value,
        identity: Option<Identity>,
    ) -> Result<Execution> {
        let (ctx, graph) = self.prepare(workflow_id, trigger, identity, None)?;
        let execution_id = ctx.execution_id().to_string();
        self.run(ctx, graph).await?;
        self.store.execution(&execution_id)
    }

    /// Starts a workflow in the background and returns its execution id.
    /// Failures of the run are logged, never returned.
    pub fn spawn(
        self: &Arc<Self>,
        workflow_id: &str,
        trigger: Value,
        identity: Option<Identity>,
        parent: Option<&Context>,
    ) -> Result<String> {
        let (ctx, graph) = self.prepare(workflow_id, trigger, identity, parent)?;
        let execution_id = ctx.execution_id().to_string();
        let executor = self.clone();
        // counted before spawning so drain() sees it
        self.running.fetch_add(1, Ordering::SeqCst);
        self.runtime.spawn(async move {
            let _guard = RunGuard(&executor);
            let id = ctx.execution_id().to_string();
            if let Err(e) = executor.walk(ctx, graph).await {
                error!(execution = %id, "background execution failed: {}", e);
            }
        });
        Ok(execution_id)
    }

    /// Polls an execution until it reaches a terminal status or `timeout` elapses.
    pub async fn wait_for(
        &self,
        execution_id: &str,
        timeout: Duration,
    ) -> Result<Execution> {
        let deadline = Instant::now() + timeout;
        let interval = Duration::from_millis(self.config.engine.child_poll_interval_ms.max(1));
        loop {
            let execution = self.store.execution(execution_id)?;
            if execution.status.is_terminal() {
                return Ok(execution);
            }
            if Instant::now() >= deadline {
                return Err(HookflowError::Timeout(format!("execution '{}' did not finish within {}ms", execution_id, timeout.as_millis())));
            }
            tokio::time::sleep(interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }

    /// Runs one node in isolation, without execution records or logs.
    pub async fn execute_single_node(
        self: &Arc<Self>,
        workflow_id: &str,
        node_id: &str,
        input: Value,
        identity: Option<Identity>,
    ) -> Result<Value> {
        let graph = self.graph(workflow_id)?;
        let node = graph.node(node_id).ok_or_else(|| HookflowError::Definition(format!("node '{}' not found in workflow '{}'", node_id, workflow_id)))?;
        let execution_id = format!("single-{}", utils::longid());
        let ctx = Context::new(self.clone(), &execution_id, workflow_id, input.clone(), graph.definition.variables.clone(), identity).without_logs();

        let dispatcher = Dispatcher::new(graph.clone());
        let output = dispatcher.execute_single(node, &ctx).await?;
        Ok(json!({"input": input, "output": output}))
    }

    /// Waits until no execution is running. Returns `false` when `timeout` elapses first.
    pub async fn drain(
        &self,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = self.idle.notified();
            if self.running() == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let _ = tokio::time::timeout(remaining, idle).await;
        }
    }
}
