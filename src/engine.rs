//! Workflow engine - the main entry point for Hookflow.
//!
//! The engine owns the workflow repository, runs executions on the host's tokio
//! runtime, binds lifecycle hooks and cron schedules to workflows, and coordinates
//! graceful shutdown.

mod monitor;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    HookflowError, Result,
    common::Shutdown,
    events::{Event, Message},
    hooks::{HookBridge, HookBus},
    model::WorkflowModel,
    runtime::{Channel, Executor},
    scheduler::Scheduler,
    services::{Identity, KvStore, RealtimeBroadcast},
    store::{
        PageData,
        data::{Execution, ExecutionLog},
    },
    workflow::{
        Graph,
        actions::{Capability, ModuleInfo, ModuleOptions},
    },
};

use monitor::Monitor;

/// The main workflow engine.
///
/// Construct it with [`EngineBuilder`](crate::EngineBuilder), then [`launch`](Engine::launch)
/// it to start the event relay, the after-hook worker and the cron scheduler.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.launch();
///
/// engine.deploy(&WorkflowModel::from_json(json_str)?).await?;
/// let execution = engine.execute_workflow("welcome", json!({"email": "a@b.c"}), None).await?;
///
/// engine.shutdown(Duration::from_secs(5)).await;
/// ```
pub struct Engine {
    executor: Arc<Executor>,
    hooks: Arc<HookBridge>,
    scheduler: Arc<Scheduler>,
    monitor: Monitor,

    running: AtomicBool,
    shutdown: Arc<Shutdown>,
}

impl Engine {
    pub(crate) fn new(
        executor: Arc<Executor>,
        kv: Arc<dyn KvStore>,
        realtime: Arc<dyn RealtimeBroadcast>,
        hook_bus: Option<Arc<dyn HookBus>>,
    ) -> Self {
        let hooks = HookBridge::new(executor.clone());
        if let Some(bus) = hook_bus {
            hooks.install(bus.as_ref());
        }
        let scheduler = Arc::new(Scheduler::new(executor.clone(), kv));
        let monitor = Monitor::new(executor.channel(), realtime);

        Self {
            executor,
            hooks,
            scheduler,
            monitor,
            running: AtomicBool::new(false),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Starts the event relay, the after-hook worker and, when enabled, the scheduler.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        // handlers first, then listen, so no event is missed
        self.monitor.monitor();
        self.executor.channel().listen(self.executor.runtime());
        self.hooks.start_worker(self.shutdown.clone());

        if self.executor.config().scheduler.enabled {
            let scheduler = self.scheduler.clone();
            self.executor.runtime().spawn(async move {
                if let Err(e) = scheduler.start().await {
                    error!("scheduler failed to start: {}", e);
                }
            });
        }
        info!("engine launched");
    }

    /// Stops new triggers, then waits up to `timeout` for in-flight executions.
    /// Returns `false` when executions were still running at the deadline.
    pub async fn shutdown(
        &self,
        timeout: Duration,
    ) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return true;
        }

        if let Err(e) = self.scheduler.stop().await {
            warn!("scheduler did not stop cleanly: {}", e);
        }
        self.hooks.close();
        self.shutdown.shutdown();

        let drained = self.executor.drain(timeout).await;
        if !drained {
            warn!(running = self.executor.running(), "shutdown timed out with executions in flight");
        }
        self.executor.channel().shutdown();
        info!("engine stopped");
        drained
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Validates and stores a definition, replacing any previous version and its cron job.
    pub async fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<bool> {
        Graph::try_from(workflow)?;
        let stored = self.executor.store().deploy(workflow)?;
        self.executor.invalidate(&workflow.id);
        self.scheduler.register(workflow).await?;
        info!(workflow = %workflow.id, "workflow deployed");
        Ok(stored)
    }

    pub async fn remove(
        &self,
        workflow_id: &str,
    ) -> Result<bool> {
        let removed = self.executor.store().undeploy(workflow_id)?;
        self.executor.invalidate(workflow_id);
        self.scheduler.unregister(workflow_id).await?;
        Ok(removed)
    }

    pub fn definition(
        &self,
        workflow_id: &str,
    ) -> Result<WorkflowModel> {
        self.executor.store().definition(workflow_id).map_err(|e| match e {
            HookflowError::NotFound(_) => HookflowError::Definition(format!("workflow '{}' not found", workflow_id)),
            other => other,
        })
    }

    pub fn list_definitions(&self) -> Result<Vec<WorkflowModel>> {
        self.executor.store().definitions()
    }

    /// Runs a workflow to its end. A failed run is recorded, then returned as the error.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        trigger: Value,
        identity: Option<Identity>,
    ) -> Result<Execution> {
        self.executor.execute(workflow_id, trigger, identity).await
    }

    /// Starts a workflow in the background and returns its execution id.
    pub fn spawn_workflow(
        &self,
        workflow_id: &str,
        trigger: Value,
        identity: Option<Identity>,
    ) -> Result<String> {
        self.executor.spawn(workflow_id, trigger, identity, None)
    }

    /// Runs one node in isolation and returns `{input, output}`.
    pub async fn execute_single_node(
        &self,
        workflow_id: &str,
        node_id: &str,
        input: Value,
        identity: Option<Identity>,
    ) -> Result<Value> {
        self.executor.execute_single_node(workflow_id, node_id, input, identity).await
    }

    pub fn execution(
        &self,
        execution_id: &str,
    ) -> Result<Execution> {
        self.executor.store().execution(execution_id)
    }

    pub fn executions_of(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<Execution>> {
        self.executor.store().executions_of(workflow_id)
    }

    /// Paginated execution history of a workflow, newest first.
    pub fn execution_page(
        &self,
        workflow_id: &str,
        page_num: usize,
        page_size: usize,
    ) -> Result<PageData<Execution>> {
        self.executor.store().execution_page(workflow_id, page_num, page_size)
    }

    pub fn execution_logs(
        &self,
        execution_id: &str,
    ) -> Result<Vec<ExecutionLog>> {
        self.executor.store().logs_of(execution_id)
    }

    /// Waits for a background execution to finish.
    pub async fn wait_for(
        &self,
        execution_id: &str,
        timeout: Duration,
    ) -> Result<Execution> {
        self.executor.wait_for(execution_id, timeout).await
    }

    /// Makes `capability` callable from script nodes as `modules.<name>`.
    pub fn register_custom_module(
        &self,
        name: &str,
        capability: Arc<dyn Capability>,
        options: ModuleOptions,
    ) -> Result<()> {
        self.executor.modules().register(name, capability, options)
    }

    pub fn unregister_custom_module(
        &self,
        name: &str,
    ) -> bool {
        self.executor.modules().unregister(name)
    }

    pub fn list_registered_modules(&self) -> Vec<ModuleInfo> {
        self.executor.modules().list()
    }

    /// Bridge to pass lifecycle events to when the host has no [`HookBus`].
    pub fn hooks(&self) -> Arc<HookBridge> {
        self.hooks.clone()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.executor.channel()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event<Message>> {
        self.executor.channel().subscribe()
    }
}
