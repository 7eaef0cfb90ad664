//! Cron triggers.
//!
//! Each active schedule-triggered workflow gets one cron job. A firing runs the workflow
//! only if it wins the per-workflow [`DistributedLock`], so a cluster of engines sharing
//! one [`KvStore`](crate::services::KvStore) runs each tick at most once.

mod lock;

use std::{collections::HashMap, sync::Arc};

use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use crate::{
    HookflowError, Result,
    model::WorkflowModel,
    runtime::Executor,
    services::KvStore,
    utils,
};

pub use lock::{DistributedLock, LockGuard};

/// Accepts 5-field (minute precision) and 6-field (second precision) expressions.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 { format!("0 {}", expr) } else { expr.to_string() }
}

/// Runs one scheduled firing of `workflow_id` under the lock.
///
/// Returns `Ok(None)` when another instance holds the lock. The lock is released
/// whatever the outcome of the run.
pub async fn fire(
    executor: &Arc<Executor>,
    lock: &DistributedLock,
    workflow_id: &str,
) -> Result<Option<String>> {
    let Some(guard) = lock.acquire(workflow_id).await? else {
        debug!(workflow = workflow_id, "scheduled firing skipped, lock held elsewhere");
        return Ok(None);
    };

    let outcome = async {
        let trigger = json!({"scheduledAt": utils::time::time_millis()});
        let (ctx, graph) = executor.prepare(workflow_id, trigger, None, None)?;
        let execution_id = ctx.execution_id().to_string();
        executor.run(ctx, graph).await?;
        Ok::<_, HookflowError>(execution_id)
    }
    .await;

    if let Err(e) = lock.release(&guard).await {
        warn!(workflow = workflow_id, "failed to release schedule lock: {}", e);
    }
    outcome.map(Some)
}

pub struct Scheduler {
    executor: Arc<Executor>,
    lock: Arc<DistributedLock>,
    job_scheduler: Mutex<Option<JobScheduler>>,
    /// workflow id -> cron job
    jobs: RwLock<HashMap<String, uuid::Uuid>>,
}

impl Scheduler {
    pub fn new(
        executor: Arc<Executor>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        let config = &executor.config().scheduler;
        let lock = Arc::new(DistributedLock::new(kv, &config.lock_prefix, config.lock_ttl_secs));
        Self {
            executor,
            lock,
            job_scheduler: Mutex::new(None),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Builds jobs for every active schedule-triggered definition and starts ticking.
    pub async fn start(&self) -> Result<()> {
        {
            let mut slot = self.job_scheduler.lock().await;
            if slot.is_some() {
                return Ok(());
            }
            let sched = JobScheduler::new().await.map_err(|e| HookflowError::Scheduler(format!("failed to create scheduler: {}", e)))?;
            *slot = Some(sched);
        }

        for workflow in self.executor.store().definitions()? {
            if let Err(e) = self.register(&workflow).await {
                warn!(workflow = %workflow.id, "failed to register cron trigger: {}", e);
            }
        }

        let slot = self.job_scheduler.lock().await;
        if let Some(sched) = slot.as_ref() {
            sched.start().await.map_err(|e| HookflowError::Scheduler(format!("failed to start scheduler: {}", e)))?;
        }
        info!("scheduler started with {} cron job(s)", self.job_count().await);
        Ok(())
    }

    /// Stops ticking. Firings already running finish on their own.
    pub async fn stop(&self) -> Result<()> {
        let mut slot = self.job_scheduler.lock().await;
        if let Some(mut sched) = slot.take() {
            sched.shutdown().await.map_err(|e| HookflowError::Scheduler(format!("failed to stop scheduler: {}", e)))?;
            self.jobs.write().await.clear();
            info!("scheduler stopped");
        }
        Ok(())
    }

    /// Replaces the cron job of `workflow`. Definitions without an active schedule just lose theirs.
    /// A no-op until the scheduler is started.
    pub async fn register(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<()> {
        self.unregister(&workflow.id).await?;
        let Some(cron) = workflow.cron() else {
            return Ok(());
        };
        let slot = self.job_scheduler.lock().await;
        let Some(sched) = slot.as_ref() else {
            return Ok(());
        };

        let schedule = normalize_cron(cron);
        let executor = self.executor.clone();
        let lock = self.lock.clone();
        let workflow_id = workflow.id.clone();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let executor = executor.clone();
            let lock = lock.clone();
            let workflow_id = workflow_id.clone();
            Box::pin(async move {
                match fire(&executor, &lock, &workflow_id).await {
                    Ok(Some(execution_id)) => info!(workflow = %workflow_id, execution = %execution_id, "scheduled execution completed"),
                    Ok(None) => {}
                    Err(e) => error!(workflow = %workflow_id, "scheduled execution failed: {}", e),
                }
            })
        })
        .map_err(|e| HookflowError::Scheduler(format!("invalid cron '{}' for workflow '{}': {}", cron, workflow.id, e)))?;

        let job_id = sched.add(job).await.map_err(|e| HookflowError::Scheduler(format!("failed to add cron job: {}", e)))?;
        self.jobs.write().await.insert(workflow.id.clone(), job_id);
        info!(workflow = %workflow.id, cron = %schedule, "registered cron trigger");
        Ok(())
    }

    pub async fn unregister(
        &self,
        workflow_id: &str,
    ) -> Result<()> {
        let Some(job_id) = self.jobs.write().await.remove(workflow_id) else {
            return Ok(());
        };
        let slot = self.job_scheduler.lock().await;
        if let Some(sched) = slot.as_ref() {
            sched.remove(&job_id).await.map_err(|e| HookflowError::Scheduler(format!("failed to remove cron job: {}", e)))?;
            debug!(workflow = workflow_id, "unregistered cron trigger");
        }
        Ok(())
    }

    /// Fires `workflow_id` now, as a cron tick would.
    pub async fn fire(
        &self,
        workflow_id: &str,
    ) -> Result<Option<String>> {
        fire(&self.executor, &self.lock, workflow_id).await
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::{Config, runtime::executor_testing::executor, services::MemKvStore, store::data::ExecutionStatus};

    fn scheduled(
        id: &str,
        cron: &str,
    ) -> Value {
        json!({
            "id": id,
            "trigger_type": "schedule",
            "trigger_cron": cron,
            "flow": {
                "nodes": [
                    {"id": "t", "type": "trigger"},
                    {"id": "wait", "type": "delay", "config": {"duration": 50}}
                ],
                "edges": [{"source": "t", "target": "wait"}]
            }
        })
    }

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron(" 30 0 9 * * Mon "), "30 0 9 * * Mon");
    }

    #[tokio::test]
    async fn test_simultaneous_firings_run_once() {
        let executor = executor(Config::default(), &[scheduled("nightly", "0 0 * * *")]);
        let kv: Arc<dyn KvStore> = Arc::new(MemKvStore::new());
        let a = Scheduler::new(executor.clone(), kv.clone());
        let b = Scheduler::new(executor.clone(), kv.clone());

        let (ra, rb) = tokio::join!(a.fire("nightly"), b.fire("nightly"));
        let ran = [ra.unwrap(), rb.unwrap()].into_iter().flatten().collect::<Vec<_>>();
        assert_eq!(ran.len(), 1);

        let executions = executor.store().executions_of("nightly").unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, ExecutionStatus::Completed);
        assert_eq!(executions[0].id, ran[0]);

        // released afterwards, so the next tick runs again
        assert!(a.fire("nightly").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let failing = json!({
            "id": "broken",
            "trigger_type": "schedule",
            "trigger_cron": "* * * * *",
            "flow": {
                "nodes": [
                    {"id": "t", "type": "trigger"},
                    {"id": "s", "type": "script", "config": {"code": "throw new Error('nope');"}}
                ],
                "edges": [{"source": "t", "target": "s"}]
            }
        });
        let executor = executor(Config::default(), &[failing]);
        let kv: Arc<dyn KvStore> = Arc::new(MemKvStore::new());
        let scheduler = Scheduler::new(executor.clone(), kv.clone());

        assert!(scheduler.fire("broken").await.is_err());
        let prefix = &executor.config().scheduler.lock_prefix;
        assert_eq!(kv.get(&format!("{}broken", prefix)).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_jobs_follow_definitions() {
        let executor = executor(Config::default(), &[scheduled("minutely", "* * * * *"), scheduled("other", "0 0 * * *")]);
        let scheduler = Scheduler::new(executor.clone(), Arc::new(MemKvStore::new()));

        let early: WorkflowModel = serde_json::from_value(json!({"id": "early", "trigger_type": "schedule", "trigger_cron": "* * * * *"})).unwrap();
        scheduler.register(&early).await.unwrap();
        assert_eq!(scheduler.job_count().await, 0);

        scheduler.start().await.unwrap();
        assert_eq!(scheduler.job_count().await, 2);

        let mut paused: WorkflowModel = executor.store().definition("other").unwrap();
        paused.status = crate::model::WorkflowStatus::Inactive;
        scheduler.register(&paused).await.unwrap();
        assert_eq!(scheduler.job_count().await, 1);

        scheduler.unregister("minutely").await.unwrap();
        assert_eq!(scheduler.job_count().await, 0);

        let bad: WorkflowModel = serde_json::from_value(json!({"id": "bad", "trigger_type": "schedule", "trigger_cron": "not a cron"})).unwrap();
        assert!(matches!(scheduler.register(&bad).await, Err(HookflowError::Scheduler(_))));

        scheduler.stop().await.unwrap();
    }
}
