use std::{
    any::Any,
    collections::HashMap,
    convert::AsRef,
    sync::{Arc, RwLock},
};

use serde_json::Value;
use tracing::{trace, warn};

use crate::{HookflowError, Result, ShareLock, model::WorkflowModel, utils};

use super::{DbCollection, DbCollectionIden, PageData, StoreIden, data::*, query::Query};

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn collection<DATA>(&self) -> Result<Arc<dyn DbCollection<Item = DATA>>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let collections = self.collections.read().map_err(|e| HookflowError::Store(e.to_string()))?;
        collections
            .get(&DATA::iden())
            .and_then(|c| c.downcast_ref::<DynDbSetRef<DATA>>())
            .map(|v| v.0.clone())
            .ok_or_else(|| HookflowError::Store(format!("fail to get collection: {}", DATA::iden().as_ref())))
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) where
        DATA: DbCollectionIden + 'static,
    {
        if let Ok(mut collections) = self.collections.write() {
            collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
        }
    }

    pub fn workflows(&self) -> Result<Arc<dyn DbCollection<Item = Workflow>>> {
        self.collection()
    }

    pub fn executions(&self) -> Result<Arc<dyn DbCollection<Item = Execution>>> {
        self.collection()
    }

    pub fn logs(&self) -> Result<Arc<dyn DbCollection<Item = ExecutionLog>>> {
        self.collection()
    }

    /// Stores or replaces a workflow definition.
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<bool> {
        trace!("store::deploy({})", workflow.id);
        if workflow.id.is_empty() {
            return Err(HookflowError::Definition("missing id in workflow".into()));
        }
        let workflows = self.workflows()?;
        let text = serde_json::to_string(workflow)?;
        let mut data = Workflow {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            status: workflow.status.as_ref().to_string(),
            trigger_type: workflow.trigger_type.as_ref().to_string(),
            data: text,
            create_time: utils::time::time_millis(),
            update_time: 0,
        };
        match workflows.find(&workflow.id) {
            Ok(m) => {
                data.create_time = m.create_time;
                data.update_time = utils::time::time_millis();
                workflows.update(&data)
            }
            Err(_) => workflows.create(&data),
        }
    }

    pub fn undeploy(
        &self,
        id: &str,
    ) -> Result<bool> {
        trace!("store::undeploy({})", id);
        self.workflows()?.delete(id)
    }

    pub fn definition(
        &self,
        id: &str,
    ) -> Result<WorkflowModel> {
        let workflow = self.workflows()?.find(id)?;
        WorkflowModel::from_json(&workflow.data)
    }

    pub fn definitions(&self) -> Result<Vec<WorkflowModel>> {
        let page = self.workflows()?.query(&Query::new().order("create_time", false))?;
        page.rows.iter().map(|w| WorkflowModel::from_json(&w.data)).collect()
    }

    /// Creates a queued execution record and returns its id.
    pub fn create_execution(
        &self,
        workflow_id: &str,
        parent_id: Option<&str>,
        trigger_data: &Value,
    ) -> Result<String> {
        let now = utils::time::time_millis();
        let execution = Execution {
            id: utils::longid(),
            workflow_id: workflow_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            status: ExecutionStatus::Queued,
            trigger_data: trigger_data.clone(),
            result_data: Value::Null,
            error_message: None,
            start_time: 0,
            end_time: 0,
            duration_ms: 0,
            timestamp: now,
        };
        self.executions()?.create(&execution)?;
        Ok(execution.id)
    }

    pub fn execution(
        &self,
        id: &str,
    ) -> Result<Execution> {
        self.executions()?.find(id)
    }

    pub fn executions_of(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<Execution>> {
        Ok(self.executions()?.query(&Query::new().filter("workflow_id", workflow_id).order("timestamp", false))?.rows)
    }

    /// One page of the execution history of `workflow_id`, newest first. `page_num` is 1-based.
    pub fn execution_page(
        &self,
        workflow_id: &str,
        page_num: usize,
        page_size: usize,
    ) -> Result<PageData<Execution>> {
        let page_size = page_size.max(1);
        let query = Query::new()
            .filter("workflow_id", workflow_id)
            .order("timestamp", true)
            .set_offset(page_num.saturating_sub(1) * page_size)
            .set_limit(page_size);
        self.executions()?.query(&query)
    }

    /// Moves an execution forward. Returns `false` and leaves the record untouched
    /// when the transition is not allowed.
    pub fn transition_execution(
        &self,
        id: &str,
        status: ExecutionStatus,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> Result<bool> {
        let executions = self.executions()?;
        let mut execution = executions.find(id)?;
        if !execution.status.can_transition_to(status) {
            warn!(execution = id, from = execution.status.as_ref(), to = status.as_ref(), "ignored execution status transition");
            return Ok(false);
        }
        let now = utils::time::time_millis();
        match status {
            ExecutionStatus::Running => execution.start_time = now,
            ExecutionStatus::Completed | ExecutionStatus::Failed => {
                if execution.start_time == 0 {
                    execution.start_time = now;
                }
                execution.end_time = now;
                execution.duration_ms = now - execution.start_time;
            }
            ExecutionStatus::Queued => {}
        }
        if let Some(result) = result {
            execution.result_data = result.clone();
        }
        if let Some(error) = error {
            execution.error_message = Some(error.to_string());
        }
        execution.status = status;
        executions.update(&execution)
    }

    /// Opens a running log entry for a node and returns its id.
    pub fn start_log(
        &self,
        execution_id: &str,
        node_id: &str,
        node_type: &str,
        input: &Value,
    ) -> Result<String> {
        let now = utils::time::time_millis();
        let log = ExecutionLog {
            id: utils::longid(),
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            status: LogStatus::Running,
            input_data: input.clone(),
            output_data: Value::Null,
            error_message: None,
            duration_ms: 0,
            start_time: now,
            timestamp: now,
        };
        self.logs()?.create(&log)?;
        Ok(log.id)
    }

    /// Closes a log entry. Once terminal, later calls are ignored.
    pub fn finalize_log(
        &self,
        id: &str,
        status: LogStatus,
        output: &Value,
        error: Option<&str>,
    ) -> Result<bool> {
        let logs = self.logs()?;
        let mut log = logs.find(id)?;
        if log.status.is_terminal() {
            return Ok(false);
        }
        let now = utils::time::time_millis();
        log.status = status;
        log.output_data = output.clone();
        log.error_message = error.map(str::to_string);
        log.duration_ms = now - log.start_time;
        logs.update(&log)
    }

    pub fn logs_of(
        &self,
        execution_id: &str,
    ) -> Result<Vec<ExecutionLog>> {
        Ok(self.logs()?.query(&Query::new().filter("execution_id", execution_id))?.rows)
    }

    /// Keeps the `keep` most recently created finished executions of `workflow_id` and
    /// deletes older finished ones together with their logs. Returns how many were removed.
    pub fn prune_history(
        &self,
        workflow_id: &str,
        keep: usize,
    ) -> Result<usize> {
        let executions = self.executions()?;
        let finished = executions
            .query(&Query::new().filter("workflow_id", workflow_id))?
            .rows
            .into_iter()
            .filter(|e| e.status.is_terminal())
            .collect::<Vec<_>>();
        let excess = finished.len().saturating_sub(keep);
        if excess == 0 {
            return Ok(0);
        }

        let logs = self.logs()?;
        for execution in &finished[..excess] {
            for log in self.logs_of(&execution.id)? {
                logs.delete(&log.id)?;
            }
            executions.delete(&execution.id)?;
        }
        trace!("store::prune_history({}) removed {}", workflow_id, excess);
        Ok(excess)
    }
}
