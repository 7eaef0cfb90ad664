use std::{fs, path::Path};

use serde::Deserialize;

use crate::{HookflowError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// interpreter limits
    pub engine: EngineConfig,
    /// cron scheduler and distributed lock
    pub scheduler: SchedulerConfig,
    /// lifecycle hook bridge
    pub hooks: HooksConfig,
    /// script sandbox limits
    pub script: ScriptConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// hard cap applied to every loop node, defaults to 1000
    pub max_loop_iterations: usize,
    /// maximum nesting of workflow nodes invoking child workflows
    pub max_workflow_depth: usize,
    /// optional ceiling for a whole execution in milliseconds, unbounded when absent
    pub execution_timeout_ms: Option<u64>,
    /// interval between child execution status polls
    pub child_poll_interval_ms: u64,
    /// default bound for awaiting a child execution
    pub child_timeout_ms: u64,
    /// default per-call timeout of http nodes
    pub http_timeout_ms: u64,
    /// upper bound of a single delay node
    pub max_delay_ms: u64,
    /// finished executions kept per workflow, older ones are pruned with their logs; 0 keeps all
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// register cron timers at launch
    pub enabled: bool,
    /// lock expiry in seconds
    pub lock_ttl_secs: u64,
    /// key prefix of the per-workflow lock
    pub lock_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// collections starting with one of these prefixes never trigger workflows
    pub reserved_prefixes: Vec<String>,
    /// collections that never trigger workflows
    pub reserved_collections: Vec<String>,
    /// capacity of the after-event queue
    pub after_queue_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// heap limit of a script runtime in bytes
    pub memory_limit_bytes: usize,
    /// stack limit of a script runtime in bytes
    pub max_stack_size: usize,
    /// interrupt a script running longer than this
    pub timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1000,
            max_workflow_depth: 8,
            execution_timeout_ms: None,
            child_poll_interval_ms: 250,
            child_timeout_ms: 30_000,
            http_timeout_ms: 30_000,
            max_delay_ms: 3_600_000,
            history_limit: 1000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_ttl_secs: 300,
            lock_prefix: "hookflow:lock:".to_string(),
        }
    }
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            reserved_prefixes: vec!["system_".to_string(), "hookflow_".to_string()],
            reserved_collections: vec!["workflows".to_string(), "workflow_executions".to_string(), "workflow_execution_logs".to_string()],
            after_queue_size: 1024,
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 32 * 1024 * 1024,
            max_stack_size: 512 * 1024,
            timeout_ms: 5_000,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| HookflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        Ok(config)
    }
}
