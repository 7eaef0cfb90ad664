//! # Hookflow
//!
//! Hookflow is an embeddable workflow engine for backend platforms. Admin-defined
//! graphs of typed steps run when data changes (CRUD lifecycle hooks) or on cron
//! schedules, with per-node execution logs and a shared execution context.
//!
//! ## Core Features
//!
//! - **Graph interpreter**: condition, loop and try/catch nodes scope their branches with sentinel edges
//! - **Leaf processors**: service (CRUD), http, transform, filter, aggregate, delay, notification,
//!   email, child workflow, stats, file, variable and sandboxed script nodes
//! - **Lifecycle hooks**: before-hooks can rewrite or veto an operation, after-hooks run in the background
//! - **Cron schedules**: at most one run per tick across a cluster, guarded by a distributed lock
//! - **Pluggable collaborators**: item store, mailer, stats, realtime and key-value store are traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hookflow::{EngineBuilder, WorkflowModel};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch();
//!
//! let workflow = WorkflowModel::from_json(json_str)?;
//! engine.deploy(&workflow).await?;
//! let execution = engine.execute_workflow(&workflow.id, json!({"age": 20}), None).await?;
//!
//! engine.shutdown(Duration::from_secs(5)).await;
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
mod events;
pub mod hooks;
mod model;
mod runtime;
pub mod scheduler;
pub mod services;
mod store;
mod utils;
mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use config::{Config, EngineConfig, HooksConfig, SchedulerConfig, ScriptConfig};
pub use engine::Engine;
pub use error::HookflowError;
pub use events::{Event, GraphEvent, Message, NodeEvent, WorkflowEvent};
pub use model::*;
pub use runtime::{Channel, ChannelOptions};
pub use store::{
    PageData,
    data::{Execution, ExecutionLog, ExecutionStatus, LogStatus},
};
pub use workflow::actions::{Capability, ModuleInfo, ModuleOptions};

/// Result type alias for Hookflow operations.
pub type Result<T> = std::result::Result<T, HookflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
