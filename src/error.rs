//! Error types for Hookflow.
//!
//! All errors in Hookflow are represented by the `HookflowError` enum,
//! which provides specific variants for different error categories.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Hookflow operations.
///
/// Each variant represents a specific category of error that can occur
/// during workflow definition, execution, triggering or storage operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum HookflowError {
    /// Engine-level errors (startup, shutdown, lifecycle).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML, etc.).
    #[error("{0}")]
    Convert(String),

    /// Workflow definition errors: missing or inactive workflow, unknown node type,
    /// dangling edge or invalid node config. Raised before any side effect.
    #[error("{0}")]
    Definition(String),

    /// A node processor failed. Aborts the run unless caught by an enclosing try node.
    ///
    /// `message` is the bare cause, `detail` the cause with its processor prefix.
    #[error("node '{node_id}' failed: {detail}")]
    NodeExecution {
        node_id: String,
        message: String,
        detail: String,
    },

    /// Failure tagged with the processor that raised it.
    #[error("{processor} failed: {message}")]
    Processor {
        processor: String,
        message: String,
    },

    /// Failure rethrown from an awaited child workflow.
    #[error("Child workflow failed: {0}")]
    ChildWorkflow(String),

    /// Processor-specific action errors.
    #[error("{0}")]
    Action(String),

    /// Script sandbox errors.
    #[error("{0}")]
    Script(String),

    /// Runtime execution errors.
    #[error("{0}")]
    Runtime(String),

    /// A bounded wait elapsed.
    #[error("{0}")]
    Timeout(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// Errors surfaced by the item store collaborator.
    #[error("{0}")]
    Item(String),

    /// Record not found in the item store.
    #[error("{0}")]
    NotFound(String),

    /// Permission denied by the item store.
    #[error("{0}")]
    PermissionDenied(String),

    /// Hook bridge errors.
    #[error("{0}")]
    Hook(String),

    /// Scheduler errors.
    #[error("{0}")]
    Scheduler(String),

    /// Distributed key-value store errors.
    #[error("{0}")]
    Kv(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl HookflowError {
    /// Message without the node prefix, as exposed to catch branches and execution records.
    pub fn message(&self) -> String {
        match self {
            HookflowError::NodeExecution {
                message,
                ..
            }
            | HookflowError::Processor {
                message,
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Tags the error with `processor`. Definition and child workflow errors keep their category.
    pub fn in_processor(
        self,
        processor: &str,
    ) -> Self {
        match self {
            HookflowError::Definition(_)
            | HookflowError::ChildWorkflow(_)
            | HookflowError::Processor {
                ..
            } => self,
            other => HookflowError::Processor {
                processor: processor.to_string(),
                message: other.message(),
            },
        }
    }

    /// Wraps the error as the failure of node `node_id`.
    pub fn at_node(
        self,
        node_id: &str,
    ) -> Self {
        match self {
            HookflowError::NodeExecution {
                ..
            } => self,
            other => HookflowError::NodeExecution {
                node_id: node_id.to_string(),
                message: other.message(),
                detail: other.to_string(),
            },
        }
    }

    /// Id of the node that raised the error, if known.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            HookflowError::NodeExecution {
                node_id,
                ..
            } => Some(node_id.as_str()),
            _ => None,
        }
    }
}

impl From<HookflowError> for String {
    fn from(val: HookflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for HookflowError {
    fn from(error: std::io::Error) -> Self {
        HookflowError::IoError(error.to_string())
    }
}

impl From<HookflowError> for std::io::Error {
    fn from(val: HookflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for HookflowError {
    fn from(_: FromUtf8Error) -> Self {
        HookflowError::Runtime("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for HookflowError {
    fn from(error: serde_json::Error) -> Self {
        HookflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for HookflowError {
    fn from(error: toml::de::Error) -> Self {
        HookflowError::Config(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for HookflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        HookflowError::Definition(error.to_string())
    }
}
