mod execution;
mod log;
mod workflow;

pub use execution::{Execution, ExecutionStatus};
pub use log::{ExecutionLog, LogStatus};
pub use workflow::Workflow;
