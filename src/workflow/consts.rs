//! Reserved edge handles.

/// Source handle of a condition's true branch.
pub const HANDLE_TRUE: &str = "true";
/// Source handle of a condition's false branch.
pub const HANDLE_FALSE: &str = "false";
/// Source handle of a loop body entry.
pub const HANDLE_LOOP: &str = "loop";
/// Source handle of a guarded try body entry.
pub const HANDLE_TRY: &str = "try";
/// Source handle of a catch branch entry.
pub const HANDLE_CATCH: &str = "catch";
/// Source handle of the continuation after a control node.
pub const HANDLE_DONE: &str = "done";

/// Target handle closing a condition branch.
pub const SENTINEL_CONDITION_END: &str = "condition-end";
/// Target handle closing a loop body.
pub const SENTINEL_LOOP_END: &str = "loop-end";
/// Target handle closing a try or catch branch.
pub const SENTINEL_TRY_END: &str = "try-end";

pub const SENTINELS: [&str; 3] = [SENTINEL_CONDITION_END, SENTINEL_LOOP_END, SENTINEL_TRY_END];
