use serde_json::Value;

/// Best-effort push of execution progress to connected clients. Must never block.
pub trait RealtimeBroadcast: Send + Sync {
    fn emit(
        &self,
        execution_id: &str,
        payload: Value,
    );
}

#[derive(Debug, Clone, Default)]
pub struct NoopBroadcast;

impl RealtimeBroadcast for NoopBroadcast {
    fn emit(
        &self,
        _execution_id: &str,
        _payload: Value,
    ) {
    }
}
