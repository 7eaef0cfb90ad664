use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::ExecutionLog, db::mem::DbDocument},
};

impl DbDocument for ExecutionLog {
    const INDEX: Option<&'static str> = Some("execution_id");

    fn id(&self) -> &str {
        &self.id
    }

    fn index_value(&self) -> Option<&str> {
        Some(&self.execution_id)
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id));
        map.insert("execution_id".to_string(), json!(self.execution_id));
        map.insert("node_id".to_string(), json!(self.node_id));
        map.insert("node_type".to_string(), json!(self.node_type));
        map.insert("status".to_string(), json!(self.status.as_ref()));
        map.insert("start_time".to_string(), json!(self.start_time));
        map.insert("timestamp".to_string(), json!(self.timestamp));
        Ok(map)
    }
}
