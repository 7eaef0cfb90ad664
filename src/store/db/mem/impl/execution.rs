use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::Execution, db::mem::DbDocument},
};

impl DbDocument for Execution {
    const INDEX: Option<&'static str> = Some("workflow_id");

    fn id(&self) -> &str {
        &self.id
    }

    fn index_value(&self) -> Option<&str> {
        Some(&self.workflow_id)
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id));
        map.insert("workflow_id".to_string(), json!(self.workflow_id));
        map.insert("parent_id".to_string(), json!(self.parent_id));
        map.insert("status".to_string(), json!(self.status.as_ref()));
        map.insert("start_time".to_string(), json!(self.start_time));
        map.insert("end_time".to_string(), json!(self.end_time));
        map.insert("timestamp".to_string(), json!(self.timestamp));
        Ok(map)
    }
}
