use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

/// A deployed workflow definition; `data` holds the serialized `WorkflowModel`.
#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub status: String,
    pub trigger_type: String,
    pub data: String,
    pub create_time: i64,
    pub update_time: i64,
}

impl DbCollectionIden for Workflow {
    fn iden() -> StoreIden {
        StoreIden::Workflows
    }
}
