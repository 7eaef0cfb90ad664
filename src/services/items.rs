use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{HookflowError, Result, ShareLock, services::Identity, utils};

/// Permission handling for a single item store call.
#[derive(Debug, Clone, Default)]
pub struct AccessOptions {
    /// skip the permission engine entirely
    pub bypass_permissions: bool,
    /// act as this identity; `None` means anonymous
    pub identity: Option<Identity>,
}

/// Generic CRUD engine of the host platform.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn create_one(
        &self,
        collection: &str,
        data: Value,
        opts: &AccessOptions,
    ) -> Result<Value>;

    async fn read_one(
        &self,
        collection: &str,
        id: &str,
        opts: &AccessOptions,
    ) -> Result<Value>;

    async fn read_by_query(
        &self,
        collection: &str,
        query: &Value,
        opts: &AccessOptions,
    ) -> Result<Vec<Value>>;

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        opts: &AccessOptions,
    ) -> Result<Value>;

    async fn delete_one(
        &self,
        collection: &str,
        id: &str,
        opts: &AccessOptions,
    ) -> Result<Value>;
}

/// Collections kept in process memory, keyed by each item's `id` field.
///
/// Collections listed with [`MemItemStore::protect`] reject calls that neither bypass
/// permissions nor run as an admin identity.
#[derive(Clone, Default)]
pub struct MemItemStore {
    collections: ShareLock<HashMap<String, Vec<Value>>>,
    protected: ShareLock<Vec<String>>,
}

impl MemItemStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            protected: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn protect(
        &self,
        collection: &str,
    ) {
        if let Ok(mut protected) = self.protected.write() {
            protected.push(collection.to_string());
        }
    }

    /// Snapshot of a collection, in insertion order.
    pub fn items(
        &self,
        collection: &str,
    ) -> Vec<Value> {
        self.collections.read().ok().and_then(|c| c.get(collection).cloned()).unwrap_or_default()
    }

    fn check_access(
        &self,
        collection: &str,
        opts: &AccessOptions,
    ) -> Result<()> {
        let protected = self.protected.read().map_err(lock_error)?.iter().any(|c| c == collection);
        let admin = opts.identity.as_ref().map(|i| i.admin).unwrap_or(false);
        if protected && !opts.bypass_permissions && !admin {
            return Err(HookflowError::PermissionDenied(format!("no permission to access collection '{}'", collection)));
        }
        Ok(())
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> HookflowError {
    HookflowError::Item(e.to_string())
}

fn item_id(item: &Value) -> Option<String> {
    match item.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Match a filter of the form `{field: value}` or `{field: {"_eq"|"_neq"|"_in"|"_gt"|"_lt": value}}`.
fn matches_filter(
    item: &Value,
    filter: &Map<String, Value>,
) -> bool {
    filter.iter().all(|(field, rule)| {
        let actual = item.get(field).unwrap_or(&Value::Null);
        match rule {
            Value::Object(ops) => ops.iter().all(|(op, expected)| match op.as_str() {
                "_eq" => actual == expected,
                "_neq" => actual != expected,
                "_in" => expected.as_array().map(|arr| arr.contains(actual)).unwrap_or(false),
                "_gt" => matches!((actual.as_f64(), expected.as_f64()), (Some(a), Some(e)) if a > e),
                "_lt" => matches!((actual.as_f64(), expected.as_f64()), (Some(a), Some(e)) if a < e),
                _ => false,
            }),
            other => actual == other,
        }
    })
}

#[async_trait]
impl ItemStore for MemItemStore {
    async fn create_one(
        &self,
        collection: &str,
        data: Value,
        opts: &AccessOptions,
    ) -> Result<Value> {
        self.check_access(collection, opts)?;
        let Value::Object(mut item) = data else {
            return Err(HookflowError::Item(format!("item for '{}' must be an object", collection)));
        };
        if !item.contains_key("id") {
            item.insert("id".to_string(), Value::String(utils::longid()));
        }
        let item = Value::Object(item);
        self.collections.write().map_err(lock_error)?.entry(collection.to_string()).or_default().push(item.clone());
        Ok(item)
    }

    async fn read_one(
        &self,
        collection: &str,
        id: &str,
        opts: &AccessOptions,
    ) -> Result<Value> {
        self.check_access(collection, opts)?;
        let collections = self.collections.read().map_err(lock_error)?;
        collections
            .get(collection)
            .and_then(|items| items.iter().find(|i| item_id(i).as_deref() == Some(id)))
            .cloned()
            .ok_or_else(|| HookflowError::NotFound(format!("item '{}' not found in '{}'", id, collection)))
    }

    async fn read_by_query(
        &self,
        collection: &str,
        query: &Value,
        opts: &AccessOptions,
    ) -> Result<Vec<Value>> {
        self.check_access(collection, opts)?;
        let filter = query.get("filter").and_then(|f| f.as_object()).cloned().unwrap_or_default();
        let limit = query.get("limit").and_then(|l| l.as_u64()).map(|l| l as usize).unwrap_or(usize::MAX);
        let collections = self.collections.read().map_err(lock_error)?;
        Ok(collections
            .get(collection)
            .map(|items| items.iter().filter(|i| matches_filter(i, &filter)).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        opts: &AccessOptions,
    ) -> Result<Value> {
        self.check_access(collection, opts)?;
        let mut collections = self.collections.write().map_err(lock_error)?;
        let item = collections
            .get_mut(collection)
            .and_then(|items| items.iter_mut().find(|i| item_id(i).as_deref() == Some(id)))
            .ok_or_else(|| HookflowError::NotFound(format!("item '{}' not found in '{}'", id, collection)))?;
        if let (Value::Object(target), Value::Object(patch)) = (&mut *item, data) {
            for (k, v) in patch {
                target.insert(k, v);
            }
        }
        Ok(item.clone())
    }

    async fn delete_one(
        &self,
        collection: &str,
        id: &str,
        opts: &AccessOptions,
    ) -> Result<Value> {
        self.check_access(collection, opts)?;
        let mut collections = self.collections.write().map_err(lock_error)?;
        let items = collections.get_mut(collection).ok_or_else(|| HookflowError::NotFound(format!("item '{}' not found in '{}'", id, collection)))?;
        let before = items.len();
        items.retain(|i| item_id(i).as_deref() != Some(id));
        if items.len() == before {
            return Err(HookflowError::NotFound(format!("item '{}' not found in '{}'", id, collection)));
        }
        Ok(Value::String(id.to_string()))
    }
}
