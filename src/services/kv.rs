use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::{HookflowError, Result};

/// Key-value store shared by every process instance.
///
/// `set_if_not_exists` must be an atomic check-and-set; entries expire after `ttl_secs`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool>;

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>>;

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool>;

    /// Delete `key` only while it still holds `value`.
    async fn delete_if_equals(
        &self,
        key: &str,
        value: &str,
    ) -> Result<bool> {
        match self.get(key).await? {
            Some(current) if current == value => self.delete(key).await,
            _ => Ok(false),
        }
    }
}

/// Single-process [`KvStore`]; share one instance to emulate a cluster in tests.
#[derive(Clone, Default)]
pub struct MemKvStore {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemKvStore {
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().map_err(|e| HookflowError::Kv(e.to_string()))?;
        let now = Instant::now();
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), (value.to_string(), now + Duration::from_secs(ttl_secs)));
        Ok(true)
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|e| HookflowError::Kv(e.to_string()))?;
        Ok(entries.get(key).filter(|(_, expires_at)| *expires_at > Instant::now()).map(|(v, _)| v.clone()))
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        Ok(self.entries.lock().map_err(|e| HookflowError::Kv(e.to_string()))?.remove(key).is_some())
    }

    async fn delete_if_equals(
        &self,
        key: &str,
        value: &str,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().map_err(|e| HookflowError::Kv(e.to_string()))?;
        match entries.get(key) {
            Some((current, _)) if current == value => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_not_exists_is_exclusive() {
        let kv = MemKvStore::new();
        assert!(kv.set_if_not_exists("k", "a", 60).await.unwrap());
        assert!(!kv.set_if_not_exists("k", "b", 60).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entry_can_be_reacquired() {
        let kv = MemKvStore::new();
        assert!(kv.set_if_not_exists("k", "a", 0).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert!(kv.set_if_not_exists("k", "b", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_equals() {
        let kv = MemKvStore::new();
        kv.set_if_not_exists("k", "owner", 60).await.unwrap();
        assert!(!kv.delete_if_equals("k", "intruder").await.unwrap());
        assert!(kv.delete_if_equals("k", "owner").await.unwrap());
        assert!(!kv.delete("k").await.unwrap());
    }
}
