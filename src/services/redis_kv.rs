//! Redis [`KvStore`] (optional, behind the `redis` feature flag).
//!
//! Locks are written with `SET key value NX EX ttl` and released with a
//! compare-and-delete script so an expired owner never removes a successor's lock.

use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{HookflowError, Result, services::KvStore};

const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Shares one reconnecting connection across all calls; it is opened on first use.
pub struct RedisKvStore {
    client: Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisKvStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(map_redis_err)?;
        info!("Redis kv store created (url: {})", redis_url);
        Ok(Self {
            client,
            manager: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                debug!("opening redis connection");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(map_redis_err)?;
        Ok(manager.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.manager.initialized()
    }
}

fn map_redis_err(err: redis::RedisError) -> HookflowError {
    HookflowError::Kv(err.to_string())
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET").arg(key).arg(value).arg("NX").arg("EX").arg(ttl_secs.max(1)).query_async(&mut conn).await.map_err(map_redis_err)?;
        Ok(reply.is_some())
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await.map_err(map_redis_err)?;
        Ok(value)
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await.map_err(map_redis_err)?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(
        &self,
        key: &str,
        value: &str,
    ) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::Script::new(COMPARE_AND_DELETE).key(key).arg(value).invoke_async(&mut conn).await.map_err(map_redis_err)?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_is_opened_lazily() {
        let kv = RedisKvStore::new("redis://127.0.0.1:6379/").unwrap();
        assert!(!kv.is_connected());
        assert!(matches!(RedisKvStore::new("not a url"), Err(HookflowError::Kv(_))));
    }
}
