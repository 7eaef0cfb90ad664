use std::sync::Arc;

use tracing::{trace, warn};

use crate::{Result, services::KvStore, utils};

/// Proof of ownership of a key. Release it through [`DistributedLock::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    pub key: String,
    pub token: String,
}

/// Cross-process mutual exclusion over a shared [`KvStore`].
///
/// Each acquisition writes a token unique to this process and moment, so a holder
/// can only ever release its own lock. Locks expire on their own after `ttl_secs`.
pub struct DistributedLock {
    kv: Arc<dyn KvStore>,
    prefix: String,
    ttl_secs: u64,
    owner: String,
}

impl DistributedLock {
    pub fn new(
        kv: Arc<dyn KvStore>,
        prefix: &str,
        ttl_secs: u64,
    ) -> Self {
        Self {
            kv,
            prefix: prefix.to_string(),
            ttl_secs: ttl_secs.max(1),
            owner: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn key(
        &self,
        name: &str,
    ) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Tries to take the lock once. `Ok(None)` means another holder owns it.
    pub async fn acquire(
        &self,
        name: &str,
    ) -> Result<Option<LockGuard>> {
        let key = self.key(name);
        let token = format!("{}:{}", self.owner, utils::time::time_millis());
        if self.kv.set_if_not_exists(&key, &token, self.ttl_secs).await? {
            trace!(key = %key, "lock acquired");
            Ok(Some(LockGuard {
                key,
                token,
            }))
        } else {
            trace!(key = %key, "lock busy");
            Ok(None)
        }
    }

    /// Releases the lock if it still carries this guard's token.
    pub async fn release(
        &self,
        guard: &LockGuard,
    ) -> Result<bool> {
        let released = self.kv.delete_if_equals(&guard.key, &guard.token).await?;
        if !released {
            warn!(key = %guard.key, "lock expired or taken over before release");
        }
        Ok(released)
    }
}
