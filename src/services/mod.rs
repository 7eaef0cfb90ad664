//! External collaborators consumed by the engine.
//!
//! The engine never talks to a database, mail server or realtime transport directly;
//! hosts inject implementations of these traits through the `EngineBuilder`.
//! In-memory implementations back the defaults and the test-suite.

mod items;
mod kv;
mod mail;
mod realtime;
#[cfg(feature = "redis")]
mod redis_kv;
mod stats;

use serde::{Deserialize, Serialize};

pub use items::{AccessOptions, ItemStore, MemItemStore};
pub use kv::{KvStore, MemKvStore};
pub use mail::{LogMailer, MailMessage, Mailer, RecordingMailer};
pub use realtime::{NoopBroadcast, RealtimeBroadcast};
#[cfg(feature = "redis")]
pub use redis_kv::RedisKvStore;
pub use stats::{ItemStatsAggregator, StatsAggregate, StatsAggregator, StatsQuery};

/// Who a workflow runs on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

impl Identity {
    pub fn user(
        user: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            user: Some(user.into()),
            role: Some(role.into()),
            admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            user: None,
            role: None,
            admin: true,
        }
    }
}
