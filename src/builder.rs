use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    Config, Engine, HookflowError, Result,
    hooks::HookBus,
    runtime::{Channel, Executor, ExecutorParts},
    services::{ItemStatsAggregator, ItemStore, KvStore, LogMailer, Mailer, MemItemStore, MemKvStore, NoopBroadcast, RealtimeBroadcast, StatsAggregator},
    store::{DbStore, MemStore, Store},
    workflow::actions::ModuleRegistry,
};

/// Wires an [`Engine`] from configuration and host collaborators.
///
/// Collaborators left unset fall back to in-memory implementations, which is enough
/// for tests and single-process use.
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<Config>,
    runtime: Option<Handle>,
    items: Option<Arc<dyn ItemStore>>,
    mailer: Option<Arc<dyn Mailer>>,
    stats: Option<Arc<dyn StatsAggregator>>,
    kv: Option<Arc<dyn KvStore>>,
    realtime: Option<Arc<dyn RealtimeBroadcast>>,
    hook_bus: Option<Arc<dyn HookBus>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = Some(config);
        self
    }

    /// Runtime executions are spawned on. Defaults to the runtime `build` is called from.
    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn items(
        mut self,
        items: Arc<dyn ItemStore>,
    ) -> Self {
        self.items = Some(items);
        self
    }

    pub fn mailer(
        mut self,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn stats(
        mut self,
        stats: Arc<dyn StatsAggregator>,
    ) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Store shared by every engine instance of a cluster; backs the schedule lock.
    pub fn kv(
        mut self,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn realtime(
        mut self,
        realtime: Arc<dyn RealtimeBroadcast>,
    ) -> Self {
        self.realtime = Some(realtime);
        self
    }

    /// Bus the hook bridge registers itself on.
    pub fn hook_bus(
        mut self,
        bus: Arc<dyn HookBus>,
    ) -> Self {
        self.hook_bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| HookflowError::Engine(format!("no tokio runtime to run on: {}", e)))?,
        };

        let store = Store::new();
        MemStore::new().init(&store);

        let items = self.items.unwrap_or_else(|| Arc::new(MemItemStore::new()));
        let stats = self.stats.unwrap_or_else(|| Arc::new(ItemStatsAggregator::new(items.clone())));
        let executor = Arc::new(Executor::new(ExecutorParts {
            config: self.config.unwrap_or_default(),
            store: Arc::new(store),
            channel: Arc::new(Channel::new()),
            items,
            mailer: self.mailer.unwrap_or_else(|| Arc::new(LogMailer)),
            stats,
            modules: Arc::new(ModuleRegistry::new()),
            runtime,
        }));

        Ok(Engine::new(
            executor,
            self.kv.unwrap_or_else(|| Arc::new(MemKvStore::new())),
            self.realtime.unwrap_or_else(|| Arc::new(NoopBroadcast)),
            self.hook_bus,
        ))
    }
}
