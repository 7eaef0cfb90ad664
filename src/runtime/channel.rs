use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tokio::{runtime::Handle, sync::broadcast};
use tracing::debug;

use crate::{
    ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{Event, Message},
};

const EVENT_QUEUE_SIZE: usize = 2048;

pub type WorkflowEventHandle = Arc<dyn Fn(&Event<Message>) + Send + Sync>;
pub type WorkflowEventHandleAsync = Arc<dyn Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Selects which executions a subscriber hears about.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// execution id to match, `*` for all
    pub execution_id: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            execution_id: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn with_execution(execution_id: &str) -> Self {
        Self {
            execution_id: execution_id.to_string(),
        }
    }

    fn is_match(
        &self,
        e: &Event<Message>,
    ) -> bool {
        self.execution_id == "*" || self.execution_id == e.execution_id
    }
}

/// In-process event bus shared by every execution of an engine.
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Event<Message>>>,

    events: ShareLock<Vec<WorkflowEventHandle>>,
    events_async: ShareLock<Vec<WorkflowEventHandleAsync>>,

    shutdown: Arc<Shutdown>,
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel {
    pub fn new() -> Self {
        Self {
            event_queue: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            events: Arc::new(RwLock::new(Vec::new())),
            events_async: Arc::new(RwLock::new(Vec::new())),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn emit(
        &self,
        msg: &Message,
    ) {
        self.event_queue.send(Event::new(msg));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event<Message>> {
        self.event_queue.subscribe()
    }

    pub fn on_event(
        &self,
        options: ChannelOptions,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        if let Ok(mut events) = self.events.write() {
            events.push(Arc::new(move |e| {
                if options.is_match(e) {
                    f(e);
                }
            }));
        }
    }

    pub fn on_event_async<F>(
        &self,
        options: ChannelOptions,
        f: F,
    ) where
        F: Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        if let Ok(mut events) = self.events_async.write() {
            events.push(Arc::new(move |e| if options.is_match(e) { f(e) } else { Box::pin(async {}) }));
        }
    }

    /// Dispatches queued events to registered handlers until shutdown.
    pub(crate) fn listen(
        &self,
        runtime: &Handle,
    ) {
        let mut event_queue = self.event_queue.subscribe();
        let events = self.events.clone();
        let events_async = self.events_async.clone();
        let shutdown = self.shutdown.clone();

        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    received = event_queue.recv() => match received {
                        Ok(e) => {
                            let handlers = events.read().map(|h| h.clone()).unwrap_or_default();
                            for handle in handlers.iter() {
                                (handle)(&e);
                            }
                            let handlers = events_async.read().map(|h| h.clone()).unwrap_or_default();
                            for handle in handlers.iter() {
                                (handle)(&e).await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => debug!("channel lagged, {} events dropped", n),
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}
