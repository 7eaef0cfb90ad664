use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot shutdown signal shared between a component and its background tasks.
#[derive(Default)]
pub struct Shutdown {
    terminated: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal; later calls are no-ops.
    pub fn shutdown(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has been triggered.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_terminated() {
                return;
            }
            notified.await;
        }
    }
}
