use std::sync::Arc;

use tracing::trace;

use crate::{
    runtime::{Channel, ChannelOptions},
    services::RealtimeBroadcast,
};

/// Relays every channel message to the realtime collaborator.
pub struct Monitor {
    channel: Arc<Channel>,
    realtime: Arc<dyn RealtimeBroadcast>,
}

impl Monitor {
    pub fn new(
        channel: Arc<Channel>,
        realtime: Arc<dyn RealtimeBroadcast>,
    ) -> Self {
        Self {
            channel,
            realtime,
        }
    }

    pub fn monitor(&self) {
        let realtime = self.realtime.clone();
        self.channel.on_event(ChannelOptions::default(), move |e| {
            trace!(execution = %e.execution_id, node = %e.node_id, "relaying event");
            realtime.emit(&e.execution_id, e.payload());
        });
    }
}
