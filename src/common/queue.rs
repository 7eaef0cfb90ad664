//! Message queues for inter-component communication.
//!
//! Provides both point-to-point (Queue) and broadcast (BroadcastQueue) messaging.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{HookflowError, Result};

/// Bounded MPMC (multi-producer, multi-consumer) queue.
///
/// Used for the after-hook queue where every event should be consumed by exactly one worker.
/// Backed by flume for high-performance message passing.
#[derive(Clone)]
pub struct Queue<T> {
    receiver: Arc<flume::Receiver<T>>,
    sender: Arc<flume::Sender<T>>,
}

impl<T> Queue<T> {
    /// create a new queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, rx) = flume::bounded(cap);

        Arc::new(Self {
            receiver: Arc::new(rx),
            sender: Arc::new(tx),
        })
    }

    /// push a message without waiting; fails when the queue is full
    pub fn try_send(
        &self,
        msg: T,
    ) -> Result<()> {
        self.sender.try_send(msg).map_err(|e| HookflowError::Queue(e.to_string()))
    }

    /// receive a message from the queue asynchronously
    pub async fn next_async(&self) -> Option<T> {
        self.receiver.recv_async().await.ok()
    }

    /// number of queued messages
    pub fn len(&self) -> usize {
        self.sender.len()
    }
}

/// Broadcast queue for one-to-many message distribution.
///
/// Used for event broadcasting where all subscribers receive every message.
/// Backed by tokio's broadcast channel.
#[derive(Clone)]
pub struct BroadcastQueue<T> {
    sender: Arc<broadcast::Sender<T>>,
}

impl<T: Clone> BroadcastQueue<T> {
    /// create a new broadcast queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender: Arc::new(tx),
        })
    }

    /// send a message to every subscriber; succeeds even when nobody listens
    pub fn send(
        &self,
        msg: T,
    ) {
        let _ = self.sender.send(msg);
    }

    /// subscribe to the queue
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::{BroadcastQueue, Queue};

    #[tokio::test]
    async fn test_queue_roundtrip_and_capacity() {
        let queue = Queue::new(1);
        queue.try_send(1).unwrap();
        assert!(queue.try_send(2).is_err());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_async().await, Some(1));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let queue = BroadcastQueue::new(4);
        queue.send("lost");

        let mut rx = queue.subscribe();
        queue.send("seen");
        assert_eq!(rx.recv().await.unwrap(), "seen");
    }
}
