//! Broker - Registry of named queues
//!
//! The Broker is the central component that resolves queue names to queues.
//! Queues are created on first reference and kept for the broker's lifetime.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use postq_queue::MessageQueue;
use postq_types::{Message, MessageId, QueueInfo, QueueStats};
use tracing::info;

/// Main message broker
pub struct Broker {
    /// Queues stored by name
    queues: DashMap<String, Arc<MessageQueue>>,
}

impl Broker {
    /// Create an empty broker
    pub fn new() -> Self {
        info!("Initializing postq broker");
        Self {
            queues: DashMap::new(),
        }
    }

    // ==================== Queue Operations ====================

    /// Get the queue for `name`, creating it if it does not exist yet.
    ///
    /// Concurrent calls for the same name always observe the same queue.
    pub fn resolve(&self, name: &str) -> Arc<MessageQueue> {
        if let Some(queue) = self.queues.get(name) {
            return Arc::clone(queue.value());
        }

        let entry = self.queues.entry(name.to_string()).or_insert_with(|| {
            info!(queue = %name, "Queue created");
            Arc::new(MessageQueue::new(name))
        });
        Arc::clone(entry.value())
    }

    /// Get a queue by name without creating it
    pub fn get(&self, name: &str) -> Option<Arc<MessageQueue>> {
        self.queues.get(name).map(|q| Arc::clone(q.value()))
    }

    /// List all queues, sorted by name
    pub fn list_queues(&self) -> Vec<QueueInfo> {
        let mut queues: Vec<QueueInfo> = self
            .queues
            .iter()
            .map(|q| QueueInfo {
                name: q.name().to_string(),
                created_at: q.created_at(),
                stats: q.stats(),
            })
            .collect();
        queues.sort_by(|a, b| a.name.cmp(&b.name));
        queues
    }

    /// Get queue statistics, if the queue has been referenced
    pub fn queue_stats(&self, name: &str) -> Option<QueueStats> {
        self.get(name).map(|q| q.stats())
    }

    /// Number of known queues
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    // ==================== Message Operations ====================

    /// Enqueue raw bytes onto the named queue
    pub fn enqueue(&self, queue_name: &str, body: impl Into<Bytes>) -> MessageId {
        let message = Message::new(body);
        let message_id = message.id;
        self.resolve(queue_name).enqueue(message);
        message_id
    }

    /// Dequeue from the named queue, waiting up to `timeout`.
    ///
    /// A zero timeout polls without waiting.
    pub async fn dequeue(&self, queue_name: &str, timeout: Duration) -> Option<Message> {
        let queue = self.resolve(queue_name);
        queue.dequeue(timeout).await
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}
