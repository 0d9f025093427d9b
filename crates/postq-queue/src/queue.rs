//! Named FIFO queue with blocking-with-timeout consumption
//!
//! A queue keeps two sequences behind one lock: buffered messages and blocked
//! consumers. At most one of them is non-empty at any time. A producer either
//! hands its message straight to the oldest blocked consumer or appends it to
//! the buffer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use postq_types::{Message, QueueStats};
use tracing::{debug, trace};

use crate::waiter::Waiter;

/// Lock-protected queue contents
#[derive(Debug, Default)]
struct QueueState {
    /// Messages waiting for a consumer, oldest first
    buffer: VecDeque<Message>,
    /// Consumers waiting for a message, oldest first
    waiters: VecDeque<Arc<Waiter>>,
    next_waiter_id: u64,
    enqueued_total: u64,
    dequeued_total: u64,
    expired_waits_total: u64,
}

impl QueueState {
    /// Give `message` to the oldest pending waiter.
    ///
    /// Returns the message if no waiter accepted it.
    fn hand_off(&mut self, mut message: Message) -> Option<Message> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.fulfill(message) {
                Ok(()) => return None,
                Err(returned) => message = returned,
            }
        }
        Some(message)
    }

    fn remove_waiter(&mut self, waiter: &Waiter) {
        if let Some(pos) = self.waiters.iter().position(|w| w.id() == waiter.id()) {
            self.waiters.remove(pos);
        }
    }
}

/// A single named message queue
#[derive(Debug)]
pub struct MessageQueue {
    name: String,
    created_at: DateTime<Utc>,
    state: Mutex<QueueState>,
}

impl MessageQueue {
    /// Create an empty queue
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Accept a message. Never blocks and never fails.
    pub fn enqueue(&self, message: Message) {
        let message_id = message.id;
        let mut state = self.state.lock();
        state.enqueued_total += 1;

        match state.hand_off(message) {
            None => {
                debug!(
                    queue = %self.name,
                    message_id = %message_id,
                    "Message handed to waiting consumer"
                );
            }
            Some(message) => {
                state.buffer.push_back(message);
                debug!(
                    queue = %self.name,
                    message_id = %message_id,
                    pending = state.buffer.len(),
                    "Message buffered"
                );
            }
        }
    }

    /// Pop the oldest buffered message without waiting
    pub fn try_dequeue(&self) -> Option<Message> {
        let mut state = self.state.lock();
        let message = state.buffer.pop_front()?;
        state.dequeued_total += 1;
        Some(message)
    }

    /// Take the oldest message, waiting up to `timeout` for one to arrive.
    ///
    /// A zero timeout is a non-blocking poll. Returns `None` when nothing
    /// arrived in time. If the future is dropped while waiting, any message
    /// already delivered to it is put back at the head of the queue.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Message> {
        let waiter = {
            let mut state = self.state.lock();
            if let Some(message) = state.buffer.pop_front() {
                state.dequeued_total += 1;
                trace!(queue = %self.name, message_id = %message.id, "Message dequeued");
                return Some(message);
            }
            if timeout.is_zero() {
                return None;
            }

            let waiter = Arc::new(Waiter::new(state.next_waiter_id));
            state.next_waiter_id += 1;
            state.waiters.push_back(Arc::clone(&waiter));
            waiter
        };

        trace!(
            queue = %self.name,
            waiter = waiter.id(),
            timeout_ms = timeout.as_millis() as u64,
            "Consumer waiting"
        );

        let wait = PendingWait::new(self, waiter);
        let woken = tokio::time::timeout(timeout, wait.waiter.delivered())
            .await
            .is_ok();
        let message = wait.finish();

        match &message {
            Some(message) if !woken => debug!(
                queue = %self.name,
                message_id = %message.id,
                "Delivery arrived as the wait expired"
            ),
            Some(message) => trace!(
                queue = %self.name,
                message_id = %message.id,
                "Message delivered to waiting consumer"
            ),
            None => trace!(queue = %self.name, "Wait expired"),
        }

        message
    }

    /// Resolve a finished wait under the queue lock.
    ///
    /// A delivery that landed before the lock was taken wins over the expired
    /// timer.
    fn finish_wait(&self, waiter: &Waiter) -> Option<Message> {
        let mut state = self.state.lock();
        match waiter.settle() {
            Some(message) => {
                state.dequeued_total += 1;
                Some(message)
            }
            None => {
                state.remove_waiter(waiter);
                state.expired_waits_total += 1;
                None
            }
        }
    }

    /// Resolve a wait whose consumer went away.
    fn cancel_wait(&self, waiter: &Waiter) {
        let mut state = self.state.lock();
        state.expired_waits_total += 1;
        match waiter.settle() {
            Some(message) => {
                debug!(
                    queue = %self.name,
                    message_id = %message.id,
                    "Consumer dropped after delivery, requeueing message"
                );
                if let Some(message) = state.hand_off(message) {
                    state.buffer.push_front(message);
                }
            }
            None => {
                state.remove_waiter(waiter);
                trace!(queue = %self.name, waiter = waiter.id(), "Consumer dropped while waiting");
            }
        }
    }

    /// Number of buffered messages
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().buffer.is_empty()
    }

    /// Number of consumers currently blocked on this queue
    pub fn waiting_consumers(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Snapshot of the queue counters
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            pending_count: state.buffer.len() as u64,
            waiting_consumers: state.waiters.len() as u64,
            enqueued_total: state.enqueued_total,
            dequeued_total: state.dequeued_total,
            expired_waits_total: state.expired_waits_total,
        }
    }
}

/// A registered waiter that is cleaned up if the consumer goes away
struct PendingWait<'a> {
    queue: &'a MessageQueue,
    waiter: Arc<Waiter>,
    finished: bool,
}

impl<'a> PendingWait<'a> {
    fn new(queue: &'a MessageQueue, waiter: Arc<Waiter>) -> Self {
        Self {
            queue,
            waiter,
            finished: false,
        }
    }

    fn finish(mut self) -> Option<Message> {
        self.finished = true;
        self.queue.finish_wait(&self.waiter)
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.queue.cancel_wait(&self.waiter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn body(message: Option<Message>) -> Option<String> {
        message.map(|m| m.body_as_str().unwrap().to_string())
    }

    /// Yield until `count` consumers are registered on the queue
    async fn wait_for_consumers(queue: &MessageQueue, count: usize) {
        while queue.waiting_consumers() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MessageQueue::new("fifo");
        for i in 0..5 {
            queue.enqueue(Message::new(format!("m{}", i)));
        }

        for i in 0..5 {
            let msg = queue.dequeue(Duration::ZERO).await;
            assert_eq!(body(msg), Some(format!("m{}", i)));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_non_blocking_poll_on_empty_queue() {
        let queue = MessageQueue::new("empty");
        let start = std::time::Instant::now();

        assert!(queue.dequeue(Duration::ZERO).await.is_none());
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(queue.waiting_consumers(), 0);
        assert_eq!(queue.stats().expired_waits_total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_delivery() {
        let queue = Arc::new(MessageQueue::new("blocking"));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let start = Instant::now();
                let msg = queue.dequeue(Duration::from_secs(5)).await;
                (msg, start.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.enqueue(Message::new("x"));

        let (msg, elapsed) = consumer.await.unwrap();
        assert_eq!(body(msg), Some("x".to_string()));
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expiry_leaves_no_waiter() {
        let queue = MessageQueue::new("timeout");
        let start = Instant::now();

        let msg = queue.dequeue(Duration::from_millis(200)).await;
        let elapsed = start.elapsed();

        assert!(msg.is_none());
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));
        assert_eq!(queue.waiting_consumers(), 0);

        // A later message must be buffered, not handed to the stale waiter
        queue.enqueue(Message::new("later"));
        let stats = queue.stats();
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.expired_waits_total, 1);
        assert_eq!(body(queue.try_dequeue()), Some("later".to_string()));
    }

    #[tokio::test]
    async fn test_waiters_served_in_arrival_order() {
        let queue = Arc::new(MessageQueue::new("order"));
        let mut consumers = Vec::new();

        for i in 0..3 {
            let q = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                q.dequeue(Duration::from_secs(10)).await
            }));
            wait_for_consumers(&queue, i + 1).await;
        }

        for name in ["a", "b", "c"] {
            queue.enqueue(Message::new(name));
            // Buffer stays empty while consumers are waiting
            assert_eq!(queue.len(), 0);
        }

        let mut received = Vec::new();
        for consumer in consumers {
            received.push(body(consumer.await.unwrap()).unwrap());
        }
        assert_eq!(received, vec!["a", "b", "c"]);

        let stats = queue.stats();
        assert_eq!(stats.enqueued_total, 3);
        assert_eq!(stats.dequeued_total, 3);
        assert_eq!(stats.waiting_consumers, 0);
    }

    #[test]
    fn test_timeout_path_honors_concurrent_delivery() {
        let queue = MessageQueue::new("race");

        // Register a waiter the way dequeue does
        let waiter = Arc::new(Waiter::new(0));
        queue.state.lock().waiters.push_back(Arc::clone(&waiter));

        // Producer wins the lock first
        queue.enqueue(Message::new("raced"));
        assert_eq!(queue.waiting_consumers(), 0);

        // Timer fired but the delivery must still be returned
        let wait = PendingWait::new(&queue, waiter);
        let msg = wait.finish();
        assert_eq!(body(msg), Some("raced".to_string()));
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.stats().expired_waits_total, 0);
    }

    #[test]
    fn test_expired_waiter_is_skipped_by_producer() {
        let queue = MessageQueue::new("race");

        let waiter = Arc::new(Waiter::new(0));
        queue.state.lock().waiters.push_back(Arc::clone(&waiter));

        // Timer wins the lock first
        assert!(PendingWait::new(&queue, waiter).finish().is_none());
        assert_eq!(queue.waiting_consumers(), 0);

        queue.enqueue(Message::new("after"));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_race_between_timeout_and_delivery() {
        for trial in 0..200u64 {
            let queue = Arc::new(MessageQueue::new("race"));

            let consumer = {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.dequeue(Duration::from_millis(5)).await })
            };
            let producer = {
                let queue = Arc::clone(&queue);
                let jitter = Duration::from_micros(4_000 + (trial * 37) % 2_000);
                tokio::spawn(async move {
                    tokio::time::sleep(jitter).await;
                    queue.enqueue(Message::new(format!("m{}", trial)));
                })
            };

            producer.await.unwrap();
            let received = consumer.await.unwrap();
            let leftover = queue.try_dequeue();

            // Exactly one side observes the message
            assert!(
                received.is_some() != leftover.is_some(),
                "trial {} lost or duplicated a message",
                trial
            );
            assert_eq!(queue.waiting_consumers(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_once_under_contention() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let queue = Arc::new(MessageQueue::new("contended"));
        let received = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::with_capacity(TOTAL)));

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let received = Arc::clone(&received);
            let seen = Arc::clone(&seen);
            consumers.push(tokio::spawn(async move {
                while received.load(Ordering::SeqCst) < TOTAL {
                    if let Some(msg) = queue.dequeue(Duration::from_millis(20)).await {
                        seen.lock().push(msg.body_as_str().unwrap().to_string());
                        received.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }

        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            producers.push(tokio::spawn(async move {
                for i in 0..PER_PRODUCER {
                    queue.enqueue(Message::new(format!("p{}-{}", p, i)));
                    if i % 16 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        for producer in producers {
            producer.await.unwrap();
        }
        for consumer in consumers {
            consumer.await.unwrap();
        }

        let seen = seen.lock();
        let unique: HashSet<&String> = seen.iter().collect();
        assert_eq!(seen.len(), TOTAL);
        assert_eq!(unique.len(), TOTAL);
        assert!(queue.is_empty());
        assert_eq!(queue.waiting_consumers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_consumer_removes_waiter() {
        let queue = MessageQueue::new("dropped");

        let outcome =
            tokio::time::timeout(Duration::from_millis(10), queue.dequeue(Duration::from_secs(10)))
                .await;
        assert!(outcome.is_err());
        assert_eq!(queue.waiting_consumers(), 0);

        queue.enqueue(Message::new("kept"));
        assert_eq!(body(queue.try_dequeue()), Some("kept".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_consumer_after_delivery_requeues_message() {
        let queue = MessageQueue::new("dropped");

        tokio::select! {
            biased;
            _ = queue.dequeue(Duration::from_secs(10)) => panic!("consumer should not complete"),
            _ = async {
                tokio::task::yield_now().await;
                queue.enqueue(Message::new("first"));
            } => {}
        }

        // The delivered message went back to the head of the queue
        assert_eq!(queue.waiting_consumers(), 0);
        queue.enqueue(Message::new("second"));
        assert_eq!(body(queue.try_dequeue()), Some("first".to_string()));
        assert_eq!(body(queue.try_dequeue()), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_consumer_passes_message_to_next_waiter() {
        let queue = Arc::new(MessageQueue::new("handover"));

        let second = {
            let queue = Arc::clone(&queue);
            async move { queue.dequeue(Duration::from_secs(10)).await }
        };
        tokio::pin!(second);

        tokio::select! {
            biased;
            _ = queue.dequeue(Duration::from_secs(10)) => panic!("first consumer should not complete"),
            _ = &mut second => panic!("second consumer should not complete"),
            _ = async {
                tokio::task::yield_now().await;
                queue.enqueue(Message::new("only"));
            } => {}
        }

        // The first consumer was dropped holding "only"; it moves on to the second
        assert_eq!(queue.len(), 0);
        assert_eq!(body(second.await), Some("only".to_string()));
    }
}
