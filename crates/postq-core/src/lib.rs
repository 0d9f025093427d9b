//! postq Core - Core business logic for the message broker
//!
//! This crate contains the broker registry:
//! - Broker: resolves queue names to queues, creating them on demand
//! - Enqueue/dequeue by queue name

pub mod broker;

// Re-exports
pub use broker::Broker;
pub use postq_queue::MessageQueue;
