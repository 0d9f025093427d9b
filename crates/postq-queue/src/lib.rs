//! postq Queue - In-memory queue for the message broker
//!
//! A `MessageQueue` is a named FIFO buffer whose consumers may block with a
//! timeout until a producer delivers a message. Every message is delivered
//! to exactly one consumer, including when a consumer's timeout fires at the
//! same moment a producer hands it a message.

pub mod queue;
mod waiter;

// Re-exports
pub use queue::MessageQueue;
