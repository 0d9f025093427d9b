//! postq Types - Core domain types for the message broker
//!
//! This crate contains all shared types used across postq components.

pub mod error;
pub mod message;
pub mod queue;

// Re-export commonly used types
pub use error::{Error, Result};
pub use message::{Message, MessageId};
pub use queue::{QueueInfo, QueueStats};
