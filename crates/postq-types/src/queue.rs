//! Queue metadata types for postq
//!
//! Snapshots returned by queue introspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Point-in-time counters for a single queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueStats {
    /// Messages buffered and waiting for a consumer
    pub pending_count: u64,

    /// Consumers currently blocked waiting for a message
    pub waiting_consumers: u64,

    /// Messages accepted since the queue was created
    pub enqueued_total: u64,

    /// Messages handed to consumers since the queue was created
    pub dequeued_total: u64,

    /// Blocking dequeues that ended without a message
    pub expired_waits_total: u64,
}

/// Queue summary used by listings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueInfo {
    /// Queue name
    pub name: String,

    /// When the queue was first referenced
    pub created_at: DateTime<Utc>,

    /// Current counters
    pub stats: QueueStats,
}
