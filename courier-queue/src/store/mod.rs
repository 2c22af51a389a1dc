//! Queue storage backends.
//!
//! A store holds named FIFO lists of serialized jobs, plus a time-ordered
//! delayed set per list. Delayed entries become poppable from their list once
//! their release time passes; the store performs that move itself.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use crate::error::QueueResult;
use async_trait::async_trait;
use std::time::Duration;

/// Prefix of live queue keys.
pub const QUEUE_PREFIX: &str = "queue:";

/// Key of the dead letter list.
pub const DEAD_LETTER_KEY: &str = "dead_letter";

/// Store key of the live queue named `queue_name`.
pub fn queue_key(queue_name: &str) -> String {
    format!("{}{}", QUEUE_PREFIX, queue_name)
}

/// Durable FIFO storage for serialized jobs.
///
/// Implementations must be safe for concurrent use from every worker loop;
/// the queue core takes no locks of its own.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append to the tail of `key`.
    async fn push(&self, key: &str, job_json: &str) -> QueueResult<()>;

    /// Remove and return the head of `key`, releasing due delayed entries
    /// first. Never blocks waiting for data.
    async fn pop(&self, key: &str) -> QueueResult<Option<String>>;

    /// Offer to `key` once `delay` has elapsed, not before.
    async fn delayed_push(&self, key: &str, job_json: &str, delay: Duration) -> QueueResult<()>;

    /// Entries currently poppable from `key`.
    async fn len(&self, key: &str) -> QueueResult<usize>;

    /// Read-only snapshot of `key`, head first.
    async fn peek_all(&self, key: &str) -> QueueResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_key() {
        assert_eq!(queue_key("email"), "queue:email");
        assert_eq!(queue_key("default"), "queue:default");
    }

    #[test]
    fn test_dead_letter_key_is_outside_queue_namespace() {
        assert!(!DEAD_LETTER_KEY.starts_with(QUEUE_PREFIX));
    }
}
