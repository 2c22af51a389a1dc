//! In-process queue store for tests and single-node development.

use super::QueueStore;
use crate::error::QueueResult;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

// Stand-in release time for delays the clock cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

#[derive(Default)]
struct Lists {
    live: HashMap<String, VecDeque<String>>,
    // Keyed by (release time, insertion sequence) so equal release times keep
    // insertion order.
    delayed: HashMap<String, BTreeMap<(Instant, u64), String>>,
    sequence: u64,
}

impl Lists {
    fn release_due(&mut self, key: &str, now: Instant) {
        let Some(delayed) = self.delayed.get_mut(key) else {
            return;
        };

        let pending = delayed.split_off(&(now, u64::MAX));
        let due = std::mem::replace(delayed, pending);
        if due.is_empty() {
            return;
        }

        let live = self.live.entry(key.to_string()).or_default();
        live.extend(due.into_values());
    }
}

/// Queue store backed by process memory.
///
/// Delayed entries follow the tokio clock, so paused-time tests can step
/// through backoff delays with `tokio::time::advance`.
#[derive(Default)]
pub struct MemoryStore {
    lists: Mutex<Lists>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries waiting in the delayed set of `key`.
    pub async fn delayed_len(&self, key: &str) -> usize {
        let lists = self.lists.lock().await;
        lists.delayed.get(key).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, key: &str, job_json: &str) -> QueueResult<()> {
        let mut lists = self.lists.lock().await;
        lists
            .live
            .entry(key.to_string())
            .or_default()
            .push_back(job_json.to_string());
        Ok(())
    }

    async fn pop(&self, key: &str) -> QueueResult<Option<String>> {
        let mut lists = self.lists.lock().await;
        lists.release_due(key, Instant::now());
        Ok(lists.live.get_mut(key).and_then(VecDeque::pop_front))
    }

    async fn delayed_push(&self, key: &str, job_json: &str, delay: Duration) -> QueueResult<()> {
        let mut lists = self.lists.lock().await;
        let now = Instant::now();
        let release_at = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
        lists.sequence += 1;
        let sequence = lists.sequence;
        lists
            .delayed
            .entry(key.to_string())
            .or_default()
            .insert((release_at, sequence), job_json.to_string());
        Ok(())
    }

    async fn len(&self, key: &str) -> QueueResult<usize> {
        let mut lists = self.lists.lock().await;
        lists.release_due(key, Instant::now());
        Ok(lists.live.get(key).map_or(0, VecDeque::len))
    }

    async fn peek_all(&self, key: &str) -> QueueResult<Vec<String>> {
        let mut lists = self.lists.lock().await;
        lists.release_due(key, Instant::now());
        Ok(lists
            .live
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let store = MemoryStore::new();
        for item in ["a", "b", "c"] {
            store.push("queue:default", item).await.unwrap();
        }

        assert_eq!(store.len("queue:default").await.unwrap(), 3);
        assert_eq!(store.pop("queue:default").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop("queue:default").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.pop("queue:default").await.unwrap().as_deref(), Some("c"));
        assert_eq!(store.pop("queue:default").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryStore::new();
        store.push("queue:email", "mail").await.unwrap();

        assert_eq!(store.pop("queue:default").await.unwrap(), None);
        assert_eq!(store.pop("queue:email").await.unwrap().as_deref(), Some("mail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_entry_not_visible_early() {
        let store = MemoryStore::new();
        store
            .delayed_push("queue:email", "later", Duration::from_secs(4))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(3999)).await;
        assert_eq!(store.pop("queue:email").await.unwrap(), None);
        assert_eq!(store.delayed_len("queue:email").await, 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.pop("queue:email").await.unwrap().as_deref(), Some("later"));
        assert_eq!(store.delayed_len("queue:email").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_entries_join_the_tail() {
        let store = MemoryStore::new();
        store
            .delayed_push("queue:default", "retried", Duration::from_secs(2))
            .await
            .unwrap();
        store.push("queue:default", "fresh").await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(
            store.peek_all("queue:default").await.unwrap(),
            vec!["fresh".to_string(), "retried".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_order_follows_release_time() {
        let store = MemoryStore::new();
        store
            .delayed_push("queue:default", "slow", Duration::from_secs(8))
            .await
            .unwrap();
        store
            .delayed_push("queue:default", "fast", Duration::from_secs(2))
            .await
            .unwrap();
        store
            .delayed_push("queue:default", "fast-too", Duration::from_secs(2))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(
            store.peek_all("queue:default").await.unwrap(),
            vec!["fast".to_string(), "fast-too".to_string(), "slow".to_string()]
        );
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let store = MemoryStore::new();
        store.push("dead_letter", "x").await.unwrap();

        assert_eq!(store.peek_all("dead_letter").await.unwrap().len(), 1);
        assert_eq!(store.len("dead_letter").await.unwrap(), 1);
    }
}
