//! Redis/Valkey queue store.
//!
//! Layout per queue key `K`:
//!
//! - `K`: list of serialized jobs, pushed with `RPUSH`, popped with `LPOP`
//! - `K:delayed`: sorted set of serialized jobs scored by release time (epoch ms)
//!
//! Pops run a Lua script that first moves every due member of `K:delayed` to
//! the tail of `K`, in release order, and then pops the head. The script runs
//! atomically, so concurrent workers never see a job twice.

use super::QueueStore;
use crate::error::QueueResult;
use async_trait::async_trait;
use courier_log::debug;
use courier_redis::RedisService;
use courier_redis::redis::Script;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

const RELEASE_DUE: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, entry in ipairs(due) do
    redis.call('RPUSH', KEYS[1], entry)
end
if #due > 0 then
    redis.call('ZREMRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
end
";

static POP_SCRIPT: Lazy<Script> =
    Lazy::new(|| Script::new(&format!("{}\nreturn redis.call('LPOP', KEYS[1])", RELEASE_DUE)));

static RELEASE_SCRIPT: Lazy<Script> =
    Lazy::new(|| Script::new(&format!("{}\nreturn #due", RELEASE_DUE)));

/// Queue store on a pooled Redis/Valkey connection.
#[derive(Clone)]
pub struct RedisStore {
    redis: Arc<RedisService>,
}

impl RedisStore {
    /// Store over an open Redis service.
    pub fn new(redis: Arc<RedisService>) -> Self {
        Self { redis }
    }

    /// Delayed set paired with `key`.
    pub fn delayed_key(key: &str) -> String {
        format!("{}:delayed", key)
    }

    /// Entries waiting in the delayed set of `key`.
    pub async fn delayed_len(&self, key: &str) -> QueueResult<u64> {
        Ok(self.redis.zcard(&Self::delayed_key(key)).await?)
    }

    async fn release_due(&self, key: &str) -> QueueResult<()> {
        let delayed_key = Self::delayed_key(key);
        let now = now_millis().to_string();
        let released: i64 = self
            .redis
            .eval(&RELEASE_SCRIPT, &[key, delayed_key.as_str()], &[now.as_str()])
            .await?;
        if released > 0 {
            debug!("Released {} delayed entries into {}", released, key);
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn push(&self, key: &str, job_json: &str) -> QueueResult<()> {
        self.redis.rpush(key, job_json).await?;
        Ok(())
    }

    async fn pop(&self, key: &str) -> QueueResult<Option<String>> {
        let delayed_key = Self::delayed_key(key);
        let now = now_millis().to_string();
        let popped: Option<String> = self
            .redis
            .eval(&POP_SCRIPT, &[key, delayed_key.as_str()], &[now.as_str()])
            .await?;
        Ok(popped)
    }

    async fn delayed_push(&self, key: &str, job_json: &str, delay: Duration) -> QueueResult<()> {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let release_at = now_millis().saturating_add(delay_ms);
        self.redis
            .zadd(&Self::delayed_key(key), job_json, release_at)
            .await?;
        Ok(())
    }

    async fn len(&self, key: &str) -> QueueResult<usize> {
        self.release_due(key).await?;
        let len = self.redis.llen(key).await?;
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }

    async fn peek_all(&self, key: &str) -> QueueResult<Vec<String>> {
        self.release_due(key).await?;
        Ok(self.redis.lrange(key, 0, -1).await?)
    }
}
