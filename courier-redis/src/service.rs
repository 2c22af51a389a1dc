//! The pooled command surface used by the queue store.

use redis::{AsyncCommands, FromRedisValue, Script};

use crate::pool::{self, PoolStats, PooledRedis, RedisPool};
use crate::{RedisConfig, Result};

/// Handle to one Redis deployment.
///
/// Shared behind an `Arc` by every queue store; each command checks a
/// connection out of the pool for its own duration only.
pub struct RedisService {
    config: RedisConfig,
    pool: RedisPool,
}

impl RedisService {
    /// Connect with `config`. Fails if the server does not answer `PING`.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = pool::connect(&config).await?;
        Ok(Self { config, pool })
    }

    /// Reuse a pool built elsewhere.
    pub fn from_pool(config: RedisConfig, pool: RedisPool) -> Self {
        Self { config, pool }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats::of(&self.pool)
    }

    /// Borrow a raw connection for commands not wrapped here.
    pub async fn connection(&self) -> Result<PooledRedis<'_>> {
        Ok(self.pool.get().await?)
    }

    /// Round-trip a `PING`.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        pool::ping(&mut conn).await
    }

    // Lists

    /// `RPUSH`; returns the list length after the push.
    pub async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.rpush(key, value).await?)
    }

    /// `LPOP` of a single element.
    pub async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.lpop(key, None).await?)
    }

    pub async fn llen(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.llen(key).await?)
    }

    /// `LRANGE`, inclusive on both ends; negative indexes count from the tail.
    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.lrange(key, start, stop).await?)
    }

    // Sorted sets

    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    pub async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.zcard(key).await?)
    }

    // Keys and scripts

    /// `DEL`; true when the key existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: u32 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Run `script` with `keys` and `args`. Scripts execute atomically on the
    /// server, which is what the queue relies on for release-then-pop.
    pub async fn eval<T: FromRedisValue>(
        &self,
        script: &Script,
        keys: &[&str],
        args: &[&str],
    ) -> Result<T> {
        let mut conn = self.connection().await?;
        let mut invocation = script.prepare_invoke();
        invocation.key(keys).arg(args);
        Ok(invocation.invoke_async(&mut *conn).await?)
    }
}

impl std::fmt::Debug for RedisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisService")
            .field("pool_size", &self.config.pool_size)
            .field("database", &self.config.database)
            .field("stats", &self.pool_stats())
            .finish()
    }
}
