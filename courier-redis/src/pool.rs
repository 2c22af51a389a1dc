//! bb8 pool of multiplexed Redis connections.

use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use crate::{RedisConfig, RedisError, Result};

/// Shared pool handle.
pub type RedisPool = Pool<RedisConnectionManager>;

/// Connection checked out of a [`RedisPool`]. Goes back to the pool on drop.
pub type PooledRedis<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections.
    pub connections: u32,
    /// Connections not checked out.
    pub idle_connections: u32,
}

impl PoolStats {
    pub(crate) fn of(pool: &RedisPool) -> Self {
        let state = pool.state();
        Self {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// Connections currently checked out.
    pub fn in_use(&self) -> u32 {
        self.connections.saturating_sub(self.idle_connections)
    }
}

/// Open a pool for `config` and make sure the server answers.
///
/// Fails fast with [`RedisError::Config`] on a zero-sized pool, before any
/// network traffic.
pub async fn connect(config: &RedisConfig) -> Result<RedisPool> {
    check_sizes(config)?;

    let manager = RedisConnectionManager::new(config.connection_url())
        .map_err(|e| RedisError::Connection(e.to_string()))?;

    let pool = Pool::builder()
        .max_size(config.pool_size)
        .min_idle(config.min_idle)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .await
        .map_err(|e| RedisError::Pool(e.to_string()))?;

    ping(&mut *pool.get().await?).await?;

    info!(
        pool_size = config.pool_size,
        database = config.database,
        "Redis pool ready"
    );
    Ok(pool)
}

/// Send `PING` over an open connection.
pub(crate) async fn ping(conn: &mut MultiplexedConnection) -> Result<()> {
    let reply: String = redis::cmd("PING")
        .query_async(conn)
        .await
        .map_err(|e| RedisError::Connection(e.to_string()))?;
    debug!(%reply, "Redis PING");
    Ok(())
}

fn check_sizes(config: &RedisConfig) -> Result<()> {
    if config.pool_size == 0 {
        return Err(RedisError::Config("pool_size must be at least 1".into()));
    }
    if config.min_idle.is_some_and(|idle| idle > config.pool_size) {
        return Err(RedisError::Config(format!(
            "min_idle ({}) exceeds pool_size ({})",
            config.min_idle.unwrap_or_default(),
            config.pool_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_pool_size_rejected_before_connecting() {
        let config = RedisConfig::builder()
            .url("redis://unreachable.invalid:6379")
            .pool_size(0)
            .build();

        assert!(matches!(
            connect(&config).await,
            Err(RedisError::Config(_))
        ));
    }

    #[test]
    fn test_min_idle_above_pool_size_rejected() {
        let config = RedisConfig::builder().pool_size(2).min_idle(5).build();
        assert!(matches!(check_sizes(&config), Err(RedisError::Config(_))));
    }

    #[test]
    fn test_stats_in_use() {
        let stats = PoolStats {
            connections: 5,
            idle_connections: 2,
        };
        assert_eq!(stats.in_use(), 3);
    }
}
