//! # Courier Redis
//!
//! Pooled Redis (or Valkey) connections backing the Courier queue store.
//!
//! ```rust,ignore
//! use courier_redis::{RedisConfig, RedisService};
//!
//! let config = RedisConfig::from_env().pool_size(4).build();
//! let redis = RedisService::new(config).await?;
//!
//! redis.rpush("queue:email", "{...}").await?;
//! let next: Option<String> = redis.lpop("queue:email").await?;
//! ```

mod config;
mod error;
mod pool;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{PoolStats, PooledRedis, RedisPool, connect};
pub use service::RedisService;

pub use redis;
