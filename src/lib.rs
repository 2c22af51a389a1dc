// Courier - background jobs for Rust services
//
// Named FIFO queues, delayed jobs, retries with exponential backoff and a
// dead letter queue, backed by Redis/Valkey or process memory.

// Re-export the queue core
pub use courier_queue::*;

// Re-export supporting crates
pub use courier_log;
pub use courier_queue;

#[cfg(feature = "redis")]
pub use courier_redis;

#[cfg(feature = "redis")]
pub use courier_redis::{RedisConfig, RedisService};

// Prelude for common imports
pub mod prelude {
    pub use courier_queue::prelude::*;

    #[cfg(feature = "redis")]
    pub use courier_redis::{RedisConfig, RedisService};
}
