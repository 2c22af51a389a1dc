//! Durable job queue with retries, delayed jobs and a dead letter queue.
//!
//! Provides:
//! - Named FIFO queues on Redis/Valkey or in memory
//! - Delayed jobs released by the store once due
//! - Automatic retries with exponential backoff (2s, 4s, 8s, ...)
//! - A terminal dead letter queue
//! - One worker loop per queue, with graceful shutdown
//! - Structured business, error and timing events
//!
//! ## Quick Start - Job Creation
//!
//! ```
//! use courier_queue::{Job, to_payload};
//! use serde_json::json;
//!
//! let job = Job::new("EMAIL", to_payload(&json!({"to": "user@example.com"})).unwrap());
//!
//! assert_eq!(job.job_type, "EMAIL");
//! assert_eq!(job.retry_count, 0);
//! assert_eq!(job.max_retries, 3);
//! ```
//!
//! ## Backoff
//!
//! ```
//! use courier_queue::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
//! assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
//! ```
//!
//! ## Complete Example
//!
//! ```no_run
//! use courier_queue::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> QueueResult<()> {
//!     let store: Arc<dyn QueueStore> = Arc::new(MemoryStore::new());
//!     let events: Arc<dyn EventSink> = Arc::new(LogEventSink);
//!
//!     let mut registry = ProcessorRegistry::new();
//!     registry.register(EmailJobProcessor::new(Arc::new(LogEmailSender)))?;
//!     let registry = Arc::new(registry);
//!
//!     let queue = QueueService::new(store.clone(), events.clone()).with_registry(registry.clone());
//!     queue
//!         .enqueue(
//!             "email",
//!             "EMAIL",
//!             &json!({"type": "OTP_VERIFICATION", "to": "user@example.com", "otpCode": "123456"}),
//!         )
//!         .await?;
//!
//!     let mut pool = WorkerPool::new(store, registry, events, WorkerConfig::default());
//!     pool.start()?;
//!     tokio::signal::ctrl_c().await.ok();
//!     pool.shutdown().await
//! }
//! ```

pub mod dead_letter;
pub mod dispatcher;
pub mod enqueue;
pub mod error;
pub mod events;
pub mod job;
pub mod processors;
pub mod registry;
pub mod retry;
pub mod store;
pub mod worker;

pub use dead_letter::DeadLetterQueue;
pub use dispatcher::{Dispatcher, JobOutcome};
pub use enqueue::{EnqueueConfig, QueueService};
pub use error::{ProcessError, QueueError, QueueResult};
pub use events::{EventSink, LogEventSink, RecordedEvent, RecordingEventSink};
pub use job::{DEFAULT_MAX_RETRIES, Job, JobId, Payload, to_payload};
pub use processors::{EmailJobProcessor, EmailSender, LogEmailSender};
pub use registry::{FnProcessor, JobProcessor, ProcessorRegistry};
pub use retry::{MIN_BACKOFF_CEILING, RetryDecision, RetryPolicy};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{DEAD_LETTER_KEY, MemoryStore, QueueStore, queue_key};
pub use worker::{WorkerConfig, WorkerPool};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dead_letter::DeadLetterQueue;
    pub use crate::enqueue::{EnqueueConfig, QueueService};
    pub use crate::error::{ProcessError, QueueError, QueueResult};
    pub use crate::events::{EventSink, LogEventSink};
    pub use crate::job::{Job, JobId, Payload};
    pub use crate::processors::{EmailJobProcessor, LogEmailSender};
    pub use crate::registry::{FnProcessor, JobProcessor, ProcessorRegistry};
    #[cfg(feature = "redis")]
    pub use crate::store::RedisStore;
    pub use crate::store::{MemoryStore, QueueStore};
    pub use crate::worker::{WorkerConfig, WorkerPool};
}
