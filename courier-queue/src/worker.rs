//! Worker pool: one consumer loop per queue.

use crate::dispatcher::{Dispatcher, JobOutcome};
use crate::error::{QueueError, QueueResult};
use crate::events::{EventSink, names};
use crate::registry::ProcessorRegistry;
use crate::retry::{MIN_BACKOFF_CEILING, RetryPolicy};
use crate::store::QueueStore;
use courier_log::{error, info, warn};
use serde_json::json;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Queues consumed when none are configured.
pub const DEFAULT_QUEUES: [&str; 3] = ["default", "email", "notifications"];

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Queue names, one consumer loop each
    pub queues: Vec<String>,

    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,

    /// How long shutdown waits for loops before aborting them
    pub shutdown_grace: Duration,

    /// Processor calls running longer than this fail (None = unbounded)
    pub job_timeout: Option<Duration>,

    /// Ceiling for retry backoff
    pub max_backoff: Duration,

    /// List that keeps undecodable entries (None = drop them)
    pub poison_queue: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect(),
            poll_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(30),
            job_timeout: None,
            max_backoff: RetryPolicy::default().max_delay(),
            poison_queue: None,
        }
    }
}

impl WorkerConfig {
    /// Read overrides from the environment.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `COURIER_QUEUES` | comma-separated queue names |
    /// | `COURIER_POLL_INTERVAL_MS` | idle poll interval |
    /// | `COURIER_SHUTDOWN_GRACE_SECS` | shutdown grace period |
    /// | `COURIER_JOB_TIMEOUT_SECS` | processor timeout, `0` disables |
    /// | `COURIER_MAX_BACKOFF_SECS` | backoff ceiling |
    /// | `COURIER_POISON_QUEUE` | poison list key, empty disables |
    pub fn from_env() -> QueueResult<Self> {
        let mut config = Self::default();

        if let Ok(queues) = env::var("COURIER_QUEUES") {
            config.queues = parse_queue_list(&queues);
        }
        if let Some(ms) = env_number::<u64>("COURIER_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_number::<u64>("COURIER_SHUTDOWN_GRACE_SECS")? {
            config.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number::<u64>("COURIER_JOB_TIMEOUT_SECS")? {
            config.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = env_number::<u64>("COURIER_MAX_BACKOFF_SECS")? {
            config.max_backoff = Duration::from_secs(secs);
        }
        if let Ok(poison) = env::var("COURIER_POISON_QUEUE") {
            let poison = poison.trim();
            config.poison_queue = (!poison.is_empty()).then(|| poison.to_string());
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the queue names.
    pub fn with_queues<I, S>(mut self, queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queues = queues.into_iter().map(Into::into).collect();
        self
    }

    /// Set the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the processor timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Set the backoff ceiling.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Keep undecodable entries in `key`.
    pub fn with_poison_queue(mut self, key: impl Into<String>) -> Self {
        self.poison_queue = Some(key.into());
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> QueueResult<()> {
        if self.queues.is_empty() {
            return Err(QueueError::Config("at least one queue is required".into()));
        }
        if self.queues.iter().any(|q| q.trim().is_empty()) {
            return Err(QueueError::Config("queue names must not be empty".into()));
        }
        for (i, queue) in self.queues.iter().enumerate() {
            if self.queues[..i].contains(queue) {
                return Err(QueueError::Config(format!("queue listed twice: {}", queue)));
            }
        }
        if self.poll_interval.is_zero() {
            return Err(QueueError::Config("poll interval must be positive".into()));
        }
        if self.max_backoff < MIN_BACKOFF_CEILING {
            return Err(QueueError::Config(format!(
                "max backoff must be at least {}s",
                MIN_BACKOFF_CEILING.as_secs()
            )));
        }
        Ok(())
    }
}

fn parse_queue_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_number<T: FromStr>(name: &str) -> QueueResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| QueueError::Config(format!("{} is not a valid number: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Consumes every configured queue until shut down.
///
/// Each queue gets its own task processing one job at a time; queues run in
/// parallel with each other.
///
/// ```no_run
/// use courier_queue::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example() -> QueueResult<()> {
/// let mut registry = ProcessorRegistry::new();
/// registry.register(FnProcessor::new("cleanup", |_| async { Ok(()) }))?;
///
/// let mut pool = WorkerPool::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(registry),
///     Arc::new(LogEventSink),
///     WorkerConfig::default(),
/// );
/// pool.start()?;
/// // ...
/// pool.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool {
    dispatcher: Dispatcher,
    events: Arc<dyn EventSink>,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Pool over `store`, resolving processors from `registry`.
    pub fn new(
        store: Arc<dyn QueueStore>,
        registry: Arc<ProcessorRegistry>,
        events: Arc<dyn EventSink>,
        config: WorkerConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(store, registry, events.clone())
            .with_retry_policy(RetryPolicy::with_max_delay(config.max_backoff))
            .with_job_timeout(config.job_timeout)
            .with_poison_queue(config.poison_queue.clone());

        Self {
            dispatcher,
            events,
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            handles: Vec::new(),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The dispatcher shared by every loop.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Launch one consumer loop per configured queue.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> QueueResult<()> {
        self.config.validate()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QueueError::WorkerAlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        for queue in &self.config.queues {
            let consumer = Consumer {
                queue: queue.clone(),
                dispatcher: self.dispatcher.clone(),
                events: self.events.clone(),
                poll_interval: self.config.poll_interval,
                running: self.running.clone(),
                shutdown: shutdown_rx.clone(),
            };
            self.handles.push(tokio::spawn(consumer.run()));
        }

        info!(
            "Queue workers started for: {}",
            self.config.queues.join(", ")
        );
        Ok(())
    }

    /// Stop the loops.
    ///
    /// Jobs already in a processor are allowed to finish. Loops still busy
    /// after the grace period are aborted.
    pub async fn shutdown(&mut self) -> QueueResult<()> {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QueueError::WorkerNotRunning);
        }

        info!("Shutting down queue workers...");
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            // receivers may already be gone
            let _ = shutdown_tx.send(true);
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        for mut handle in self.handles.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Queue worker task failed: {}", e),
                Err(_) => {
                    warn!("Queue worker still busy after grace period, aborting");
                    handle.abort();
                }
            }
        }

        info!("Queue workers shut down completed");
        Ok(())
    }

    /// Whether the loops are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // detached loops stop at their next check
        self.running.store(false, Ordering::SeqCst);
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
    }
}

struct Consumer {
    queue: String,
    dispatcher: Dispatcher,
    events: Arc<dyn EventSink>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
}

impl Consumer {
    async fn run(mut self) {
        info!("Worker started for queue: {}", self.queue);

        while self.running.load(Ordering::SeqCst) {
            match self.dispatcher.poll_once(&self.queue).await {
                Ok(JobOutcome::Idle) => self.idle().await,
                Ok(_) => {}
                Err(e) => {
                    error!("Error polling queue: {}: {}", self.queue, e);
                    self.events.error_event(
                        names::QUEUE_POLL,
                        &e.to_string(),
                        json!({ "queueName": self.queue }),
                    );
                    self.idle().await;
                }
            }
        }

        info!("Worker stopped for queue: {}", self.queue);
    }

    async fn idle(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = self.shutdown.changed() => {}
        }
    }
}
