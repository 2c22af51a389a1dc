//! Producer side: turning payloads into stored jobs.

use crate::error::{QueueError, QueueResult};
use crate::events::{EventSink, names};
use crate::job::{DEFAULT_MAX_RETRIES, Job, JobId, to_payload};
use crate::registry::ProcessorRegistry;
use crate::store::{QueueStore, queue_key};
use courier_log::{debug, info};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Enqueue defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueConfig {
    /// Queue used by [`QueueService::schedule_job`]
    pub default_queue: String,

    /// Retry budget for job types without a registered processor
    pub default_max_retries: u32,
}

impl Default for EnqueueConfig {
    fn default() -> Self {
        Self {
            default_queue: "default".to_string(),
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl EnqueueConfig {
    /// Set the queue used by `schedule_job`.
    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = queue.into();
        self
    }

    /// Set the fallback retry budget.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }
}

/// Enqueues jobs onto named queues.
///
/// Every accepted job produces a `JOB_ENQUEUED` or `JOB_SCHEDULED` event.
/// Rejected jobs produce a `JOB_ENQUEUE` or `JOB_SCHEDULE` error event and the
/// error is returned to the caller; nothing is retried on its behalf.
#[derive(Clone)]
pub struct QueueService {
    store: Arc<dyn QueueStore>,
    events: Arc<dyn EventSink>,
    config: EnqueueConfig,
    registry: Option<Arc<ProcessorRegistry>>,
}

impl QueueService {
    /// Service with default settings.
    pub fn new(store: Arc<dyn QueueStore>, events: Arc<dyn EventSink>) -> Self {
        Self::with_config(store, events, EnqueueConfig::default())
    }

    /// Service with custom settings.
    pub fn with_config(
        store: Arc<dyn QueueStore>,
        events: Arc<dyn EventSink>,
        config: EnqueueConfig,
    ) -> Self {
        Self {
            store,
            events,
            config,
            registry: None,
        }
    }

    /// Take each new job's retry budget from its registered processor.
    pub fn with_registry(mut self, registry: Arc<ProcessorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Current settings.
    pub fn config(&self) -> &EnqueueConfig {
        &self.config
    }

    /// Append a job to the tail of `queue_name`.
    ///
    /// `payload` must serialize to a JSON object.
    pub async fn enqueue<P>(&self, queue_name: &str, job_type: &str, payload: &P) -> QueueResult<JobId>
    where
        P: Serialize + ?Sized,
    {
        debug!("Enqueueing job: {} on queue '{}'", job_type, queue_name);
        self.submit(queue_name, job_type, payload, None).await
    }

    /// Offer a job to `queue_name` once `delay` has elapsed.
    pub async fn enqueue_delayed<P>(
        &self,
        queue_name: &str,
        job_type: &str,
        payload: &P,
        delay: Duration,
    ) -> QueueResult<JobId>
    where
        P: Serialize + ?Sized,
    {
        debug!(
            "Scheduling job: {} on queue '{}' in {}s",
            job_type,
            queue_name,
            delay.as_secs()
        );
        self.submit(queue_name, job_type, payload, Some(delay)).await
    }

    /// Delayed enqueue onto the default queue.
    pub async fn schedule_job<P>(&self, job_type: &str, payload: &P, delay: Duration) -> QueueResult<JobId>
    where
        P: Serialize + ?Sized,
    {
        let queue_name = self.config.default_queue.clone();
        self.enqueue_delayed(&queue_name, job_type, payload, delay)
            .await
    }

    async fn submit<P>(
        &self,
        queue_name: &str,
        job_type: &str,
        payload: &P,
        delay: Option<Duration>,
    ) -> QueueResult<JobId>
    where
        P: Serialize + ?Sized,
    {
        match self.try_submit(queue_name, job_type, payload, delay).await {
            Ok(job_id) => Ok(job_id),
            Err(e) => {
                let mut context = json!({
                    "queueName": queue_name,
                    "jobType": job_type,
                });
                let operation = match delay {
                    Some(delay) => {
                        context["delaySeconds"] = delay.as_secs().into();
                        names::JOB_SCHEDULE
                    }
                    None => names::JOB_ENQUEUE,
                };
                self.events.error_event(operation, &e.to_string(), context);
                Err(e)
            }
        }
    }

    async fn try_submit<P>(
        &self,
        queue_name: &str,
        job_type: &str,
        payload: &P,
        delay: Option<Duration>,
    ) -> QueueResult<JobId>
    where
        P: Serialize + ?Sized,
    {
        if queue_name.trim().is_empty() {
            return Err(QueueError::InvalidJob("queue name must not be empty".into()));
        }

        let mut job = Job::new(job_type, to_payload(payload)?).with_max_retries(self.max_retries_for(job_type));
        job.validate()?;
        if let Some(delay) = delay {
            job = job.delayed_by(delay);
        }

        let key = queue_key(queue_name);
        let job_json = job.to_json()?;

        match delay {
            None => {
                self.store.push(&key, &job_json).await?;
                self.events.business_event(
                    names::JOB_ENQUEUED,
                    names::SUCCESS,
                    json!({
                        "queueName": queue_name,
                        "jobType": job_type,
                        "jobId": job.id,
                    }),
                );
                info!("Job enqueued: {} to queue: {}", job.id, queue_name);
            }
            Some(delay) => {
                self.store.delayed_push(&key, &job_json, delay).await?;
                self.events.business_event(
                    names::JOB_SCHEDULED,
                    names::SUCCESS,
                    json!({
                        "queueName": queue_name,
                        "jobType": job_type,
                        "jobId": job.id,
                        "delaySeconds": delay.as_secs(),
                    }),
                );
                info!(
                    "Job scheduled: {} to queue: {} with delay: {}s",
                    job.id,
                    queue_name,
                    delay.as_secs()
                );
            }
        }

        Ok(job.id)
    }

    fn max_retries_for(&self, job_type: &str) -> u32 {
        self.registry
            .as_ref()
            .and_then(|registry| registry.max_retries_for(job_type))
            .unwrap_or(self.config.default_max_retries)
    }
}
