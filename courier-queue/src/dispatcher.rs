//! One step of a consumer loop: pop, decode, process, settle.

use crate::dead_letter::DeadLetterQueue;
use crate::error::{ProcessError, QueueError, QueueResult};
use crate::events::{EventSink, names};
use crate::job::{Job, JobId};
use crate::registry::{JobProcessor, ProcessorRegistry};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::{QueueStore, queue_key};
use courier_log::{debug, error, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Dead letter reason for jobs whose type has no processor.
pub const NO_PROCESSOR_FOUND: &str = "No processor found";

/// Failure cause recorded when a processor exceeds the job timeout.
pub const JOB_TIMED_OUT: &str = "Job timed out";

/// Failure cause recorded when a processor panics.
pub const PROCESSOR_PANICKED: &str = "Processor panicked";

/// What happened during one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The queue had nothing due.
    Idle,
    /// The processor succeeded.
    Succeeded {
        /// Processed job
        job_id: JobId,
        /// Time spent in the processor
        duration: Duration,
    },
    /// The processor failed and the job will be offered again.
    RetryScheduled {
        /// Failed job
        job_id: JobId,
        /// Failures so far
        retry_count: u32,
        /// Backoff before the job is poppable again
        delay: Duration,
    },
    /// The job went to the dead letter queue.
    DeadLettered {
        /// Dead-lettered job
        job_id: JobId,
        /// Recorded reason
        reason: String,
    },
    /// The job could be neither retried nor dead-lettered.
    Lost {
        /// Dropped job
        job_id: JobId,
        /// Store failure that prevented the dead letter move
        error: String,
    },
    /// An undecodable entry was dropped.
    Discarded,
    /// An undecodable entry was moved to the poison queue.
    Poisoned,
}

/// Pops and settles jobs for any queue.
///
/// Cloned into every consumer loop; all state lives in the store.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn QueueStore>,
    registry: Arc<ProcessorRegistry>,
    events: Arc<dyn EventSink>,
    dead_letter: DeadLetterQueue,
    policy: RetryPolicy,
    job_timeout: Option<Duration>,
    poison_queue: Option<String>,
}

impl Dispatcher {
    /// Dispatcher with the default retry policy, no job timeout and no
    /// poison queue.
    pub fn new(
        store: Arc<dyn QueueStore>,
        registry: Arc<ProcessorRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let dead_letter = DeadLetterQueue::new(store.clone(), events.clone());
        Self {
            store,
            registry,
            events,
            dead_letter,
            policy: RetryPolicy::default(),
            job_timeout: None,
            poison_queue: None,
        }
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fail processor calls that run longer than `timeout`.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Keep undecodable entries in the list `key` instead of dropping them.
    pub fn with_poison_queue(mut self, key: Option<String>) -> Self {
        self.poison_queue = key;
        self
    }

    /// The dead letter queue this dispatcher writes to.
    pub fn dead_letter(&self) -> &DeadLetterQueue {
        &self.dead_letter
    }

    /// Processors this dispatcher resolves against.
    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Pop at most one job from `queue_name` and settle it.
    ///
    /// Only a failed pop is returned as an error; everything after the pop is
    /// reported through events and the returned outcome.
    pub async fn poll_once(&self, queue_name: &str) -> QueueResult<JobOutcome> {
        match self.store.pop(&queue_key(queue_name)).await? {
            Some(job_json) => Ok(self.handle(queue_name, &job_json).await),
            None => Ok(JobOutcome::Idle),
        }
    }

    /// Settle one popped entry.
    pub async fn handle(&self, queue_name: &str, job_json: &str) -> JobOutcome {
        let mut job = match Job::from_json(job_json) {
            Ok(job) => job,
            Err(e) => return self.reject_entry(queue_name, job_json, &e).await,
        };

        let Some(processor) = self.registry.get(&job.job_type) else {
            error!("No processor found for job type: {}", job.job_type);
            return self.move_to_dead_letter(&mut job, NO_PROCESSOR_FOUND).await;
        };

        debug!("Processing job {} ({}) from '{}'", job.id, job.job_type, queue_name);
        let started = Instant::now();
        let result = self.run_processor(processor, &job).await;
        let duration = started.elapsed();

        self.events.performance_metric(
            names::JOB_PROCESSING,
            duration,
            json!({
                "jobId": job.id,
                "jobType": job.job_type,
                "queueName": queue_name,
                "success": result.is_ok(),
            }),
        );

        match result {
            Ok(()) => {
                self.events.business_event(
                    names::JOB_PROCESSED,
                    names::SUCCESS,
                    json!({
                        "jobId": job.id,
                        "jobType": job.job_type,
                        "queueName": queue_name,
                        "duration": duration_millis(duration),
                    }),
                );
                info!(
                    "Job processed successfully: {} in {}ms",
                    job.id,
                    duration_millis(duration)
                );
                JobOutcome::Succeeded {
                    job_id: job.id,
                    duration,
                }
            }
            Err(e) => self.handle_failure(queue_name, job, e).await,
        }
    }

    async fn run_processor(
        &self,
        processor: Arc<dyn JobProcessor>,
        job: &Job,
    ) -> Result<(), ProcessError> {
        let payload = job.payload.clone();
        let mut task = tokio::spawn(async move { processor.process(&payload).await });
        // the processor dies with this future: on timeout, or when the
        // consumer loop is aborted mid-job
        let _guard = AbortOnDrop(task.abort_handle());

        let joined = match self.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => return Err(ProcessError::new(JOB_TIMED_OUT)),
            },
            None => (&mut task).await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ProcessError::new(PROCESSOR_PANICKED)),
            Err(e) => Err(ProcessError::new(e.to_string())),
        }
    }

    async fn handle_failure(&self, queue_name: &str, mut job: Job, cause: ProcessError) -> JobOutcome {
        let decision = self.policy.on_failure(&mut job, cause.message());

        self.events.error_event(
            names::JOB_PROCESSING_FAILED,
            cause.message(),
            json!({
                "jobId": job.id,
                "jobType": job.job_type,
                "queueName": queue_name,
                "retryCount": job.retry_count,
                "maxRetries": job.max_retries,
            }),
        );

        match decision {
            RetryDecision::Retry { delay } => match self.schedule_retry(queue_name, &job, delay).await {
                Ok(()) => {
                    self.events.business_event(
                        names::JOB_RETRY_SCHEDULED,
                        names::RETRY,
                        json!({
                            "jobId": job.id,
                            "jobType": job.job_type,
                            "queueName": queue_name,
                            "retryCount": job.retry_count,
                            "maxRetries": job.max_retries,
                            "delaySeconds": delay.as_secs(),
                        }),
                    );
                    warn!(
                        "Job failed, scheduling retry {}/{} in {}s: {}",
                        job.retry_count,
                        job.max_retries,
                        delay.as_secs(),
                        job.id
                    );
                    JobOutcome::RetryScheduled {
                        job_id: job.id,
                        retry_count: job.retry_count,
                        delay,
                    }
                }
                Err(e) => {
                    error!("Failed to schedule retry for job: {}: {}", job.id, e);
                    self.events.error_event(
                        names::JOB_RETRY_SCHEDULE,
                        &e.to_string(),
                        json!({
                            "jobId": job.id,
                            "jobType": job.job_type,
                            "queueName": queue_name,
                        }),
                    );
                    let reason = format!("Failed to schedule retry: {}", e);
                    self.move_to_dead_letter(&mut job, &reason).await
                }
            },
            RetryDecision::DeadLetter => {
                let reason = job.error_message.clone().unwrap_or_default();
                error!("Job exhausted retries, moved to dead letter: {}", job.id);
                self.move_to_dead_letter(&mut job, &reason).await
            }
        }
    }

    async fn schedule_retry(&self, queue_name: &str, job: &Job, delay: Duration) -> QueueResult<()> {
        let job_json = job.to_json()?;
        self.store
            .delayed_push(&queue_key(queue_name), &job_json, delay)
            .await
    }

    async fn move_to_dead_letter(&self, job: &mut Job, reason: &str) -> JobOutcome {
        match self.dead_letter.move_to(job, reason).await {
            Ok(()) => JobOutcome::DeadLettered {
                job_id: job.id,
                reason: reason.to_string(),
            },
            Err(e) => JobOutcome::Lost {
                job_id: job.id,
                error: e.to_string(),
            },
        }
    }

    async fn reject_entry(&self, queue_name: &str, job_json: &str, cause: &QueueError) -> JobOutcome {
        error!("Failed to parse job JSON from '{}': {}", queue_name, cause);
        self.events.error_event(
            names::JOB_DESERIALIZE,
            &cause.to_string(),
            json!({
                "queueName": queue_name,
                "entryLength": job_json.len(),
            }),
        );

        let Some(poison_queue) = &self.poison_queue else {
            return JobOutcome::Discarded;
        };
        match self.store.push(poison_queue, job_json).await {
            Ok(()) => JobOutcome::Poisoned,
            Err(e) => {
                error!("Failed to keep entry in poison queue '{}': {}", poison_queue, e);
                JobOutcome::Discarded
            }
        }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
