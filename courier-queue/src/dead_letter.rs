//! Terminal home for jobs that will not be retried.

use crate::error::QueueResult;
use crate::events::{EventSink, names};
use crate::job::Job;
use crate::store::{DEAD_LETTER_KEY, QueueStore};
use courier_log::{error, warn};
use serde_json::json;
use std::sync::Arc;

/// The `dead_letter` list.
///
/// Entries keep the full job, including the final `errorMessage`. Nothing in
/// the queue consumes them; operators inspect and requeue by hand.
#[derive(Clone)]
pub struct DeadLetterQueue {
    store: Arc<dyn QueueStore>,
    events: Arc<dyn EventSink>,
}

impl DeadLetterQueue {
    /// Dead letter queue over `store`.
    pub fn new(store: Arc<dyn QueueStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Record `reason` on the job and append it to the dead letter list.
    ///
    /// Emits `JOB_DEAD_LETTER` / `FAILED` once the job is stored.
    pub async fn move_to(&self, job: &mut Job, reason: &str) -> QueueResult<()> {
        job.error_message = Some(reason.to_string());

        let stored = match job.to_json() {
            Ok(job_json) => self.store.push(DEAD_LETTER_KEY, &job_json).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            error!("Failed to move job to dead letter queue: {}: {}", job.id, e);
            return Err(e);
        }

        self.events.business_event(
            names::JOB_DEAD_LETTER,
            names::FAILED,
            json!({
                "jobId": job.id,
                "jobType": job.job_type,
                "reason": reason,
            }),
        );
        warn!("Job {} moved to dead letter: {}", job.id, reason);
        Ok(())
    }

    /// Dead-lettered jobs, oldest first. Entries that no longer decode are
    /// skipped.
    pub async fn inspect(&self) -> QueueResult<Vec<Job>> {
        let entries = self.store.peek_all(DEAD_LETTER_KEY).await?;
        Ok(entries
            .iter()
            .filter_map(|entry| Job::from_json(entry).ok())
            .collect())
    }

    /// Number of dead-lettered entries.
    pub async fn len(&self) -> QueueResult<usize> {
        self.store.len(DEAD_LETTER_KEY).await
    }

    /// Whether the dead letter list is empty.
    pub async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }
}
