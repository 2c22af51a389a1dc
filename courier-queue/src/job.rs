//! Job definition.

use crate::error::{QueueError, QueueResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Job unique identifier.
pub type JobId = Uuid;

/// Job payload: a JSON object, opaque to the queue.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Retry budget for jobs whose type sets none.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A unit of deferred work.
///
/// Serialized as `{id, jobType, payload, retryCount, maxRetries, createdAt,
/// scheduledAt, errorMessage}`. The `id` survives every move between the live
/// queue, the delayed set and the dead letter queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Tag selecting the processor
    pub job_type: String,

    /// Processor input
    pub payload: Payload,

    /// Failed attempts so far
    pub retry_count: u32,

    /// Retries allowed before dead-lettering
    pub max_retries: u32,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// Earliest time the job may run
    pub scheduled_at: DateTime<Utc>,

    /// Cause of the most recent failure
    pub error_message: Option<String>,
}

impl Job {
    /// Create a job that is eligible immediately.
    pub fn new(job_type: impl Into<String>, payload: Payload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            payload,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: now,
            scheduled_at: now,
            error_message: None,
        }
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Push `scheduled_at` to `delay` after creation.
    pub fn delayed_by(mut self, delay: Duration) -> Self {
        self.scheduled_at = add_delay(self.created_at, delay);
        self
    }

    /// Reject jobs no processor could ever match.
    pub fn validate(&self) -> QueueResult<()> {
        if self.job_type.trim().is_empty() {
            return Err(QueueError::InvalidJob("job type must not be empty".into()));
        }
        Ok(())
    }

    /// Whether another failure would still be retried.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Count a failed attempt and remember its cause.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.error_message = Some(message.into());
    }

    /// Move the earliest run time to `delay` from now.
    pub fn reschedule_after(&mut self, delay: Duration) {
        self.scheduled_at = add_delay(Utc::now(), delay);
    }

    /// Whether `scheduled_at` has passed.
    pub fn is_due(&self) -> bool {
        Utc::now() >= self.scheduled_at
    }

    /// Encode to the stored JSON form.
    pub fn to_json(&self) -> QueueResult<String> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    /// Decode from the stored JSON form.
    pub fn from_json(json: &str) -> QueueResult<Self> {
        serde_json::from_str(json).map_err(|e| QueueError::Deserialization(e.to_string()))
    }
}

/// Convert any serializable value into a payload. Only JSON objects qualify.
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> QueueResult<Payload> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(QueueError::InvalidJob(format!(
            "payload must be a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(QueueError::Serialization(e.to_string())),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn add_delay(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| at.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
