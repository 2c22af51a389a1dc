//! Structured event sink.
//!
//! Events are observability only; nothing in the queue reads them back.

use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Event names emitted by the queue.
pub mod names {
    /// Immediate enqueue succeeded
    pub const JOB_ENQUEUED: &str = "JOB_ENQUEUED";
    /// Delayed enqueue succeeded
    pub const JOB_SCHEDULED: &str = "JOB_SCHEDULED";
    /// Processor succeeded
    pub const JOB_PROCESSED: &str = "JOB_PROCESSED";
    /// Failed job re-offered after backoff
    pub const JOB_RETRY_SCHEDULED: &str = "JOB_RETRY_SCHEDULED";
    /// Job moved to the dead letter queue
    pub const JOB_DEAD_LETTER: &str = "JOB_DEAD_LETTER";

    /// Error: immediate enqueue failed
    pub const JOB_ENQUEUE: &str = "JOB_ENQUEUE";
    /// Error: delayed enqueue failed
    pub const JOB_SCHEDULE: &str = "JOB_SCHEDULE";
    /// Error: processor failed
    pub const JOB_PROCESSING_FAILED: &str = "JOB_PROCESSING_FAILED";
    /// Error: retry could not be stored
    pub const JOB_RETRY_SCHEDULE: &str = "JOB_RETRY_SCHEDULE";
    /// Error: stored entry could not be decoded
    pub const JOB_DESERIALIZE: &str = "JOB_DESERIALIZE";
    /// Error: store unavailable while polling
    pub const QUEUE_POLL: &str = "QUEUE_POLL";

    /// Performance metric around a processor call
    pub const JOB_PROCESSING: &str = "JOB_PROCESSING";

    /// Outcome: success
    pub const SUCCESS: &str = "SUCCESS";
    /// Outcome: retry scheduled
    pub const RETRY: &str = "RETRY";
    /// Outcome: terminal failure
    pub const FAILED: &str = "FAILED";
}

/// Receiver of structured queue events.
pub trait EventSink: Send + Sync {
    /// A business outcome, e.g. `JOB_PROCESSED` / `SUCCESS`.
    fn business_event(&self, event: &str, outcome: &str, context: Value);

    /// A failure in `operation`.
    fn error_event(&self, operation: &str, error: &str, context: Value);

    /// Timing of `operation`.
    fn performance_metric(&self, operation: &str, duration: Duration, metrics: Value);
}

/// Sink writing JSON events through `courier-log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn business_event(&self, event: &str, outcome: &str, context: Value) {
        courier_log::event::business_event(event, outcome, &context);
    }

    fn error_event(&self, operation: &str, error: &str, context: Value) {
        courier_log::event::error_event(operation, error, &context);
    }

    fn performance_metric(&self, operation: &str, duration: Duration, metrics: Value) {
        courier_log::event::performance_metric(operation, duration, &metrics);
    }
}

/// One event captured by [`RecordingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    /// See [`EventSink::business_event`]
    Business {
        /// Event name
        event: String,
        /// Outcome
        outcome: String,
        /// Context object
        context: Value,
    },
    /// See [`EventSink::error_event`]
    Error {
        /// Failed operation
        operation: String,
        /// Error text
        error: String,
        /// Context object
        context: Value,
    },
    /// See [`EventSink::performance_metric`]
    Metric {
        /// Timed operation
        operation: String,
        /// Elapsed time
        duration: Duration,
    },
}

/// Sink that keeps every event in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventSink {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    /// Contexts of business events matching `event` and `outcome`.
    pub fn business(&self, event: &str, outcome: &str) -> Vec<Value> {
        self.lock()
            .iter()
            .filter_map(|recorded| match recorded {
                RecordedEvent::Business {
                    event: e,
                    outcome: o,
                    context,
                } if e == event && o == outcome => Some(context.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(error, context)` of error events for `operation`.
    pub fn errors(&self, operation: &str) -> Vec<(String, Value)> {
        self.lock()
            .iter()
            .filter_map(|recorded| match recorded {
                RecordedEvent::Error {
                    operation: op,
                    error,
                    context,
                } if op == operation => Some((error.clone(), context.clone())),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        // a poisoned recorder only means a test already panicked
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for RecordingEventSink {
    fn business_event(&self, event: &str, outcome: &str, context: Value) {
        self.lock().push(RecordedEvent::Business {
            event: event.to_string(),
            outcome: outcome.to_string(),
            context,
        });
    }

    fn error_event(&self, operation: &str, error: &str, context: Value) {
        self.lock().push(RecordedEvent::Error {
            operation: operation.to_string(),
            error: error.to_string(),
            context,
        });
    }

    fn performance_metric(&self, operation: &str, duration: Duration, _metrics: Value) {
        self.lock().push(RecordedEvent::Metric {
            operation: operation.to_string(),
            duration,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_sink_filters() {
        let sink = RecordingEventSink::new();
        sink.business_event(names::JOB_ENQUEUED, names::SUCCESS, json!({"jobId": "1"}));
        sink.business_event(names::JOB_PROCESSED, names::SUCCESS, json!({"jobId": "1"}));
        sink.error_event(names::JOB_ENQUEUE, "store down", json!({"queueName": "email"}));
        sink.performance_metric(names::JOB_PROCESSING, Duration::from_millis(5), json!({}));

        assert_eq!(sink.events().len(), 4);
        assert_eq!(sink.business(names::JOB_ENQUEUED, names::SUCCESS).len(), 1);
        assert!(sink.business(names::JOB_ENQUEUED, names::FAILED).is_empty());

        let errors = sink.errors(names::JOB_ENQUEUE);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "store down");
        assert_eq!(errors[0].1["queueName"], "email");
    }

    #[test]
    fn test_log_sink_accepts_events() {
        let sink = LogEventSink;
        sink.business_event(names::JOB_PROCESSED, names::SUCCESS, json!({"duration": 1}));
        sink.error_event(names::JOB_DESERIALIZE, "bad json", json!({}));
        sink.performance_metric(names::JOB_PROCESSING, Duration::from_millis(1), json!({}));
    }
}
