//! Job processors and their registry.

use crate::error::{ProcessError, QueueError, QueueResult};
use crate::job::{DEFAULT_MAX_RETRIES, Payload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Handler for one job type.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Tag this processor answers to, matched exactly.
    fn job_type(&self) -> &str;

    /// Retry budget for new jobs of this type.
    fn max_retries(&self) -> u32 {
        DEFAULT_MAX_RETRIES
    }

    /// Run the job. Any error is retried with backoff.
    async fn process(&self, payload: &Payload) -> Result<(), ProcessError>;
}

/// Processor built from an async closure.
///
/// ```
/// use courier_queue::{FnProcessor, ProcessorRegistry};
///
/// let mut registry = ProcessorRegistry::new();
/// registry
///     .register(FnProcessor::new("cleanup", |_payload| async { Ok(()) }))
///     .unwrap();
/// assert!(registry.get("cleanup").is_some());
/// ```
pub struct FnProcessor<F> {
    job_type: String,
    max_retries: u32,
    handler: F,
}

impl<F, Fut> FnProcessor<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessError>> + Send,
{
    /// Processor for `job_type` with the default retry budget.
    pub fn new(job_type: impl Into<String>, handler: F) -> Self {
        Self {
            job_type: job_type.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            handler,
        }
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl<F, Fut> JobProcessor for FnProcessor<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessError>> + Send,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn process(&self, payload: &Payload) -> Result<(), ProcessError> {
        (self.handler)(payload.clone()).await
    }
}

/// Processors keyed by job type.
///
/// Filled at startup, then shared read-only between worker loops.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn JobProcessor>>,
}

impl ProcessorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a processor. Each job type may be claimed once.
    pub fn register<P>(&mut self, processor: P) -> QueueResult<&mut Self>
    where
        P: JobProcessor + 'static,
    {
        self.register_arc(Arc::new(processor))
    }

    /// Add a shared processor.
    pub fn register_arc(&mut self, processor: Arc<dyn JobProcessor>) -> QueueResult<&mut Self> {
        let job_type = processor.job_type().to_string();
        if job_type.trim().is_empty() {
            return Err(QueueError::InvalidJob(
                "processor job type must not be empty".into(),
            ));
        }
        if self.processors.contains_key(&job_type) {
            return Err(QueueError::DuplicateProcessor(job_type));
        }
        self.processors.insert(job_type, processor);
        Ok(self)
    }

    /// Processor for `job_type`, by exact match.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobProcessor>> {
        self.processors.get(job_type).cloned()
    }

    /// Retry budget declared by the processor for `job_type`.
    pub fn max_retries_for(&self, job_type: &str) -> Option<u32> {
        self.processors.get(job_type).map(|p| p.max_retries())
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_fn_processor_runs_closure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let processor = FnProcessor::new("count", move |payload: Payload| {
            let counter = counter.clone();
            async move {
                assert!(payload.contains_key("n"));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let mut payload = Payload::new();
        payload.insert("n".into(), 1.into());
        processor.process(&payload).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(processor.max_retries(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(FnProcessor::new("EMAIL", |_| async { Ok(()) }))
            .unwrap();

        assert!(registry.get("EMAIL").is_some());
        assert!(registry.get("email").is_none());
        assert!(registry.get("EMAIL ").is_none());
    }

    #[test]
    fn test_duplicate_job_type_rejected() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(FnProcessor::new("EMAIL", |_| async { Ok(()) }))
            .unwrap();

        let err = registry
            .register(FnProcessor::new("EMAIL", |_| async { Ok(()) }))
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateProcessor(t) if t == "EMAIL"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_blank_job_type_rejected() {
        let mut registry = ProcessorRegistry::new();
        assert!(
            registry
                .register(FnProcessor::new("", |_| async { Ok(()) }))
                .is_err()
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_max_retries_for() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(FnProcessor::new("report", |_| async { Ok(()) }).with_max_retries(7))
            .unwrap()
            .register(FnProcessor::new("EMAIL", |_| async { Ok(()) }))
            .unwrap();

        assert_eq!(registry.max_retries_for("report"), Some(7));
        assert_eq!(registry.max_retries_for("EMAIL"), Some(3));
        assert_eq!(registry.max_retries_for("missing"), None);
        assert_eq!(registry.job_types(), vec!["EMAIL", "report"]);
    }
}
