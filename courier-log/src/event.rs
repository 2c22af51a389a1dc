//! Structured JSON events.
//!
//! Three shapes are emitted, each as a single JSON object inside the log
//! message:
//!
//! - business events: `{"event", "action", "timestamp", "data"}` at info
//! - performance metrics: `{"event": "PERFORMANCE", "operation", "duration", "metrics", "timestamp"}` at info
//! - errors: `{"event": "ERROR", "operation", "message", "context", "timestamp"}` at error

use crate::{Level, log};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const TARGET: &str = "courier::event";

#[derive(Debug, Serialize)]
struct BusinessEvent<'a> {
    event: &'a str,
    action: &'a str,
    timestamp: i64,
    data: &'a Value,
}

#[derive(Debug, Serialize)]
struct PerformanceMetric<'a> {
    event: &'static str,
    operation: &'a str,
    duration: u64,
    metrics: &'a Value,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct ErrorEvent<'a> {
    event: &'static str,
    operation: &'a str,
    message: &'a str,
    context: &'a Value,
    timestamp: i64,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Render a business event record.
pub fn render_business_event(event: &str, action: &str, data: &Value) -> Value {
    serde_json::to_value(BusinessEvent {
        event,
        action,
        timestamp: now_millis(),
        data,
    })
    .unwrap_or(Value::Null)
}

/// Render a performance metric record. `duration` is reported in milliseconds.
pub fn render_performance_metric(operation: &str, duration: Duration, metrics: &Value) -> Value {
    serde_json::to_value(PerformanceMetric {
        event: "PERFORMANCE",
        operation,
        duration: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        metrics,
        timestamp: now_millis(),
    })
    .unwrap_or(Value::Null)
}

/// Render an error record.
pub fn render_error_event(operation: &str, message: &str, context: &Value) -> Value {
    serde_json::to_value(ErrorEvent {
        event: "ERROR",
        operation,
        message,
        context,
        timestamp: now_millis(),
    })
    .unwrap_or(Value::Null)
}

/// Emit a business event at info level.
pub fn business_event(event: &str, action: &str, data: &Value) {
    log(
        Level::Info,
        TARGET,
        &format!("Business Event: {}", render_business_event(event, action, data)),
    );
}

/// Emit a performance metric at info level.
pub fn performance_metric(operation: &str, duration: Duration, metrics: &Value) {
    log(
        Level::Info,
        TARGET,
        &format!(
            "Performance Metric: {}",
            render_performance_metric(operation, duration, metrics)
        ),
    );
}

/// Emit an error event at error level.
pub fn error_event(operation: &str, message: &str, context: &Value) {
    log(
        Level::Error,
        TARGET,
        &format!(
            "Application Error: {}",
            render_error_event(operation, message, context)
        ),
    );
}
