//! Request event reporting
//!
//! Every fetch attempt a session makes is reported exactly once to an
//! [`EventSink`], successful or not. Sinks are shared by all sessions of a
//! load run, so implementations must tolerate concurrent calls.
//!
//! - [`TracingSink`] logs each record
//! - [`RequestStats`] aggregates per request name
//! - [`EventLog`] keeps timestamped records
//! - [`MultiSink`] fans out to several sinks

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Receives one report per fetch attempt
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn report_success(&self, name: &str, elapsed_millis: u64, response_bytes: u64);

    async fn report_failure(&self, name: &str, elapsed_millis: u64, error: &FetchError);
}

/// A single request outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RequestEvent {
    Success {
        name: String,
        elapsed_ms: u64,
        response_bytes: u64,
    },
    Failure {
        name: String,
        elapsed_ms: u64,
        code: String,
        message: String,
    },
}

impl RequestEvent {
    pub fn name(&self) -> &str {
        match self {
            RequestEvent::Success { name, .. } | RequestEvent::Failure { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestEvent::Success { .. })
    }
}

/// Request event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEventRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Sequence number
    pub sequence: u64,
    /// The event
    #[serde(flatten)]
    pub event: RequestEvent,
}

/// Logs every report at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn report_success(&self, name: &str, elapsed_millis: u64, response_bytes: u64) {
        debug!(name, elapsed_ms = elapsed_millis, bytes = response_bytes, "Request succeeded");
    }

    async fn report_failure(&self, name: &str, elapsed_millis: u64, error: &FetchError) {
        debug!(name, elapsed_ms = elapsed_millis, error = %error, "Request failed");
    }
}

/// Keeps every report as a timestamped record
#[derive(Debug, Default)]
pub struct EventLog {
    sequence: RwLock<u64>,
    records: RwLock<Vec<RequestEventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    async fn push(&self, event: RequestEvent) {
        let mut seq = self.sequence.write().await;
        *seq += 1;

        let record = RequestEventRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sequence: *seq,
            event,
        };
        self.records.write().await.push(record);
    }

    /// Get all recorded events in report order
    pub async fn get_events(&self) -> Vec<RequestEventRecord> {
        self.records.read().await.clone()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl EventSink for EventLog {
    async fn report_success(&self, name: &str, elapsed_millis: u64, response_bytes: u64) {
        self.push(RequestEvent::Success {
            name: name.to_string(),
            elapsed_ms: elapsed_millis,
            response_bytes,
        })
        .await;
    }

    async fn report_failure(&self, name: &str, elapsed_millis: u64, error: &FetchError) {
        self.push(RequestEvent::Failure {
            name: name.to_string(),
            elapsed_ms: elapsed_millis,
            code: error.error_code().to_string(),
            message: error.to_string(),
        })
        .await;
    }
}

/// Aggregated statistics for one request name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestStatsEntry {
    pub name: String,
    /// Attempts, successful or not
    pub requests: u64,
    pub failures: u64,
    pub total_response_ms: u64,
    pub min_response_ms: Option<u64>,
    pub max_response_ms: u64,
    /// Sum of reported response sizes of successful requests
    pub total_bytes: u64,
    /// Failure count per error code
    pub errors: BTreeMap<String, u64>,
}

impl RequestStatsEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, elapsed_millis: u64) {
        self.requests += 1;
        self.total_response_ms += elapsed_millis;
        self.max_response_ms = self.max_response_ms.max(elapsed_millis);
        self.min_response_ms = Some(
            self.min_response_ms
                .map_or(elapsed_millis, |min| min.min(elapsed_millis)),
        );
    }

    fn merge(&mut self, other: &RequestStatsEntry) {
        self.requests += other.requests;
        self.failures += other.failures;
        self.total_response_ms += other.total_response_ms;
        self.max_response_ms = self.max_response_ms.max(other.max_response_ms);
        self.min_response_ms = match (self.min_response_ms, other.min_response_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.total_bytes += other.total_bytes;
        for (code, count) in &other.errors {
            *self.errors.entry(code.clone()).or_default() += count;
        }
    }

    pub fn successes(&self) -> u64 {
        self.requests - self.failures
    }

    /// Mean response time in milliseconds
    pub fn avg_response_ms(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.total_response_ms as f64 / self.requests as f64
    }

    /// Mean response size of successful requests
    pub fn avg_bytes(&self) -> f64 {
        match self.successes() {
            0 => 0.0,
            n => self.total_bytes as f64 / n as f64,
        }
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.failures as f64 / self.requests as f64
    }
}

/// Thread-safe per-name request aggregate
#[derive(Debug)]
pub struct RequestStats {
    entries: RwLock<BTreeMap<String, RequestStatsEntry>>,
    started_at: DateTime<Utc>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            started_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Entries sorted by request name
    pub async fn snapshot(&self) -> Vec<RequestStatsEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Statistics for one request name
    pub async fn entry(&self, name: &str) -> Option<RequestStatsEntry> {
        self.entries.read().await.get(name).cloned()
    }

    /// All names merged into a single `Total` row
    pub async fn total(&self) -> RequestStatsEntry {
        let entries = self.entries.read().await;
        let mut total = RequestStatsEntry::new("Total");
        for entry in entries.values() {
            total.merge(entry);
        }
        total
    }

    pub async fn reset(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for RequestStats {
    async fn report_success(&self, name: &str, elapsed_millis: u64, response_bytes: u64) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(|| RequestStatsEntry::new(name));
        entry.record(elapsed_millis);
        entry.total_bytes += response_bytes;
    }

    async fn report_failure(&self, name: &str, elapsed_millis: u64, error: &FetchError) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(|| RequestStatsEntry::new(name));
        entry.record(elapsed_millis);
        entry.failures += 1;
        *entry.errors.entry(error.error_code().to_string()).or_default() += 1;
    }
}

/// Forwards every report to each inner sink in order
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventSink for MultiSink {
    async fn report_success(&self, name: &str, elapsed_millis: u64, response_bytes: u64) {
        for sink in &self.sinks {
            sink.report_success(name, elapsed_millis, response_bytes).await;
        }
    }

    async fn report_failure(&self, name: &str, elapsed_millis: u64, error: &FetchError) {
        for sink in &self.sinks {
            sink.report_failure(name, elapsed_millis, error).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_aggregate_per_name() {
        let stats = RequestStats::new();
        stats.report_success("master", 10, 512).await;
        stats.report_success("master", 30, 512).await;
        stats.report_failure("master", 5, &FetchError::Http(503)).await;
        stats.report_success("Segment (a.m3u8)", 100, 4096).await;

        let master = stats.entry("master").await.unwrap();
        assert_eq!(master.requests, 3);
        assert_eq!(master.failures, 1);
        assert_eq!(master.successes(), 2);
        assert_eq!(master.min_response_ms, Some(5));
        assert_eq!(master.max_response_ms, 30);
        assert_eq!(master.total_bytes, 1024);
        assert_eq!(master.errors.get("HTTP"), Some(&1));
        assert!((master.avg_response_ms() - 15.0).abs() < 1e-9);
        assert!((master.avg_bytes() - 512.0).abs() < 1e-9);

        let total = stats.total().await;
        assert_eq!(total.requests, 4);
        assert_eq!(total.failures, 1);
        assert_eq!(total.total_bytes, 5120);
        assert_eq!(total.min_response_ms, Some(5));
        assert_eq!(total.max_response_ms, 100);
        assert_eq!(stats.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_concurrent_reports() {
        let stats = Arc::new(RequestStats::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    stats.report_success("segment", 1, 10).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let entry = stats.entry("segment").await.unwrap();
        assert_eq!(entry.requests, 400);
        assert_eq!(entry.total_bytes, 4000);
    }

    #[tokio::test]
    async fn test_event_log_sequence() {
        let log = EventLog::new();
        log.report_success("a", 1, 2).await;
        log.report_failure("b", 3, &FetchError::Timeout).await;

        let events = log.get_events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert!(events[0].event.is_success());
        assert_eq!(events[1].event.name(), "b");
        match &events[1].event {
            RequestEvent::Failure { code, .. } => assert_eq!(code, "TIMEOUT"),
            other => panic!("unexpected event {:?}", other),
        }

        let json = serde_json::to_value(&events[1]).unwrap();
        assert_eq!(json["event"], "failure");
        assert_eq!(json["sequence"], 2);
    }

    #[tokio::test]
    async fn test_multi_sink_fans_out() {
        let stats = Arc::new(RequestStats::new());
        let log = Arc::new(EventLog::new());
        let sink = MultiSink::new()
            .with(stats.clone())
            .with(log.clone())
            .with(Arc::new(TracingSink));

        sink.report_success("x", 1, 1).await;
        assert_eq!(stats.total().await.requests, 1);
        assert_eq!(log.get_events().await.len(), 1);
    }
}
