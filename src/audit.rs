//! Audit records and performance samples.
//!
//! Every collect call writes one audit record and one performance sample,
//! best-effort: a sink failure is logged and never changes the caller's
//! result. The in-memory sink backs the prototype and the test suites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;

/// Append-only record of one collection call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCollectionAudit {
    /// Unique id of the collect call
    pub operation_id: Uuid,
    /// Registered operation name
    pub operation_name: String,
    /// Device reference as given by the caller; kept verbatim so calls
    /// against unresolved references still audit
    pub device_id: String,
    /// Record time
    pub timestamp: DateTime<Utc>,
    /// Whether the call succeeded
    pub success: bool,
    /// Wall-clock duration
    pub execution_time_ms: u64,
    /// Size of the returned payload in bytes
    pub data_size_bytes: u64,
    /// Whether the answer came from the cache
    pub cached: bool,
    /// The command after parameter substitution, when one was built
    pub command_used: Option<String>,
    /// Failure detail for unsuccessful calls
    pub error_message: Option<String>,
    /// Free-form JSON metadata
    pub metadata: Value,
}

/// Per-call performance rollup.
///
/// Duration percentiles are degenerate for single-call rows and carry the
/// call's own duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePerformanceSample {
    /// Sample time
    pub timestamp: DateTime<Utc>,
    /// Emitting service name
    pub service_name: String,
    /// Operations in this sample (always 1 for per-call rows)
    pub total_operations: u64,
    /// Successful operations
    pub successful_operations: u64,
    /// Failed operations
    pub failed_operations: u64,
    /// Timed-out operations
    pub timeout_operations: u64,
    /// Retries consumed
    pub retry_operations: u64,
    /// Average duration in milliseconds
    pub avg_duration_ms: f64,
    /// Minimum duration in milliseconds
    pub min_duration_ms: f64,
    /// Maximum duration in milliseconds
    pub max_duration_ms: f64,
    /// 95th percentile duration
    pub p95_duration_ms: f64,
    /// 99th percentile duration
    pub p99_duration_ms: f64,
    /// Cache hits in this sample
    pub cache_hits: u64,
    /// Cache misses in this sample
    pub cache_misses: u64,
}

impl ServicePerformanceSample {
    /// Build a single-call sample where all duration stats collapse to the
    /// call's own duration
    #[must_use]
    pub fn single_call(
        service_name: impl Into<String>,
        duration_ms: u64,
        success: bool,
        timed_out: bool,
        retries: u64,
        cached: bool,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let duration = duration_ms as f64;
        Self {
            timestamp: Utc::now(),
            service_name: service_name.into(),
            total_operations: 1,
            successful_operations: u64::from(success),
            failed_operations: u64::from(!success),
            timeout_operations: u64::from(timed_out),
            retry_operations: retries,
            avg_duration_ms: duration,
            min_duration_ms: duration,
            max_duration_ms: duration,
            p95_duration_ms: duration,
            p99_duration_ms: duration,
            cache_hits: u64::from(cached),
            cache_misses: u64::from(!cached),
        }
    }
}

/// Destination for audit records and performance samples
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an audit record; returns a sink-assigned id when available
    async fn append(&self, record: DataCollectionAudit) -> Result<Option<i64>>;

    /// Record a performance sample
    async fn record_sample(&self, sample: ServicePerformanceSample) -> Result<()>;
}

/// In-memory audit sink used by the prototype and the test suites
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<DataCollectionAudit>>,
    samples: Mutex<Vec<ServicePerformanceSample>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All audit records appended so far
    pub async fn records(&self) -> Vec<DataCollectionAudit> {
        self.records.lock().await.clone()
    }

    /// All performance samples recorded so far
    pub async fn samples(&self) -> Vec<ServicePerformanceSample> {
        self.samples.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: DataCollectionAudit) -> Result<Option<i64>> {
        let mut records = self.records.lock().await;
        records.push(record);
        let id = i64::try_from(records.len()).unwrap_or(i64::MAX);
        Ok(Some(id))
    }

    async fn record_sample(&self, sample: ServicePerformanceSample) -> Result<()> {
        self.samples.lock().await.push(sample);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_assigns_sequential_ids() {
        let sink = MemoryAuditSink::new();
        let record = DataCollectionAudit {
            operation_id: Uuid::new_v4(),
            operation_name: "list_containers".into(),
            device_id: "host-a".into(),
            timestamp: Utc::now(),
            success: true,
            execution_time_ms: 42,
            data_size_bytes: 128,
            cached: false,
            command_used: Some("docker ps -a".into()),
            error_message: None,
            metadata: Value::Null,
        };
        assert_eq!(sink.append(record.clone()).await.unwrap(), Some(1));
        assert_eq!(sink.append(record).await.unwrap(), Some(2));
        assert_eq!(sink.records().await.len(), 2);
    }

    #[test]
    fn test_single_call_sample_degenerate_percentiles() {
        let sample = ServicePerformanceSample::single_call("collector", 250, true, false, 1, false);
        assert_eq!(sample.total_operations, 1);
        assert_eq!(sample.successful_operations, 1);
        assert!((sample.p95_duration_ms - 250.0).abs() < f64::EPSILON);
        assert!((sample.p99_duration_ms - sample.avg_duration_ms).abs() < f64::EPSILON);
        assert_eq!(sample.cache_misses, 1);
    }
}
