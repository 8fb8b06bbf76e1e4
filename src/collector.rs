//! Unified data collection service.
//!
//! The single entry point for every remote read. A collect call resolves
//! the command, consults the cache, executes through the transport,
//! validates the output, writes an audit record and a performance sample,
//! publishes a change event, and returns a typed result. The call never
//! returns `Err` and never panics: every failure becomes a
//! [`CollectionResult`] with a stable error code.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditSink, DataCollectionAudit, ServicePerformanceSample};
use crate::cache::{CacheManager, CacheStats};
use crate::client::{CommandTransport, ExecOptions};
use crate::device::{CollectionStatus, DeviceStatus, DeviceStore};
use crate::error::Error;
use crate::events::{DataCollectedEvent, Event, EventBus};
use crate::parsers;
use crate::registry::{CommandCategory, CommandDefinition, CommandRegistry};

/// Service name stamped on performance samples
const SERVICE_NAME: &str = "unified_data_collection";

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Cap on concurrent collect executions
    pub max_concurrent_operations: usize,
    /// Timeout when neither the caller nor the command carries one
    pub default_timeout: Duration,
    /// Whether audit records are written
    pub enable_audit_trail: bool,
    /// Whether performance samples are written
    pub enable_performance_tracking: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 10,
            default_timeout: Duration::from_secs(30),
            enable_audit_trail: true,
            enable_performance_tracking: true,
        }
    }
}

/// Result of one collect call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResult {
    /// Globally unique id of this call
    pub operation_id: Uuid,
    /// Registered operation name
    pub operation_name: String,
    /// Device reference as given by the caller
    pub device_id: String,
    /// Whether the call succeeded
    pub success: bool,
    /// Collected payload; `None` on failure
    pub data: Option<Value>,
    /// Whether the payload came from the cache
    pub cached: bool,
    /// Wall-clock duration of the call
    pub execution_time_ms: u64,
    /// Failure detail
    pub error_message: Option<String>,
    /// Stable failure code from the error taxonomy
    pub error_code: Option<String>,
    /// The command after parameter substitution, when one was built
    pub command_used: Option<String>,
    /// Whether output validation passed
    pub validation_passed: bool,
    /// Audit sink id for this call's record, when the sink assigned one
    pub audit_id: Option<i64>,
    /// Free-form metadata (exit code, detected errors, category)
    pub metadata: Value,
}

/// One in-flight collect call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveOperation {
    /// Operation id of the call
    pub operation_id: Uuid,
    /// Registered operation name
    pub operation_name: String,
    /// Device reference as given
    pub device_ref: String,
    /// Call parameters
    pub parameters: BTreeMap<String, String>,
    /// When the call started
    pub started_at: DateTime<Utc>,
}

/// Scope selector for targeted cache invalidation
#[derive(Debug, Clone)]
pub enum CacheScope {
    /// One operation on one device
    Operation {
        /// Operation name
        operation: String,
        /// Device reference
        device_ref: String,
    },
    /// Everything for one device
    Device(String),
    /// Everything in one category
    Category(CommandCategory),
    /// The whole cache
    All,
}

/// Running counters for the collector
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OperationStats {
    /// Calls completed
    pub total_operations: u64,
    /// Calls that succeeded
    pub successful_operations: u64,
    /// Calls that failed
    pub failed_operations: u64,
    /// Calls answered from the cache
    pub cached_operations: u64,
    /// Rolling average call duration
    pub avg_execution_time_ms: f64,
}

/// Snapshot returned by [`UnifiedCollector::statistics`]
#[derive(Debug, Clone)]
pub struct CollectorStatistics {
    /// Running call counters
    pub operations: OperationStats,
    /// Cache counters
    pub cache: CacheStats,
    /// Registered command count
    pub registered_commands: usize,
    /// Calls currently in flight
    pub active_operations: usize,
}

/// The orchestrator for all remote reads
pub struct UnifiedCollector {
    registry: Arc<CommandRegistry>,
    cache: Arc<CacheManager>,
    transport: Arc<dyn CommandTransport>,
    devices: Arc<dyn DeviceStore>,
    audit: Arc<dyn AuditSink>,
    bus: EventBus,
    config: CollectorConfig,
    slots: Arc<Semaphore>,
    active: Arc<std::sync::Mutex<HashMap<Uuid, ActiveOperation>>>,
    stats: Mutex<OperationStats>,
    running: AtomicBool,
}

/// Removes the active-operation entry even when the collect future is
/// cancelled mid-flight.
struct ActiveGuard {
    active: Arc<std::sync::Mutex<HashMap<Uuid, ActiveOperation>>>,
    operation_id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .expect("active operations lock")
            .remove(&self.operation_id);
    }
}

impl std::fmt::Debug for UnifiedCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedCollector")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl UnifiedCollector {
    /// Build a collector over the given services. Call [`Self::start`]
    /// before collecting.
    #[must_use]
    pub fn new(
        registry: Arc<CommandRegistry>,
        cache: Arc<CacheManager>,
        transport: Arc<dyn CommandTransport>,
        devices: Arc<dyn DeviceStore>,
        audit: Arc<dyn AuditSink>,
        bus: EventBus,
        config: CollectorConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_operations));
        Self {
            registry,
            cache,
            transport,
            devices,
            audit,
            bus,
            config,
            slots,
            active: Arc::new(std::sync::Mutex::new(HashMap::new())),
            stats: Mutex::new(OperationStats::default()),
            running: AtomicBool::new(false),
        }
    }

    /// Mark the service started
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            max_concurrent = self.config.max_concurrent_operations,
            audit_trail = self.config.enable_audit_trail,
            "unified data collection service started"
        );
    }

    /// Mark the service stopped; in-flight calls finish, new calls fail
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("unified data collection service stopped");
    }

    /// The event bus the collector publishes on
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Collect data from a device with intelligent caching.
    ///
    /// This is the primary read path. It never returns an error; failures
    /// arrive as a result with `success=false` and a stable `error_code`.
    pub async fn collect(
        &self,
        operation_name: &str,
        device_ref: &str,
        parameters: BTreeMap<String, String>,
        force_refresh: bool,
        timeout_override: Option<Duration>,
        audit_metadata: Value,
    ) -> CollectionResult {
        let operation_id = Uuid::new_v4();
        let started = Instant::now();

        if !self.running.load(Ordering::SeqCst) {
            return self.fail_unaudited(
                operation_id,
                operation_name,
                device_ref,
                started,
                &Error::unavailable(SERVICE_NAME),
            );
        }

        // Unknown operations fail before any audit or execution
        let Some(command) = self.registry.get(operation_name) else {
            return self.fail_unaudited(
                operation_id,
                operation_name,
                device_ref,
                started,
                &Error::UnknownOperation {
                    operation: operation_name.to_string(),
                },
            );
        };

        self.active.lock().expect("active operations lock").insert(
            operation_id,
            ActiveOperation {
                operation_id,
                operation_name: operation_name.to_string(),
                device_ref: device_ref.to_string(),
                parameters: parameters.clone(),
                started_at: Utc::now(),
            },
        );
        let _active = ActiveGuard {
            active: Arc::clone(&self.active),
            operation_id,
        };

        let mut result = self
            .collect_inner(
                operation_id,
                operation_name,
                device_ref,
                &parameters,
                force_refresh,
                timeout_override,
                &command,
                started,
            )
            .await;

        // One audit record per call, best-effort, both outcomes
        if self.config.enable_audit_trail {
            result.audit_id = self.write_audit(&result, &parameters, audit_metadata).await;
        }
        if self.config.enable_performance_tracking {
            self.write_sample(&result).await;
        }
        if result.success && !result.cached {
            self.emit_data_collected(&result, &command).await;
        }
        self.update_stats(&result).await;

        if !result.success {
            error!(
                operation = operation_name,
                device = device_ref,
                code = result.error_code.as_deref().unwrap_or("unknown"),
                "data collection failed"
            );
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn collect_inner(
        &self,
        operation_id: Uuid,
        operation_name: &str,
        device_ref: &str,
        parameters: &BTreeMap<String, String>,
        force_refresh: bool,
        timeout_override: Option<Duration>,
        command: &CommandDefinition,
        started: Instant,
    ) -> CollectionResult {
        let category = command.category.as_str();

        // Cache first, unless the caller forces a refresh
        if command.cache_ttl_seconds > 0 && !force_refresh {
            let (value, hit) = self
                .cache
                .get(operation_name, device_ref, category, parameters, false)
                .await;
            if hit {
                debug!(operation = operation_name, device = device_ref, "cache hit");
                return CollectionResult {
                    operation_id,
                    operation_name: operation_name.to_string(),
                    device_id: device_ref.to_string(),
                    success: true,
                    data: value,
                    cached: true,
                    execution_time_ms: elapsed_ms(started),
                    error_message: None,
                    error_code: None,
                    command_used: Some(command.command_template.clone()),
                    validation_passed: true,
                    audit_id: None,
                    metadata: json!({ "cache_hit": true, "command_category": category }),
                };
            }
        }

        // Resolve the device
        let device = match self.devices.resolve(device_ref).await {
            Ok(device) => device,
            Err(e) => return self.fail(operation_id, operation_name, device_ref, started, &e),
        };

        // Substitute parameters
        let Some(formatted) = command.format(parameters) else {
            let missing = command
                .missing_parameters(parameters)
                .first()
                .cloned()
                .unwrap_or_default();
            return self.fail(
                operation_id,
                operation_name,
                device_ref,
                started,
                &Error::InvalidParameters {
                    operation: operation_name.to_string(),
                    missing,
                },
            );
        };

        // Execute under the global concurrency cap
        let Ok(_slot) = self.slots.acquire().await else {
            return self.fail(
                operation_id,
                operation_name,
                device_ref,
                started,
                &Error::unavailable(SERVICE_NAME),
            );
        };

        // Effective timeout: caller override, else the command's own,
        // else the service default
        let timeout = timeout_override
            .unwrap_or_else(|| {
                if command.timeout_seconds > 0 {
                    Duration::from_secs(command.timeout_seconds)
                } else {
                    self.config.default_timeout
                }
            })
            .max(Duration::from_secs(1));
        let options = ExecOptions::default()
            .timeout(timeout)
            .retries(command.retry_count)
            .retry_delay_seconds(command.retry_delay_seconds)
            .expected_exit_codes(command.expected_exit_codes.iter().copied());

        let execution = self
            .transport
            .execute(&device.connection_info(), &formatted, options)
            .await;

        let execution = match execution {
            Ok(execution) => execution,
            Err(e) => {
                self.record_device_failure(device.id, &e).await;
                let mut result =
                    self.fail(operation_id, operation_name, device_ref, started, &e);
                result.command_used = Some(formatted);
                return result;
            }
        };

        // Success requires the exit code, the validation patterns, and the
        // absence of error patterns, all together
        let validation_passed = command.validate_output(&execution.stdout);
        let detected_errors = command.detect_errors(&execution.stdout);
        let success = execution.success && validation_passed && detected_errors.is_empty();

        let data = if success {
            let payload = parsers::parse(command.category, operation_name, &execution.stdout);
            if command.cache_ttl_seconds > 0 && !payload.is_null() {
                self.cache
                    .set(
                        operation_name,
                        device_ref,
                        payload.clone(),
                        category,
                        parameters,
                        command.cache_ttl_seconds,
                        json!({
                            "operation_id": operation_id,
                            "execution_time_ms": execution.execution_time_ms,
                        }),
                    )
                    .await;
            }
            Some(payload)
        } else {
            None
        };

        self.record_device_outcome(device.id, success).await;

        CollectionResult {
            operation_id,
            operation_name: operation_name.to_string(),
            device_id: device_ref.to_string(),
            success,
            data,
            cached: false,
            execution_time_ms: elapsed_ms(started),
            error_message: if success {
                None
            } else if execution.stderr.trim().is_empty() {
                Some(format!(
                    "validation failed (exit code {})",
                    execution.exit_code
                ))
            } else {
                Some(execution.stderr.clone())
            },
            error_code: (!success).then(|| "COMMAND_EXECUTION_FAILED".to_string()),
            command_used: Some(formatted),
            validation_passed,
            audit_id: None,
            metadata: json!({
                "exit_code": execution.exit_code,
                "detected_errors": detected_errors,
                "command_category": category,
                "device_hostname": device.hostname,
                "retry_attempts": execution.attempts.saturating_sub(1),
            }),
        }
    }

    /// Targeted cache invalidation; returns the number of entries removed
    pub async fn invalidate_cache(&self, scope: CacheScope) -> usize {
        match scope {
            CacheScope::Operation {
                operation,
                device_ref,
            } => usize::from(self.cache.invalidate(&operation, &device_ref).await),
            CacheScope::Device(device_ref) => self.cache.invalidate_device(&device_ref).await,
            CacheScope::Category(category) => {
                self.cache.invalidate_by_type(category.as_str()).await
            }
            CacheScope::All => self.cache.clear().await,
        }
    }

    /// Calls currently in flight, with their parameters
    pub fn active_operations(&self) -> Vec<ActiveOperation> {
        self.active
            .lock()
            .expect("active operations lock")
            .values()
            .cloned()
            .collect()
    }

    /// Counter snapshot across operations, cache, and registry
    pub async fn statistics(&self) -> CollectorStatistics {
        CollectorStatistics {
            operations: *self.stats.lock().await,
            cache: self.cache.stats().await,
            registered_commands: self.registry.len(),
            active_operations: self.active.lock().expect("active operations lock").len(),
        }
    }

    fn fail_unaudited(
        &self,
        operation_id: Uuid,
        operation_name: &str,
        device_ref: &str,
        started: Instant,
        error: &Error,
    ) -> CollectionResult {
        self.fail(operation_id, operation_name, device_ref, started, error)
    }

    fn fail(
        &self,
        operation_id: Uuid,
        operation_name: &str,
        device_ref: &str,
        started: Instant,
        error: &Error,
    ) -> CollectionResult {
        CollectionResult {
            operation_id,
            operation_name: operation_name.to_string(),
            device_id: device_ref.to_string(),
            success: false,
            data: None,
            cached: false,
            execution_time_ms: elapsed_ms(started),
            error_message: Some(error.to_string()),
            error_code: Some(error.error_code().to_string()),
            command_used: None,
            validation_passed: !matches!(error, Error::ExecutionFailed { .. }),
            audit_id: None,
            metadata: json!({ "error_category": error.category() }),
        }
    }

    async fn write_audit(
        &self,
        result: &CollectionResult,
        parameters: &BTreeMap<String, String>,
        audit_metadata: Value,
    ) -> Option<i64> {
        let data_size = result
            .data
            .as_ref()
            .map(|d| d.to_string().len() as u64)
            .unwrap_or(0);
        let record = DataCollectionAudit {
            operation_id: result.operation_id,
            operation_name: result.operation_name.clone(),
            device_id: result.device_id.clone(),
            timestamp: Utc::now(),
            success: result.success,
            execution_time_ms: result.execution_time_ms,
            data_size_bytes: data_size,
            cached: result.cached,
            command_used: result.command_used.clone(),
            error_message: result.error_message.clone(),
            metadata: json!({
                "parameters": parameters,
                "caller": audit_metadata,
                "result": result.metadata,
            }),
        };
        match self.audit.append(record).await {
            Ok(id) => id,
            Err(e) => {
                // Audit failures never change the caller's result
                warn!(error = %e, "failed to write audit record");
                None
            }
        }
    }

    async fn write_sample(&self, result: &CollectionResult) {
        let timed_out = result.error_code.as_deref() == Some("SSH_TIMEOUT_ERROR");
        let retries = result
            .metadata
            .get("retry_attempts")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let sample = ServicePerformanceSample::single_call(
            SERVICE_NAME,
            result.execution_time_ms,
            result.success,
            timed_out,
            retries,
            result.cached,
        );
        if let Err(e) = self.audit.record_sample(sample).await {
            warn!(error = %e, "failed to record performance sample");
        }
    }

    async fn emit_data_collected(&self, result: &CollectionResult, command: &CommandDefinition) {
        let Ok(device) = self.devices.resolve(&result.device_id).await else {
            return;
        };
        self.bus.emit(Event::DataCollected(DataCollectedEvent {
            operation_id: result.operation_id,
            operation_name: result.operation_name.clone(),
            device_id: device.id,
            timestamp: Utc::now(),
            data_category: command.category.as_str().to_string(),
            execution_time_ms: result.execution_time_ms,
        }));
    }

    async fn update_stats(&self, result: &CollectionResult) {
        let mut stats = self.stats.lock().await;
        stats.total_operations += 1;
        if result.success {
            stats.successful_operations += 1;
        } else {
            stats.failed_operations += 1;
        }
        if result.cached {
            stats.cached_operations += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            let n = stats.total_operations as f64;
            stats.avg_execution_time_ms +=
                (result.execution_time_ms as f64 - stats.avg_execution_time_ms) / n;
        }
    }

    async fn record_device_outcome(&self, device_id: Uuid, success: bool) {
        let now = Utc::now();
        let outcome = self
            .devices
            .update(
                device_id,
                Box::new(move |device| {
                    device.last_seen = Some(now);
                    device.status = DeviceStatus::Online;
                    if success {
                        device.last_collection_status = CollectionStatus::Success;
                        device.last_successful_collection = Some(now);
                        device.collection_error_count = 0;
                    } else {
                        device.last_collection_status = CollectionStatus::Failed;
                        device.collection_error_count += 1;
                    }
                }),
            )
            .await;
        if let Err(e) = outcome {
            warn!(error = %e, "failed to record device collection outcome");
        }
    }

    async fn record_device_failure(&self, device_id: Uuid, error: &Error) {
        let status = match error {
            Error::Timeout { .. } => CollectionStatus::Timeout,
            _ => CollectionStatus::Failed,
        };
        let went_offline = matches!(error, Error::Connection { .. });
        let outcome = self
            .devices
            .update(
                device_id,
                Box::new(move |device| {
                    device.last_collection_status = status;
                    device.collection_error_count += 1;
                    if went_offline {
                        device.status = DeviceStatus::Offline;
                    }
                }),
            )
            .await;
        if let Err(e) = outcome {
            warn!(error = %e, "failed to record device collection failure");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
