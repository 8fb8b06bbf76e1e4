//! Acceptance tests for the unified data collection service, driven
//! through a scripted transport.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use fleetwatch::testing::{ScriptedOutcome, ScriptedTransport};
use fleetwatch::{
    CacheManager, CacheScope, CollectorConfig, CommandRegistry, Device, DeviceStatus, DeviceStore,
    EventBus, MemoryAuditSink, MemoryDeviceStore, UnifiedCollector,
};

const PS_TABLE: &str = "CONTAINER ID\tNAMES\tSTATUS\tIMAGE\tPORTS\n\
    aaa111\tc1\tUp 2 hours\tredis:7\t6379/tcp\n\
    bbb222\tc2\tUp 2 hours\tnginx:1.25\t80/tcp\n\
    ccc333\tc3\tExited (0)\tpostgres:16\t\n";

struct Harness {
    collector: UnifiedCollector,
    transport: Arc<ScriptedTransport>,
    audit: Arc<MemoryAuditSink>,
    devices: Arc<MemoryDeviceStore>,
    device_id: uuid::Uuid,
}

fn harness(transport: ScriptedTransport, config: CollectorConfig) -> Harness {
    let transport = Arc::new(transport);
    let audit = Arc::new(MemoryAuditSink::new());
    let device = Device::new("host-a").ssh_username("admin");
    let device_id = device.id;
    let devices = Arc::new(MemoryDeviceStore::with_devices([device]));

    let collector = UnifiedCollector::new(
        Arc::new(CommandRegistry::with_builtin_commands()),
        Arc::new(CacheManager::new()),
        Arc::clone(&transport) as Arc<dyn fleetwatch::CommandTransport>,
        Arc::clone(&devices) as Arc<dyn DeviceStore>,
        Arc::clone(&audit) as Arc<dyn fleetwatch::AuditSink>,
        EventBus::default(),
        config,
    );
    collector.start();

    Harness {
        collector,
        transport,
        audit,
        devices,
        device_id,
    }
}

fn no_params() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[tokio::test]
async fn cache_hit_within_ttl_returns_identical_data_without_ssh() {
    let h = harness(
        ScriptedTransport::new().respond("docker ps", PS_TABLE),
        CollectorConfig::default(),
    );

    let first = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(first.success);
    assert!(!first.cached);
    let data = first.data.clone().unwrap();
    assert_eq!(data.as_array().unwrap().len(), 3);
    assert_eq!(data[0]["names"], "c1");
    assert_eq!(h.transport.call_count("docker ps"), 1);

    let second = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(second.success);
    assert!(second.cached);
    assert_eq!(second.data, first.data);
    // No new SSH session was used for the cached answer
    assert_eq!(h.transport.call_count("docker ps"), 1);
}

#[tokio::test]
async fn force_refresh_bypasses_cache_and_writes_new_audit() {
    let h = harness(
        ScriptedTransport::new().respond("docker ps", PS_TABLE),
        CollectorConfig::default(),
    );

    let first = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(!first.cached);

    let refreshed = h
        .collector
        .collect("list_containers", "host-a", no_params(), true, None, Value::Null)
        .await;
    assert!(refreshed.success);
    assert!(!refreshed.cached);
    assert_eq!(h.transport.call_count("docker ps"), 2);

    let records = h.audit.records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].operation_id, first.operation_id);
    assert_eq!(records[1].operation_id, refreshed.operation_id);
}

#[tokio::test]
async fn validation_failure_on_truncated_output() {
    // get_system_info output missing the kernel banner, exit code 0
    let h = harness(
        ScriptedTransport::new().respond("uname -a", "PRETTY_NAME=\"Debian GNU/Linux 12\"\n"),
        CollectorConfig::default(),
    );

    let result = h
        .collector
        .collect("get_system_info", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(!result.success);
    assert!(!result.validation_passed);
    assert_eq!(result.error_code.as_deref(), Some("COMMAND_EXECUTION_FAILED"));
    assert!(result.data.is_none());

    // The cache must be untouched by the failure
    let stats = h.collector.statistics().await;
    assert_eq!(stats.cache.entries, 0);

    // A retry still goes to the device rather than the cache
    let again = h
        .collector
        .collect("get_system_info", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(!again.cached);
}

#[tokio::test]
async fn unknown_operation_fails_without_audit_or_execution() {
    let h = harness(ScriptedTransport::new(), CollectorConfig::default());

    let result = h
        .collector
        .collect("no_such_operation", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("UNKNOWN_OPERATION"));
    assert!(h.audit.records().await.is_empty());
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn device_not_found_is_reported_and_audited() {
    let h = harness(ScriptedTransport::new(), CollectorConfig::default());

    let result = h
        .collector
        .collect("list_containers", "host-z", no_params(), false, None, Value::Null)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("DEVICE_NOT_FOUND"));

    let records = h.audit.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].device_id, "host-z");
    assert!(!records[0].success);
}

#[tokio::test]
async fn missing_template_parameter_is_invalid_parameters() {
    let h = harness(ScriptedTransport::new(), CollectorConfig::default());

    let result = h
        .collector
        .collect("inspect_container", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("INVALID_PARAMETERS"));
    assert!(result.error_message.unwrap().contains("container_name"));
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn unreachable_device_maps_to_ssh_error_codes() {
    let h = harness(
        ScriptedTransport::new().on("docker ps", ScriptedOutcome::ConnectionError),
        CollectorConfig::default(),
    );

    let result = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("SSH_CONNECTION_ERROR"));

    let device = h.devices.get(h.device_id).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Offline);
    assert_eq!(device.collection_error_count, 1);

    let timing_out = harness(
        ScriptedTransport::new().on("docker ps", ScriptedOutcome::TimeoutError),
        CollectorConfig::default(),
    );
    let result = timing_out
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert_eq!(result.error_code.as_deref(), Some("SSH_TIMEOUT_ERROR"));
}

#[tokio::test]
async fn every_call_writes_exactly_one_matching_audit_record() {
    let h = harness(
        ScriptedTransport::new().respond("docker ps", PS_TABLE),
        CollectorConfig::default(),
    );

    let fresh = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    let cached = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;

    let records = h.audit.records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].operation_id, fresh.operation_id);
    assert!(!records[0].cached);
    assert_eq!(records[1].operation_id, cached.operation_id);
    assert!(records[1].cached);
    assert_eq!(fresh.audit_id, Some(1));
    assert_eq!(cached.audit_id, Some(2));
}

#[tokio::test]
async fn data_collected_event_fires_only_for_fresh_successes() {
    let h = harness(
        ScriptedTransport::new()
            .respond("docker ps", PS_TABLE)
            .respond("uname -a", "no banner here"),
        CollectorConfig::default(),
    );
    let mut rx = h.collector.event_bus().subscribe();

    let fresh = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    let _cached = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    let _failed = h
        .collector
        .collect("get_system_info", "host-a", no_params(), false, None, Value::Null)
        .await;

    let event = rx.try_recv().expect("one event for the fresh success");
    match event {
        fleetwatch::Event::DataCollected(payload) => {
            assert_eq!(payload.operation_id, fresh.operation_id);
            assert_eq!(payload.device_id, h.device_id);
            assert_eq!(payload.data_category, "container_management");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(rx.try_recv().is_err(), "cached and failed calls emit nothing");
}

#[tokio::test]
async fn concurrent_collects_respect_the_global_cap() {
    let h = harness(
        ScriptedTransport::new()
            .respond("docker ps", PS_TABLE)
            .with_latency(Duration::from_millis(50)),
        CollectorConfig {
            max_concurrent_operations: 2,
            ..CollectorConfig::default()
        },
    );
    let collector = Arc::new(h.collector);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let collector = Arc::clone(&collector);
        handles.push(tokio::spawn(async move {
            collector
                .collect("list_containers", "host-a", no_params(), true, None, Value::Null)
                .await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.success);
    }

    assert!(
        h.transport.max_concurrency() <= 2,
        "observed {} concurrent executions",
        h.transport.max_concurrency()
    );
    assert_eq!(h.transport.call_count("docker ps"), 5);
}

#[tokio::test]
async fn statistics_and_invalidation_track_the_caches() {
    let h = harness(
        ScriptedTransport::new().respond("docker ps", PS_TABLE),
        CollectorConfig::default(),
    );

    let _ = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    let _ = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;

    let stats = h.collector.statistics().await;
    assert_eq!(stats.operations.total_operations, 2);
    assert_eq!(stats.operations.successful_operations, 2);
    assert_eq!(stats.operations.cached_operations, 1);
    assert_eq!(stats.cache.entries, 1);
    assert!(stats.registered_commands >= 24);
    assert_eq!(stats.active_operations, 0);

    let removed = h
        .collector
        .invalidate_cache(CacheScope::Device("host-a".to_string()))
        .await;
    assert_eq!(removed, 1);

    // Next read misses and goes back to the transport
    let after = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(!after.cached);
    assert_eq!(h.transport.call_count("docker ps"), 2);
}

#[tokio::test]
async fn stopped_service_refuses_new_collects() {
    let h = harness(ScriptedTransport::new(), CollectorConfig::default());
    h.collector.stop();

    let result = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("SERVICE_UNAVAILABLE"));
}

#[tokio::test]
async fn successful_collect_updates_device_bookkeeping() {
    let h = harness(
        ScriptedTransport::new().respond("docker ps", PS_TABLE),
        CollectorConfig::default(),
    );

    let before = h.devices.get(h.device_id).await.unwrap();
    assert!(before.last_seen.is_none());

    let _ = h
        .collector
        .collect("list_containers", "host-a", no_params(), false, None, Value::Null)
        .await;

    let after = h.devices.get(h.device_id).await.unwrap();
    assert_eq!(after.status, DeviceStatus::Online);
    assert!(after.last_seen.is_some());
    assert!(after.last_successful_collection.is_some());
    assert_eq!(after.collection_error_count, 0);
}
