//! Integration tests for the remote file watcher, driven through the
//! scripted transport.

use std::sync::Arc;
use std::time::Duration;

use fleetwatch::testing::{ScriptedOutcome, ScriptedTransport};
use fleetwatch::{
    ChangeType, Device, DeviceStore, EventBus, MemoryDeviceStore, MemorySnapshotStore,
    RemoteFileWatcher, SnapshotStore, WatchMode, WatchTarget, WatcherConfig,
};
use serde_json::json;

fn fast_config() -> WatcherConfig {
    WatcherConfig {
        heartbeat_interval: Duration::from_millis(500),
        poll_interval: Duration::from_millis(50),
        max_reconnect_attempts: 3,
        reconnect_delay: Duration::from_millis(20),
        ..WatcherConfig::default()
    }
}

struct Harness {
    watcher: Arc<RemoteFileWatcher>,
    snapshots: Arc<MemorySnapshotStore>,
    devices: Arc<MemoryDeviceStore>,
    bus: EventBus,
    device_id: uuid::Uuid,
}

fn harness(transport: ScriptedTransport, device: Device) -> Harness {
    let device_id = device.id;
    let devices = Arc::new(MemoryDeviceStore::with_devices([device]));
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let bus = EventBus::default();
    let watcher = RemoteFileWatcher::new(
        Arc::new(transport) as Arc<dyn fleetwatch::CommandTransport>,
        Arc::clone(&devices) as Arc<dyn DeviceStore>,
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        bus.clone(),
        fast_config(),
    );
    watcher.start();
    Harness {
        watcher,
        snapshots,
        devices,
        bus,
        device_id,
    }
}

#[tokio::test]
async fn inotify_event_appends_snapshot_and_emits() {
    let transport = ScriptedTransport::new()
        .respond("which inotifywait", "/usr/bin/inotifywait")
        .respond("cat '/etc/nginx/proxy-confs/app.conf'", "server { listen 443; }")
        .with_stream(
            "inotifywait",
            vec!["/etc/nginx/proxy-confs/app.conf|MODIFY|2024-01-15 10:30:45".to_string()],
        );
    let h = harness(transport, Device::new("host-a"));
    let mut rx = h.bus.subscribe();

    h.watcher
        .start_watching("host-a", Some(vec!["/etc/nginx".to_string()]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let latest = h
        .snapshots
        .latest(h.device_id, "/etc/nginx/proxy-confs/app.conf")
        .await
        .expect("snapshot appended");
    assert_eq!(latest.change_type, ChangeType::Modify);
    assert_eq!(latest.config_type.as_str(), "nginx_proxy");
    assert_eq!(latest.raw_content, "server { listen 443; }");
    assert!(latest.previous_hash.is_none());

    match rx.try_recv().expect("file_changed event") {
        fleetwatch::Event::FileChanged(event) => {
            assert_eq!(event.device_id, h.device_id);
            assert_eq!(event.change_type, "MODIFY");
            assert_eq!(event.config_type, "nginx_proxy");
            assert!(event.content_hash.is_some());
        }
        other => panic!("unexpected event: {other:?}"),
    }

    h.watcher.stop_all().await;
}

#[tokio::test]
async fn unchanged_content_hash_is_deduplicated() {
    // Two MODIFY events (a touch) for a file whose content does not change
    let transport = ScriptedTransport::new()
        .respond("which inotifywait", "/usr/bin/inotifywait")
        .respond("cat '/etc/nginx/proxy-confs/app.conf'", "server { }")
        .with_stream(
            "inotifywait",
            vec![
                "/etc/nginx/proxy-confs/app.conf|MODIFY|2024-01-15 10:30:45".to_string(),
                "/etc/nginx/proxy-confs/app.conf|MODIFY|2024-01-15 10:30:46".to_string(),
            ],
        );
    let h = harness(transport, Device::new("host-a"));

    h.watcher
        .start_watching("host-a", Some(vec!["/etc/nginx".to_string()]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.snapshots.len().await, 1, "touch produced no new snapshot");
    h.watcher.stop_all().await;
}

#[tokio::test]
async fn polling_fallback_detects_modifications() {
    let scan_v1 = "1111111111111111111111111111111111111111111111111111111111111111  /opt/app/config.yml";
    let scan_v2 = "2222222222222222222222222222222222222222222222222222222222222222  /opt/app/config.yml";
    let transport = ScriptedTransport::new()
        // No inotify tools on this host
        .on("which inotifywait", ScriptedOutcome::exit(1, ""))
        .respond_seq(
            "sha256sum",
            vec![ScriptedOutcome::ok(scan_v1), ScriptedOutcome::ok(scan_v2)],
        )
        .respond("cat '/opt/app/config.yml'", "key: value\n");
    let h = harness(transport, Device::new("host-a"));

    h.watcher
        .start_watching("host-a", Some(vec!["/opt/app".to_string()]))
        .await
        .unwrap();

    let stats = h.watcher.session_stats().await;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].mode, WatchMode::Polling);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let latest = h
        .snapshots
        .latest(h.device_id, "/opt/app/config.yml")
        .await
        .expect("modification detected by polling");
    assert_eq!(latest.change_type, ChangeType::Modify);
    assert_eq!(latest.config_type.as_str(), "yaml_config");
    // Light YAML parsing succeeded
    assert_eq!(latest.parsed_data.as_ref().unwrap()["key"], "value");

    // Content settled; repeated polls add nothing
    let count = h.snapshots.len().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.snapshots.len().await, count);

    h.watcher.stop_all().await;
}

#[tokio::test]
async fn excluded_paths_are_dropped_before_reading() {
    let transport = ScriptedTransport::new()
        .respond("which inotifywait", "/usr/bin/inotifywait")
        .respond("cat", "content")
        .with_stream(
            "inotifywait",
            vec![
                "/etc/nginx/app.conf.swp|MODIFY|2024-01-15 10:30:45".to_string(),
                "/etc/nginx/app.conf|MODIFY|2024-01-15 10:30:46".to_string(),
            ],
        );
    let h = harness(transport, Device::new("host-a"));

    h.watcher
        .start_watching_targets(
            "host-a",
            Some(vec![WatchTarget::new("/etc/nginx").exclude(r"\.swp$")]),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(h
        .snapshots
        .latest(h.device_id, "/etc/nginx/app.conf.swp")
        .await
        .is_none());
    assert!(h
        .snapshots
        .latest(h.device_id, "/etc/nginx/app.conf")
        .await
        .is_some());

    h.watcher.stop_all().await;
}

#[tokio::test]
async fn unreadable_file_records_error_snapshot() {
    let transport = ScriptedTransport::new()
        .respond("which inotifywait", "/usr/bin/inotifywait")
        .on("cat", ScriptedOutcome::exit(1, "cat: permission denied"))
        .with_stream(
            "inotifywait",
            vec!["/etc/nginx/secret.conf|MODIFY|2024-01-15 10:30:45".to_string()],
        );
    let h = harness(transport, Device::new("host-a"));

    h.watcher
        .start_watching("host-a", Some(vec!["/etc/nginx".to_string()]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let latest = h
        .snapshots
        .latest(h.device_id, "/etc/nginx/secret.conf")
        .await
        .expect("error snapshot recorded");
    assert_eq!(latest.sync_status, fleetwatch::SyncStatus::Error);
    assert!(latest.raw_content.contains("<unreadable>"));

    h.watcher.stop_all().await;
}

#[tokio::test]
async fn targets_resolve_from_device_tags() {
    let mut device = Device::new("host-a");
    device.tags.insert("swag".into(), json!(true));
    device
        .tags
        .insert("all_appdata_paths".into(), json!(["/mnt/appdata"]));
    device.tags.insert(
        "all_docker_compose_paths".into(),
        json!(["/opt/stacks/media"]),
    );
    device.docker_appdata_path = Some("/mnt/appdata".to_string());

    let transport = ScriptedTransport::new()
        .respond("which inotifywait", "/usr/bin/inotifywait")
        .with_stream("inotifywait", Vec::new());
    let h = harness(transport, device);

    h.watcher.start_watching("host-a", None).await.unwrap();
    let stats = h.watcher.session_stats().await;
    let paths = &stats[0].paths;
    assert!(paths.contains(&"/mnt/appdata/swag/nginx/proxy-confs".to_string()));
    assert!(paths.contains(&"/opt/stacks/media".to_string()));
    assert!(paths.contains(&"/mnt/appdata/traefik".to_string()));

    h.watcher.stop_all().await;
}

#[tokio::test]
async fn untagged_device_falls_back_to_conservative_paths() {
    let transport = ScriptedTransport::new()
        .respond("which inotifywait", "/usr/bin/inotifywait")
        .with_stream("inotifywait", Vec::new());
    let h = harness(transport, Device::new("host-a"));

    h.watcher.start_watching("host-a", None).await.unwrap();
    let stats = h.watcher.session_stats().await;
    assert_eq!(
        stats[0].paths,
        vec!["/etc/nginx", "/etc/apache2", "/etc/traefik"]
    );

    h.watcher.stop_all().await;
}

#[tokio::test]
async fn start_watching_validates_device_and_monitoring_flag() {
    let transport = ScriptedTransport::new()
        .respond("which inotifywait", "/usr/bin/inotifywait")
        .with_stream("inotifywait", Vec::new());
    let h = harness(transport, Device::new("host-a").monitoring_disabled());

    let err = h.watcher.start_watching("host-z", None).await.unwrap_err();
    assert_eq!(err.error_code(), "DEVICE_NOT_FOUND");

    let err = h.watcher.start_watching("host-a", None).await.unwrap_err();
    assert_eq!(err.error_code(), "SERVICE_UNAVAILABLE");

    h.watcher.stop_all().await;
}

#[tokio::test]
async fn stop_watching_removes_the_session() {
    let transport = ScriptedTransport::new()
        .respond("which inotifywait", "/usr/bin/inotifywait")
        .with_stream("inotifywait", Vec::new());
    let h = harness(transport, Device::new("host-a"));

    h.watcher.start_watching("host-a", None).await.unwrap();
    assert_eq!(h.watcher.monitored_devices().await, vec![h.device_id]);

    h.watcher.stop_watching("host-a").await.unwrap();
    assert!(h.watcher.monitored_devices().await.is_empty());

    // Devices stay resolvable after their watch ends
    assert!(h.devices.resolve("host-a").await.is_ok());
    h.watcher.stop_all().await;
}
