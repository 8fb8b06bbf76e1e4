//! Device records and the device store seam.
//!
//! A [`Device`] is the persistent identity of one monitored host. The store
//! trait is how the collector, watcher, and analyzer resolve references and
//! record their narrow mutations; an in-memory implementation backs the
//! prototype and the test suites.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::connection::SshConnectionInfo;
use crate::error::{Error, Result};

/// Reachability state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Reachable and collecting
    Online,
    /// Known but unreachable
    Offline,
    /// Not yet probed
    #[default]
    Unknown,
    /// Deliberately excluded from collection
    Maintenance,
}

/// Outcome of the most recent collection against a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    /// No collection attempted yet
    #[default]
    Never,
    /// Last collection succeeded
    Success,
    /// Last collection failed
    Failed,
    /// Last collection partially succeeded
    Partial,
    /// Last collection timed out
    Timeout,
}

/// Persistent record of one monitored host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier
    pub id: Uuid,
    /// Canonical public key; unique across the fleet
    pub hostname: String,
    /// Optional IP address used instead of the hostname when set
    pub ip_address: Option<String>,
    /// SSH port
    pub ssh_port: u16,
    /// SSH username; `None` delegates to the system SSH configuration
    pub ssh_username: Option<String>,
    /// Free-form device type tag (server, nas, vm-host)
    pub device_type: Option<String>,
    /// Physical or logical location
    pub location: Option<String>,
    /// Human description
    pub description: Option<String>,
    /// Capability and summary tags written by the analyzer
    pub tags: HashMap<String, Value>,
    /// Primary docker-compose directory
    pub docker_compose_path: Option<String>,
    /// Primary appdata directory
    pub docker_appdata_path: Option<String>,
    /// Whether this device participates in monitoring
    pub monitoring_enabled: bool,
    /// Reachability state
    pub status: DeviceStatus,
    /// Last time any probe reached the device
    pub last_seen: Option<DateTime<Utc>>,
    /// Last time a collection succeeded
    pub last_successful_collection: Option<DateTime<Utc>>,
    /// Outcome of the most recent collection
    pub last_collection_status: CollectionStatus,
    /// Consecutive collection failures since the last success
    pub collection_error_count: u32,
    /// Opaque metadata blob; the persistent field is named
    /// `device_metadata` regardless of how a façade exposes it
    pub device_metadata: Value,
}

impl Device {
    /// Create a device with defaults for everything but the hostname
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hostname: hostname.into(),
            ip_address: None,
            ssh_port: crate::connection::DEFAULT_SSH_PORT,
            ssh_username: None,
            device_type: None,
            location: None,
            description: None,
            tags: HashMap::new(),
            docker_compose_path: None,
            docker_appdata_path: None,
            monitoring_enabled: true,
            status: DeviceStatus::default(),
            last_seen: None,
            last_successful_collection: None,
            last_collection_status: CollectionStatus::default(),
            collection_error_count: 0,
            device_metadata: Value::Null,
        }
    }

    /// Set the IP address
    #[must_use]
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Set the SSH port
    #[must_use]
    pub fn ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Set the SSH username
    #[must_use]
    pub fn ssh_username(mut self, username: impl Into<String>) -> Self {
        self.ssh_username = Some(username.into());
        self
    }

    /// Set the device type
    #[must_use]
    pub fn device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    /// Disable monitoring for this device
    #[must_use]
    pub fn monitoring_disabled(mut self) -> Self {
        self.monitoring_enabled = false;
        self
    }

    /// Connection descriptor for this device. Prefers the IP when present.
    #[must_use]
    pub fn connection_info(&self) -> SshConnectionInfo {
        let mut info =
            SshConnectionInfo::new(self.ip_address.clone().unwrap_or_else(|| self.hostname.clone()))
                .port(self.ssh_port);
        if let Some(user) = &self.ssh_username {
            info = info.username(user.clone());
        }
        info
    }

    /// True when a boolean-ish tag is set truthy
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        matches!(self.tags.get(name), Some(Value::Bool(true)))
    }

    /// String values of a tag holding an array of strings
    #[must_use]
    pub fn tag_strings(&self, name: &str) -> Vec<String> {
        match self.tags.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Mutation applied through [`DeviceStore::update`]
pub type DeviceMutation = Box<dyn FnOnce(&mut Device) + Send>;

/// Resolver and narrow mutator over the persistent device set
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Resolve a hostname or stable id to a device
    async fn resolve(&self, device_ref: &str) -> Result<Device>;

    /// Fetch by id
    async fn get(&self, id: Uuid) -> Option<Device>;

    /// All devices
    async fn list(&self) -> Vec<Device>;

    /// Insert or replace a device
    async fn upsert(&self, device: Device) -> Result<()>;

    /// Apply a mutation to one device
    async fn update(&self, id: Uuid, mutation: DeviceMutation) -> Result<()>;
}

/// In-memory device store used by the prototype and the test suites
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<Uuid, Device>>,
}

impl MemoryDeviceStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with devices
    #[must_use]
    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let map = devices.into_iter().map(|d| (d.id, d)).collect();
        Self {
            devices: RwLock::new(map),
        }
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn resolve(&self, device_ref: &str) -> Result<Device> {
        let devices = self.devices.read().await;
        if let Ok(id) = Uuid::parse_str(device_ref) {
            if let Some(device) = devices.get(&id) {
                return Ok(device.clone());
            }
        }
        devices
            .values()
            .find(|d| d.hostname == device_ref)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound {
                device: device_ref.to_string(),
            })
    }

    async fn get(&self, id: Uuid) -> Option<Device> {
        self.devices.read().await.get(&id).cloned()
    }

    async fn list(&self) -> Vec<Device> {
        self.devices.read().await.values().cloned().collect()
    }

    async fn upsert(&self, device: Device) -> Result<()> {
        self.devices.write().await.insert(device.id, device);
        Ok(())
    }

    async fn update(&self, id: Uuid, mutation: DeviceMutation) -> Result<()> {
        let mut devices = self.devices.write().await;
        let device = devices.get_mut(&id).ok_or_else(|| Error::DeviceNotFound {
            device: id.to_string(),
        })?;
        mutation(device);
        Ok(())
    }
}

/// Memoized SWAG host picker.
///
/// Picks the first device (in hostname order) whose tags carry `swag=true`
/// and remembers the answer for the TTL, so repeated lookups during a
/// deploy burst do not rescan the fleet.
#[derive(Debug)]
pub struct SwagLocator {
    ttl: Duration,
    cached: Mutex<Option<(Instant, Option<String>)>>,
}

impl Default for SwagLocator {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl SwagLocator {
    /// Create a locator with the given memoization TTL
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Hostname of the fleet's SWAG host, if any
    pub async fn swag_host(&self, store: &Arc<dyn DeviceStore>) -> Option<String> {
        let mut cached = self.cached.lock().await;
        if let Some((at, host)) = cached.as_ref() {
            if at.elapsed() < self.ttl {
                return host.clone();
            }
        }

        let mut devices = store.list().await;
        devices.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        let host = devices
            .iter()
            .find(|d| d.has_tag("swag"))
            .map(|d| d.hostname.clone());
        *cached = Some((Instant::now(), host.clone()));
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_by_hostname_and_id() {
        let device = Device::new("host-a");
        let id = device.id;
        let store = MemoryDeviceStore::with_devices([device]);

        assert_eq!(store.resolve("host-a").await.unwrap().id, id);
        assert_eq!(store.resolve(&id.to_string()).await.unwrap().hostname, "host-a");
        let err = store.resolve("host-z").await.unwrap_err();
        assert_eq!(err.error_code(), "DEVICE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_update_mutates_in_place() {
        let device = Device::new("host-a");
        let id = device.id;
        let store = MemoryDeviceStore::with_devices([device]);

        store
            .update(
                id,
                Box::new(|d| {
                    d.status = DeviceStatus::Online;
                    d.collection_error_count += 1;
                }),
            )
            .await
            .unwrap();

        let device = store.get(id).await.unwrap();
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.collection_error_count, 1);
    }

    #[test]
    fn test_connection_info_prefers_ip() {
        let device = Device::new("host-a")
            .ip_address("10.0.0.5")
            .ssh_port(2222)
            .ssh_username("admin");
        let info = device.connection_info();
        assert_eq!(info.host, "10.0.0.5");
        assert_eq!(info.port, 2222);
        assert_eq!(info.username.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_swag_locator_is_deterministic_and_memoized() {
        let mut swag_b = Device::new("host-b");
        swag_b.tags.insert("swag".into(), json!(true));
        let mut swag_c = Device::new("host-c");
        swag_c.tags.insert("swag".into(), json!(true));
        let plain = Device::new("host-a");

        let store: Arc<dyn DeviceStore> =
            Arc::new(MemoryDeviceStore::with_devices([swag_c, plain, swag_b]));
        let locator = SwagLocator::default();

        // First device in hostname order with swag=true wins
        assert_eq!(locator.swag_host(&store).await.as_deref(), Some("host-b"));

        // A new swag host earlier in hostname order does not take over
        // until the memo expires
        let mut swag_a = Device::new("host-0");
        swag_a.tags.insert("swag".into(), json!(true));
        store.upsert(swag_a).await.unwrap();
        assert_eq!(locator.swag_host(&store).await.as_deref(), Some("host-b"));

        let expired = SwagLocator::new(Duration::from_millis(0));
        assert_eq!(expired.swag_host(&store).await.as_deref(), Some("host-0"));
    }

    #[test]
    fn test_tag_helpers() {
        let mut device = Device::new("host-a");
        device.tags.insert("docker".into(), json!(true));
        device.tags.insert("zfs".into(), json!(false));
        device
            .tags
            .insert("all_appdata_paths".into(), json!(["/mnt/appdata", "/opt/appdata"]));

        assert!(device.has_tag("docker"));
        assert!(!device.has_tag("zfs"));
        assert!(!device.has_tag("missing"));
        assert_eq!(
            device.tag_strings("all_appdata_paths"),
            vec!["/mnt/appdata".to_string(), "/opt/appdata".to_string()]
        );
    }
}
