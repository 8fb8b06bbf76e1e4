//! Configuration snapshots.
//!
//! Append-only records of watched configuration files. A new snapshot is
//! inserted only when the content hash differs from the latest one for the
//! same `(device, path)`; snapshots are never rewritten.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Classified configuration type, derived from the file path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    /// Reverse-proxy site config under proxy-confs or nginx
    NginxProxy,
    /// docker-compose project file
    DockerCompose,
    /// Traefik dynamic or static config
    Traefik,
    /// Apache site config
    Apache,
    /// Any other YAML file
    YamlConfig,
    /// Any other JSON file
    JsonConfig,
    /// Any other .conf file
    GenericConfig,
    /// Unclassified
    Unknown,
}

impl ConfigType {
    /// Classify a file path.
    ///
    /// Container checks run before extension checks so a
    /// `proxy-confs/app.subdomain.conf` classifies as a proxy config, not a
    /// generic one.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.contains("/proxy-confs/") || lower.contains("/nginx/") {
            Self::NginxProxy
        } else if lower.contains("docker-compose") {
            Self::DockerCompose
        } else if lower.contains("/traefik/") {
            Self::Traefik
        } else if lower.contains("/apache") {
            Self::Apache
        } else if lower.ends_with(".yml") || lower.ends_with(".yaml") {
            Self::YamlConfig
        } else if lower.ends_with(".json") {
            Self::JsonConfig
        } else if lower.ends_with(".conf") {
            Self::GenericConfig
        } else {
            Self::Unknown
        }
    }

    /// Snake-case name used on events and audit metadata
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NginxProxy => "nginx_proxy",
            Self::DockerCompose => "docker_compose",
            Self::Traefik => "traefik",
            Self::Apache => "apache",
            Self::YamlConfig => "yaml_config",
            Self::JsonConfig => "json_config",
            Self::GenericConfig => "generic_config",
            Self::Unknown => "unknown",
        }
    }
}

/// What happened to a watched file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    /// File appeared
    Create,
    /// File content changed
    Modify,
    /// File disappeared
    Delete,
    /// The watcher could not read the file
    Error,
}

impl ChangeType {
    /// Wire name as emitted on events
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Modify => "MODIFY",
            Self::Delete => "DELETE",
            Self::Error => "ERROR",
        }
    }
}

/// How the snapshot was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionSource {
    /// Polling fallback pass
    Polling,
    /// inotify event stream
    Event,
    /// Device analysis sweep
    Analysis,
}

/// Whether the remote read succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Content read successfully
    Synced,
    /// Content could not be read; raw content is a surrogate string
    Error,
}

/// Whether light parsing of the content succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// Parsed cleanly
    Ok,
    /// Parsing failed
    Error,
    /// No parser for this type
    Unknown,
}

/// One appended configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    /// Device the file lives on
    pub device_id: Uuid,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Classified configuration type
    pub config_type: ConfigType,
    /// Remote file path
    pub file_path: String,
    /// SHA-256 of the content (hex)
    pub content_hash: String,
    /// Raw file content, or a surrogate string on read failure
    pub raw_content: String,
    /// Structured form for known types, when light parsing succeeded
    pub parsed_data: Option<Value>,
    /// What happened to the file
    pub change_type: ChangeType,
    /// How the snapshot was obtained
    pub collection_source: CollectionSource,
    /// Hash of the previous snapshot for the same path, when any
    pub previous_hash: Option<String>,
    /// Whether the remote read succeeded
    pub sync_status: SyncStatus,
    /// Whether light parsing succeeded
    pub validation_status: ValidationStatus,
}

/// SHA-256 hex digest of file content
#[must_use]
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Store seam for configuration snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest snapshot for `(device, path)`, when any
    async fn latest(&self, device_id: Uuid, file_path: &str) -> Option<ConfigurationSnapshot>;

    /// Append a snapshot
    async fn insert(&self, snapshot: ConfigurationSnapshot) -> Result<()>;
}

/// In-memory snapshot store used by the prototype and the test suites
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    by_path: RwLock<HashMap<(Uuid, String), Vec<ConfigurationSnapshot>>>,
}

impl MemorySnapshotStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot ever appended for a device, in insertion order
    pub async fn history(&self, device_id: Uuid) -> Vec<ConfigurationSnapshot> {
        let by_path = self.by_path.read().await;
        let mut all: Vec<ConfigurationSnapshot> = by_path
            .iter()
            .filter(|((id, _), _)| *id == device_id)
            .flat_map(|(_, snaps)| snaps.iter().cloned())
            .collect();
        all.sort_by_key(|s| s.timestamp);
        all
    }

    /// Total snapshot count across all devices
    pub async fn len(&self) -> usize {
        self.by_path.read().await.values().map(Vec::len).sum()
    }

    /// True when no snapshots are stored
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn latest(&self, device_id: Uuid, file_path: &str) -> Option<ConfigurationSnapshot> {
        self.by_path
            .read()
            .await
            .get(&(device_id, file_path.to_string()))
            .and_then(|snaps| snaps.last().cloned())
    }

    async fn insert(&self, snapshot: ConfigurationSnapshot) -> Result<()> {
        self.by_path
            .write()
            .await
            .entry((snapshot.device_id, snapshot.file_path.clone()))
            .or_default()
            .push(snapshot);
        Ok(())
    }
}
