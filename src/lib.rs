//! # fleetwatch
//!
//! An agentless infrastructure monitoring and control-plane engine for
//! fleets of heterogeneous Linux hosts.
//!
//! A central process opens SSH sessions to registered devices, runs a
//! curated catalog of diagnostic commands (system metrics, SMART, Docker,
//! docker-compose, ZFS, journald/syslog, network, libvirt), parses
//! structured results, caches them by freshness class, watches remote
//! configuration files in near real time, and derives per-device
//! capability tags from live probes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use fleetwatch::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let pool = SshPool::start(PoolConfig::default());
//!     let client = Arc::new(SshClient::new(Arc::clone(&pool), ClientConfig::default())?);
//!
//!     let devices: Arc<dyn DeviceStore> = Arc::new(MemoryDeviceStore::with_devices([
//!         Device::new("host-a").ssh_username("admin"),
//!     ]));
//!     let audit: Arc<dyn AuditSink> = Arc::new(MemoryAuditSink::new());
//!
//!     let collector = UnifiedCollector::new(
//!         Arc::new(CommandRegistry::with_builtin_commands()),
//!         Arc::new(CacheManager::new()),
//!         client,
//!         devices,
//!         audit,
//!         EventBus::default(),
//!         CollectorConfig::default(),
//!     );
//!     collector.start();
//!
//!     let result = collector
//!         .collect("list_containers", "host-a", BTreeMap::new(), false, None, serde_json::Value::Null)
//!         .await;
//!     println!("{} containers payload: {:?}", result.device_id, result.data);
//!
//!     collector.stop();
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`registry`] - Command catalog with validation and cache policy
//! - [`pool`] / [`client`] - SSH session pool and execution client
//! - [`cache`] - Fingerprint → value store with TTL
//! - [`collector`] - The unified read path (cache, pool, audit, events)
//! - [`watcher`] / [`snapshot`] - Remote file watching and config snapshots
//! - [`analyzer`] - Composite device probe and capability tagging
//! - [`parsers`] - Pure stdout → typed value parsers
//! - [`events`] / [`audit`] - In-process bus and audit sinks
//! - [`testing`] - Scripted transport for integration tests

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub use analyzer::{
    AnalyzeOptions, AnalyzerConfig, DeviceAnalysis, DeviceAnalyzer, DriveReport, CAPABILITY_TAGS,
};
pub use audit::{
    AuditSink, DataCollectionAudit, MemoryAuditSink, ServicePerformanceSample,
};
pub use cache::{CacheEntry, CacheManager, CacheStats};
pub use client::{
    ClientConfig, CommandStream, CommandTransport, ExecOptions, ExecutionResult, LineStream,
    SshClient,
};
pub use collector::{
    ActiveOperation, CacheScope, CollectionResult, CollectorConfig, CollectorStatistics,
    OperationStats, UnifiedCollector,
};
pub use connection::{HostKeyCheck, SshConnectionInfo};
pub use device::{
    CollectionStatus, Device, DeviceStatus, DeviceStore, MemoryDeviceStore, SwagLocator,
};
pub use error::{Error, Result};
pub use events::{DataCollectedEvent, Event, EventBus, FileChangedEvent};
pub use pool::{PoolConfig, PoolStats, PooledSession, SshPool};
pub use registry::{CommandCategory, CommandDefinition, CommandRegistry};
pub use snapshot::{
    ChangeType, CollectionSource, ConfigType, ConfigurationSnapshot, MemorySnapshotStore,
    SnapshotStore, SyncStatus, ValidationStatus,
};
pub use watcher::{RemoteFileWatcher, WatchMode, WatchTarget, WatcherConfig};

pub mod analyzer;
pub mod audit;
pub mod cache;
pub mod client;
pub mod collector;
pub mod connection;
pub mod device;
pub mod error;
pub mod events;
pub mod parsers;
pub mod pool;
pub mod registry;
pub mod snapshot;
pub mod testing;
pub mod watcher;

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default timeout for remote operations
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
