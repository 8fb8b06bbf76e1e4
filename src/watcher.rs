//! Remote file watcher.
//!
//! Per-device streaming change detection over SSH `inotifywait`, with a
//! polling fallback for hosts without inotify tools. Detected changes feed
//! the configuration snapshot store, deduplicated by content hash, and
//! publish `file_changed` events. A heartbeat supervisor restarts stalled
//! sessions with exponential backoff and abandons them past the reconnect
//! cap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{CommandTransport, ExecOptions};
use crate::connection::SshConnectionInfo;
use crate::device::DeviceStore;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus, FileChangedEvent};
use crate::snapshot::{
    content_hash, ChangeType, CollectionSource, ConfigType, ConfigurationSnapshot, SnapshotStore,
    SyncStatus, ValidationStatus,
};

/// Surrogate content recorded when a changed file cannot be read
pub const UNREADABLE_CONTENT: &str = "<unreadable>";

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Supervisor check interval; sessions are stale at twice this age
    pub heartbeat_interval: Duration,
    /// Polling fallback interval
    pub poll_interval: Duration,
    /// Reconnect attempts before a session is abandoned
    pub max_reconnect_attempts: u32,
    /// Base reconnect delay; doubles per consecutive failure
    pub reconnect_delay: Duration,
    /// Conservative targets when a device carries no discovered paths
    pub fallback_paths: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(5),
            fallback_paths: vec![
                "/etc/nginx".to_string(),
                "/etc/apache2".to_string(),
                "/etc/traefik".to_string(),
            ],
        }
    }
}

/// One path under watch
#[derive(Debug, Clone)]
pub struct WatchTarget {
    /// Remote directory or file
    pub path: String,
    /// Whether to watch recursively
    pub recursive: bool,
    /// inotify event mask
    pub events: Vec<String>,
    /// Paths matching any of these are dropped before processing
    pub exclude_patterns: Vec<String>,
}

impl WatchTarget {
    /// A recursive target with the default event mask and no exclusions
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            recursive: true,
            events: vec![
                "modify".to_string(),
                "create".to_string(),
                "delete".to_string(),
                "move".to_string(),
            ],
            exclude_patterns: Vec::new(),
        }
    }

    /// Add an exclusion regex
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }
}

/// How a session detects changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Streaming `inotifywait` over SSH
    Inotify,
    /// Periodic remote hashing pass
    Polling,
}

struct SessionCtx {
    device_id: Uuid,
    hostname: String,
    conn: SshConnectionInfo,
    targets: Vec<WatchTarget>,
    excludes: Vec<Regex>,
    mode: WatchMode,
    heartbeat: StdMutex<Instant>,
    consecutive_failures: AtomicU32,
    abandoned: AtomicBool,
}

impl SessionCtx {
    fn touch(&self) {
        *self.heartbeat.lock().expect("heartbeat lock") = Instant::now();
    }

    fn heartbeat_age(&self) -> Duration {
        self.heartbeat.lock().expect("heartbeat lock").elapsed()
    }
}

struct WatchSession {
    ctx: Arc<SessionCtx>,
    task: StdMutex<JoinHandle<()>>,
}

/// Session counters exposed for observability
#[derive(Debug, Clone)]
pub struct WatchSessionInfo {
    /// Watched device
    pub device_id: Uuid,
    /// Device hostname
    pub hostname: String,
    /// Detection mode
    pub mode: WatchMode,
    /// Watched paths
    pub paths: Vec<String>,
    /// Age of the last heartbeat
    pub heartbeat_age: Duration,
    /// Consecutive failures since the last healthy pass
    pub consecutive_failures: u32,
    /// Whether the session exhausted its reconnect budget
    pub abandoned: bool,
}

/// SSH-based remote file watching with inotify streaming
pub struct RemoteFileWatcher {
    transport: Arc<dyn CommandTransport>,
    devices: Arc<dyn DeviceStore>,
    snapshots: Arc<dyn SnapshotStore>,
    bus: EventBus,
    config: WatcherConfig,
    sessions: Mutex<HashMap<Uuid, WatchSession>>,
    running: AtomicBool,
    supervisor: StdMutex<Option<JoinHandle<()>>>,
    me: Weak<Self>,
}

impl std::fmt::Debug for RemoteFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFileWatcher")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RemoteFileWatcher {
    /// Build a watcher over the given services
    #[must_use]
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        devices: Arc<dyn DeviceStore>,
        snapshots: Arc<dyn SnapshotStore>,
        bus: EventBus,
        config: WatcherConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            transport,
            devices,
            snapshots,
            bus,
            config,
            sessions: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            supervisor: StdMutex::new(None),
            me: me.clone(),
        })
    }

    fn handle(&self) -> Arc<Self> {
        self.me.upgrade().expect("watcher alive while in use")
    }

    /// Start the heartbeat supervisor
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let watcher = self.handle();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(watcher.config.heartbeat_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                watcher.supervise().await;
            }
        });
        *self.supervisor.lock().expect("supervisor lock") = Some(handle);
        info!(
            heartbeat_interval = ?self.config.heartbeat_interval,
            "remote file watcher started"
        );
    }

    /// Begin watching a device.
    ///
    /// Targets come from `paths` when given, else from the device's
    /// discovered-path tags, else from the conservative fallback set. After
    /// the synchronous setup, runtime failures never reach callers: they
    /// drive the heartbeat/reconnect loop instead.
    pub async fn start_watching(
        &self,
        device_ref: &str,
        paths: Option<Vec<String>>,
    ) -> Result<()> {
        let targets = paths.map(|paths| paths.into_iter().map(WatchTarget::new).collect());
        self.start_watching_targets(device_ref, targets).await
    }

    /// Begin watching with fully specified targets (event masks and
    /// exclusion patterns included)
    pub async fn start_watching_targets(
        &self,
        device_ref: &str,
        targets: Option<Vec<WatchTarget>>,
    ) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(Error::unavailable("remote_file_watcher"));
        }

        let device = self.devices.resolve(device_ref).await?;
        if !device.monitoring_enabled {
            return Err(Error::unavailable(format!(
                "monitoring disabled for device {}",
                device.hostname
            )));
        }

        // Replace any existing session for the device
        self.stop_session(device.id).await;

        let targets = self.resolve_targets(&device, targets);
        let excludes = compile_excludes(&targets);
        let conn = device.connection_info();
        let mode = self.detect_mode(&conn).await;

        let ctx = Arc::new(SessionCtx {
            device_id: device.id,
            hostname: device.hostname.clone(),
            conn,
            targets,
            excludes,
            mode,
            heartbeat: StdMutex::new(Instant::now()),
            consecutive_failures: AtomicU32::new(0),
            abandoned: AtomicBool::new(false),
        });

        let task = tokio::spawn(self.handle().run_session(Arc::clone(&ctx)));
        self.sessions.lock().await.insert(
            device.id,
            WatchSession {
                ctx,
                task: StdMutex::new(task),
            },
        );

        info!(
            device = %device.hostname,
            mode = ?mode,
            "started watching device"
        );
        Ok(())
    }

    /// Stop watching a device
    pub async fn stop_watching(&self, device_ref: &str) -> Result<()> {
        let device = self.devices.resolve(device_ref).await?;
        self.stop_session(device.id).await;
        Ok(())
    }

    /// Stop every session and the supervisor
    pub async fn stop_all(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.supervisor.lock().expect("supervisor lock").take() {
            handle.abort();
        }
        let sessions: Vec<WatchSession> = {
            let mut map = self.sessions.lock().await;
            map.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.task.lock().expect("task lock").abort();
        }
        info!("remote file watcher stopped");
    }

    /// Devices currently under watch
    pub async fn monitored_devices(&self) -> Vec<Uuid> {
        self.sessions.lock().await.keys().copied().collect()
    }

    /// Counter snapshot for each live session
    pub async fn session_stats(&self) -> Vec<WatchSessionInfo> {
        self.sessions
            .lock()
            .await
            .values()
            .map(|s| WatchSessionInfo {
                device_id: s.ctx.device_id,
                hostname: s.ctx.hostname.clone(),
                mode: s.ctx.mode,
                paths: s.ctx.targets.iter().map(|t| t.path.clone()).collect(),
                heartbeat_age: s.ctx.heartbeat_age(),
                consecutive_failures: s.ctx.consecutive_failures.load(Ordering::Relaxed),
                abandoned: s.ctx.abandoned.load(Ordering::Relaxed),
            })
            .collect()
    }

    async fn stop_session(&self, device_id: Uuid) {
        if let Some(session) = self.sessions.lock().await.remove(&device_id) {
            session.task.lock().expect("task lock").abort();
            debug!(device_id = %device_id, "stopped watch session");
        }
    }

    fn resolve_targets(
        &self,
        device: &crate::device::Device,
        targets: Option<Vec<WatchTarget>>,
    ) -> Vec<WatchTarget> {
        if let Some(targets) = targets {
            return targets;
        }

        let mut discovered = Vec::new();
        if device.has_tag("swag") {
            for appdata in device.tag_strings("all_appdata_paths") {
                discovered.push(format!("{appdata}/swag/nginx/proxy-confs"));
            }
        }
        discovered.extend(device.tag_strings("all_docker_compose_paths"));
        if let Some(appdata) = &device.docker_appdata_path {
            discovered.push(format!("{appdata}/traefik"));
        }
        discovered.dedup();

        if discovered.is_empty() {
            discovered = self.config.fallback_paths.clone();
        }
        discovered.into_iter().map(WatchTarget::new).collect()
    }

    async fn detect_mode(&self, conn: &SshConnectionInfo) -> WatchMode {
        let probe = self
            .transport
            .execute(
                conn,
                "which inotifywait",
                ExecOptions::default().timeout(Duration::from_secs(10)),
            )
            .await;
        match probe {
            Ok(result) if result.success => WatchMode::Inotify,
            _ => WatchMode::Polling,
        }
    }

    async fn run_session(self: Arc<Self>, ctx: Arc<SessionCtx>) {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            let outcome = match ctx.mode {
                WatchMode::Inotify => self.stream_inotify(&ctx).await,
                WatchMode::Polling => self.poll_loop(&ctx).await,
            };
            let Err(e) = outcome else { return };

            let failures = ctx.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= self.config.max_reconnect_attempts {
                error!(
                    device = %ctx.hostname,
                    failures,
                    error = %e,
                    "watch session exhausted reconnect attempts, abandoning"
                );
                ctx.abandoned.store(true, Ordering::SeqCst);
                return;
            }
            let delay = reconnect_backoff(self.config.reconnect_delay, failures);
            warn!(
                device = %ctx.hostname,
                failures,
                error = %e,
                delay = ?delay,
                "watch session failed, reconnecting"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn stream_inotify(&self, ctx: &SessionCtx) -> Result<()> {
        let command = inotify_command(&ctx.targets);
        let mut stream = self.transport.open_stream(&ctx.conn, &command).await?;
        ctx.touch();

        loop {
            match stream.next_line().await {
                Ok(Some(line)) => {
                    ctx.touch();
                    ctx.consecutive_failures.store(0, Ordering::SeqCst);
                    if let Some((path, change)) = parse_inotify_line(&line) {
                        self.handle_change(ctx, &path, change, CollectionSource::Event)
                            .await;
                    }
                }
                Ok(None) => {
                    stream.close().await;
                    return Err(Error::connection(&ctx.conn.host, "inotify stream closed"));
                }
                Err(e) => {
                    stream.close().await;
                    return Err(e);
                }
            }
        }
    }

    async fn poll_loop(&self, ctx: &SessionCtx) -> Result<()> {
        let mut known = self.scan_hashes(ctx).await?;
        ctx.touch();

        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            let current = self.scan_hashes(ctx).await?;
            ctx.touch();
            ctx.consecutive_failures.store(0, Ordering::SeqCst);

            for (path, hash) in &current {
                match known.get(path) {
                    None => {
                        self.handle_change(ctx, path, ChangeType::Create, CollectionSource::Polling)
                            .await;
                    }
                    Some(old) if old != hash => {
                        self.handle_change(ctx, path, ChangeType::Modify, CollectionSource::Polling)
                            .await;
                    }
                    Some(_) => {}
                }
            }
            for path in known.keys() {
                if !current.contains_key(path) {
                    self.handle_change(ctx, path, ChangeType::Delete, CollectionSource::Polling)
                        .await;
                }
            }
            known = current;
        }
    }

    /// Hash every config-shaped file under the session's targets
    async fn scan_hashes(&self, ctx: &SessionCtx) -> Result<HashMap<String, String>> {
        let mut hashes = HashMap::new();
        for target in &ctx.targets {
            let command = format!(
                "find '{}' -type f \\( -name '*.yml' -o -name '*.yaml' -o -name '*.conf' -o -name '*.json' \\) -exec sha256sum {{}} + 2>/dev/null || true",
                target.path
            );
            let result = self
                .transport
                .execute(
                    &ctx.conn,
                    &command,
                    ExecOptions::default().timeout(Duration::from_secs(60)),
                )
                .await?;
            for line in result.stdout.lines() {
                if let Some((hash, path)) = line.split_once(char::is_whitespace) {
                    hashes.insert(path.trim().to_string(), hash.trim().to_string());
                }
            }
        }
        Ok(hashes)
    }

    /// Process one detected change: classify, read, dedup, snapshot, emit.
    async fn handle_change(
        &self,
        ctx: &SessionCtx,
        path: &str,
        change_type: ChangeType,
        source: CollectionSource,
    ) {
        // Exclusions apply before any remote read
        if ctx.excludes.iter().any(|re| re.is_match(path)) {
            debug!(path, "change excluded by pattern");
            return;
        }

        let config_type = ConfigType::from_path(path);

        let (raw_content, sync_status) = if change_type == ChangeType::Delete {
            (String::new(), SyncStatus::Synced)
        } else {
            match self.read_remote_file(ctx, path).await {
                Ok(content) => (content, SyncStatus::Synced),
                Err(e) => {
                    warn!(path, error = %e, "could not read changed file");
                    (format!("{UNREADABLE_CONTENT}:{path}"), SyncStatus::Error)
                }
            }
        };

        let hash = content_hash(&raw_content);
        let latest = self.snapshots.latest(ctx.device_id, path).await;
        if let Some(previous) = &latest {
            if previous.content_hash == hash {
                debug!(path, "content hash unchanged, dropping event");
                return;
            }
        }

        let (parsed_data, validation_status) = if sync_status == SyncStatus::Error {
            (None, ValidationStatus::Unknown)
        } else {
            parse_config_content(config_type, &raw_content)
        };

        let snapshot = ConfigurationSnapshot {
            device_id: ctx.device_id,
            timestamp: Utc::now(),
            config_type,
            file_path: path.to_string(),
            content_hash: hash.clone(),
            raw_content,
            parsed_data,
            change_type,
            collection_source: source,
            previous_hash: latest.map(|s| s.content_hash),
            sync_status,
            validation_status,
        };

        if let Err(e) = self.snapshots.insert(snapshot).await {
            error!(path, error = %e, "failed to store configuration snapshot");
            return;
        }

        self.bus.emit(Event::FileChanged(FileChangedEvent {
            device_id: ctx.device_id,
            path: path.to_string(),
            change_type: change_type.as_str().to_string(),
            config_type: config_type.as_str().to_string(),
            content_hash: (change_type != ChangeType::Delete).then_some(hash),
            timestamp: Utc::now(),
        }));
    }

    async fn read_remote_file(&self, ctx: &SessionCtx, path: &str) -> Result<String> {
        let result = self
            .transport
            .execute(
                &ctx.conn,
                &format!("cat '{path}'"),
                ExecOptions::default().timeout(Duration::from_secs(30)),
            )
            .await?;
        if result.success {
            Ok(result.stdout)
        } else {
            Err(Error::execution_failed(
                format!("cat '{path}'"),
                result.exit_code,
                result.stderr,
            ))
        }
    }

    /// Restart sessions whose heartbeat has gone stale
    async fn supervise(&self) {
        let stale_age = self.config.heartbeat_interval * 2;
        let stale: Vec<Arc<SessionCtx>> = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .filter(|s| {
                    !s.ctx.abandoned.load(Ordering::Relaxed) && s.ctx.heartbeat_age() > stale_age
                })
                .map(|s| Arc::clone(&s.ctx))
                .collect()
        };

        for ctx in stale {
            let failures = ctx.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= self.config.max_reconnect_attempts {
                error!(
                    device = %ctx.hostname,
                    "stale watch session exhausted reconnect attempts, abandoning"
                );
                ctx.abandoned.store(true, Ordering::SeqCst);
                let sessions = self.sessions.lock().await;
                if let Some(session) = sessions.get(&ctx.device_id) {
                    session.task.lock().expect("task lock").abort();
                }
                continue;
            }

            warn!(
                device = %ctx.hostname,
                age = ?ctx.heartbeat_age(),
                failures,
                "watch session heartbeat stale, restarting"
            );
            let sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get(&ctx.device_id) {
                let mut task = session.task.lock().expect("task lock");
                task.abort();
                ctx.touch();
                *task = tokio::spawn(self.handle().run_session(Arc::clone(&ctx)));
            }
        }
    }
}

/// Build the bit-exact `inotifywait` invocation the line parser expects
#[must_use]
pub fn inotify_command(targets: &[WatchTarget]) -> String {
    let mut parts = vec![
        "inotifywait".to_string(),
        "-m".to_string(),
        "-r".to_string(),
        "-e".to_string(),
        "modify,create,delete,move".to_string(),
        "--format".to_string(),
        "'%w%f|%e|%T'".to_string(),
        "--timefmt".to_string(),
        "'%Y-%m-%d %H:%M:%S'".to_string(),
    ];
    parts.extend(targets.iter().map(|t| format!("'{}'", t.path)));
    parts.join(" ")
}

/// Parse one inotifywait output line (`/path|EVENTS|timestamp`).
///
/// Returns the path and the mapped change type, or `None` for lines that
/// do not match the three-field format or carry no relevant event.
#[must_use]
pub fn parse_inotify_line(line: &str) -> Option<(String, ChangeType)> {
    let mut parts = line.trim().splitn(3, '|');
    let path = parts.next()?.trim();
    let events = parts.next()?.trim();
    let _timestamp = parts.next()?;

    if path.is_empty() {
        return None;
    }

    let events: Vec<String> = events
        .split(',')
        .map(|e| e.trim().to_lowercase())
        .collect();

    let change = if events.iter().any(|e| e == "delete" || e == "moved_from") {
        ChangeType::Delete
    } else if events.iter().any(|e| e == "create" || e == "moved_to") {
        ChangeType::Create
    } else if events
        .iter()
        .any(|e| e == "modify" || e == "attrib" || e == "close_write")
    {
        ChangeType::Modify
    } else {
        return None;
    };

    Some((path.to_string(), change))
}

/// Light parsing for known config types. Failures never abort the
/// snapshot insert; they mark it instead.
fn parse_config_content(config_type: ConfigType, content: &str) -> (Option<Value>, ValidationStatus) {
    match config_type {
        ConfigType::JsonConfig => match serde_json::from_str(content) {
            Ok(value) => (Some(value), ValidationStatus::Ok),
            Err(_) => (None, ValidationStatus::Error),
        },
        ConfigType::YamlConfig | ConfigType::DockerCompose | ConfigType::Traefik => {
            match serde_yaml::from_str::<Value>(content) {
                Ok(value) => (Some(value), ValidationStatus::Ok),
                Err(_) => (None, ValidationStatus::Error),
            }
        }
        _ => (None, ValidationStatus::Unknown),
    }
}

fn compile_excludes(targets: &[WatchTarget]) -> Vec<Regex> {
    targets
        .iter()
        .flat_map(|t| t.exclude_patterns.iter())
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern, error = %e, "skipping invalid exclusion pattern");
                None
            }
        })
        .collect()
}

fn reconnect_backoff(base: Duration, failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(6);
    (base * 2u32.pow(shift)).min(Duration::from_secs(120))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inotify_command_is_bit_exact() {
        let targets = vec![
            WatchTarget::new("/etc/nginx"),
            WatchTarget::new("/opt/stacks"),
        ];
        assert_eq!(
            inotify_command(&targets),
            "inotifywait -m -r -e modify,create,delete,move --format '%w%f|%e|%T' \
             --timefmt '%Y-%m-%d %H:%M:%S' '/etc/nginx' '/opt/stacks'"
        );
    }

    #[test]
    fn test_parse_inotify_line() {
        assert_eq!(
            parse_inotify_line("/etc/nginx/a.conf|MODIFY|2024-01-15 10:30:45"),
            Some(("/etc/nginx/a.conf".to_string(), ChangeType::Modify))
        );
        assert_eq!(
            parse_inotify_line("/etc/nginx/new.conf|CREATE|2024-01-15 10:30:45"),
            Some(("/etc/nginx/new.conf".to_string(), ChangeType::Create))
        );
        assert_eq!(
            parse_inotify_line("/etc/nginx/old.conf|DELETE|2024-01-15 10:30:45"),
            Some(("/etc/nginx/old.conf".to_string(), ChangeType::Delete))
        );
        // MOVED_TO arrives with ISDIR decorations
        assert_eq!(
            parse_inotify_line("/etc/nginx/dir|MOVED_TO,ISDIR|2024-01-15 10:30:45"),
            Some(("/etc/nginx/dir".to_string(), ChangeType::Create))
        );
    }

    #[test]
    fn test_parse_inotify_line_rejects_malformed() {
        assert!(parse_inotify_line("not a watch line").is_none());
        assert!(parse_inotify_line("/path|MODIFY").is_none());
        assert!(parse_inotify_line("|MODIFY|2024-01-15 10:30:45").is_none());
        // Irrelevant event kinds are dropped
        assert!(parse_inotify_line("/path|OPEN|2024-01-15 10:30:45").is_none());
    }

    #[test]
    fn test_reconnect_backoff_doubles_and_caps() {
        let base = Duration::from_secs(5);
        assert_eq!(reconnect_backoff(base, 1), Duration::from_secs(5));
        assert_eq!(reconnect_backoff(base, 2), Duration::from_secs(10));
        assert_eq!(reconnect_backoff(base, 3), Duration::from_secs(20));
        assert_eq!(reconnect_backoff(base, 20), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_config_content() {
        let (parsed, status) = parse_config_content(ConfigType::JsonConfig, r#"{"a": 1}"#);
        assert_eq!(status, ValidationStatus::Ok);
        assert_eq!(parsed.unwrap()["a"], 1);

        let (parsed, status) =
            parse_config_content(ConfigType::DockerCompose, "services:\n  app:\n    image: x\n");
        assert_eq!(status, ValidationStatus::Ok);
        assert!(parsed.unwrap()["services"]["app"]["image"] == "x");

        let (parsed, status) = parse_config_content(ConfigType::JsonConfig, "{broken");
        assert_eq!(status, ValidationStatus::Error);
        assert!(parsed.is_none());

        let (parsed, status) =
            parse_config_content(ConfigType::NginxProxy, "server { listen 443; }");
        assert_eq!(status, ValidationStatus::Unknown);
        assert!(parsed.is_none());
    }
}
