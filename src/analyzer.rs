//! Device analyzer.
//!
//! A composite probe over one device: reachability, SSH, live metrics,
//! Docker, ZFS, hardware, OS, virtualization, and drive health. The
//! analyzer is the authoritative producer of capability tags; with
//! `store_results` it mutates the device row with what it found. Every
//! step is non-fatal except the SSH handshake: per-step failures are
//! collected into the report and analysis continues.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{CommandTransport, ExecOptions};
use crate::connection::SshConnectionInfo;
use crate::device::{Device, DeviceStatus, DeviceStore};
use crate::error::Result;
use crate::parsers::smart::{self, SmartData};
use crate::parsers::sysinfo::{
    self, CpuTimes, DiskIoStats, FilesystemUsage, InterfaceCounters, MemorySummary,
};
use crate::parsers::zfs::{self, ZfsPool, ZfsSnapshot};

/// The five capability tags the analyzer owns
pub const CAPABILITY_TAGS: [&str; 5] = ["docker", "zfs", "swag", "vms", "gpu"];

/// Analyzer configuration
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Whether SMART collection runs at all
    pub smart_monitoring_enabled: bool,
    /// Only try `sudo smartctl`, never the unprivileged fallback
    pub smart_require_sudo: bool,
    /// Treat SMART permission failures as an empty block instead of a
    /// per-drive failure
    pub smart_graceful_fallback: bool,
    /// Per-probe timeout
    pub probe_timeout: Duration,
    /// Per-drive SMART timeout
    pub smart_timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            smart_monitoring_enabled: true,
            smart_require_sudo: false,
            smart_graceful_fallback: true,
            probe_timeout: Duration::from_secs(15),
            smart_timeout: Duration::from_secs(30),
        }
    }
}

/// Options for one analysis run
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Include the top-process listing
    pub include_processes: bool,
    /// Write findings back to the device row
    pub store_results: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            include_processes: false,
            store_results: true,
        }
    }
}

/// Local ping probe outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingProbe {
    /// Whether the host answered
    pub reachable: bool,
    /// Packet loss percentage
    pub packet_loss_percent: Option<u8>,
    /// Average round-trip time
    pub avg_rtt_ms: Option<f64>,
}

/// SSH handshake probe outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshProbe {
    /// Whether the handshake test passed
    pub connected: bool,
    /// Remote username
    pub username: Option<String>,
    /// Remote hostname as the device reports it
    pub hostname: Option<String>,
}

/// Docker findings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerProbe {
    /// Whether a usable docker engine answered
    pub installed: bool,
    /// Engine version
    pub version: Option<String>,
    /// `docker info` JSON when it parsed
    pub info: Option<Value>,
    /// Compose files found under the conventional roots
    pub compose_files: Vec<String>,
    /// Parent directories of those files, deduplicated
    pub compose_paths: Vec<String>,
    /// Detected appdata directories
    pub appdata_paths: Vec<String>,
}

/// Reverse-proxy service findings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesProbe {
    /// Whether a SWAG container is running
    pub swag_running: bool,
    /// Names of running SWAG containers
    pub swag_containers: Vec<String>,
    /// Entries in the proxy-confs directory
    pub proxy_confs_count: u64,
    /// Running container or populated proxy-confs directory
    pub reverse_proxy_detected: bool,
}

/// Storage findings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageProbe {
    /// Whether ZFS tools answered
    pub zfs_available: bool,
    /// Pools from the brief listing
    pub pools: Vec<ZfsPool>,
    /// Most recent snapshots (capped at 20 by the probe)
    pub snapshots: Vec<ZfsSnapshot>,
}

/// Hardware findings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareProbe {
    /// CPU model string
    pub cpu_model: Option<String>,
    /// Logical CPU count
    pub cpu_cores: Option<u32>,
    /// CPU architecture
    pub cpu_architecture: Option<String>,
    /// Total memory as reported by `free -h`
    pub memory_total: Option<String>,
    /// VGA/NVIDIA adapters from lspci
    pub gpus: Vec<String>,
    /// Root filesystem usage line
    pub root_filesystem: Option<FilesystemUsage>,
}

/// Operating system findings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsProbe {
    /// OS name from os-release
    pub name: Option<String>,
    /// OS version from os-release
    pub version: Option<String>,
    /// Kernel release
    pub kernel: Option<String>,
    /// Raw `uptime` line
    pub uptime: Option<String>,
}

/// Virtualization findings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualizationProbe {
    /// Whether virsh is present
    pub virsh_available: bool,
    /// Lines from `virsh list --all`
    pub vms: Vec<String>,
}

/// Live metrics block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsProbe {
    /// CPU breakdown from /proc/stat
    pub cpu: Option<CpuTimes>,
    /// Load averages
    pub load_average: Option<(f64, f64, f64)>,
    /// Logical core count
    pub core_count: Option<u32>,
    /// Memory summary from /proc/meminfo
    pub memory: Option<MemorySummary>,
    /// Mounted /dev filesystems
    pub filesystems: Vec<FilesystemUsage>,
    /// Block IO counters
    pub disk_io: Vec<DiskIoStats>,
    /// Interface counters
    pub network: Vec<InterfaceCounters>,
    /// Raw `uname -a` line
    pub uname: Option<String>,
    /// Seconds since boot
    pub uptime_seconds: Option<u64>,
    /// Boot time as epoch seconds (mtime of /proc/1)
    pub boot_time_epoch: Option<i64>,
}

/// One enumerated drive with its SMART block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveReport {
    /// Kernel name (sda, nvme0n1)
    pub name: String,
    /// Device path (/dev/sda)
    pub device_path: String,
    /// Size column from lsblk
    pub size: Option<String>,
    /// Model column from lsblk
    pub model: Option<String>,
    /// Serial column from lsblk
    pub serial: Option<String>,
    /// Parsed SMART attributes; empty block when unavailable
    pub smart: SmartData,
}

/// The full analysis report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAnalysis {
    /// Hostname of the analyzed device
    pub device: String,
    /// Analysis time
    pub analyzed_at: DateTime<Utc>,
    /// Ping probe
    pub ping: PingProbe,
    /// SSH probe
    pub ssh: SshProbe,
    /// Docker findings
    pub docker: DockerProbe,
    /// Reverse-proxy findings
    pub services: ServicesProbe,
    /// Storage findings
    pub storage: StorageProbe,
    /// Hardware findings
    pub hardware: HardwareProbe,
    /// OS findings
    pub os: OsProbe,
    /// Virtualization findings
    pub virtualization: VirtualizationProbe,
    /// Live metrics
    pub metrics: MetricsProbe,
    /// Per-drive reports
    pub drives: Vec<DriveReport>,
    /// Top-process lines when requested
    pub processes: Vec<String>,
    /// Non-fatal step errors
    pub errors: Vec<String>,
    /// Derived capability tags
    pub capabilities: Vec<String>,
}

impl DeviceAnalysis {
    fn empty(device: &str) -> Self {
        Self {
            device: device.to_string(),
            analyzed_at: Utc::now(),
            ping: PingProbe::default(),
            ssh: SshProbe::default(),
            docker: DockerProbe::default(),
            services: ServicesProbe::default(),
            storage: StorageProbe::default(),
            hardware: HardwareProbe::default(),
            os: OsProbe::default(),
            virtualization: VirtualizationProbe::default(),
            metrics: MetricsProbe::default(),
            drives: Vec::new(),
            processes: Vec::new(),
            errors: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    /// True when a capability was detected
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }
}

/// Composite device prober and capability tagger
pub struct DeviceAnalyzer {
    transport: Arc<dyn CommandTransport>,
    devices: Arc<dyn DeviceStore>,
    config: AnalyzerConfig,
}

impl std::fmt::Debug for DeviceAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAnalyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeviceAnalyzer {
    /// Build an analyzer over the given transport and device store
    #[must_use]
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        devices: Arc<dyn DeviceStore>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            transport,
            devices,
            config,
        }
    }

    /// Run the composite probe against one device.
    ///
    /// Fails only when the device reference does not resolve; every other
    /// failure lands inside the report. SSH handshake failure
    /// short-circuits the remote steps.
    pub async fn analyze(
        &self,
        device_ref: &str,
        options: AnalyzeOptions,
    ) -> Result<DeviceAnalysis> {
        let device = self.devices.resolve(device_ref).await?;
        let conn = device.connection_info();
        let mut report = DeviceAnalysis::empty(&device.hostname);

        info!(device = %device.hostname, "starting device analysis");

        report.ping = self.probe_ping(&conn.host).await;

        report.ssh = self.probe_ssh(&conn, &mut report.errors).await;
        if !report.ssh.connected {
            report
                .errors
                .push("SSH connectivity failed; analysis aborted".to_string());
            return Ok(report);
        }

        report.metrics = self.probe_metrics(&conn, &mut report.errors).await;
        (report.docker, report.services) = self.probe_docker(&conn, &mut report.errors).await;
        report.storage = self.probe_zfs(&conn, &mut report.errors).await;
        report.hardware = self.probe_hardware(&conn, &mut report.errors).await;
        report.os = self.probe_os(&conn, &mut report.errors).await;
        report.virtualization = self.probe_virtualization(&conn, &mut report.errors).await;
        report.drives = self.probe_drives(&conn, &mut report.errors).await;
        if options.include_processes {
            report.processes = self.probe_processes(&conn, &mut report.errors).await;
        }

        report.capabilities = derive_capabilities(&report);

        if options.store_results {
            self.store_results(&device, &report).await;
        }

        info!(
            device = %device.hostname,
            capabilities = ?report.capabilities,
            errors = report.errors.len(),
            "device analysis complete"
        );
        Ok(report)
    }

    /// Run a probe command, recording failures as step errors
    async fn run(
        &self,
        conn: &SshConnectionInfo,
        command: &str,
        errors: &mut Vec<String>,
        step: &str,
    ) -> Option<String> {
        let options = ExecOptions::default().timeout(self.config.probe_timeout);
        match self.transport.execute(conn, command, options).await {
            Ok(result) if result.success => Some(result.stdout),
            Ok(result) => {
                debug!(step, exit_code = result.exit_code, "probe returned non-zero");
                errors.push(format!("{step}: exit code {}", result.exit_code));
                None
            }
            Err(e) => {
                errors.push(format!("{step}: {e}"));
                None
            }
        }
    }

    /// Ping the device from the local machine
    async fn probe_ping(&self, host: &str) -> PingProbe {
        let output = tokio::process::Command::new("ping")
            .arg("-c")
            .arg("4")
            .arg("-W")
            .arg("5")
            .arg(host)
            .output()
            .await;

        let Ok(output) = output else {
            return PingProbe::default();
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut probe = PingProbe {
            reachable: output.status.success(),
            ..PingProbe::default()
        };
        for line in stdout.lines() {
            if line.contains("% packet loss") {
                probe.packet_loss_percent = capture_u8(line, r"(\d+)% packet loss");
            } else if line.contains("avg") && line.contains("ms") {
                probe.avg_rtt_ms = capture_f64(line, r"avg[^=]*=\s*[0-9.]+/([0-9.]+)");
            }
        }
        probe
    }

    async fn probe_ssh(&self, conn: &SshConnectionInfo, errors: &mut Vec<String>) -> SshProbe {
        let stdout = self
            .run(
                conn,
                "echo SSH_CONNECTION_TEST && whoami && hostname",
                errors,
                "ssh_probe",
            )
            .await;
        let Some(stdout) = stdout else {
            return SshProbe::default();
        };
        if !stdout.contains("SSH_CONNECTION_TEST") {
            errors.push("ssh_probe: marker missing from output".to_string());
            return SshProbe::default();
        }
        let mut lines = stdout.lines().skip(1);
        SshProbe {
            connected: true,
            username: lines.next().map(|l| l.trim().to_string()),
            hostname: lines.next().map(|l| l.trim().to_string()),
        }
    }

    async fn probe_metrics(
        &self,
        conn: &SshConnectionInfo,
        errors: &mut Vec<String>,
    ) -> MetricsProbe {
        let mut metrics = MetricsProbe::default();

        if let Some(out) = self.run(conn, "head -1 /proc/stat", errors, "cpu_stat").await {
            metrics.cpu = sysinfo::parse_proc_stat_cpu(&out);
        }
        if let Some(out) = self.run(conn, "cat /proc/loadavg", errors, "loadavg").await {
            metrics.load_average = sysinfo::parse_loadavg(&out);
        }
        if let Some(out) = self.run(conn, "nproc", errors, "nproc").await {
            metrics.core_count = out.trim().parse().ok();
        }
        if let Some(out) = self.run(conn, "cat /proc/meminfo", errors, "meminfo").await {
            metrics.memory = sysinfo::memory_summary(&out);
        }
        if let Some(out) = self
            .run(
                conn,
                "df -h --output=source,size,used,avail,pcent,target | grep -E '^/dev/'",
                errors,
                "df",
            )
            .await
        {
            metrics.filesystems = sysinfo::parse_df(&out);
        }
        if let Some(out) = self.run(conn, "cat /proc/diskstats", errors, "diskstats").await {
            metrics.disk_io = sysinfo::parse_diskstats(&out);
        }
        if let Some(out) = self.run(conn, "cat /proc/net/dev", errors, "net_dev").await {
            metrics.network = sysinfo::parse_net_dev(&out);
        }
        if let Some(out) = self.run(conn, "uname -a", errors, "uname").await {
            metrics.uname = Some(out.trim().to_string());
        }
        if let Some(out) = self.run(conn, "cat /proc/uptime", errors, "uptime").await {
            metrics.uptime_seconds = sysinfo::parse_uptime_seconds(&out);
        }
        if let Some(out) = self
            .run(conn, "stat -c %Y /proc/1", errors, "boot_time")
            .await
        {
            metrics.boot_time_epoch = out.trim().parse().ok();
        }
        metrics
    }

    async fn probe_docker(
        &self,
        conn: &SshConnectionInfo,
        errors: &mut Vec<String>,
    ) -> (DockerProbe, ServicesProbe) {
        let mut docker = DockerProbe::default();
        let mut services = ServicesProbe::default();

        let version_out = self
            .run(
                conn,
                "docker --version && docker info --format json 2>/dev/null || echo 'DOCKER_NOT_AVAILABLE'",
                errors,
                "docker_version",
            )
            .await;
        let Some(version_out) = version_out else {
            return (docker, services);
        };
        if version_out.contains("DOCKER_NOT_AVAILABLE") {
            return (docker, services);
        }

        docker.installed = true;
        docker.version = capture_string(&version_out, r"Docker version ([0-9.]+)");
        if let Some(start) = version_out.find('{') {
            docker.info = serde_json::from_str(&version_out[start..]).ok();
        }

        if let Some(out) = self
            .run(
                conn,
                "find /home /opt /srv -name 'docker-compose.yml' -o -name 'docker-compose.yaml' 2>/dev/null | head -10",
                errors,
                "compose_files",
            )
            .await
        {
            docker.compose_files = out
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToString::to_string)
                .collect();
            let mut paths: Vec<String> = docker
                .compose_files
                .iter()
                .filter_map(|f| f.rsplit_once('/').map(|(dir, _)| dir.to_string()))
                .collect();
            paths.sort();
            paths.dedup();
            docker.compose_paths = paths;
        }

        if let Some(out) = self
            .run(
                conn,
                "ls -d /mnt/appdata /opt/appdata /home/*/appdata 2>/dev/null || echo 'NO_APPDATA_FOUND'",
                errors,
                "appdata",
            )
            .await
        {
            if !out.contains("NO_APPDATA_FOUND") {
                let mut paths: Vec<String> = out
                    .lines()
                    .map(str::trim)
                    .filter(|l| l.contains("appdata"))
                    .map(ToString::to_string)
                    .collect();
                paths.sort();
                paths.dedup();
                docker.appdata_paths = paths;
            }
        }

        if let Some(out) = self
            .run(
                conn,
                "docker ps --format '{{.Names}}' | grep -i swag; ls /mnt/appdata/swag/nginx/proxy-confs 2>/dev/null | wc -l || echo 'NO_SWAG_FOUND'",
                errors,
                "swag",
            )
            .await
        {
            if !out.contains("NO_SWAG_FOUND") {
                for line in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    if let Ok(count) = line.parse::<u64>() {
                        services.proxy_confs_count = count;
                    } else if line.to_lowercase().contains("swag") {
                        services.swag_containers.push(line.to_string());
                        services.swag_running = true;
                    }
                }
            }
        }
        services.reverse_proxy_detected = services.swag_running || services.proxy_confs_count > 0;

        (docker, services)
    }

    async fn probe_zfs(&self, conn: &SshConnectionInfo, errors: &mut Vec<String>) -> StorageProbe {
        let mut storage = StorageProbe::default();
        let out = self
            .run(
                conn,
                "zpool list -H -o name,size,alloc,free,health 2>/dev/null && echo '---SNAPSHOTS---' && zfs list -t snapshot -H -o name,used,creation 2>/dev/null | head -20 || echo 'ZFS_NOT_AVAILABLE'",
                errors,
                "zfs",
            )
            .await;
        let Some(out) = out else { return storage };
        if out.contains("ZFS_NOT_AVAILABLE") {
            return storage;
        }

        let (pools_part, snaps_part) = match out.split_once("---SNAPSHOTS---") {
            Some((pools, snaps)) => (pools, snaps),
            None => (out.as_str(), ""),
        };
        storage.pools = zfs::parse_pool_list_brief(pools_part);
        storage.snapshots = zfs::parse_snapshot_list(snaps_part);
        storage.zfs_available = !storage.pools.is_empty();
        storage
    }

    async fn probe_hardware(
        &self,
        conn: &SshConnectionInfo,
        errors: &mut Vec<String>,
    ) -> HardwareProbe {
        let mut hardware = HardwareProbe::default();
        let out = self
            .run(
                conn,
                "lscpu | grep -E 'Model name|^CPU\\(s\\)|Architecture'; free -h | grep 'Mem:'; lspci | grep -i vga; lspci | grep -i nvidia; df -h / | tail -1",
                errors,
                "hardware",
            )
            .await;
        let Some(out) = out else { return hardware };

        for line in out.lines() {
            let line = line.trim();
            if let Some(model) = line.strip_prefix("Model name:") {
                hardware.cpu_model = Some(model.trim().to_string());
            } else if let Some(cores) = line.strip_prefix("CPU(s):") {
                hardware.cpu_cores = cores.trim().parse().ok();
            } else if let Some(arch) = line.strip_prefix("Architecture:") {
                hardware.cpu_architecture = Some(arch.trim().to_string());
            } else if line.starts_with("Mem:") {
                hardware.memory_total = line.split_whitespace().nth(1).map(ToString::to_string);
            } else if line.to_lowercase().contains("vga")
                || line.to_lowercase().contains("nvidia")
            {
                hardware.gpus.push(line.to_string());
            } else if line.starts_with("/dev/") {
                hardware.root_filesystem = sysinfo::parse_df(line).into_iter().next();
            }
        }
        hardware.gpus.dedup();
        hardware
    }

    async fn probe_os(&self, conn: &SshConnectionInfo, errors: &mut Vec<String>) -> OsProbe {
        let mut os = OsProbe::default();
        if let Some(out) = self.run(conn, "cat /etc/os-release", errors, "os_release").await {
            let release = sysinfo::parse_os_release(&out);
            os.name = release.get("NAME").cloned();
            os.version = release
                .get("VERSION")
                .or_else(|| release.get("VERSION_ID"))
                .cloned();
        }
        if let Some(out) = self.run(conn, "uname -r", errors, "kernel").await {
            os.kernel = Some(out.trim().to_string());
        }
        if let Some(out) = self.run(conn, "uptime", errors, "uptime_text").await {
            os.uptime = Some(out.trim().to_string());
        }
        os
    }

    async fn probe_virtualization(
        &self,
        conn: &SshConnectionInfo,
        errors: &mut Vec<String>,
    ) -> VirtualizationProbe {
        let mut virt = VirtualizationProbe::default();
        let out = self
            .run(
                conn,
                "which virsh && virsh list --all 2>/dev/null | head -10 || echo 'VIRSH_NOT_AVAILABLE'",
                errors,
                "virsh",
            )
            .await;
        let Some(out) = out else { return virt };
        if out.contains("VIRSH_NOT_AVAILABLE") {
            return virt;
        }
        virt.virsh_available = true;
        virt.vms = out
            .lines()
            .map(str::trim)
            .filter(|l| {
                !l.is_empty()
                    && !l.starts_with('/')
                    && !l.starts_with("Id")
                    && !l.starts_with('-')
            })
            .map(ToString::to_string)
            .collect();
        virt
    }

    async fn probe_drives(
        &self,
        conn: &SshConnectionInfo,
        errors: &mut Vec<String>,
    ) -> Vec<DriveReport> {
        let out = self
            .run(
                conn,
                "lsblk -d -n -o NAME,TYPE,SIZE,MODEL,SERIAL",
                errors,
                "lsblk",
            )
            .await;
        let Some(out) = out else { return Vec::new() };

        let mut drives = Vec::new();
        for line in out.lines() {
            let Some(row) = parse_lsblk_row(line) else {
                continue;
            };
            if row.device_type != "disk" {
                continue;
            }
            let device_path = format!("/dev/{}", row.name);
            let smart = self.collect_smart(conn, &device_path, errors).await;
            drives.push(DriveReport {
                name: row.name,
                device_path,
                size: row.size,
                model: row.model,
                serial: row.serial,
                smart,
            });
        }
        drives
    }

    /// SMART collection with the three-flag policy: disabled → empty,
    /// sudo-only → fail the drive on denial, graceful → empty block on any
    /// denial or failure.
    async fn collect_smart(
        &self,
        conn: &SshConnectionInfo,
        device_path: &str,
        errors: &mut Vec<String>,
    ) -> SmartData {
        if !self.config.smart_monitoring_enabled {
            return SmartData::default();
        }

        let command = if self.config.smart_require_sudo {
            format!("sudo smartctl -a {device_path}")
        } else {
            format!(
                "sudo smartctl -a {device_path} 2>/dev/null || smartctl -a {device_path} 2>/dev/null || echo 'SMART_ACCESS_DENIED'"
            )
        };

        let options = ExecOptions::default()
            .timeout(self.config.smart_timeout)
            // smartctl uses bits of the exit code for non-fatal warnings
            .expected_exit_codes([0, 4, 64]);
        let result = match self.transport.execute(conn, &command, options).await {
            Ok(result) => result,
            Err(e) => {
                if !self.config.smart_graceful_fallback {
                    errors.push(format!("smart {device_path}: {e}"));
                }
                return SmartData::default();
            }
        };

        if !result.success || smart::is_access_denied(&result.stdout, &result.stderr) {
            if !self.config.smart_graceful_fallback {
                errors.push(format!(
                    "smart {device_path}: access denied (exit code {})",
                    result.exit_code
                ));
            } else {
                warn!(device_path, "SMART access denied, continuing without data");
            }
            return SmartData::default();
        }

        smart::parse_smart_output(&result.stdout)
    }

    async fn probe_processes(
        &self,
        conn: &SshConnectionInfo,
        errors: &mut Vec<String>,
    ) -> Vec<String> {
        let out = self
            .run(conn, "ps aux --sort=-%cpu | head -11", errors, "processes")
            .await;
        out.map(|stdout| {
            stdout
                .lines()
                .skip(1)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
    }

    /// Write the analysis back onto the device row: status, capability
    /// tags (removing stale ones), canonical paths, and summaries.
    async fn store_results(&self, device: &Device, report: &DeviceAnalysis) {
        let report = report.clone();
        let outcome = self
            .devices
            .update(
                device.id,
                Box::new(move |device| {
                    device.status = DeviceStatus::Online;
                    device.last_seen = Some(Utc::now());

                    let detected: Vec<&str> = report
                        .capabilities
                        .iter()
                        .map(String::as_str)
                        .collect();
                    for tag in CAPABILITY_TAGS {
                        if detected.contains(&tag) {
                            device.tags.insert(tag.to_string(), json!(true));
                        } else {
                            device.tags.remove(tag);
                        }
                    }

                    device
                        .tags
                        .insert("analysis_timestamp".into(), json!(report.analyzed_at));

                    if report.docker.installed {
                        if let Some(version) = &report.docker.version {
                            device.tags.insert("docker_version".into(), json!(version));
                        }
                        if let Some(first) = report.docker.compose_paths.first() {
                            device.docker_compose_path = Some(first.clone());
                            device.tags.insert(
                                "all_docker_compose_paths".into(),
                                json!(report.docker.compose_paths),
                            );
                        }
                        if let Some(first) = report.docker.appdata_paths.first() {
                            device.docker_appdata_path = Some(first.clone());
                            device.tags.insert(
                                "all_appdata_paths".into(),
                                json!(report.docker.appdata_paths),
                            );
                        }
                    }

                    if report.storage.zfs_available {
                        let pool_names: Vec<&str> =
                            report.storage.pools.iter().map(|p| p.name.as_str()).collect();
                        device.tags.insert("zfs_pools".into(), json!(pool_names));
                        device
                            .tags
                            .insert("zfs_pool_count".into(), json!(pool_names.len()));
                    }

                    if report.services.reverse_proxy_detected {
                        device.tags.insert(
                            "swag_containers".into(),
                            json!(report.services.swag_containers),
                        );
                        device.tags.insert(
                            "swag_config_count".into(),
                            json!(report.services.proxy_confs_count),
                        );
                        device
                            .tags
                            .insert("swag_running".into(), json!(report.services.swag_running));
                    }

                    if report.virtualization.virsh_available {
                        device
                            .tags
                            .insert("vm_count".into(), json!(report.virtualization.vms.len()));
                        device.tags.insert("hypervisor".into(), json!("libvirt"));
                    }

                    if !report.hardware.gpus.is_empty() {
                        device.tags.insert("gpu_info".into(), json!(report.hardware.gpus));
                        device
                            .tags
                            .insert("gpu_count".into(), json!(report.hardware.gpus.len()));
                    }

                    if let Some(name) = &report.os.name {
                        device.tags.insert("os_name".into(), json!(name));
                    }
                    if let Some(version) = &report.os.version {
                        device.tags.insert("os_version".into(), json!(version));
                    }
                    if let Some(kernel) = &report.os.kernel {
                        device.tags.insert("kernel".into(), json!(kernel));
                    }
                    if let Some(model) = &report.hardware.cpu_model {
                        device.tags.insert("cpu_model".into(), json!(model));
                    }
                    if let Some(cores) = report.hardware.cpu_cores {
                        device.tags.insert("cpu_cores".into(), json!(cores));
                    }
                    if let Some(arch) = &report.hardware.cpu_architecture {
                        device.tags.insert("cpu_architecture".into(), json!(arch));
                    }
                    if let Some(total) = &report.hardware.memory_total {
                        device.tags.insert("memory_total".into(), json!(total));
                    }
                }),
            )
            .await;
        if let Err(e) = outcome {
            warn!(device = %device.hostname, error = %e, "failed to store analysis results");
        }
    }
}

struct LsblkRow {
    name: String,
    device_type: String,
    size: Option<String>,
    model: Option<String>,
    serial: Option<String>,
}

/// Split one `lsblk -d -n -o NAME,TYPE,SIZE,MODEL,SERIAL` row.
///
/// NAME, TYPE, and SIZE are single tokens and SERIAL never contains
/// spaces, but MODEL often does (`Samsung SSD 970 EVO`). So the serial is
/// the last remaining token and the model is the span in between.
fn parse_lsblk_row(line: &str) -> Option<LsblkRow> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        return None;
    }
    let (model, serial) = match fields.len() {
        2 | 3 => (None, None),
        4 => (Some(fields[3].to_string()), None),
        n => (
            Some(fields[3..n - 1].join(" ")),
            Some(fields[n - 1].to_string()),
        ),
    };
    Some(LsblkRow {
        name: fields[0].to_string(),
        device_type: fields[1].to_string(),
        size: fields.get(2).map(ToString::to_string),
        model,
        serial,
    })
}

/// Derive the capability tag set from a finished report
#[must_use]
pub fn derive_capabilities(report: &DeviceAnalysis) -> Vec<String> {
    let mut capabilities = Vec::new();
    if report.docker.installed {
        capabilities.push("docker".to_string());
    }
    if report.storage.zfs_available {
        capabilities.push("zfs".to_string());
    }
    if report.services.reverse_proxy_detected {
        capabilities.push("swag".to_string());
    }
    if report.virtualization.virsh_available {
        capabilities.push("vms".to_string());
    }
    if !report.hardware.gpus.is_empty() {
        capabilities.push("gpu".to_string());
    }
    capabilities
}

fn capture_string(text: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(text)
        .map(|c| c[1].to_string())
}

fn capture_u8(text: &str, pattern: &str) -> Option<u8> {
    capture_string(text, pattern)?.parse().ok()
}

fn capture_f64(text: &str, pattern: &str) -> Option<f64> {
    capture_string(text, pattern)?.parse().ok()
}
