//! Parsers for /proc files and coreutils output (`df`, `free`, `uptime`).

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// CPU time breakdown from the first line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuTimes {
    /// Percent of time in user mode
    pub user_percent: f64,
    /// Percent of time in kernel mode
    pub system_percent: f64,
    /// Percent of time idle
    pub idle_percent: f64,
    /// Percent of time waiting on IO
    pub iowait_percent: f64,
    /// Total non-idle percent
    pub usage_percent: f64,
}

/// Memory summary distilled from `/proc/meminfo`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    /// Total memory in MB
    pub total_mb: f64,
    /// Used memory in MB (total minus available)
    pub used_mb: f64,
    /// Available memory in MB
    pub available_mb: f64,
    /// Used percent of total
    pub usage_percent: f64,
    /// Page cache in MB
    pub cached_mb: f64,
    /// Buffers in MB
    pub buffers_mb: f64,
    /// Swap total in MB
    pub swap_total_mb: f64,
    /// Swap used in MB
    pub swap_used_mb: f64,
}

/// One mounted filesystem from `df`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemUsage {
    /// Source device
    pub device: String,
    /// Size column as reported
    pub size: String,
    /// Used column as reported
    pub used: String,
    /// Available column as reported
    pub available: String,
    /// Usage percent
    pub usage_percent: u8,
    /// Mount point
    pub mount_point: String,
}

/// Per-device IO counters from `/proc/diskstats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskIoStats {
    /// Device name
    pub device: String,
    /// Reads completed
    pub reads_completed: u64,
    /// Sectors read
    pub sectors_read: u64,
    /// Writes completed
    pub writes_completed: u64,
    /// Sectors written
    pub sectors_written: u64,
}

/// Per-interface counters from `/proc/net/dev`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    /// Interface name
    pub interface: String,
    /// Bytes received
    pub rx_bytes: u64,
    /// Packets received
    pub rx_packets: u64,
    /// Bytes transmitted
    pub tx_bytes: u64,
    /// Packets transmitted
    pub tx_packets: u64,
}

/// Parse `/proc/meminfo` into a `field → kB` map
#[must_use]
pub fn parse_meminfo(stdout: &str) -> HashMap<String, u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+)").expect("static regex"));

    stdout
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let number = re.find(value)?.as_str().parse().ok()?;
            Some((key.trim().to_string(), number))
        })
        .collect()
}

/// Distill a [`MemorySummary`] from `/proc/meminfo` output
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn memory_summary(stdout: &str) -> Option<MemorySummary> {
    let info = parse_meminfo(stdout);
    let total_kb = *info.get("MemTotal")?;
    let available_kb = *info.get("MemAvailable")?;
    let used_kb = total_kb.saturating_sub(available_kb);
    let swap_total_kb = info.get("SwapTotal").copied().unwrap_or(0);
    let swap_used_kb = swap_total_kb.saturating_sub(info.get("SwapFree").copied().unwrap_or(0));

    Some(MemorySummary {
        total_mb: round2(total_kb as f64 / 1024.0),
        used_mb: round2(used_kb as f64 / 1024.0),
        available_mb: round2(available_kb as f64 / 1024.0),
        usage_percent: if total_kb == 0 {
            0.0
        } else {
            round2(used_kb as f64 / total_kb as f64 * 100.0)
        },
        cached_mb: round2(info.get("Cached").copied().unwrap_or(0) as f64 / 1024.0),
        buffers_mb: round2(info.get("Buffers").copied().unwrap_or(0) as f64 / 1024.0),
        swap_total_mb: round2(swap_total_kb as f64 / 1024.0),
        swap_used_mb: round2(swap_used_kb as f64 / 1024.0),
    })
}

/// Parse the first `cpu` line of `/proc/stat` into percentages
#[must_use]
pub fn parse_proc_stat_cpu(stdout: &str) -> Option<CpuTimes> {
    let line = stdout.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() < 7 {
        return None;
    }
    let (user, _nice, system, idle, iowait) = (values[0], values[1], values[2], values[3], values[4]);
    let total: u64 = values[..7].iter().sum();
    if total == 0 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let pct = |v: u64| round2(v as f64 / total as f64 * 100.0);
    Some(CpuTimes {
        user_percent: pct(user),
        system_percent: pct(system),
        idle_percent: pct(idle),
        iowait_percent: pct(iowait),
        usage_percent: pct(total - idle),
    })
}

/// Parse `/proc/loadavg` into the three load averages
#[must_use]
pub fn parse_loadavg(stdout: &str) -> Option<(f64, f64, f64)> {
    let mut fields = stdout.split_whitespace();
    Some((
        fields.next()?.parse().ok()?,
        fields.next()?.parse().ok()?,
        fields.next()?.parse().ok()?,
    ))
}

/// Parse `df` output (with or without headers) into mounted filesystems.
/// Only `/dev/`-backed rows are kept, matching the metrics probe.
#[must_use]
pub fn parse_df(stdout: &str) -> Vec<FilesystemUsage> {
    stdout
        .lines()
        .filter(|l| l.starts_with("/dev/"))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            Some(FilesystemUsage {
                device: parts[0].to_string(),
                size: parts[1].to_string(),
                used: parts[2].to_string(),
                available: parts[3].to_string(),
                usage_percent: parts[4].trim_end_matches('%').parse().ok()?,
                mount_point: parts[5].to_string(),
            })
        })
        .collect()
}

/// Parse `/proc/uptime` into whole seconds since boot
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_uptime_seconds(stdout: &str) -> Option<u64> {
    let seconds: f64 = stdout.split_whitespace().next()?.parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(seconds as u64)
    } else {
        None
    }
}

/// Parse `/proc/diskstats` rows for whole block devices, skipping
/// partitions and loop/ram devices.
#[must_use]
pub fn parse_diskstats(stdout: &str) -> Vec<DiskIoStats> {
    stdout
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 14 {
                return None;
            }
            let device = parts[2];
            if device.starts_with("loop") || device.starts_with("ram") {
                return None;
            }
            // Partitions end in a digit for sd/vd devices (sda1); nvme
            // partitions carry a 'p' separator (nvme0n1p1)
            let is_partition = device.contains('p') && device.starts_with("nvme")
                || device.starts_with("sd") && device.ends_with(|c: char| c.is_ascii_digit())
                || device.starts_with("vd") && device.ends_with(|c: char| c.is_ascii_digit());
            if is_partition {
                return None;
            }
            Some(DiskIoStats {
                device: device.to_string(),
                reads_completed: parts[3].parse().ok()?,
                sectors_read: parts[5].parse().ok()?,
                writes_completed: parts[7].parse().ok()?,
                sectors_written: parts[9].parse().ok()?,
            })
        })
        .collect()
}

/// Parse `/proc/net/dev` into per-interface counters, excluding loopback
#[must_use]
pub fn parse_net_dev(stdout: &str) -> Vec<InterfaceCounters> {
    stdout
        .lines()
        .filter_map(|line| {
            let (name, counters) = line.split_once(':')?;
            let name = name.trim();
            if name == "lo" {
                return None;
            }
            let parts: Vec<&str> = counters.split_whitespace().collect();
            if parts.len() < 10 {
                return None;
            }
            Some(InterfaceCounters {
                interface: name.to_string(),
                rx_bytes: parts[0].parse().ok()?,
                rx_packets: parts[1].parse().ok()?,
                tx_bytes: parts[8].parse().ok()?,
                tx_packets: parts[9].parse().ok()?,
            })
        })
        .collect()
}

/// Parse `/etc/os-release` into a key → value map with quotes stripped
#[must_use]
pub fn parse_os_release(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
