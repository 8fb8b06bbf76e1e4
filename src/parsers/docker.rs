//! Parsers for docker CLI table and JSON output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of `docker ps` table output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container ID (short form)
    pub id: String,
    /// Container name
    pub names: String,
    /// Status column (e.g. "Up 2 hours")
    pub status: String,
    /// Image reference
    pub image: String,
    /// Published ports column
    pub ports: String,
}

impl ContainerRecord {
    /// True when the status column reports the container running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status.starts_with("Up")
    }
}

/// One row of `docker stats --no-stream` table output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatsRecord {
    /// Container name or ID
    pub container: String,
    /// CPU usage percentage
    pub cpu_percent: Option<f64>,
    /// Memory usage column (e.g. "120MiB / 7.6GiB")
    pub mem_usage: String,
    /// Network IO column
    pub net_io: String,
    /// Block IO column
    pub block_io: String,
}

/// Parse `docker ps` output in the tab-separated table format
/// `{{.ID}}\t{{.Names}}\t{{.Status}}\t{{.Image}}\t{{.Ports}}`.
#[must_use]
pub fn parse_ps_table(stdout: &str) -> Vec<ContainerRecord> {
    stdout
        .lines()
        .skip_while(|l| l.starts_with("CONTAINER ID"))
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.split('\t').map(str::trim);
            Some(ContainerRecord {
                id: parts.next()?.to_string(),
                names: parts.next()?.to_string(),
                status: parts.next()?.to_string(),
                image: parts.next()?.to_string(),
                ports: parts.next().unwrap_or("").to_string(),
            })
        })
        .collect()
}

/// Parse `docker stats --no-stream` output in the tab-separated format
/// `{{.Container}}\t{{.CPUPerc}}\t{{.MemUsage}}\t{{.NetIO}}\t{{.BlockIO}}`.
#[must_use]
pub fn parse_stats_table(stdout: &str) -> Vec<ContainerStatsRecord> {
    stdout
        .lines()
        .skip_while(|l| l.starts_with("CONTAINER"))
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.split('\t').map(str::trim);
            Some(ContainerStatsRecord {
                container: parts.next()?.to_string(),
                cpu_percent: parts.next().and_then(parse_percent),
                mem_usage: parts.next().unwrap_or("").to_string(),
                net_io: parts.next().unwrap_or("").to_string(),
                block_io: parts.next().unwrap_or("").to_string(),
            })
        })
        .collect()
}

/// Parse `docker inspect` JSON output
#[must_use]
pub fn parse_inspect(stdout: &str) -> Option<Value> {
    serde_json::from_str(stdout.trim()).ok()
}

fn parse_percent(field: &str) -> Option<f64> {
    field.trim().trim_end_matches('%').parse().ok()
}
