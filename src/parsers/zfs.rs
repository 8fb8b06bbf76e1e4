//! Parsers for `zpool` and `zfs` scripted (`-H`) output.

use serde::{Deserialize, Serialize};

/// One pool from `zpool list -H`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZfsPool {
    /// Pool name
    pub name: String,
    /// Total size (human units, as reported)
    pub size: String,
    /// Allocated space
    pub allocated: String,
    /// Free space
    pub free: String,
    /// Capacity percentage column, when present
    pub capacity: Option<String>,
    /// Health column (ONLINE, DEGRADED, FAULTED)
    pub health: Option<String>,
}

impl ZfsPool {
    /// True when the pool reports ONLINE
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health.as_deref() == Some("ONLINE")
    }
}

/// One dataset from `zfs list -H`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZfsDataset {
    /// Dataset name
    pub name: String,
    /// Used space
    pub used: String,
    /// Available space
    pub available: String,
    /// Referenced space
    pub referenced: String,
    /// Mountpoint, `-` when none
    pub mountpoint: String,
    /// Dataset type column, when present
    pub dataset_type: Option<String>,
}

/// One snapshot from `zfs list -t snapshot -H`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZfsSnapshot {
    /// Snapshot name (`dataset@snap`)
    pub name: String,
    /// Space held by the snapshot
    pub used: String,
    /// Creation time as reported (free text with spaces)
    pub creation: String,
}

/// Parse `zpool list -H -o name,size,allocated,free,capacity,health,altroot`
#[must_use]
pub fn parse_pool_list(stdout: &str) -> Vec<ZfsPool> {
    scripted_lines(stdout)
        .filter_map(|fields| {
            let mut it = fields.into_iter();
            Some(ZfsPool {
                name: it.next()?,
                size: it.next()?,
                allocated: it.next()?,
                free: it.next()?,
                capacity: it.next(),
                health: it.next(),
            })
        })
        .collect()
}

/// Parse the analyzer's brief pool probe,
/// `zpool list -H -o name,size,alloc,free,health` (no capacity column)
#[must_use]
pub fn parse_pool_list_brief(stdout: &str) -> Vec<ZfsPool> {
    scripted_lines(stdout)
        .filter_map(|fields| {
            let mut it = fields.into_iter();
            Some(ZfsPool {
                name: it.next()?,
                size: it.next()?,
                allocated: it.next()?,
                free: it.next()?,
                capacity: None,
                health: it.next(),
            })
        })
        .collect()
}

/// Parse `zfs list -H -o name,used,avail,refer,mountpoint,type`
#[must_use]
pub fn parse_dataset_list(stdout: &str) -> Vec<ZfsDataset> {
    scripted_lines(stdout)
        .filter_map(|fields| {
            let mut it = fields.into_iter();
            Some(ZfsDataset {
                name: it.next()?,
                used: it.next()?,
                available: it.next()?,
                referenced: it.next()?,
                mountpoint: it.next()?,
                dataset_type: it.next(),
            })
        })
        .collect()
}

/// Parse `zfs list -H -t snapshot -o name,used,creation`.
///
/// Creation is free text containing spaces, so only the first two fields
/// are split and the rest is kept verbatim.
#[must_use]
pub fn parse_snapshot_list(stdout: &str) -> Vec<ZfsSnapshot> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.contains("no datasets available"))
        .filter_map(|line| {
            if line.contains('\t') {
                let mut parts = line.splitn(3, '\t');
                Some(ZfsSnapshot {
                    name: parts.next()?.trim().to_string(),
                    used: parts.next()?.trim().to_string(),
                    creation: parts.next().unwrap_or("").trim().to_string(),
                })
            } else {
                let mut parts = line.splitn(3, char::is_whitespace);
                Some(ZfsSnapshot {
                    name: parts.next()?.trim().to_string(),
                    used: parts.next()?.trim().to_string(),
                    creation: parts.next().unwrap_or("").trim().to_string(),
                })
            }
        })
        .collect()
}

/// Split scripted output into per-line fields. `-H` output is
/// tab-separated; whitespace-aligned output is tolerated.
fn scripted_lines(stdout: &str) -> impl Iterator<Item = Vec<String>> + '_ {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.contains("no pools available"))
        .map(|line| {
            if line.contains('\t') {
                line.split('\t').map(|f| f.trim().to_string()).collect()
            } else {
                line.split_whitespace().map(ToString::to_string).collect()
            }
        })
}
