//! Result parsers.
//!
//! Pure functions from remote stdout to typed values, selected by command
//! category. Parsing never fails outward: output a parser does not
//! recognize is returned as the raw string, so two identical outputs always
//! produce identical payloads.

use serde_json::{json, Value};

use crate::registry::CommandCategory;

pub mod docker;
pub mod journald;
pub mod smart;
pub mod sysinfo;
pub mod syslog;
pub mod zfs;

/// Parse command output into the payload stored in the cache and returned
/// to collect callers.
#[must_use]
pub fn parse(category: CommandCategory, operation: &str, stdout: &str) -> Value {
    match category {
        CommandCategory::ContainerManagement => match operation {
            "list_containers" => json!(docker::parse_ps_table(stdout)),
            "get_container_stats" => json!(docker::parse_stats_table(stdout)),
            "inspect_container" => docker::parse_inspect(stdout)
                .unwrap_or_else(|| Value::String(stdout.to_string())),
            _ => Value::String(stdout.to_string()),
        },
        CommandCategory::ZfsManagement => match operation {
            "list_zfs_pools" => json!(zfs::parse_pool_list(stdout)),
            "list_zfs_datasets" => json!(zfs::parse_dataset_list(stdout)),
            "list_zfs_snapshots" => json!(zfs::parse_snapshot_list(stdout)),
            _ => Value::String(stdout.to_string()),
        },
        CommandCategory::Logs => {
            if journald::looks_like_journal_json(stdout) {
                json!(journald::parse_journal_lines(stdout))
            } else {
                json!(syslog::parse_syslog_lines(stdout))
            }
        }
        CommandCategory::SystemInfo if operation == "get_memory_info" => {
            json!(sysinfo::parse_meminfo(stdout))
        }
        CommandCategory::SystemMonitoring if operation == "get_disk_usage" => {
            json!(sysinfo::parse_df(stdout))
        }
        CommandCategory::DriveHealth if operation == "get_smart_status" => {
            json!(smart::parse_smart_output(stdout))
        }
        _ => Value::String(stdout.to_string()),
    }
}
