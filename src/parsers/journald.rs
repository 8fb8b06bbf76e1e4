//! Parser for `journalctl --output=json` lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Entry time, when the journal carried a realtime timestamp
    pub timestamp: Option<DateTime<Utc>>,
    /// Severity in the syslog taxonomy
    pub level: String,
    /// systemd unit or syslog identifier, when present
    pub unit: Option<String>,
    /// Emitting PID, when present
    pub pid: Option<u32>,
    /// Message text
    pub message: String,
}

/// Map a numeric journald priority to the syslog level taxonomy
#[must_use]
pub fn priority_to_level(priority: u8) -> &'static str {
    match priority {
        0 => "emerg",
        1 => "alert",
        2 => "crit",
        3 => "err",
        4 => "warning",
        5 => "notice",
        6 => "info",
        _ => "debug",
    }
}

/// Heuristic: journal JSON output has one object per line
#[must_use]
pub fn looks_like_journal_json(stdout: &str) -> bool {
    stdout
        .lines()
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.trim_start().starts_with('{'))
}

/// Parse `journalctl --output=json` output, one JSON object per line.
///
/// Lines that are not valid JSON are kept as opaque messages at `info`.
#[must_use]
pub fn parse_journal_lines(stdout: &str) -> Vec<LogRecord> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| match serde_json::from_str::<Value>(line) {
            Ok(entry) => parse_entry(&entry),
            Err(_) => LogRecord {
                timestamp: None,
                level: "info".to_string(),
                unit: None,
                pid: None,
                message: line.to_string(),
            },
        })
        .collect()
}

fn parse_entry(entry: &Value) -> LogRecord {
    let priority = string_field(entry, "PRIORITY")
        .and_then(|p| p.parse::<u8>().ok())
        .unwrap_or(6);

    // Realtime timestamps arrive as microseconds-since-epoch strings
    let timestamp = string_field(entry, "__REALTIME_TIMESTAMP")
        .and_then(|usec| usec.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_micros);

    let unit = string_field(entry, "_SYSTEMD_UNIT")
        .or_else(|| string_field(entry, "SYSLOG_IDENTIFIER"));

    let pid = string_field(entry, "_PID").and_then(|p| p.parse().ok());

    // MESSAGE is usually a string but the journal can carry byte arrays
    let message = match entry.get("MESSAGE") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    LogRecord {
        timestamp,
        level: priority_to_level(priority).to_string(),
        unit,
        pid,
        message,
    }
}

fn string_field(entry: &Value, key: &str) -> Option<String> {
    entry.get(key).and_then(Value::as_str).map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_taxonomy() {
        assert_eq!(priority_to_level(0), "emerg");
        assert_eq!(priority_to_level(3), "err");
        assert_eq!(priority_to_level(4), "warning");
        assert_eq!(priority_to_level(6), "info");
        assert_eq!(priority_to_level(7), "debug");
        assert_eq!(priority_to_level(42), "debug");
    }

    #[test]
    fn test_parse_journal_lines() {
        let stdout = concat!(
            r#"{"MESSAGE":"Started nginx","PRIORITY":"6","_SYSTEMD_UNIT":"nginx.service","_PID":"812","__REALTIME_TIMESTAMP":"1705314645000000"}"#,
            "\n",
            r#"{"MESSAGE":"segfault","PRIORITY":"2"}"#,
            "\n",
        );
        let records = parse_journal_lines(stdout);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].message, "Started nginx");
        assert_eq!(records[0].level, "info");
        assert_eq!(records[0].unit.as_deref(), Some("nginx.service"));
        assert_eq!(records[0].pid, Some(812));
        assert!(records[0].timestamp.is_some());

        assert_eq!(records[1].level, "crit");
        assert!(records[1].unit.is_none());
    }

    #[test]
    fn test_invalid_json_kept_opaque_at_info() {
        let records = parse_journal_lines("-- No entries --\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "info");
        assert_eq!(records[0].message, "-- No entries --");
    }

    #[test]
    fn test_looks_like_journal_json() {
        assert!(looks_like_journal_json(r#"{"MESSAGE":"x"}"#));
        assert!(!looks_like_journal_json("Jan  5 10:30:45 host sshd: hi"));
        assert!(!looks_like_journal_json(""));
    }
}
