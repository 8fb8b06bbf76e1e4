//! Parser for classic syslog lines.
//!
//! Tolerates the `Mon  D HH:MM:SS host service[PID]: message` shape with
//! an optional PID; lines that do not match are kept as opaque messages at
//! `info`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One parsed syslog line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyslogEntry {
    /// Timestamp text as it appeared (`Jan  5 10:30:45`); empty for
    /// opaque lines
    pub timestamp_text: String,
    /// Reporting host; empty for opaque lines
    pub host: String,
    /// Emitting service; empty for opaque lines
    pub service: String,
    /// PID when the line carried one
    pub pid: Option<u32>,
    /// Severity; always `info` since classic syslog lines do not carry one
    pub level: String,
    /// Message text, or the whole line for opaque entries
    pub message: String,
}

fn syslog_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(\S+)\s+([^\s:\[]+)(?:\[(\d+)\])?:\s*(.*)$",
        )
        .expect("static regex")
    })
}

/// Parse one syslog line; `None` when the shape does not match
#[must_use]
pub fn parse_syslog_line(line: &str) -> Option<SyslogEntry> {
    let caps = syslog_regex().captures(line)?;
    Some(SyslogEntry {
        timestamp_text: caps[1].to_string(),
        host: caps[2].to_string(),
        service: caps[3].to_string(),
        pid: caps.get(4).and_then(|m| m.as_str().parse().ok()),
        level: "info".to_string(),
        message: caps[5].to_string(),
    })
}

/// Parse a block of syslog output, keeping unparseable lines opaque
#[must_use]
pub fn parse_syslog_lines(stdout: &str) -> Vec<SyslogEntry> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            parse_syslog_line(line).unwrap_or_else(|| SyslogEntry {
                timestamp_text: String::new(),
                host: String::new(),
                service: String::new(),
                pid: None,
                level: "info".to_string(),
                message: line.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_pid() {
        let entry =
            parse_syslog_line("Jan  5 10:30:45 host-a sshd[812]: Accepted publickey for root")
                .unwrap();
        assert_eq!(entry.timestamp_text, "Jan  5 10:30:45");
        assert_eq!(entry.host, "host-a");
        assert_eq!(entry.service, "sshd");
        assert_eq!(entry.pid, Some(812));
        assert_eq!(entry.message, "Accepted publickey for root");
    }

    #[test]
    fn test_parse_without_pid() {
        let entry = parse_syslog_line("Mar 12 03:12:01 nas kernel: usb 1-1 disconnect").unwrap();
        assert_eq!(entry.service, "kernel");
        assert!(entry.pid.is_none());
    }

    #[test]
    fn test_unparseable_line_kept_opaque() {
        let entries = parse_syslog_lines("totally free-form text\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, "info");
        assert_eq!(entries[0].message, "totally free-form text");
        assert!(entries[0].host.is_empty());
    }

    #[test]
    fn test_mixed_block() {
        let block = "Jan  5 10:30:45 host-a cron[100]: job started\nnoise\n";
        let entries = parse_syslog_lines(block);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].service, "cron");
        assert_eq!(entries[1].message, "noise");
    }
}
