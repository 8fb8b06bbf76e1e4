//! Parser for `smartctl` output.
//!
//! Extracts the handful of attributes the fleet cares about from both
//! ATA attribute tables and NVMe health logs. Unparseable fields stay
//! `None`; they never fail a drive or an analysis.

use serde::{Deserialize, Serialize};

/// Sentinel emitted by the graceful-fallback command chain when neither
/// sudo nor plain smartctl could read the drive
pub const SMART_ACCESS_DENIED: &str = "SMART_ACCESS_DENIED";

/// Parsed SMART attributes for one drive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartData {
    /// Whether SMART data could be read at all
    pub smart_available: bool,
    /// Accumulated power-on hours
    pub power_on_hours: Option<u64>,
    /// Drive temperature in Celsius, gated to `[0, 100]`
    pub temperature_celsius: Option<i64>,
    /// Reallocated sector count (attribute id 5)
    pub reallocated_sectors: Option<u64>,
    /// Overall health verdict (`PASSED`, `OK`, `FAILED!`)
    pub health_status: Option<String>,
}

/// True when the command result indicates the drive could not be read.
/// Covers the graceful-fallback sentinel and the raw permission errors.
#[must_use]
pub fn is_access_denied(stdout: &str, stderr: &str) -> bool {
    stdout.contains(SMART_ACCESS_DENIED)
        || stderr.contains("Permission denied")
        || stderr.contains("Operation not permitted")
}

/// Parse `smartctl -a` output into [`SmartData`].
///
/// Output carrying the access-denied sentinel yields an empty block with
/// `smart_available=false`.
#[must_use]
pub fn parse_smart_output(stdout: &str) -> SmartData {
    if stdout.contains(SMART_ACCESS_DENIED) || !stdout.contains("SMART") {
        return SmartData::default();
    }

    let mut data = SmartData {
        smart_available: true,
        ..SmartData::default()
    };

    for line in stdout.lines() {
        let line = line.trim();

        if line.contains("Power_On_Hours")
            || line.contains("Power On Hours")
            || line.contains("Power on Hours:")
        {
            if data.power_on_hours.is_none() {
                data.power_on_hours = first_integer_after_label(line);
            }
        } else if line.contains("Temperature_Celsius") || line.contains("Airflow_Temperature_Cel")
        {
            if data.temperature_celsius.is_none() {
                data.temperature_celsius = parse_attribute_temperature(line);
            }
        } else if line.contains("Temperature:") && line.contains("Celsius") {
            if data.temperature_celsius.is_none() {
                data.temperature_celsius = parse_nvme_temperature(line);
            }
        } else if let Some(rest) = line.strip_prefix("SMART overall-health self-assessment test result:")
        {
            data.health_status = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("SMART Health Status:") {
            data.health_status = Some(rest.trim().to_string());
        } else if line.starts_with("5 ") && line.contains("Reallocated_Sector_Ct") {
            data.reallocated_sectors = line
                .split_whitespace()
                .last()
                .and_then(|raw| raw.parse().ok());
        }
    }

    data
}

/// First integer token after the label, tolerating thousands separators.
/// Handles both `Power On Hours: 12,345` and the attribute-table shape
/// where the raw value is the trailing column.
fn first_integer_after_label(line: &str) -> Option<u64> {
    let after_label = match line.split_once(':') {
        Some((_, rest)) => rest,
        // Attribute table row: the raw value is the last column
        None => line.rsplit_once(char::is_whitespace).map(|(_, v)| v)?,
    };
    after_label
        .split_whitespace()
        .find_map(|tok| tok.replace(',', "").parse().ok())
}

/// Temperature from an ATA temperature attribute row
/// (`Temperature_Celsius` or `Airflow_Temperature_Cel`).
///
/// The current reading is the first token of the raw-value column
/// (column 9); decorations like `33 (Min/Max 19/45)` carry min/max
/// bookkeeping after it. Values outside `[0, 100]` are discarded.
fn parse_attribute_temperature(line: &str) -> Option<i64> {
    let value: i64 = line.split_whitespace().nth(9)?.parse().ok()?;
    (0..=100).contains(&value).then_some(value)
}

/// Temperature from an NVMe `Temperature: N Celsius` line
fn parse_nvme_temperature(line: &str) -> Option<i64> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    for (i, tok) in tokens.iter().enumerate() {
        if let Ok(value) = tok.parse::<i64>() {
            let followed_by_celsius = tokens
                .get(i + 1)
                .is_some_and(|next| matches!(next.to_lowercase().as_str(), "celsius" | "°c" | "c"));
            if followed_by_celsius && (0..=100).contains(&value) {
                return Some(value);
            }
        }
    }
    None
}
