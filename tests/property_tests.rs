//! Property-based tests: template formatting and output parsing must be
//! robust against arbitrary inputs.

use std::collections::BTreeMap;

use proptest::prelude::*;

use fleetwatch::parsers::{docker, journald, smart, syslog, sysinfo, zfs};
use fleetwatch::{CacheManager, CommandCategory, CommandDefinition};

fn param_name_strategy() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,15}"
}

fn param_value_strategy() -> impl Strategy<Value = String> {
    // Values may carry shell-looking noise; formatting is plain text
    // substitution and must not choke on it
    "[ -~]{0,40}"
}

proptest! {
    #[test]
    fn format_substitutes_every_known_placeholder(
        name in param_name_strategy(),
        value in param_value_strategy(),
    ) {
        let def = CommandDefinition::new(
            "probe",
            format!("run --flag {{{name}}} --done"),
            CommandCategory::SystemInfo,
        );
        let mut params = BTreeMap::new();
        params.insert(name.clone(), value.clone());

        let formatted = def.format(&params);
        // A value containing a brace placeholder of its own would leave an
        // unresolved-looking token behind; anything else must format
        if !value.contains('{') {
            let formatted = formatted.expect("all placeholders provided");
            prop_assert!(formatted.contains(&value));
            let placeholder = format!("{{{}}}", name);
            prop_assert!(!formatted.contains(&placeholder));
        }
    }

    #[test]
    fn format_missing_parameter_is_none_not_panic(
        name in param_name_strategy(),
    ) {
        let def = CommandDefinition::new(
            "probe",
            format!("run {{{name}}}"),
            CommandCategory::SystemInfo,
        );
        prop_assert!(def.format(&BTreeMap::new()).is_none());
    }

    #[test]
    fn fingerprints_are_deterministic_and_param_sensitive(
        op in "[a-z_]{1,20}",
        device in "[a-z0-9-]{1,20}",
        key in param_name_strategy(),
        value in "[a-z0-9]{0,20}",
    ) {
        let mut params = BTreeMap::new();
        params.insert(key.clone(), value.clone());

        let a = CacheManager::fingerprint(&op, &device, "system_info", &params);
        let b = CacheManager::fingerprint(&op, &device, "system_info", &params);
        prop_assert_eq!(&a, &b);

        let mut changed = BTreeMap::new();
        changed.insert(key, format!("{value}x"));
        let c = CacheManager::fingerprint(&op, &device, "system_info", &changed);
        prop_assert_ne!(&a, &c);
    }

    #[test]
    fn parsers_never_panic_on_arbitrary_output(text in ".{0,512}") {
        let _ = docker::parse_ps_table(&text);
        let _ = docker::parse_stats_table(&text);
        let _ = zfs::parse_pool_list(&text);
        let _ = zfs::parse_snapshot_list(&text);
        let _ = journald::parse_journal_lines(&text);
        let _ = syslog::parse_syslog_lines(&text);
        let _ = sysinfo::parse_meminfo(&text);
        let _ = sysinfo::parse_df(&text);
        let _ = sysinfo::parse_diskstats(&text);
        let _ = smart::parse_smart_output(&text);
    }

    #[test]
    fn smart_temperature_stays_in_range(text in ".{0,512}") {
        let data = smart::parse_smart_output(&text);
        if let Some(temp) = data.temperature_celsius {
            prop_assert!((0..=100).contains(&temp));
        }
    }

    #[test]
    fn syslog_lines_are_never_dropped(lines in proptest::collection::vec("[^\n]{0,80}", 0..10)) {
        let nonempty = lines.iter().filter(|l| !l.trim().is_empty()).count();
        let block = lines.join("\n");
        prop_assert_eq!(syslog::parse_syslog_lines(&block).len(), nonempty);
    }
}
