//! The builtin command catalog.
//!
//! Every command the fleet engine ships with, organized by category. The
//! validation patterns encode the minimum shape a healthy answer must have;
//! the error patterns catch the common remote-side failure strings that
//! arrive with a zero exit code.

use super::{CommandCategory, CommandDefinition, CommandRegistry};

/// Register the full builtin catalog into `registry`
pub fn register_builtin_commands(registry: &CommandRegistry) {
    for def in builtin_commands() {
        registry.register(def);
    }
}

/// The builtin catalog as a vector, for inspection and tests
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn builtin_commands() -> Vec<CommandDefinition> {
    vec![
        // -- system_info ----------------------------------------------------
        CommandDefinition::new(
            "get_system_info",
            "uname -a && cat /etc/os-release && uptime && free -h && df -h",
            CommandCategory::SystemInfo,
        )
        .description("Kernel, OS release, uptime, memory and disk totals")
        .timeout_seconds(15)
        .cache_ttl_seconds(3600)
        .freshness_threshold_seconds(1800)
        .validation_pattern("Linux")
        .validation_pattern("PRETTY_NAME")
        .error_pattern("command not found"),
        CommandDefinition::new(
            "get_memory_info",
            "cat /proc/meminfo",
            CommandCategory::SystemInfo,
        )
        .description("Raw memory accounting from /proc/meminfo")
        .timeout_seconds(10)
        .cache_ttl_seconds(300)
        .validation_pattern("MemTotal"),
        CommandDefinition::new("get_uptime", "uptime", CommandCategory::SystemInfo)
            .description("Load averages and time since boot")
            .timeout_seconds(10)
            .cache_ttl_seconds(60)
            .validation_pattern("load average"),
        // -- system_monitoring ----------------------------------------------
        CommandDefinition::new(
            "get_system_metrics",
            "top -bn1 | head -20 && iostat -x 1 1 && free -m",
            CommandCategory::SystemMonitoring,
        )
        .description("Snapshot of CPU, IO, and memory pressure")
        .timeout_seconds(20)
        .cache_ttl_seconds(300)
        .validation_pattern("load average"),
        CommandDefinition::new(
            "get_disk_usage",
            "df -h && du -sh /var/log /tmp /home 2>/dev/null || true",
            CommandCategory::SystemMonitoring,
        )
        .description("Filesystem usage plus hot directory sizes")
        .timeout_seconds(30)
        .cache_ttl_seconds(600)
        .validation_pattern("Filesystem"),
        // -- container_management -------------------------------------------
        CommandDefinition::new(
            "list_containers",
            "docker ps -a --format 'table {{.ID}}\t{{.Names}}\t{{.Status}}\t{{.Image}}\t{{.Ports}}'",
            CommandCategory::ContainerManagement,
        )
        .description("All containers with status, image, and ports")
        .timeout_seconds(15)
        .cache_ttl_seconds(30)
        .validation_pattern("CONTAINER ID")
        .error_pattern("Cannot connect to the Docker daemon"),
        CommandDefinition::new(
            "get_container_stats",
            "docker stats --no-stream --format 'table {{.Container}}\t{{.CPUPerc}}\t{{.MemUsage}}\t{{.NetIO}}\t{{.BlockIO}}'",
            CommandCategory::ContainerManagement,
        )
        .description("One-shot resource usage for running containers")
        .timeout_seconds(20)
        .cache_ttl_seconds(60)
        .validation_pattern("CONTAINER")
        .error_pattern("Cannot connect to the Docker daemon"),
        CommandDefinition::new(
            "inspect_container",
            "docker inspect {container_name}",
            CommandCategory::ContainerManagement,
        )
        .description("Full inspect JSON for one container")
        .timeout_seconds(15)
        .cache_ttl_seconds(300)
        .validation_pattern(r"^\[")
        .error_pattern("No such object"),
        CommandDefinition::new(
            "get_container_logs",
            "docker logs --tail {tail_lines} {container_name}",
            CommandCategory::ContainerManagement,
        )
        .description("Tail of one container's log stream")
        .timeout_seconds(30)
        .cache_ttl_seconds(60)
        .error_pattern("No such container"),
        CommandDefinition::new(
            "get_docker_version",
            "docker --version",
            CommandCategory::ContainerManagement,
        )
        .description("Docker engine version string")
        .timeout_seconds(10)
        .cache_ttl_seconds(3600)
        .validation_pattern("Docker version"),
        CommandDefinition::new(
            "list_docker_networks",
            "docker network ls --format json",
            CommandCategory::ContainerManagement,
        )
        .description("Docker networks as JSON lines")
        .timeout_seconds(15)
        .cache_ttl_seconds(300)
        .error_pattern("Cannot connect to the Docker daemon"),
        // -- docker_compose -------------------------------------------------
        CommandDefinition::new(
            "compose_ps",
            "cd {compose_path} && docker compose ps -a --format json",
            CommandCategory::DockerCompose,
        )
        .description("Service state for one compose project")
        .timeout_seconds(30)
        .cache_ttl_seconds(60)
        .error_pattern("no configuration file provided"),
        CommandDefinition::new(
            "compose_config",
            "cd {compose_path} && docker compose config",
            CommandCategory::DockerCompose,
        )
        .description("Canonicalized compose file for one project")
        .timeout_seconds(30)
        .cache_ttl_seconds(300)
        .validation_pattern("services:")
        .error_pattern("no configuration file provided"),
        // -- zfs_management -------------------------------------------------
        CommandDefinition::new(
            "list_zfs_pools",
            "zpool list -H -o name,size,allocated,free,capacity,health,altroot",
            CommandCategory::ZfsManagement,
        )
        .description("All ZFS pools with capacity and health")
        .timeout_seconds(30)
        .cache_ttl_seconds(1800)
        .error_pattern("command not found"),
        CommandDefinition::new(
            "get_zfs_pool_status",
            "zpool status {pool_name}",
            CommandCategory::ZfsManagement,
        )
        .description("Detailed vdev status for one pool")
        .timeout_seconds(30)
        .cache_ttl_seconds(600)
        .validation_pattern("pool:")
        .error_pattern("no such pool"),
        CommandDefinition::new(
            "get_zfs_pool_properties",
            "zpool get all {pool_name} -H -o property,value,source",
            CommandCategory::ZfsManagement,
        )
        .description("All properties for one pool")
        .timeout_seconds(20)
        .cache_ttl_seconds(300)
        .error_pattern("no such pool"),
        CommandDefinition::new(
            "list_zfs_datasets",
            "zfs list -H -o name,used,avail,refer,mountpoint,type",
            CommandCategory::ZfsManagement,
        )
        .description("All datasets with usage and mountpoints")
        .timeout_seconds(20)
        .cache_ttl_seconds(600)
        .error_pattern("command not found"),
        CommandDefinition::new(
            "list_zfs_snapshots",
            "zfs list -H -t snapshot -o name,used,creation",
            CommandCategory::ZfsManagement,
        )
        .description("All snapshots with space held and creation time")
        .timeout_seconds(30)
        .cache_ttl_seconds(300)
        .error_pattern("command not found"),
        CommandDefinition::new(
            "get_zfs_dataset_properties",
            "zfs get all {dataset_name} -H -o property,value,source",
            CommandCategory::ZfsManagement,
        )
        .description("All properties for one dataset")
        .timeout_seconds(15)
        .cache_ttl_seconds(300)
        .error_pattern("dataset does not exist"),
        // -- drive_health ---------------------------------------------------
        CommandDefinition::new(
            "get_drive_health",
            "lsblk -d -n -o NAME,TYPE,SIZE,MODEL,SERIAL && \
             for d in $(lsblk -d -n -o NAME,TYPE | awk '$2==\"disk\"{print $1}'); do \
             echo \"=== /dev/$d ===\"; \
             sudo smartctl -a /dev/$d 2>/dev/null || smartctl -a /dev/$d 2>/dev/null || echo 'SMART_ACCESS_DENIED'; \
             done",
            CommandCategory::DriveHealth,
        )
        .description("Per-disk identity plus full SMART dump with graceful fallback")
        .timeout_seconds(60)
        .retry_count(0)
        .cache_ttl_seconds(3600)
        .validation_pattern("disk|==="),
        CommandDefinition::new(
            "get_smart_status",
            "smartctl -H {device_path}",
            CommandCategory::DriveHealth,
        )
        .description("SMART health verdict for one device")
        .timeout_seconds(30)
        .requires_sudo()
        .cache_ttl_seconds(1800)
        .validation_pattern("SMART"),
        // -- network_info ---------------------------------------------------
        CommandDefinition::new(
            "get_network_interfaces",
            "ip addr show && ip route show",
            CommandCategory::NetworkInfo,
        )
        .description("Interface addresses and routing table")
        .timeout_seconds(15)
        .cache_ttl_seconds(300)
        .validation_pattern("inet"),
        CommandDefinition::new(
            "get_network_stats",
            "ss -tuln && netstat -i",
            CommandCategory::NetworkInfo,
        )
        .description("Listening sockets and interface counters")
        .timeout_seconds(15)
        .cache_ttl_seconds(60),
        CommandDefinition::new("scan_device_ports", "ss -tlnp", CommandCategory::NetworkInfo)
            .description("Listening TCP ports with owning processes")
            .timeout_seconds(15)
            .cache_ttl_seconds(120),
        // -- process_management ---------------------------------------------
        CommandDefinition::new(
            "list_processes",
            "ps aux --sort=-%cpu | head -20",
            CommandCategory::ProcessManagement,
        )
        .description("Top processes by CPU")
        .timeout_seconds(15)
        .cache_ttl_seconds(60)
        .validation_pattern("PID"),
        // -- service_management ---------------------------------------------
        CommandDefinition::new(
            "list_systemd_services",
            "systemctl list-units --type=service --state=running --no-pager",
            CommandCategory::ServiceManagement,
        )
        .description("Running systemd services")
        .timeout_seconds(15)
        .cache_ttl_seconds(300)
        .validation_pattern("UNIT"),
        CommandDefinition::new(
            "get_service_status",
            "systemctl status {service_name} --no-pager -l",
            CommandCategory::ServiceManagement,
        )
        .description("Unit status including recent log lines")
        .timeout_seconds(15)
        // systemctl status exits 3 for inactive units; that is still an answer
        .expected_exit_codes([0, 3])
        .cache_ttl_seconds(60),
        // -- file_operations ------------------------------------------------
        CommandDefinition::new("read_file", "cat {file_path}", CommandCategory::FileOperations)
            .description("Read one remote file")
            .timeout_seconds(30)
            .cache_ttl_seconds(300),
        CommandDefinition::new(
            "list_directory",
            "ls -la {directory_path}",
            CommandCategory::FileOperations,
        )
        .description("Directory listing with permissions and sizes")
        .timeout_seconds(15)
        .cache_ttl_seconds(300),
        CommandDefinition::new(
            "find_compose_files",
            "find /home /opt /srv -maxdepth 4 -name 'docker-compose.yml' -o -name 'docker-compose.yaml' 2>/dev/null | head -10",
            CommandCategory::FileOperations,
        )
        .description("Locate compose projects under the conventional roots")
        .timeout_seconds(30)
        .cache_ttl_seconds(1800),
        // -- logs -----------------------------------------------------------
        CommandDefinition::new(
            "get_system_logs",
            "journalctl --no-pager -n {lines} --since '{since}' --output=json",
            CommandCategory::Logs,
        )
        .description("Recent journal entries as JSON lines")
        .timeout_seconds(30)
        .cache_ttl_seconds(300),
        CommandDefinition::new(
            "get_service_logs",
            "journalctl --no-pager -u {service_name} -n {lines} --output=json",
            CommandCategory::Logs,
        )
        .description("Recent journal entries for one unit as JSON lines")
        .timeout_seconds(30)
        .cache_ttl_seconds(180),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_builtin_catalog_registers() {
        let registry = CommandRegistry::with_builtin_commands();
        assert!(registry.len() >= 24);
        for name in [
            "get_system_info",
            "get_memory_info",
            "get_system_metrics",
            "get_disk_usage",
            "list_containers",
            "get_container_stats",
            "inspect_container",
            "get_container_logs",
            "compose_ps",
            "list_zfs_pools",
            "get_zfs_pool_status",
            "list_zfs_datasets",
            "list_zfs_snapshots",
            "get_drive_health",
            "get_smart_status",
            "get_network_interfaces",
            "get_network_stats",
            "list_processes",
            "list_systemd_services",
            "get_service_status",
            "read_file",
            "list_directory",
            "get_system_logs",
            "get_service_logs",
        ] {
            assert!(registry.get(name).is_some(), "missing builtin: {name}");
        }
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let commands = builtin_commands();
        let mut names: Vec<&str> = commands.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn test_system_info_validation() {
        let registry = CommandRegistry::with_builtin_commands();
        let healthy = "Linux host-a 6.1.0 x86_64 GNU/Linux\nPRETTY_NAME=\"Debian GNU/Linux 12\"";
        assert!(registry.validate_output("get_system_info", healthy));
        // Truncated output missing the kernel banner must fail validation
        assert!(!registry.validate_output("get_system_info", "PRETTY_NAME=\"Debian\""));
    }

    #[test]
    fn test_parameterized_templates_format() {
        let registry = CommandRegistry::with_builtin_commands();
        let mut params = BTreeMap::new();
        params.insert("service_name".to_string(), "nginx".to_string());
        assert_eq!(
            registry.format("get_service_status", &params),
            Some("systemctl status nginx --no-pager -l".to_string())
        );
        // journalctl template needs both lines and since
        let mut partial = BTreeMap::new();
        partial.insert("lines".to_string(), "100".to_string());
        assert!(registry.format("get_system_logs", &partial).is_none());
    }

    #[test]
    fn test_service_status_accepts_inactive_exit_code() {
        let registry = CommandRegistry::with_builtin_commands();
        let def = registry.get("get_service_status").unwrap();
        assert!(def.expected_exit_codes.contains(&0));
        assert!(def.expected_exit_codes.contains(&3));
    }

    #[test]
    fn test_ttls_match_freshness_classes() {
        let registry = CommandRegistry::with_builtin_commands();
        assert_eq!(registry.get("get_system_info").unwrap().cache_ttl_seconds, 3600);
        assert_eq!(registry.get("list_containers").unwrap().cache_ttl_seconds, 30);
        assert_eq!(registry.get("list_zfs_pools").unwrap().cache_ttl_seconds, 1800);
        assert_eq!(registry.get("get_drive_health").unwrap().cache_ttl_seconds, 3600);
        assert_eq!(registry.get("get_service_logs").unwrap().cache_ttl_seconds, 180);
    }
}
