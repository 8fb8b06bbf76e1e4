//! Command registry: the single source of truth for what can be asked of a
//! remote host and how to tell a good answer from a bad one.
//!
//! Every remote read in the crate resolves through a registered
//! [`CommandDefinition`]: a parameterized shell template plus the timeout,
//! retry, exit-code, validation, and cache policy that governs it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod builtin;

/// Default per-command timeout when a definition does not carry one
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Categories every registered command belongs to (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    /// Static host information (kernel, OS release, totals)
    SystemInfo,
    /// Live performance metrics
    SystemMonitoring,
    /// Docker container operations
    ContainerManagement,
    /// docker-compose stack operations
    DockerCompose,
    /// ZFS pools, datasets, snapshots
    ZfsManagement,
    /// Block-device SMART health
    DriveHealth,
    /// Interfaces, routes, sockets
    NetworkInfo,
    /// Process listings
    ProcessManagement,
    /// systemd unit state
    ServiceManagement,
    /// Remote file reads and listings
    FileOperations,
    /// Configuration file access
    Configuration,
    /// journald and syslog access
    Logs,
}

impl CommandCategory {
    /// Category name as used in cache fingerprints and audit metadata
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemInfo => "system_info",
            Self::SystemMonitoring => "system_monitoring",
            Self::ContainerManagement => "container_management",
            Self::DockerCompose => "docker_compose",
            Self::ZfsManagement => "zfs_management",
            Self::DriveHealth => "drive_health",
            Self::NetworkInfo => "network_info",
            Self::ProcessManagement => "process_management",
            Self::ServiceManagement => "service_management",
            Self::FileOperations => "file_operations",
            Self::Configuration => "configuration",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable definition of a registered remote command
#[derive(Debug, Clone)]
pub struct CommandDefinition {
    /// Unique operation name
    pub name: String,
    /// Shell template with `{placeholder}` parameters
    pub command_template: String,
    /// Category tag used for parser dispatch and cache invalidation
    pub category: CommandCategory,
    /// Human-readable description
    pub description: String,
    /// Per-attempt timeout
    pub timeout_seconds: u64,
    /// Number of retries after the first failed attempt
    pub retry_count: u32,
    /// Base delay between retries; backoff multiplies by 1.5 per attempt
    pub retry_delay_seconds: f64,
    /// Exit codes treated as success
    pub expected_exit_codes: HashSet<i32>,
    /// Whether the command elevates via sudo
    pub requires_sudo: bool,
    /// Cache TTL; 0 disables caching for this command
    pub cache_ttl_seconds: u64,
    /// Age below which cached data is considered fresh without re-validation
    pub freshness_threshold_seconds: u64,
    /// Output must match every one of these
    validation_patterns: Vec<Regex>,
    /// Output must match none of these
    error_patterns: Vec<Regex>,
}

impl CommandDefinition {
    /// Create a definition with defaults: 30s timeout, one retry, exit code
    /// 0 expected, caching disabled.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        command_template: impl Into<String>,
        category: CommandCategory,
    ) -> Self {
        Self {
            name: name.into(),
            command_template: command_template.into(),
            category,
            description: String::new(),
            timeout_seconds: DEFAULT_COMMAND_TIMEOUT_SECS,
            retry_count: 1,
            retry_delay_seconds: 1.0,
            expected_exit_codes: HashSet::from([0]),
            requires_sudo: false,
            cache_ttl_seconds: 0,
            freshness_threshold_seconds: 0,
            validation_patterns: Vec::new(),
            error_patterns: Vec::new(),
        }
    }

    /// Set the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the per-attempt timeout in seconds
    #[must_use]
    pub fn timeout_seconds(mut self, timeout: u64) -> Self {
        self.timeout_seconds = timeout;
        self
    }

    /// Set the retry count
    #[must_use]
    pub fn retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    /// Set the base retry delay in seconds
    #[must_use]
    pub fn retry_delay_seconds(mut self, delay: f64) -> Self {
        self.retry_delay_seconds = delay;
        self
    }

    /// Replace the expected exit code set
    #[must_use]
    pub fn expected_exit_codes<I: IntoIterator<Item = i32>>(mut self, codes: I) -> Self {
        self.expected_exit_codes = codes.into_iter().collect();
        self
    }

    /// Mark the command as requiring sudo
    #[must_use]
    pub fn requires_sudo(mut self) -> Self {
        self.requires_sudo = true;
        self
    }

    /// Set the cache TTL in seconds; 0 disables caching
    #[must_use]
    pub fn cache_ttl_seconds(mut self, ttl: u64) -> Self {
        self.cache_ttl_seconds = ttl;
        self
    }

    /// Set the freshness threshold in seconds
    #[must_use]
    pub fn freshness_threshold_seconds(mut self, threshold: u64) -> Self {
        self.freshness_threshold_seconds = threshold;
        self
    }

    /// Add a validation pattern; output must match it to count as valid.
    /// Invalid regexes are skipped with a warning.
    #[must_use]
    pub fn validation_pattern(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => self.validation_patterns.push(re),
            Err(e) => tracing::warn!(
                command = %self.name,
                pattern,
                error = %e,
                "skipping invalid validation pattern"
            ),
        }
        self
    }

    /// Add an error pattern; output matching it marks the result as failed.
    /// Invalid regexes are skipped with a warning.
    #[must_use]
    pub fn error_pattern(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => self.error_patterns.push(re),
            Err(e) => tracing::warn!(
                command = %self.name,
                pattern,
                error = %e,
                "skipping invalid error pattern"
            ),
        }
        self
    }

    /// Substitute `{placeholder}` parameters into the template.
    ///
    /// Returns `None` naming nothing when any placeholder has no matching
    /// parameter; callers report that as a validation failure. Go-template
    /// braces (`{{.Names}}`) are left untouched because their contents never
    /// form a valid placeholder identifier.
    #[must_use]
    pub fn format(&self, params: &BTreeMap<String, String>) -> Option<String> {
        let mut formatted = self.command_template.clone();
        for (key, value) in params {
            formatted = formatted.replace(&format!("{{{key}}}"), value);
        }
        if Self::first_unresolved_placeholder(&formatted).is_some() {
            return None;
        }
        Some(formatted)
    }

    /// The first `{placeholder}` left unresolved in a formatted command
    #[must_use]
    pub fn first_unresolved_placeholder(formatted: &str) -> Option<String> {
        placeholder_regex()
            .captures(formatted)
            .map(|c| c[1].to_string())
    }

    /// Placeholders the given parameters leave unresolved
    #[must_use]
    pub fn missing_parameters(&self, params: &BTreeMap<String, String>) -> Vec<String> {
        placeholder_regex()
            .captures_iter(&self.command_template)
            .map(|c| c[1].to_string())
            .filter(|name| !params.contains_key(name))
            .collect()
    }

    /// True when every validation pattern matches the output
    #[must_use]
    pub fn validate_output(&self, stdout: &str) -> bool {
        self.validation_patterns.iter().all(|re| re.is_match(stdout))
    }

    /// Error patterns that matched the output
    #[must_use]
    pub fn detect_errors(&self, stdout: &str) -> Vec<String> {
        self.error_patterns
            .iter()
            .filter(|re| re.is_match(stdout))
            .map(|re| re.as_str().to_string())
            .collect()
    }
}

fn placeholder_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_][a-z0-9_]*)\}").expect("static regex"))
}

/// Process-global catalog of command definitions.
///
/// Populated once at startup from [`builtin::register_builtin_commands`];
/// re-registration replaces by name. Lookups are lock-light reads.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<CommandDefinition>>>,
}

impl CommandRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the builtin catalog
    #[must_use]
    pub fn with_builtin_commands() -> Self {
        let registry = Self::new();
        builtin::register_builtin_commands(&registry);
        registry
    }

    /// Insert or replace a definition by name
    pub fn register(&self, def: CommandDefinition) {
        let mut commands = self.commands.write().expect("registry lock");
        commands.insert(def.name.clone(), Arc::new(def));
    }

    /// Retrieve a definition by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CommandDefinition>> {
        self.commands.read().expect("registry lock").get(name).cloned()
    }

    /// All definitions in a category
    #[must_use]
    pub fn by_category(&self, category: CommandCategory) -> Vec<Arc<CommandDefinition>> {
        self.commands
            .read()
            .expect("registry lock")
            .values()
            .filter(|d| d.category == category)
            .cloned()
            .collect()
    }

    /// Format a named command with parameters.
    ///
    /// `None` when the command is unknown or a placeholder is missing.
    #[must_use]
    pub fn format(&self, name: &str, params: &BTreeMap<String, String>) -> Option<String> {
        self.get(name)?.format(params)
    }

    /// Validate output against a named command's validation patterns.
    /// Unknown commands validate nothing and return false.
    #[must_use]
    pub fn validate_output(&self, name: &str, stdout: &str) -> bool {
        self.get(name).is_some_and(|d| d.validate_output(stdout))
    }

    /// Error patterns of a named command matching the output
    #[must_use]
    pub fn detect_errors(&self, name: &str, stdout: &str) -> Vec<String> {
        self.get(name)
            .map(|d| d.detect_errors(stdout))
            .unwrap_or_default()
    }

    /// Registered command names, sorted
    #[must_use]
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .read()
            .expect("registry lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.read().expect("registry lock").len()
    }

    /// True when no commands are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_format_substitutes_placeholders() {
        let def = CommandDefinition::new(
            "inspect_container",
            "docker inspect {container_name}",
            CommandCategory::ContainerManagement,
        );
        assert_eq!(
            def.format(&params(&[("container_name", "redis")])),
            Some("docker inspect redis".to_string())
        );
    }

    #[test]
    fn test_format_missing_placeholder_returns_none() {
        let def = CommandDefinition::new(
            "get_container_logs",
            "docker logs --tail {tail_lines} {container_name}",
            CommandCategory::ContainerManagement,
        );
        assert_eq!(def.format(&params(&[("tail_lines", "50")])), None);
    }

    #[test]
    fn test_format_leaves_go_templates_untouched() {
        let def = CommandDefinition::new(
            "list_containers",
            "docker ps -a --format 'table {{.ID}}\t{{.Names}}'",
            CommandCategory::ContainerManagement,
        );
        let formatted = def.format(&BTreeMap::new()).expect("no placeholders");
        assert!(formatted.contains("{{.ID}}"));
        assert!(formatted.contains("{{.Names}}"));
    }

    #[test]
    fn test_validation_and_error_patterns() {
        let def = CommandDefinition::new(
            "get_system_info",
            "uname -a && cat /etc/os-release",
            CommandCategory::SystemInfo,
        )
        .validation_pattern("Linux")
        .validation_pattern("PRETTY_NAME")
        .error_pattern("command not found");

        assert!(def.validate_output("Linux host 6.1\nPRETTY_NAME=\"Debian\""));
        assert!(!def.validate_output("PRETTY_NAME=\"Debian\""));
        assert_eq!(
            def.detect_errors("bash: uname: command not found"),
            vec!["command not found".to_string()]
        );
        assert!(def.detect_errors("Linux host").is_empty());
    }

    #[test]
    fn test_registry_replaces_on_reregistration() {
        let registry = CommandRegistry::new();
        registry.register(CommandDefinition::new(
            "probe",
            "echo one",
            CommandCategory::SystemInfo,
        ));
        registry.register(CommandDefinition::new(
            "probe",
            "echo two",
            CommandCategory::SystemInfo,
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("probe").unwrap().command_template,
            "echo two"
        );
    }

    #[test]
    fn test_registry_by_category() {
        let registry = CommandRegistry::new();
        registry.register(CommandDefinition::new(
            "a",
            "echo a",
            CommandCategory::ZfsManagement,
        ));
        registry.register(CommandDefinition::new(
            "b",
            "echo b",
            CommandCategory::ZfsManagement,
        ));
        registry.register(CommandDefinition::new(
            "c",
            "echo c",
            CommandCategory::Logs,
        ));
        assert_eq!(registry.by_category(CommandCategory::ZfsManagement).len(), 2);
        assert_eq!(registry.by_category(CommandCategory::Logs).len(), 1);
        assert!(registry
            .by_category(CommandCategory::DriveHealth)
            .is_empty());
    }

    #[test]
    fn test_unknown_name_lookups() {
        let registry = CommandRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(registry.format("nope", &BTreeMap::new()).is_none());
        assert!(!registry.validate_output("nope", "anything"));
        assert!(registry.detect_errors("nope", "anything").is_empty());
    }
}
