//! SSH connection descriptors.
//!
//! A [`SshConnectionInfo`] names a remote endpoint and how to authenticate
//! against it. The default configuration delegates everything to the host
//! user's SSH configuration (`~/.ssh/config`, agent, known hosts); advanced
//! deployments inject per-device credentials explicitly.

use std::path::PathBuf;
use std::time::Duration;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default connection establishment timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Known-host verification behavior for pooled sessions.
///
/// Infrastructure mode accepts unknown hosts by default; strict mode defers
/// to the user's `known_hosts` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyCheck {
    /// Accept and record unknown host keys (infrastructure default)
    #[default]
    Accept,
    /// Add new hosts, reject changed keys
    Strict,
}

/// Connection information for a single SSH endpoint
#[derive(Debug, Clone)]
pub struct SshConnectionInfo {
    /// Hostname or IP address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Remote username; `None` delegates to the SSH configuration
    pub username: Option<String>,
    /// Opaque password or key passphrase, resolved by the system SSH
    /// askpass/agent configuration; never interpreted by this crate
    pub password: Option<String>,
    /// Private key path fed to the session builder
    pub private_key_path: Option<PathBuf>,
    /// Timeout for session establishment
    pub connect_timeout: Duration,
    /// Known-host verification behavior
    pub host_key_check: HostKeyCheck,
}

impl SshConnectionInfo {
    /// Create connection info for a host with all defaults
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: None,
            password: None,
            private_key_path: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            host_key_check: HostKeyCheck::default(),
        }
    }

    /// Set the SSH port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the remote username
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set an opaque password or passphrase
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the private key path
    #[must_use]
    pub fn private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Set the connection establishment timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set strict known-host checking
    #[must_use]
    pub fn strict_host_keys(mut self) -> Self {
        self.host_key_check = HostKeyCheck::Strict;
        self
    }

    /// Pool key for this endpoint. Sessions are ringed per destination,
    /// so user and port are part of the key.
    #[must_use]
    pub fn pool_key(&self) -> String {
        match &self.username {
            Some(user) => format!("{}@{}:{}", user, self.host, self.port),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// The `user@host` destination string used by the raw `ssh` binary
    #[must_use]
    pub fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}
