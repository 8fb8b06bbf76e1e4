//! SSH command execution client.
//!
//! [`SshClient`] drives pooled sessions for request/response commands and
//! dedicated `ssh` subprocesses for streaming. The [`CommandTransport`]
//! trait is the seam every higher layer consumes, so collection, watching,
//! and analysis can be exercised against a scripted transport in tests.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command as TokioCommand};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::connection::{HostKeyCheck, SshConnectionInfo};
use crate::error::{Error, Result};
use crate::pool::SshPool;

/// Client-level configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Global cap on concurrent command executions across all hosts
    pub max_concurrent_operations: usize,
    /// Timeout applied when the caller does not supply one
    pub default_timeout: Duration,
    /// Budget for [`SshClient::test_connectivity`]
    pub connectivity_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 10,
            default_timeout: Duration::from_secs(30),
            connectivity_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-call execution options
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first failed attempt
    pub retries: u32,
    /// Base retry delay in seconds; grows by 1.5× per attempt
    pub retry_delay_seconds: f64,
    /// Exit codes treated as success
    pub expected_exit_codes: HashSet<i32>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 0,
            retry_delay_seconds: 1.0,
            expected_exit_codes: HashSet::from([0]),
        }
    }
}

impl ExecOptions {
    /// Set the per-attempt timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry count
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the base retry delay
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
}

/// Outcome of one remote command execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Remote exit code; -1 when terminated by signal
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration across all attempts
    pub execution_time_ms: u64,
    /// Whether the exit code was in the expected set
    pub success: bool,
    /// Attempts consumed (1 when the first try answered)
    pub attempts: u32,
}

/// Async line source over a streaming remote command
#[async_trait]
pub trait CommandStream: Send {
    /// Next line of remote stdout; `None` once the stream ends
    async fn next_line(&mut self) -> Result<Option<String>>;

    /// Terminate the underlying command promptly
    async fn close(self: Box<Self>);
}

/// Line stream over a dedicated `ssh` subprocess, never a pooled session.
/// Closing kills the subprocess; dropping does the same via kill-on-drop.
#[derive(Debug)]
pub struct LineStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl CommandStream for LineStream {
    async fn next_line(&mut self) -> Result<Option<String>> {
        self.lines.next_line().await.map_err(Error::from)
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "stream subprocess already gone");
        }
        let _ = self.child.wait().await;
    }
}

/// Transport seam between the SSH layer and every consumer of remote output
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Execute a command to completion with retry and timeout policy
    async fn execute(
        &self,
        info: &SshConnectionInfo,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecutionResult>;

    /// Open a line stream over a long-running command
    async fn open_stream(
        &self,
        info: &SshConnectionInfo,
        command: &str,
    ) -> Result<Box<dyn CommandStream>>;

    /// Cheap reachability probe
    async fn test_connectivity(&self, info: &SshConnectionInfo) -> bool;
}

/// SSH execution client over a shared session pool
pub struct SshClient {
    pool: Arc<SshPool>,
    config: ClientConfig,
    global_slots: Arc<Semaphore>,
}

impl std::fmt::Debug for SshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SshClient {
    /// Create a client over `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SshNotFound`] when no `ssh` binary is on PATH.
    pub fn new(pool: Arc<SshPool>, config: ClientConfig) -> Result<Self> {
        which::which("ssh").map_err(|_| Error::SshNotFound)?;
        let global_slots = Arc::new(Semaphore::new(config.max_concurrent_operations));
        Ok(Self {
            pool,
            config,
            global_slots,
        })
    }

    /// The shared pool, for shutdown orchestration
    #[must_use]
    pub fn pool(&self) -> &Arc<SshPool> {
        &self.pool
    }

    /// Run many commands concurrently under the global cap.
    ///
    /// Branches never panic out; each returns its own result.
    pub async fn execute_parallel(
        &self,
        batch: Vec<(SshConnectionInfo, String)>,
        options: ExecOptions,
    ) -> Vec<Result<ExecutionResult>> {
        let futures = batch.into_iter().map(|(info, command)| {
            let options = options.clone();
            async move { self.execute(&info, &command, options).await }
        });
        futures::future::join_all(futures).await
    }

    async fn execute_once(
        &self,
        info: &SshConnectionInfo,
        command: &str,
        timeout: Duration,
        expected_exit_codes: &HashSet<i32>,
    ) -> Result<(i32, String, String, bool)> {
        let pooled = self.pool.acquire(info).await?;
        let outcome = {
            let mut remote = pooled.session().shell(command);
            tokio::time::timeout(timeout, remote.output()).await
        };
        match outcome {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let success = expected_exit_codes.contains(&exit_code);
                Ok((exit_code, stdout, stderr, success))
            }
            Ok(Err(e)) => {
                let classified = match e {
                    openssh::Error::Disconnected => {
                        Error::connection(&info.host, "session disconnected")
                    }
                    other => Error::command(&info.host, other.to_string()),
                };
                pooled.discard().await;
                Err(classified)
            }
            Err(_) => {
                // The remote command may still be running; the session state
                // is unknown, so it must not re-enter the ring.
                pooled.discard().await;
                Err(Error::timeout(timeout.as_secs()))
            }
        }
    }
}

#[async_trait]
impl CommandTransport for SshClient {
    async fn execute(
        &self,
        info: &SshConnectionInfo,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecutionResult> {
        let _slot = self
            .global_slots
            .acquire()
            .await
            .map_err(|_| Error::unavailable("ssh_client"))?;

        let started = Instant::now();
        let max_attempts = options.retries + 1;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = self
                .execute_once(info, command, options.timeout, &options.expected_exit_codes)
                .await;

            match outcome {
                Ok((exit_code, stdout, stderr, success)) => {
                    if !success && attempt < max_attempts {
                        debug!(
                            host = %info.host,
                            exit_code,
                            attempt,
                            "unexpected exit code, retrying"
                        );
                        tokio::time::sleep(backoff_delay(options.retry_delay_seconds, attempt))
                            .await;
                        continue;
                    }
                    return Ok(ExecutionResult {
                        exit_code,
                        stdout,
                        stderr,
                        execution_time_ms: elapsed_millis(started),
                        success,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        host = %info.host,
                        error = %e,
                        attempt,
                        "transient ssh failure, retrying"
                    );
                    tokio::time::sleep(backoff_delay(options.retry_delay_seconds, attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn open_stream(
        &self,
        info: &SshConnectionInfo,
        command: &str,
    ) -> Result<Box<dyn CommandStream>> {
        let ssh_binary = which::which("ssh").map_err(|_| Error::SshNotFound)?;

        let mut cmd = TokioCommand::new(ssh_binary);
        cmd.arg("-p")
            .arg(info.port.to_string())
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(match info.host_key_check {
                HostKeyCheck::Accept => "StrictHostKeyChecking=accept-new",
                HostKeyCheck::Strict => "StrictHostKeyChecking=yes",
            })
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                info.connect_timeout.as_secs().max(1)
            ));
        if let Some(key) = &info.private_key_path {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(info.destination())
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::connection(&info.host, format!("failed to spawn ssh: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::connection(&info.host, "failed to capture ssh stdout"))?;

        debug!(host = %info.host, command, "opened streaming ssh subprocess");
        Ok(Box::new(LineStream {
            child,
            lines: BufReader::new(stdout).lines(),
        }))
    }

    async fn test_connectivity(&self, info: &SshConnectionInfo) -> bool {
        let options = ExecOptions::default().timeout(self.config.connectivity_timeout);
        match self.execute(info, "echo connectivity_test", options).await {
            Ok(result) => result.success && result.stdout.contains("connectivity_test"),
            Err(_) => false,
        }
    }
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn backoff_delay(base_seconds: f64, attempt: u32) -> Duration {
    let factor = 1.5f64.powi(attempt.saturating_sub(1).min(10) as i32);
    Duration::from_secs_f64((base_seconds * factor).clamp(0.0, 60.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_options_defaults() {
        let options = ExecOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.retries, 0);
        assert!(options.expected_exit_codes.contains(&0));
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let first = backoff_delay(2.0, 1);
        let second = backoff_delay(2.0, 2);
        let third = backoff_delay(2.0, 3);
        assert_eq!(first, Duration::from_secs_f64(2.0));
        assert_eq!(second, Duration::from_secs_f64(3.0));
        assert_eq!(third, Duration::from_secs_f64(4.5));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert!(backoff_delay(30.0, 20) <= Duration::from_secs(60));
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_concurrent_operations, 10);
        assert_eq!(config.connectivity_timeout, Duration::from_secs(10));
    }
}
