//! Test support: a scripted transport for exercising the collector,
//! watcher, and analyzer without live SSH targets.
//!
//! Rules match on a substring of the executed command; the first match
//! wins. Commands with no matching rule succeed with empty output.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{CommandStream, CommandTransport, ExecOptions, ExecutionResult};
use crate::connection::SshConnectionInfo;
use crate::error::{Error, Result};

/// Scripted outcome for one command rule
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return output with the given exit code
    Output {
        /// Exit code
        exit_code: i32,
        /// Standard output
        stdout: String,
        /// Standard error
        stderr: String,
    },
    /// Fail with `SSH_CONNECTION_ERROR`
    ConnectionError,
    /// Fail with `SSH_TIMEOUT_ERROR`
    TimeoutError,
}

impl ScriptedOutcome {
    /// Successful output with exit code 0
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::Output {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    #[must_use]
    pub fn exit(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::Output {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

struct Rule {
    pattern: String,
    // Outcomes consumed in order; the last one repeats forever
    outcomes: Vec<ScriptedOutcome>,
    served: usize,
}

/// One recorded call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Target host
    pub host: String,
    /// Executed command
    pub command: String,
}

/// A [`CommandTransport`] driven entirely by scripted rules
#[derive(Default)]
pub struct ScriptedTransport {
    rules: Mutex<Vec<Rule>>,
    streams: Mutex<Vec<(String, Vec<String>)>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport").finish_non_exhaustive()
    }
}

impl ScriptedTransport {
    /// Create a transport with no rules; everything succeeds empty
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule matching commands containing `pattern`
    #[must_use]
    pub fn on(self, pattern: impl Into<String>, outcome: ScriptedOutcome) -> Self {
        self.rules.lock().expect("rules lock").push(Rule {
            pattern: pattern.into(),
            outcomes: vec![outcome],
            served: 0,
        });
        self
    }

    /// Add a rule with successful stdout
    #[must_use]
    pub fn respond(self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.on(pattern, ScriptedOutcome::ok(stdout))
    }

    /// Add a rule serving outcomes in sequence; the last repeats
    #[must_use]
    pub fn respond_seq(
        self,
        pattern: impl Into<String>,
        outcomes: Vec<ScriptedOutcome>,
    ) -> Self {
        assert!(!outcomes.is_empty(), "sequence needs at least one outcome");
        self.rules.lock().expect("rules lock").push(Rule {
            pattern: pattern.into(),
            outcomes,
            served: 0,
        });
        self
    }

    /// Add a streaming rule yielding the given lines, then end-of-stream
    #[must_use]
    pub fn with_stream(self, pattern: impl Into<String>, lines: Vec<String>) -> Self {
        self.streams
            .lock()
            .expect("streams lock")
            .push((pattern.into(), lines));
        self
    }

    /// Sleep this long inside every execute, for concurrency assertions
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().expect("latency lock") = Some(latency);
        self
    }

    /// All calls executed so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Number of executed commands containing `pattern`
    pub fn call_count(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.command.contains(pattern))
            .count()
    }

    /// Highest number of concurrently executing commands observed
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, command: &str) -> ScriptedOutcome {
        let mut rules = self.rules.lock().expect("rules lock");
        for rule in rules.iter_mut() {
            if command.contains(&rule.pattern) {
                let idx = rule.served.min(rule.outcomes.len() - 1);
                rule.served += 1;
                return rule.outcomes[idx].clone();
            }
        }
        ScriptedOutcome::ok("")
    }
}

#[async_trait]
impl CommandTransport for ScriptedTransport {
    async fn execute(
        &self,
        info: &SshConnectionInfo,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecutionResult> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            host: info.host.clone(),
            command: command.to_string(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let latency = *self.latency.lock().expect("latency lock");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.next_outcome(command) {
            ScriptedOutcome::Output {
                exit_code,
                stdout,
                stderr,
            } => Ok(ExecutionResult {
                exit_code,
                stdout,
                stderr,
                execution_time_ms: latency
                    .map_or(1, |l| u64::try_from(l.as_millis()).unwrap_or(u64::MAX)),
                success: options.expected_exit_codes.contains(&exit_code),
                attempts: 1,
            }),
            ScriptedOutcome::ConnectionError => {
                Err(Error::connection(&info.host, "scripted connection failure"))
            }
            ScriptedOutcome::TimeoutError => Err(Error::timeout(options.timeout.as_secs())),
        }
    }

    async fn open_stream(
        &self,
        info: &SshConnectionInfo,
        command: &str,
    ) -> Result<Box<dyn CommandStream>> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            host: info.host.clone(),
            command: command.to_string(),
        });

        let streams = self.streams.lock().expect("streams lock");
        for (pattern, lines) in streams.iter() {
            if command.contains(pattern.as_str()) {
                return Ok(Box::new(ScriptedStream {
                    lines: lines.iter().cloned().collect(),
                }));
            }
        }
        Err(Error::connection(&info.host, "no scripted stream for command"))
    }

    async fn test_connectivity(&self, info: &SshConnectionInfo) -> bool {
        self.execute(
            info,
            "echo connectivity_test",
            ExecOptions::default().timeout(Duration::from_secs(10)),
        )
        .await
        .map(|r| r.success && r.stdout.contains("connectivity_test"))
        .unwrap_or(false)
    }
}

struct ScriptedStream {
    lines: VecDeque<String>,
}

#[async_trait]
impl CommandStream for ScriptedStream {
    async fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.pop_front() {
            Some(line) => Ok(Some(line)),
            // Park forever once drained so the session does not treat a
            // finished script as a dropped connection mid-test
            None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_match_first_substring() {
        let transport = ScriptedTransport::new()
            .respond("uname", "Linux host-a")
            .on("docker ps", ScriptedOutcome::exit(1, "no daemon"));

        let info = SshConnectionInfo::new("host-a");
        let result = transport
            .execute(&info, "uname -a", ExecOptions::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "Linux host-a");

        let result = transport
            .execute(&info, "docker ps -a", ExecOptions::default())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);

        // Unmatched commands succeed with empty output
        let result = transport
            .execute(&info, "true", ExecOptions::default())
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_outcomes_then_repeat() {
        let transport = ScriptedTransport::new().respond_seq(
            "cat",
            vec![ScriptedOutcome::ok("v1"), ScriptedOutcome::ok("v2")],
        );
        let info = SshConnectionInfo::new("host-a");
        let opts = ExecOptions::default();
        assert_eq!(
            transport.execute(&info, "cat f", opts.clone()).await.unwrap().stdout,
            "v1"
        );
        assert_eq!(
            transport.execute(&info, "cat f", opts.clone()).await.unwrap().stdout,
            "v2"
        );
        assert_eq!(
            transport.execute(&info, "cat f", opts).await.unwrap().stdout,
            "v2"
        );
    }

    #[tokio::test]
    async fn test_connectivity_uses_rules() {
        let transport =
            ScriptedTransport::new().respond("echo connectivity_test", "connectivity_test");
        assert!(
            transport
                .test_connectivity(&SshConnectionInfo::new("host-a"))
                .await
        );

        let down = ScriptedTransport::new().on("echo", ScriptedOutcome::ConnectionError);
        assert!(!down.test_connectivity(&SshConnectionInfo::new("host-a")).await);
    }

    #[tokio::test]
    async fn test_call_recording() {
        let transport = ScriptedTransport::new();
        let info = SshConnectionInfo::new("host-a");
        let _ = transport.execute(&info, "ls /tmp", ExecOptions::default()).await;
        let _ = transport.execute(&info, "ls /var", ExecOptions::default()).await;
        assert_eq!(transport.call_count("ls"), 2);
        assert_eq!(transport.calls()[0].host, "host-a");
    }
}
