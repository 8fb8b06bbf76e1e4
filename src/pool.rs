//! SSH session pool.
//!
//! Maps each destination to a ring of reusable multiplexed sessions with a
//! per-host concurrency cap, FIFO borrowing, liveness probing on checkout,
//! and a background idle reaper. Only the pool closes pooled sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use openssh::{KnownHosts, Session, SessionBuilder};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::{HostKeyCheck, SshConnectionInfo};
use crate::error::{Error, Result};

/// Tuning knobs for the session pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrent sessions per destination
    pub max_connections_per_host: usize,
    /// Idle age past which the reaper closes a session
    pub max_idle: Duration,
    /// Interval between reaper sweeps
    pub reap_interval: Duration,
    /// Budget for the checkout liveness probe
    pub liveness_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: 3,
            max_idle: Duration::from_secs(300),
            reap_interval: Duration::from_secs(60),
            liveness_timeout: Duration::from_secs(1),
        }
    }
}

/// Counter snapshot for observability
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Destinations with at least one ring
    pub hosts: usize,
    /// Sessions currently parked idle
    pub idle_sessions: usize,
    /// Sessions established since start
    pub sessions_created: u64,
    /// Checkouts served from the ring
    pub sessions_reused: u64,
    /// Sessions discarded after a failed liveness probe
    pub sessions_replaced: u64,
}

struct IdleSession {
    session: Session,
    parked_at: Instant,
}

struct HostRing {
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<IdleSession>>,
}

/// Process-global pool of authenticated SSH sessions
pub struct SshPool {
    config: PoolConfig,
    rings: Mutex<HashMap<String, Arc<HostRing>>>,
    closed: AtomicBool,
    reaper: Mutex<Option<JoinHandle<()>>>,
    sessions_created: AtomicU64,
    sessions_reused: AtomicU64,
    sessions_replaced: AtomicU64,
}

impl std::fmt::Debug for SshPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshPool")
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SshPool {
    /// Create a pool and start its idle reaper
    #[must_use]
    pub fn start(config: PoolConfig) -> Arc<Self> {
        let pool = Arc::new(Self {
            config,
            rings: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            reaper: Mutex::new(None),
            sessions_created: AtomicU64::new(0),
            sessions_reused: AtomicU64::new(0),
            sessions_replaced: AtomicU64::new(0),
        });

        let reaper_pool = Arc::clone(&pool);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(reaper_pool.config.reap_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                reaper_pool.reap_idle().await;
            }
        });
        *pool.reaper.lock().expect("reaper lock") = Some(handle);
        pool
    }

    /// Borrow a live session for `info`, waiting FIFO behind the per-host cap.
    ///
    /// Popped sessions are liveness-probed with a short `echo`; dead ones are
    /// replaced transparently.
    pub async fn acquire(&self, info: &SshConnectionInfo) -> Result<PooledSession> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable("ssh_pool"));
        }

        let ring = self.ring_for(&info.pool_key());
        let permit = Arc::clone(&ring.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::unavailable("ssh_pool"))?;

        // Shutdown may have raced the permit wait
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable("ssh_pool"));
        }

        loop {
            let candidate = ring.idle.lock().expect("ring lock").pop();
            match candidate {
                Some(idle) => {
                    if self.probe(&idle.session).await {
                        self.sessions_reused.fetch_add(1, Ordering::Relaxed);
                        return Ok(PooledSession {
                            session: Some(idle.session),
                            ring: Arc::clone(&ring),
                            _permit: permit,
                        });
                    }
                    self.sessions_replaced.fetch_add(1, Ordering::Relaxed);
                    debug!(host = %info.host, "pooled session failed liveness probe, replacing");
                    close_session(idle.session).await;
                }
                None => {
                    let session = self.connect(info).await?;
                    self.sessions_created.fetch_add(1, Ordering::Relaxed);
                    return Ok(PooledSession {
                        session: Some(session),
                        ring: Arc::clone(&ring),
                        _permit: permit,
                    });
                }
            }
        }
    }

    /// Close everything and refuse further borrows
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reaper.lock().expect("reaper lock").take() {
            handle.abort();
        }

        let rings: Vec<Arc<HostRing>> = {
            let mut map = self.rings.lock().expect("rings lock");
            map.drain().map(|(_, ring)| ring).collect()
        };
        for ring in rings {
            let drained: Vec<IdleSession> = {
                let mut idle = ring.idle.lock().expect("ring lock");
                idle.drain(..).collect()
            };
            for parked in drained {
                close_session(parked.session).await;
            }
        }
        debug!("ssh pool shut down");
    }

    /// Counter snapshot
    pub fn stats(&self) -> PoolStats {
        let rings = self.rings.lock().expect("rings lock");
        let idle_sessions = rings
            .values()
            .map(|r| r.idle.lock().expect("ring lock").len())
            .sum();
        PoolStats {
            hosts: rings.len(),
            idle_sessions,
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_reused: self.sessions_reused.load(Ordering::Relaxed),
            sessions_replaced: self.sessions_replaced.load(Ordering::Relaxed),
        }
    }

    fn ring_for(&self, key: &str) -> Arc<HostRing> {
        let mut rings = self.rings.lock().expect("rings lock");
        Arc::clone(rings.entry(key.to_string()).or_insert_with(|| {
            Arc::new(HostRing {
                semaphore: Arc::new(Semaphore::new(self.config.max_connections_per_host)),
                idle: Mutex::new(Vec::new()),
            })
        }))
    }

    async fn probe(&self, session: &Session) -> bool {
        let mut echo = session.command("echo");
        echo.arg("liveness_probe");
        match tokio::time::timeout(self.config.liveness_timeout, echo.output()).await {
            Ok(Ok(output)) => output.status.success(),
            _ => false,
        }
    }

    async fn connect(&self, info: &SshConnectionInfo) -> Result<Session> {
        let mut builder = SessionBuilder::default();
        builder.connect_timeout(info.connect_timeout);
        builder.known_hosts_check(match info.host_key_check {
            HostKeyCheck::Accept => KnownHosts::Accept,
            HostKeyCheck::Strict => KnownHosts::Add,
        });
        if let Some(user) = &info.username {
            builder.user(user.clone());
        }
        if info.port != crate::connection::DEFAULT_SSH_PORT {
            builder.port(info.port);
        }
        if let Some(key) = &info.private_key_path {
            builder.keyfile(key);
        }

        let connect = builder.connect_mux(&info.host);
        match tokio::time::timeout(info.connect_timeout, connect).await {
            Ok(Ok(session)) => {
                debug!(host = %info.host, "established ssh session");
                Ok(session)
            }
            Ok(Err(e)) => Err(Error::connection(&info.host, e.to_string())),
            Err(_) => Err(Error::connection(
                &info.host,
                format!(
                    "connection timed out after {}s",
                    info.connect_timeout.as_secs()
                ),
            )),
        }
    }

    async fn reap_idle(&self) {
        let rings: Vec<Arc<HostRing>> = {
            let map = self.rings.lock().expect("rings lock");
            map.values().map(Arc::clone).collect()
        };
        let mut reaped = 0usize;
        for ring in rings {
            let expired: Vec<IdleSession> = {
                let mut idle = ring.idle.lock().expect("ring lock");
                let (stale, fresh): (Vec<_>, Vec<_>) = idle
                    .drain(..)
                    .partition(|s| s.parked_at.elapsed() > self.config.max_idle);
                *idle = fresh;
                stale
            };
            for parked in expired {
                close_session(parked.session).await;
                reaped += 1;
            }
        }
        if reaped > 0 {
            debug!(reaped, "closed idle ssh sessions");
        }
    }
}

async fn close_session(session: Session) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "error closing ssh session");
    }
}

/// A borrowed session. Returned to the ring on drop; call
/// [`PooledSession::discard`] instead when the session is known broken.
pub struct PooledSession {
    session: Option<Session>,
    ring: Arc<HostRing>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    /// The underlying session
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session.as_ref().expect("session taken")
    }

    /// Drop the session instead of returning it to the ring. Used after
    /// timeouts and transport errors, when the remote side state is unknown.
    pub async fn discard(mut self) {
        if let Some(session) = self.session.take() {
            close_session(session).await;
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.ring.idle.lock().expect("ring lock").push(IdleSession {
                session,
                parked_at: Instant::now(),
            });
        }
    }
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession").finish_non_exhaustive()
    }
}
