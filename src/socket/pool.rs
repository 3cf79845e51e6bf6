use crate::base::neterror::NetError;
use crate::http::stream::HttpStream;
use crate::socket::connectjob::{Target, Transport};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

// Process-wide pools, created on first use and kept for the process lifetime.
static HTTP_POOL: Lazy<Arc<ClientSocketPool>> =
    Lazy::new(|| Arc::new(ClientSocketPool::new(PoolConfig::default())));
static HTTPS_POOL: Lazy<Arc<ClientSocketPool>> =
    Lazy::new(|| Arc::new(ClientSocketPool::new(PoolConfig::default())));

/// The shared pool for `transport`.
///
/// Its idle sweep starts with the first checkout on a runtime and restarts
/// on a later runtime if the first one shuts down.
pub fn shared_pool(transport: Transport) -> Arc<ClientSocketPool> {
    match transport {
        Transport::Http => HTTP_POOL.clone(),
        Transport::Https => HTTPS_POOL.clone(),
    }
}

/// Pool limits and keep-alive behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Return connections to the pool after a clean exchange.
    pub keep_alive: bool,
    /// Upper bound on connections in use at once, across all groups.
    pub max_total_sockets: usize,
    /// Idle connections kept per (transport, host, port).
    pub max_idle_per_group: usize,
    /// Idle connections older than this are not reused.
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_total_sockets: 128,
            max_idle_per_group: 32,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Per-group state tracking.
#[derive(Default)]
struct Group {
    idle_streams: VecDeque<HttpStream>,
}

/// A connection checked out of the pool.
///
/// Holds one active-socket slot. Dropping it discards the connection and
/// frees the slot; [`ClientSocketPool::release_stream`] keeps it for reuse.
#[derive(Debug)]
pub struct PooledStream {
    stream: HttpStream,
    _slot: OwnedSemaphorePermit,
}

impl PooledStream {
    pub fn stream(&self) -> &HttpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut HttpStream {
        &mut self.stream
    }
}

/// One active-socket slot, held until a connection is checked out on it.
#[derive(Debug)]
pub struct SocketSlot(OwnedSemaphorePermit);

/// Keep-alive pool of HTTP/1.1 connections.
///
/// Active connections are bounded by `max_total_sockets`; callers beyond the
/// bound wait for a slot. Idle connections do not count against the bound.
pub struct ClientSocketPool {
    config: PoolConfig,
    groups: Arc<DashMap<Target, Group>>,
    slots: Arc<Semaphore>,
    sweeping: Arc<AtomicBool>,
}

impl Clone for ClientSocketPool {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            groups: Arc::clone(&self.groups),
            slots: Arc::clone(&self.slots),
            sweeping: Arc::clone(&self.sweeping),
        }
    }
}

impl std::fmt::Debug for ClientSocketPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSocketPool")
            .field("max_total_sockets", &self.config.max_total_sockets)
            .field("keep_alive", &self.config.keep_alive)
            .field("total_active", &self.total_active_count())
            .field("idle", &self.idle_socket_count())
            .finish()
    }
}

impl Default for ClientSocketPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl ClientSocketPool {
    pub fn new(mut config: PoolConfig) -> Self {
        config.max_total_sockets = config.max_total_sockets.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            slots: Arc::new(Semaphore::new(config.max_total_sockets)),
            groups: Arc::new(DashMap::new()),
            sweeping: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a connection to `target`, waiting for a slot if the pool is full.
    ///
    /// A live idle connection of the same group is preferred over a new one.
    pub async fn request_stream(&self, target: &Target) -> Result<PooledStream, NetError> {
        let slot = self.wait_for_slot().await?;
        self.checkout(target, slot).await
    }

    /// Wait until an active-socket slot is free.
    pub async fn wait_for_slot(&self) -> Result<SocketSlot, NetError> {
        self.ensure_cleanup_task();
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map(SocketSlot)
            .map_err(|_| NetError::ConnectionAborted)
    }

    /// Reuse an idle connection to `target` or open a new one on `slot`.
    pub async fn checkout(&self, target: &Target, slot: SocketSlot) -> Result<PooledStream, NetError> {
        let SocketSlot(slot) = slot;
        while let Some(mut stream) = self.pop_idle(target) {
            match stream.ready().await {
                Ok(()) => {
                    stream.mark_reused();
                    tracing::debug!(peer = %target, "reusing idle connection");
                    return Ok(PooledStream {
                        stream,
                        _slot: slot,
                    });
                }
                Err(e) => {
                    tracing::debug!(peer = %target, error = %e, "dropping dead idle connection");
                }
            }
        }

        tracing::debug!(peer = %target, "opening new connection");
        let stream = HttpStream::connect(target).await?;
        Ok(PooledStream {
            stream,
            _slot: slot,
        })
    }

    /// Pop the oldest usable idle connection of the group.
    fn pop_idle(&self, target: &Target) -> Option<HttpStream> {
        let mut group = self.groups.get_mut(target)?;
        while let Some(stream) = group.idle_streams.pop_front() {
            if self.is_usable(&stream) {
                return Some(stream);
            }
        }
        None
    }

    fn is_usable(&self, stream: &HttpStream) -> bool {
        !stream.is_closed() && stream.idle_since.elapsed() < self.config.idle_timeout
    }

    /// Return a connection after a clean exchange.
    ///
    /// With keep-alive off, or when `reusable` is false, the connection is discarded.
    pub fn release_stream(&self, pooled: PooledStream, reusable: bool) {
        let PooledStream { mut stream, _slot } = pooled;

        if !(self.config.keep_alive && reusable) || stream.is_closed() {
            tracing::debug!(peer = %stream.target(), "discarding connection");
            return;
        }

        let mut group = self
            .groups
            .entry(stream.target().clone())
            .or_default();
        if group.idle_streams.len() >= self.config.max_idle_per_group {
            tracing::debug!(peer = %stream.target(), "idle limit reached, discarding connection");
            return;
        }
        stream.idle_since = Instant::now();
        group.idle_streams.push_back(stream);
    }

    /// Get total active socket count.
    pub fn total_active_count(&self) -> usize {
        self.config.max_total_sockets - self.slots.available_permits()
    }

    /// Get total idle socket count across all groups.
    pub fn idle_socket_count(&self) -> usize {
        self.groups.iter().map(|g| g.idle_streams.len()).sum()
    }

    /// Idle connections held for one target.
    pub fn idle_count_for(&self, target: &Target) -> usize {
        self.groups
            .get(target)
            .map(|g| g.idle_streams.len())
            .unwrap_or(0)
    }

    /// Drop expired or closed idle connections, and empty groups.
    pub fn cleanup_idle_sockets(&self) {
        sweep_idle(&self.groups, self.config.idle_timeout);
    }

    /// Start a background task to periodically clean up idle sockets.
    ///
    /// The task ends once every handle to the pool is gone.
    pub fn start_cleanup_task(&self) {
        let interval = self.config.idle_timeout.max(Duration::from_secs(1));
        let idle_timeout = self.config.idle_timeout;
        let groups: Weak<DashMap<Target, Group>> = Arc::downgrade(&self.groups);
        let running = SweepFlag::raise(&self.sweeping);
        tokio::spawn(async move {
            let _running = running;
            loop {
                tokio::time::sleep(interval).await;
                match groups.upgrade() {
                    Some(groups) => sweep_idle(&groups, idle_timeout),
                    None => break,
                }
            }
        });
    }

    /// True while a cleanup task is sweeping this pool.
    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    fn ensure_cleanup_task(&self) {
        if self.is_sweeping() || tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!("starting idle connection sweep");
            self.start_cleanup_task();
        }
    }
}

fn sweep_idle(groups: &DashMap<Target, Group>, idle_timeout: Duration) {
    let mut groups_to_remove = Vec::new();

    for mut entry in groups.iter_mut() {
        entry
            .value_mut()
            .idle_streams
            .retain(|s| !s.is_closed() && s.idle_since.elapsed() < idle_timeout);

        if entry.idle_streams.is_empty() {
            groups_to_remove.push(entry.key().clone());
        }
    }

    for target in groups_to_remove {
        groups.remove_if(&target, |_, g| g.idle_streams.is_empty());
    }
}

/// Marks a pool as swept; lowered when the cleanup task ends or is dropped
/// with its runtime.
struct SweepFlag(Arc<AtomicBool>);

impl SweepFlag {
    fn raise(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(Arc::clone(flag))
    }
}

impl Drop for SweepFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
