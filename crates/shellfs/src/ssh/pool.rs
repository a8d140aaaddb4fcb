// A reference-counted pool of SSH connections, keyed by (host, port, user).
//
// Lock order: the pool-wide `connections` lock is always taken before any
// per-connection `state` lock. Every path that touches an entry's state
// (acquire, release, sweep, introspection) holds the pool lock while doing so,
// which also means an entry's state cannot change between a sweep deciding to
// evict it and the eviction itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use super::auth::{compose_auth_methods, Credential};
use super::transport::{Connector, Transport};
use crate::config::PoolConfig;
use crate::error::Result;

/// The (host, port, user) triple a pooled connection is shared under.
///
/// Displays as `host:port:user`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    host: String,
    port: u16,
    user: String,
}

impl Identity {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// `host:port`, the address to dial
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.user)
    }
}

struct ConnectionState {
    last_used: Instant,
    ref_count: usize,
}

impl ConnectionState {
    fn is_reclaimable(&self, now: Instant, max_idle: std::time::Duration) -> bool {
        self.ref_count == 0 && now.saturating_duration_since(self.last_used) > max_idle
    }
}

struct PooledConnection<T> {
    transport: Arc<T>,
    state: Mutex<ConnectionState>,
}

impl<T> PooledConnection<T> {
    fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: Mutex::new(ConnectionState {
                last_used: Instant::now(),
                ref_count: 1,
            }),
        }
    }
}

/// A pool of shared transports.
///
/// Callers pair every successful [`acquire`](Self::acquire) with a
/// [`release`](Self::release) for the same identity. Connections whose
/// reference count has dropped to zero stay open for reuse until they have
/// been idle for longer than `max_idle_time`; they are then closed by the next
/// release or background sweep that notices.
pub struct ConnectionPool<C: Connector> {
    connector: C,
    config: PoolConfig,
    connections: Mutex<HashMap<Identity, Arc<PooledConnection<C::Transport>>>>,
    sweeper: OnceLock<JoinHandle<()>>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Create a pool without a background sweeper
    pub fn new(connector: C, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            connector,
            config,
            connections: Mutex::new(HashMap::new()),
            sweeper: OnceLock::new(),
        })
    }

    /// Create a pool and start its background sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(connector: C, config: PoolConfig) -> Arc<Self> {
        let pool = Self::new(connector, config);
        pool.start_sweeper();
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Start the periodic idle sweep. Calling this more than once has no
    /// further effect; the task stops on its own once the pool is dropped.
    pub fn start_sweeper(self: &Arc<Self>) {
        self.sweeper.get_or_init(|| {
            let pool = Arc::downgrade(self);
            let period = self.config.cleanup_interval;

            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);

                loop {
                    ticker.tick().await;

                    let Some(pool) = pool.upgrade() else {
                        tracing::debug!("SSH pool dropped, stopping idle sweep");
                        break;
                    };

                    let evicted = pool.sweep().await;
                    if evicted > 0 {
                        tracing::debug!("Idle sweep closed {evicted} SSH connections");
                    }
                }
            })
        });
    }

    /// Get a transport for `identity`, reusing a pooled one if it still
    /// answers a probe, otherwise dialing a new one with `credential`.
    pub async fn acquire(
        &self,
        identity: &Identity,
        credential: &Credential,
    ) -> Result<Arc<C::Transport>> {
        let mut connections = self.connections.lock().await;

        if let Some(entry) = connections.get(identity).cloned() {
            tracing::debug!("found existing ssh connection in pool for {identity}");
            let mut state = entry.state.lock().await;

            match entry.transport.probe().await {
                Ok(()) => {
                    state.ref_count += 1;
                    state.last_used = Instant::now();
                    tracing::debug!("reusing {identity} (refs: {})", state.ref_count);
                    return Ok(entry.transport.clone());
                }
                Err(e) => {
                    tracing::warn!("Removing dead SSH connection for {identity}: {e}");
                    let unreferenced = state.ref_count == 0;
                    drop(state);
                    connections.remove(identity);
                    if unreferenced {
                        entry.transport.close().await;
                    }
                }
            }
        }

        let methods = compose_auth_methods(credential).await?;

        tracing::debug!("Creating new SSH connection for {identity}");
        let transport = Arc::new(self.connector.dial(identity, methods).await?);

        connections.insert(
            identity.clone(),
            Arc::new(PooledConnection::new(transport.clone())),
        );

        Ok(transport)
    }

    /// Like [`acquire`](Self::acquire), but the reference is held by a
    /// [`Lease`] that gives it back when dropped.
    pub async fn lease(
        self: &Arc<Self>,
        identity: &Identity,
        credential: &Credential,
    ) -> Result<Lease<C>> {
        let transport = self.acquire(identity, credential).await?;
        Ok(Lease {
            pool: self.clone(),
            identity: identity.clone(),
            transport,
            released: false,
        })
    }

    /// Drop one reference to the connection for `identity`.
    ///
    /// The count never goes below zero. If the connection is left unreferenced
    /// and had already been idle for longer than `max_idle_time` when this
    /// release arrived, it is closed right away.
    pub async fn release(&self, identity: &Identity) {
        let mut connections = self.connections.lock().await;

        let Some(entry) = connections.get(identity).cloned() else {
            tracing::debug!("release for {identity}, which is not pooled");
            return;
        };

        let mut state = entry.state.lock().await;
        let now = Instant::now();
        let idle = now.saturating_duration_since(state.last_used);

        if state.ref_count == 0 {
            tracing::warn!("unbalanced release for {identity}");
        }
        state.ref_count = state.ref_count.saturating_sub(1);
        state.last_used = now;

        if state.ref_count == 0 && idle > self.config.max_idle_time {
            tracing::debug!("closing idle SSH connection for {identity} on release");
            drop(state);
            connections.remove(identity);
            entry.transport.close().await;
        }
    }

    /// Close every unreferenced connection idle for longer than
    /// `max_idle_time`. Returns how many were closed.
    pub async fn sweep(&self) -> usize {
        let mut connections = self.connections.lock().await;
        let now = Instant::now();

        let mut idle = Vec::new();
        for (identity, entry) in connections.iter() {
            let state = entry.state.lock().await;
            if state.is_reclaimable(now, self.config.max_idle_time) {
                idle.push(identity.clone());
            }
        }

        for identity in &idle {
            if let Some(entry) = connections.remove(identity) {
                tracing::debug!("closing idle SSH connection for {identity}");
                entry.transport.close().await;
            }
        }

        idle.len()
    }

    /// Stop the sweeper and close every pooled connection, referenced or not.
    ///
    /// The pool can still be used afterwards, but idle connections will then
    /// only be reclaimed on release.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.get() {
            sweeper.abort();
        }

        let mut connections = self.connections.lock().await;
        for (identity, entry) in connections.drain() {
            tracing::debug!("closing SSH connection for {identity} on shutdown");
            entry.transport.close().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Identities with a pooled connection, sorted
    pub async fn identities(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> =
            self.connections.lock().await.keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Outstanding references for `identity`, if it is pooled
    pub async fn ref_count(&self, identity: &Identity) -> Option<usize> {
        let connections = self.connections.lock().await;
        let entry = connections.get(identity)?;
        let count = entry.state.lock().await.ref_count;
        Some(count)
    }
}

/// One acquired reference to a pooled transport.
///
/// Call [`release`](Self::release) when done. A lease that is dropped without
/// being released (a cancelled future, a panic) hands its release to a
/// spawned task instead.
pub struct Lease<C: Connector> {
    pool: Arc<ConnectionPool<C>>,
    identity: Identity,
    transport: Arc<C::Transport>,
    released: bool,
}

impl<C: Connector> Lease<C> {
    pub fn transport(&self) -> &Arc<C::Transport> {
        &self.transport
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub async fn release(mut self) {
        self.released = true;
        self.pool.release(&self.identity).await;
    }
}

impl<C: Connector> Drop for Lease<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let pool = self.pool.clone();
        let identity = self.identity.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("lease for {identity} dropped unreleased, releasing in background");
                handle.spawn(async move { pool.release(&identity).await });
            }
            Err(_) => {
                tracing::warn!("lease for {identity} dropped outside a runtime, reference leaked");
            }
        }
    }
}

impl<C: Connector> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get() {
            sweeper.abort();
        }
    }
}
