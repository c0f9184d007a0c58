//! Per-shard connection pooling
//!
//! One pool per server address, created lazily on first use. A pool hands
//! out at most `pool.max` connections at a time; callers beyond that
//! queue up to `max_waiting_clients` and then fail fast. Idle connections
//! are validated before reuse (test-on-borrow) and reclaimed once they
//! sit idle past the configured threshold.

use crate::config::PoolConfig;
use crate::error::{MemshardError, Result};
use crate::metrics::Metrics;
use crate::router::ServerAddress;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// A live transport to one shard
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    /// Open a socket to the shard with keep-alive enabled and Nagle
    /// disabled. Resolves only once the transport reports connected.
    async fn connect(addr: &ServerAddress) -> Result<Self> {
        let target = lookup_host(addr.as_str())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no address for {addr}"))
            })?;

        let socket = if target.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(true)?;
        let stream = socket.connect(target).await?;
        stream.set_nodelay(true)?;
        debug!(server = %addr, "connected");
        Ok(Connection { stream })
    }

    /// Test-on-borrow probe: a healthy idle connection is open and has no
    /// unsolicited bytes waiting. EOF means the peer closed it; pending
    /// bytes mean a previous exchange left the protocol state dirty.
    fn is_valid(&self) -> bool {
        let mut probe = [0u8; 1];
        match self.stream.try_read(&mut probe) {
            Ok(_) => false,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(_) => false,
        }
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

struct IdleConn {
    conn: Connection,
    since: Instant,
}

/// Bounded pool of connections to a single shard
pub struct ConnectionPool {
    addr: ServerAddress,
    config: PoolConfig,
    max_waiting: usize,
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    idle: Mutex<VecDeque<IdleConn>>,
    metrics: Arc<Metrics>,
}

impl ConnectionPool {
    fn new(
        addr: ServerAddress,
        config: PoolConfig,
        max_waiting: usize,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        // a zero-sized pool could never serve a request
        let max = config.max.max(1);
        Arc::new(ConnectionPool {
            addr,
            config,
            max_waiting,
            permits: Arc::new(Semaphore::new(max)),
            waiting: AtomicUsize::new(0),
            idle: Mutex::new(VecDeque::new()),
            metrics,
        })
    }

    /// Acquire a validated connection, queuing while the pool is at
    /// capacity. Fails fast with [`MemshardError::PoolExhausted`] once
    /// the wait queue is full.
    pub async fn acquire(self: &Arc<Self>, cancel: CancellationToken) -> Result<PooledConnection> {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => self.wait_for_permit().await?,
        };

        while let Some(entry) = self.pop_idle() {
            if entry.conn.is_valid() {
                self.metrics.connections_reused.inc();
                return Ok(PooledConnection::new(
                    Arc::clone(self),
                    entry.conn,
                    permit,
                    cancel,
                ));
            }
            self.metrics.connections_destroyed.inc();
            debug!(server = %self.addr, "discarding invalid idle connection");
        }

        let conn = Connection::connect(&self.addr).await?;
        self.metrics.connections_created.inc();
        Ok(PooledConnection::new(Arc::clone(self), conn, permit, cancel))
    }

    async fn wait_for_permit(&self) -> Result<OwnedSemaphorePermit> {
        if self.waiting.load(Ordering::Acquire) >= self.max_waiting {
            self.metrics.pool_exhausted.inc();
            return Err(MemshardError::PoolExhausted);
        }
        self.waiting.fetch_add(1, Ordering::AcqRel);
        let _guard = WaitGuard(&self.waiting);
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MemshardError::PoolExhausted)
    }

    /// Pop the most recently used idle connection, first dropping any
    /// beyond `min` that idled past the threshold (oldest sit at the
    /// front).
    fn pop_idle(&self) -> Option<IdleConn> {
        let mut idle = self.idle.lock();
        while idle.len() > self.config.min {
            let stale = idle
                .front()
                .is_some_and(|entry| entry.since.elapsed() >= self.config.idle());
            if !stale {
                break;
            }
            idle.pop_front();
            self.metrics.connections_destroyed.inc();
            trace!(server = %self.addr, "reclaimed idle connection");
        }
        idle.pop_back()
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        idle.push_back(IdleConn {
            conn,
            since: Instant::now(),
        });
    }
}

/// Decrements the waiter count even when the acquire future is dropped
/// mid-wait (deadline cancellation).
struct WaitGuard<'a>(&'a AtomicUsize);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusively-held connection, returned to its pool on drop
///
/// The connection goes back to the idle list only after the request marks
/// it clean; dropping the guard mid-flight (IO error, cancelled call)
/// closes the socket instead, since its protocol state can no longer be
/// trusted.
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    conn: Option<Connection>,
    _permit: OwnedSemaphorePermit,
    cancel: CancellationToken,
    clean: bool,
}

impl PooledConnection {
    fn new(
        pool: Arc<ConnectionPool>,
        conn: Connection,
        permit: OwnedSemaphorePermit,
        cancel: CancellationToken,
    ) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            _permit: permit,
            cancel,
            clean: false,
        }
    }

    /// Mark the protocol exchange complete; the connection may be reused.
    pub fn finish(&mut self) {
        self.clean = true;
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        self.conn
            .as_mut()
            .expect("connection present until drop")
            .stream_mut()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else { return };
        if self.clean && !self.cancel.is_cancelled() {
            self.pool.release(conn);
        } else {
            // dropping the socket closes it; unread reply bytes must not
            // leak into the next request on this shard
            self.pool.metrics.connections_destroyed.inc();
            debug!(server = %self.pool.addr, "destroying connection after incomplete exchange");
        }
    }
}

/// Lazily-created pools keyed by shard address
///
/// Creation runs under a single lock, so concurrent first use of a shard
/// cannot build duplicate pools.
pub struct PoolSet {
    pool_config: PoolConfig,
    max_waiting: usize,
    pools: Mutex<HashMap<ServerAddress, Arc<ConnectionPool>>>,
    metrics: Arc<Metrics>,
}

impl PoolSet {
    pub fn new(pool_config: PoolConfig, max_waiting: usize, metrics: Arc<Metrics>) -> Self {
        PoolSet {
            pool_config,
            max_waiting,
            pools: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub fn pool_for(&self, addr: &ServerAddress) -> Arc<ConnectionPool> {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(addr) {
            return Arc::clone(pool);
        }
        let pool = ConnectionPool::new(
            addr.clone(),
            self.pool_config.clone(),
            self.max_waiting,
            Arc::clone(&self.metrics),
        );
        pools.insert(addr.clone(), Arc::clone(&pool));
        pool
    }
}
