//! Client facade and the per-call request executor
//!
//! Every operation runs the same pipeline: validate input, route the key
//! to a shard, borrow a pooled connection, write the command, accumulate
//! the reply until its terminator, release the connection, then parse.
//! The whole pipeline races a per-call deadline; a call that times out
//! cancels its token so the borrowed connection is destroyed rather than
//! released, because its reply may still be in flight.

use crate::config::Config;
use crate::error::{MemshardError, ProtocolError, Result};
use crate::key::validate_key;
use crate::metrics::Metrics;
use crate::pool::PoolSet;
use crate::protocol::command::{CommandWriter, Ttl};
use crate::protocol::response::{self, CounterReply, DeleteReply, ReplyKind, StorageReply};
use crate::router::{ServerAddress, ShardRouter};
use crate::value::{self, Value};
use bytes::BytesMut;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Sharded memcached client
///
/// Holds one lazily-created connection pool per shard. Concurrent calls
/// interleave at the pool, write and read suspension points; a connection
/// is never shared between two in-flight calls, and no cross-request
/// ordering is guaranteed.
pub struct Client {
    config: Config,
    router: ShardRouter,
    pools: PoolSet,
    metrics: Arc<Metrics>,
}

impl Client {
    /// Build a client over an ordered set of `host:port` shard locations.
    ///
    /// The shard set is validated here and never changes afterwards.
    pub fn new<I, S>(servers: I, config: Config) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let servers = servers
            .into_iter()
            .map(|location| location.as_ref().parse())
            .collect::<Result<Vec<ServerAddress>>>()?;
        let servers: Arc<[ServerAddress]> = servers.into();
        let router = ShardRouter::new(
            Arc::clone(&servers),
            config.cluster_alg,
            config.route_fn.clone(),
        )?;
        let metrics = Arc::new(Metrics::new());
        let pools = PoolSet::new(
            config.pool.clone(),
            config.max_waiting_clients,
            Arc::clone(&metrics),
        );
        Ok(Client {
            config,
            router,
            pools,
            metrics,
        })
    }

    /// Fetch a value. `Ok(None)` is a miss.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.metrics.cmd_get.inc();
        validate_key(key)?;
        let mut writer = CommandWriter::default();
        writer.get(key);
        let raw = self
            .round_trip("get", key, writer.take(), ReplyKind::Get)
            .await?;
        match self.track_protocol(response::parse_get(&raw, key))? {
            None => {
                self.metrics.get_misses.inc();
                Ok(None)
            }
            Some((flag, payload)) => {
                self.metrics.get_hits.inc();
                let unescaped = value::unescape(payload);
                Ok(Some(self.track_protocol(Value::decode(flag, &unescaped))?))
            }
        }
    }

    /// Store a value under `key`. `ttl` is in seconds; zero never
    /// expires.
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<Value>,
        ttl: impl Into<Ttl>,
    ) -> Result<StorageReply> {
        self.metrics.cmd_set.inc();
        validate_key(key)?;
        let (flag, payload) = value.into().encode()?;
        let mut writer = CommandWriter::default();
        writer.set(key, flag, ttl.into(), &payload);
        let raw = self
            .round_trip("set", key, writer.take(), ReplyKind::Storage)
            .await?;
        self.track_protocol(response::parse_storage(&raw))
    }

    /// Delete a key. An absent key is a `NotFound` outcome, not an error.
    pub async fn delete(&self, key: &str) -> Result<DeleteReply> {
        self.metrics.cmd_delete.inc();
        validate_key(key)?;
        let mut writer = CommandWriter::default();
        writer.delete(key);
        let raw = self
            .round_trip("delete", key, writer.take(), ReplyKind::Delete)
            .await?;
        self.track_protocol(response::parse_delete(&raw))
    }

    /// Alias for [`Client::delete`].
    pub async fn del(&self, key: &str) -> Result<DeleteReply> {
        self.delete(key).await
    }

    /// Increment a counter by `amount`. A missing counter key comes back
    /// as the `NotFound` marker.
    pub async fn incr(&self, key: &str, amount: u64) -> Result<CounterReply> {
        self.metrics.cmd_incr.inc();
        validate_key(key)?;
        let mut writer = CommandWriter::default();
        writer.incr(key, amount);
        let raw = self
            .round_trip("incr", key, writer.take(), ReplyKind::Counter)
            .await?;
        self.track_protocol(response::parse_counter(&raw))
    }

    /// Decrement a counter by `amount`. The server floors the result at
    /// zero; it is passed through untouched.
    pub async fn decr(&self, key: &str, amount: u64) -> Result<CounterReply> {
        self.metrics.cmd_decr.inc();
        validate_key(key)?;
        let mut writer = CommandWriter::default();
        writer.decr(key, amount);
        let raw = self
            .round_trip("decr", key, writer.take(), ReplyKind::Counter)
            .await?;
        self.track_protocol(response::parse_counter(&raw))
    }

    /// The shard `key` routes to under the configured policy.
    pub fn shard_for(&self, key: &str) -> Result<&ServerAddress> {
        self.router.route(key)
    }

    /// Client-side metrics registry.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Route, borrow a connection, write the command and accumulate the
    /// reply, all raced against the per-call deadline.
    async fn round_trip(
        &self,
        op: &'static str,
        key: &str,
        command: BytesMut,
        kind: ReplyKind,
    ) -> Result<BytesMut> {
        let cancel = CancellationToken::new();
        let timer = self.metrics.cmd_latency.start_timer();
        let mut exchange = pin!(self.exchange(key, &command, kind, &cancel));
        let result = tokio::select! {
            result = &mut exchange => result,
            _ = tokio::time::sleep(self.config.timeout()) => {
                // cancelling first makes the pool guard destroy the
                // borrowed connection instead of releasing it: a late
                // reply on that socket would be misattributed to the
                // next request
                cancel.cancel();
                self.metrics.timeouts.inc();
                Err(MemshardError::Timeout {
                    op,
                    key: key.to_string(),
                    timeout_ms: self.config.timeout_ms,
                })
            }
        };
        timer.observe_duration();
        result
    }

    /// One command/reply exchange on a pooled connection. The connection
    /// goes back to its pool as soon as the terminator is seen and before
    /// the reply is parsed, so a malformed reply never holds it hostage.
    async fn exchange(
        &self,
        key: &str,
        command: &[u8],
        kind: ReplyKind,
        cancel: &CancellationToken,
    ) -> Result<BytesMut> {
        let server = self.router.route(key)?;
        let pool = self.pools.pool_for(server);
        let mut conn = pool.acquire(cancel.clone()).await?;

        conn.stream_mut().write_all(command).await?;
        self.metrics.bytes_written.inc_by(command.len() as u64);

        let mut reply = BytesMut::with_capacity(4096);
        loop {
            let n = conn.stream_mut().read_buf(&mut reply).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-reply",
                )
                .into());
            }
            self.metrics.bytes_read.inc_by(n as u64);
            if kind.is_complete(&reply) {
                break;
            }
            trace!(key, have = reply.len(), "partial reply, awaiting terminator");
        }

        conn.finish();
        drop(conn);
        Ok(reply)
    }

    fn track_protocol<T>(&self, parsed: std::result::Result<T, ProtocolError>) -> Result<T> {
        parsed.map_err(|err| {
            self.metrics.protocol_errors.inc();
            MemshardError::Protocol(err)
        })
    }
}
