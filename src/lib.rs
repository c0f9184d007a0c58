//! # memshard
//!
//! Sharded client for the memcached ASCII protocol.
//!
//! ## Features
//!
//! - get / set / delete / incr / decr over the text protocol
//! - Typed values (string, number, binary, JSON) tagged with flags and
//!   reconstructed on read
//! - Consistent-hash or modulo shard routing, plus a caller-supplied
//!   override
//! - Lazily-created, bounded connection pool per shard with
//!   test-on-borrow validation and idle reclamation
//! - Per-call deadlines that discard the implicated connection
//! - Prometheus metrics per client
//!
//! ## Example
//!
//! ```ignore
//! use memshard::{Client, Config};
//!
//! let client = Client::new(["127.0.0.1:11211", "127.0.0.2:11211"], Config::default())?;
//! client.set("greeting", "hello", 0u64).await?;
//! let value = client.get("greeting").await?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────┐   ┌────────────┐   ┌─────────────────┐
//! │ Client  │──▶│ ShardRouter│──▶│ PoolSet    │──▶│ memcached shard │
//! │ facade  │   │ (ring/mod) │   │ (per shard)│   │ (ASCII protocol)│
//! └─────────┘   └───────────┘   └────────────┘   └─────────────────┘
//!      │              validate → route → acquire → write →
//!      └── protocol codec ── read-until-terminator → release → parse
//! ```

// Modules
pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod metrics;
pub mod pool;
pub mod prelude;
pub mod protocol;
pub mod router;
pub mod value;

// Re-exports for convenience
pub use client::Client;
pub use config::{ClusterAlg, Config, PoolConfig, RouteFn};
pub use error::{KeyError, MemshardError, ProtocolError, Result, ValueError};
pub use protocol::{CounterReply, DeleteReply, StorageReply, Ttl};
pub use router::ServerAddress;
pub use value::{Flag, Value};
