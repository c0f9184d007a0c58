//! Shard routing: server addresses and the key-to-server selection policy

mod ring;

pub use ring::HashRing;

use crate::config::{ClusterAlg, RouteFn};
use crate::error::MemshardError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Modulus for the integer fold (see [`fold_digest`]).
const FOLD_PRIME: u64 = 982_451_653;

/// A validated `host:port` server location.
///
/// Immutable once the client is built; the ordered set of these forms the
/// routing universe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress(String);

impl ServerAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ServerAddress {
    type Err = MemshardError;

    /// Accepts `host:port`. Whitespace is stripped before validation;
    /// both parts must be non-empty and the port numeric.
    fn from_str(location: &str) -> Result<Self, Self::Err> {
        let cleaned: String = location.chars().filter(|c| !c.is_whitespace()).collect();
        let mut parts = cleaned.split(':');
        let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(MemshardError::Config(format!(
                "bad server location: {location}"
            )));
        };
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(MemshardError::Config(format!(
                "bad server location: {location}"
            )));
        }
        Ok(ServerAddress(cleaned))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServerAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key-to-server selection over a fixed shard set.
///
/// Built once at client construction; never blocks and holds no mutable
/// state afterwards, so routing the same key always lands on the same
/// server.
pub struct ShardRouter {
    servers: Arc<[ServerAddress]>,
    policy: Policy,
}

enum Policy {
    /// Caller-supplied routing function, highest priority.
    Custom(RouteFn),
    /// Single configured server; hashing is bypassed entirely.
    Single,
    /// Digest fold modulo shard count. Array order is significant.
    Modulo,
    /// Consistent-hash ring (default).
    Ring(HashRing),
}

impl ShardRouter {
    pub fn new(
        servers: Arc<[ServerAddress]>,
        alg: ClusterAlg,
        custom: Option<RouteFn>,
    ) -> Result<Self, MemshardError> {
        if servers.is_empty() {
            return Err(MemshardError::Config("server list is empty".into()));
        }
        let policy = if let Some(route_fn) = custom {
            Policy::Custom(route_fn)
        } else if servers.len() == 1 {
            Policy::Single
        } else {
            match alg {
                ClusterAlg::Hash => Policy::Modulo,
                ClusterAlg::Ring => Policy::Ring(HashRing::new(&servers)),
            }
        };
        Ok(ShardRouter { servers, policy })
    }

    /// Pick the shard for `key`.
    ///
    /// A custom routing function must return one of the configured
    /// servers; anything else is a configuration error.
    pub fn route(&self, key: &str) -> Result<&ServerAddress, MemshardError> {
        match &self.policy {
            Policy::Custom(route_fn) => {
                let chosen = route_fn.call(key);
                self.servers
                    .iter()
                    .find(|server| **server == chosen)
                    .ok_or_else(|| {
                        MemshardError::Config(format!(
                            "routing function returned {chosen}, not a configured server"
                        ))
                    })
            }
            Policy::Single => Ok(&self.servers[0]),
            Policy::Modulo => {
                let index = (fold_digest(key) % self.servers.len() as u64) as usize;
                Ok(&self.servers[index])
            }
            Policy::Ring(ring) => {
                let index = ring.route(key).unwrap_or(0);
                Ok(&self.servers[index])
            }
        }
    }

    /// The configured shard set, in construction order.
    pub fn servers(&self) -> &[ServerAddress] {
        &self.servers
    }
}

/// Deterministic integer fold used by modulo routing.
///
/// Stage one hashes the key to a lowercase md5 hex digest; stage two folds
/// the digest characters with a polynomial accumulation seeded at 7. Both
/// stages must stay bit-identical for deployments that pin key placement.
pub fn fold_digest(key: &str) -> u64 {
    fold_hex(&format!("{:x}", md5::compute(key.as_bytes())))
}

fn fold_hex(digest: &str) -> u64 {
    digest
        .bytes()
        .fold(7u64, |acc, c| (acc * 31 * u64::from(c)) % FOLD_PRIME)
}
