//! Configuration for the memshard client

use crate::router::ServerAddress;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Main configuration structure
///
/// Immutable for the lifetime of the client that was built from it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,

    /// Per-call deadline in milliseconds
    pub timeout_ms: u64,

    /// Declared retry budget. The client itself never retries; an
    /// external retry wrapper may consume this value.
    pub retries: u32,

    /// Bound on queued acquire requests per shard before failing fast
    pub max_waiting_clients: usize,

    /// Shard selection scheme
    pub cluster_alg: ClusterAlg,

    /// Caller-supplied routing override, highest priority when set
    #[serde(skip)]
    pub route_fn: Option<RouteFn>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            timeout_ms: 5000,
            retries: 5,
            max_waiting_clients: 10_000,
            cluster_alg: ClusterAlg::default(),
            route_fn: None,
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("MEMSHARD_POOL_MAX")
            && let Ok(n) = v.parse()
        {
            config.pool.max = n;
        }

        if let Ok(v) = std::env::var("MEMSHARD_POOL_MIN")
            && let Ok(n) = v.parse()
        {
            config.pool.min = n;
        }

        if let Ok(v) = std::env::var("MEMSHARD_POOL_IDLE_MS")
            && let Ok(n) = v.parse()
        {
            config.pool.idle_ms = n;
        }

        if let Ok(v) = std::env::var("MEMSHARD_TIMEOUT_MS")
            && let Ok(n) = v.parse()
        {
            config.timeout_ms = n;
        }

        if let Ok(v) = std::env::var("MEMSHARD_MAX_WAITING_CLIENTS")
            && let Ok(n) = v.parse()
        {
            config.max_waiting_clients = n;
        }

        if let Ok(v) = std::env::var("MEMSHARD_CLUSTER_ALG")
            && v == "hash"
        {
            config.cluster_alg = ClusterAlg::Hash;
        }

        config
    }
}

/// Per-shard pool sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum connections per shard
    pub max: usize,

    /// Warm connections kept through idle reclamation
    pub min: usize,

    /// Idle time in milliseconds before a connection beyond `min` is
    /// reclaimed
    pub idle_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: 1,
            min: 0,
            idle_ms: 30_000,
        }
    }
}

impl PoolConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

/// Shard selection scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterAlg {
    /// Consistent-hash ring: server set changes remap only a bounded
    /// fraction of keys.
    #[default]
    Ring,
    /// Digest fold modulo shard count. Remaps almost all keys when the
    /// shard count changes; kept for deployments that pinned placement
    /// with it.
    Hash,
}

/// Caller-supplied `key -> server` routing override.
#[derive(Clone)]
pub struct RouteFn(Arc<dyn Fn(&str) -> ServerAddress + Send + Sync>);

impl RouteFn {
    pub fn new(route: impl Fn(&str) -> ServerAddress + Send + Sync + 'static) -> Self {
        RouteFn(Arc::new(route))
    }

    pub(crate) fn call(&self, key: &str) -> ServerAddress {
        (self.0)(key)
    }
}

impl fmt::Debug for RouteFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RouteFn(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pool.max, 1);
        assert_eq!(config.pool.min, 0);
        assert_eq!(config.pool.idle_ms, 30_000);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.retries, 5);
        assert_eq!(config.max_waiting_clients, 10_000);
        assert_eq!(config.cluster_alg, ClusterAlg::Ring);
        assert!(config.route_fn.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config =
            serde_json::from_str(r#"{"timeout_ms": 250, "cluster_alg": "hash"}"#).unwrap();
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.cluster_alg, ClusterAlg::Hash);
        // untouched fields keep their defaults
        assert_eq!(config.pool.max, 1);
    }

    #[test]
    fn test_deserialize_pool() {
        let config: Config =
            serde_json::from_str(r#"{"pool": {"max": 10, "idle_ms": 1000}}"#).unwrap();
        assert_eq!(config.pool.max, 10);
        assert_eq!(config.pool.min, 0);
        assert_eq!(config.pool.idle(), Duration::from_secs(1));
    }
}
