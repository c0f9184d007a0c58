//! Prometheus metrics for memshard

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

/// Client-side metrics, one instance per [`crate::Client`]
pub struct Metrics {
    pub registry: Registry,

    // Command counters
    pub cmd_get: IntCounter,
    pub cmd_set: IntCounter,
    pub cmd_delete: IntCounter,
    pub cmd_incr: IntCounter,
    pub cmd_decr: IntCounter,

    // Hit/miss counters
    pub get_hits: IntCounter,
    pub get_misses: IntCounter,

    // Connection lifecycle
    pub connections_created: IntCounter,
    pub connections_reused: IntCounter,
    pub connections_destroyed: IntCounter,

    // Failure counters
    pub timeouts: IntCounter,
    pub pool_exhausted: IntCounter,
    pub protocol_errors: IntCounter,

    // Bytes counters
    pub bytes_read: IntCounter,
    pub bytes_written: IntCounter,

    // Latency histogram
    pub cmd_latency: Histogram,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let cmd_get = IntCounter::new("memshard_cmd_get_total", "Total get commands").unwrap();
        let cmd_set = IntCounter::new("memshard_cmd_set_total", "Total set commands").unwrap();
        let cmd_delete =
            IntCounter::new("memshard_cmd_delete_total", "Total delete commands").unwrap();
        let cmd_incr = IntCounter::new("memshard_cmd_incr_total", "Total incr commands").unwrap();
        let cmd_decr = IntCounter::new("memshard_cmd_decr_total", "Total decr commands").unwrap();

        let get_hits = IntCounter::new("memshard_get_hits_total", "Total get hits").unwrap();
        let get_misses = IntCounter::new("memshard_get_misses_total", "Total get misses").unwrap();

        let connections_created = IntCounter::new(
            "memshard_connections_created_total",
            "Connections opened to shards",
        )
        .unwrap();
        let connections_reused = IntCounter::new(
            "memshard_connections_reused_total",
            "Idle connections handed out again",
        )
        .unwrap();
        let connections_destroyed = IntCounter::new(
            "memshard_connections_destroyed_total",
            "Connections discarded instead of released",
        )
        .unwrap();

        let timeouts =
            IntCounter::new("memshard_timeouts_total", "Calls that exceeded the deadline").unwrap();
        let pool_exhausted = IntCounter::new(
            "memshard_pool_exhausted_total",
            "Acquires rejected with a full wait queue",
        )
        .unwrap();
        let protocol_errors =
            IntCounter::new("memshard_protocol_errors_total", "Total protocol errors").unwrap();

        let bytes_read = IntCounter::new("memshard_bytes_read_total", "Total bytes read").unwrap();
        let bytes_written =
            IntCounter::new("memshard_bytes_written_total", "Total bytes written").unwrap();

        let cmd_latency = Histogram::with_opts(
            HistogramOpts::new("memshard_cmd_latency_seconds", "Command latency in seconds")
                .buckets(vec![
                    0.0001, 0.0005, 0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ]),
        )
        .unwrap();

        // Register all metrics
        registry.register(Box::new(cmd_get.clone())).unwrap();
        registry.register(Box::new(cmd_set.clone())).unwrap();
        registry.register(Box::new(cmd_delete.clone())).unwrap();
        registry.register(Box::new(cmd_incr.clone())).unwrap();
        registry.register(Box::new(cmd_decr.clone())).unwrap();
        registry.register(Box::new(get_hits.clone())).unwrap();
        registry.register(Box::new(get_misses.clone())).unwrap();
        registry
            .register(Box::new(connections_created.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_reused.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_destroyed.clone()))
            .unwrap();
        registry.register(Box::new(timeouts.clone())).unwrap();
        registry.register(Box::new(pool_exhausted.clone())).unwrap();
        registry
            .register(Box::new(protocol_errors.clone()))
            .unwrap();
        registry.register(Box::new(bytes_read.clone())).unwrap();
        registry.register(Box::new(bytes_written.clone())).unwrap();
        registry.register(Box::new(cmd_latency.clone())).unwrap();

        Self {
            registry,
            cmd_get,
            cmd_set,
            cmd_delete,
            cmd_incr,
            cmd_decr,
            get_hits,
            get_misses,
            connections_created,
            connections_reused,
            connections_destroyed,
            timeouts,
            pool_exhausted,
            protocol_errors,
            bytes_read,
            bytes_written,
            cmd_latency,
        }
    }

    /// Get Prometheus formatted metrics
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        metrics.cmd_get.inc();
        metrics.get_misses.inc();
        metrics.connections_created.inc();

        let output = metrics.gather();
        assert!(output.contains("memshard_cmd_get_total"));
        assert!(output.contains("memshard_connections_created_total"));
    }
}
