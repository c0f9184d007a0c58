//! Prelude module for common imports.
//!
//! This module re-exports commonly used types and traits for convenience.
//!
//! # Usage
//!
//! ```ignore
//! use memshard::prelude::*;
//! ```

// Error types
pub use crate::error::{KeyError, MemshardError, ProtocolError, Result, ValueError};

// Configuration
pub use crate::config::{ClusterAlg, Config, PoolConfig, RouteFn};

// Client
pub use crate::client::Client;

// Protocol
pub use crate::protocol::{CounterReply, DeleteReply, StorageReply, Ttl};

// Routing
pub use crate::router::ServerAddress;

// Values
pub use crate::value::{Flag, Value};

// Metrics
pub use crate::metrics::Metrics;

// Common external crates
pub use std::sync::Arc;
pub use tracing::{debug, error, info, trace, warn};
