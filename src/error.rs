//! Error types for memshard

use thiserror::Error;

/// Main error type for memshard
#[derive(Error, Debug)]
pub enum MemshardError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("timeout of {timeout_ms}ms exceeded: {op} {key}")]
    Timeout {
        op: &'static str,
        key: String,
        timeout_ms: u64,
    },

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key contains whitespace or control characters")]
    IllegalCharacter,

    #[error("key must be 1..=250 bytes")]
    Length,
}

/// Value encoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("value cannot be serialized: {0}")]
    Type(String),

    #[error("escaped value must be 1..=1048576 bytes")]
    Length,
}

/// Errors reported by the server or raised while parsing its replies
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("nonexistent command")]
    NonexistentCommand,

    #[error("client error: {0}")]
    Client(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("malformed reply: {0}")]
    Parse(String),

    #[error("unknown response: {0}")]
    UnknownResponse(String),
}

pub type Result<T> = std::result::Result<T, MemshardError>;
