//! Memcached ASCII protocol: command encoding and reply parsing

pub mod command;
pub mod response;

pub use command::{CommandWriter, Ttl};
pub use response::{
    CounterReply, DeleteReply, ReplyKind, StorageReply, check_error_line, parse_counter,
    parse_delete, parse_get, parse_storage,
};
