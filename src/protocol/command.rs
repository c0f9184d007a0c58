//! Memcached ASCII protocol command builder
//!
//! Commands are single CRLF-terminated lines; `set` carries a data block
//! after its line. The writer reuses one buffer across commands.

use crate::value::Flag;
use bytes::BytesMut;
use itoa::Buffer;

/// Expiration time in seconds. Zero never expires.
///
/// The conversions carry the coercion rules of the wire format: negative
/// expirations collapse to zero and fractional seconds are floored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ttl(u64);

impl Ttl {
    pub const NEVER: Ttl = Ttl(0);

    pub fn seconds(self) -> u64 {
        self.0
    }
}

impl From<u64> for Ttl {
    fn from(secs: u64) -> Self {
        Ttl(secs)
    }
}

impl From<u32> for Ttl {
    fn from(secs: u32) -> Self {
        Ttl(u64::from(secs))
    }
}

impl From<i64> for Ttl {
    fn from(secs: i64) -> Self {
        Ttl(secs.max(0) as u64)
    }
}

impl From<i32> for Ttl {
    fn from(secs: i32) -> Self {
        Ttl(i64::from(secs).max(0) as u64)
    }
}

impl From<f64> for Ttl {
    fn from(secs: f64) -> Self {
        if secs.is_nan() || secs < 0.0 {
            Ttl(0)
        } else {
            Ttl(secs.floor() as u64)
        }
    }
}

/// Command writer for the memcached ASCII protocol
pub struct CommandWriter {
    buf: BytesMut,
}

impl CommandWriter {
    /// Create a new command writer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the internal buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Take the buffer, leaving an empty buffer in its place
    pub fn take(&mut self) -> BytesMut {
        std::mem::take(&mut self.buf)
    }

    /// Write `get <key>\r\n`
    pub fn get(&mut self, key: &str) {
        self.buf.extend_from_slice(b"get ");
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write `set <key> <flags> <exptime> <bytes>\r\n<data>\r\n`
    ///
    /// `data` must already be escaped; its length is the declared byte
    /// count on the command line.
    pub fn set(&mut self, key: &str, flag: Flag, ttl: Ttl, data: &[u8]) {
        let mut itoa_buf = Buffer::new();
        self.buf.extend_from_slice(b"set ");
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf
            .extend_from_slice(itoa_buf.format(flag.bits()).as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf
            .extend_from_slice(itoa_buf.format(ttl.seconds()).as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf
            .extend_from_slice(itoa_buf.format(data.len()).as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write `delete <key>\r\n`
    pub fn delete(&mut self, key: &str) {
        self.buf.extend_from_slice(b"delete ");
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write `incr <key> <amount>\r\n`
    pub fn incr(&mut self, key: &str, amount: u64) {
        self.counter(b"incr ", key, amount);
    }

    /// Write `decr <key> <amount>\r\n`
    pub fn decr(&mut self, key: &str, amount: u64) {
        self.counter(b"decr ", key, amount);
    }

    fn counter(&mut self, verb: &[u8], key: &str, amount: u64) {
        let mut itoa_buf = Buffer::new();
        self.buf.extend_from_slice(verb);
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf
            .extend_from_slice(itoa_buf.format(amount).as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }
}

impl Default for CommandWriter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get() {
        let mut writer = CommandWriter::default();
        writer.get("mykey");
        assert_eq!(writer.buffer(), b"get mykey\r\n");
    }

    #[test]
    fn test_set() {
        let mut writer = CommandWriter::default();
        writer.set("mykey", Flag::Numeric, Ttl::from(3600u64), b"12345");
        assert_eq!(writer.buffer(), b"set mykey 8 3600 5\r\n12345\r\n");
    }

    #[test]
    fn test_set_never_expires() {
        let mut writer = CommandWriter::default();
        writer.set("k", Flag::String, Ttl::NEVER, b"v");
        assert_eq!(writer.buffer(), b"set k 0 0 1\r\nv\r\n");
    }

    #[test]
    fn test_delete() {
        let mut writer = CommandWriter::default();
        writer.delete("mykey");
        assert_eq!(writer.buffer(), b"delete mykey\r\n");
    }

    #[test]
    fn test_counters() {
        let mut writer = CommandWriter::default();
        writer.incr("hits", 5);
        assert_eq!(writer.take().as_ref(), b"incr hits 5\r\n");
        writer.decr("hits", 2);
        assert_eq!(writer.take().as_ref(), b"decr hits 2\r\n");
    }

    #[test]
    fn test_take_resets() {
        let mut writer = CommandWriter::default();
        writer.get("a");
        let _ = writer.take();
        writer.get("b");
        assert_eq!(writer.buffer(), b"get b\r\n");
    }

    #[test]
    fn test_ttl_coercion() {
        assert_eq!(Ttl::from(-5i64).seconds(), 0);
        assert_eq!(Ttl::from(-1i32).seconds(), 0);
        assert_eq!(Ttl::from(2.9f64).seconds(), 2);
        assert_eq!(Ttl::from(f64::NAN).seconds(), 0);
        assert_eq!(Ttl::from(-0.5f64).seconds(), 0);
        assert_eq!(Ttl::from(60u64).seconds(), 60);
    }
}
