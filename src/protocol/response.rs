//! Memcached ASCII protocol reply parsing
//!
//! Replies are CRLF-delimited; `get` replies carry a VALUE block before a
//! final `END` line. Generic error lines (`ERROR`, `CLIENT_ERROR`,
//! `SERVER_ERROR`) take precedence over command-specific parsing for
//! every reply class.

use crate::error::ProtocolError;
use crate::value::Flag;

/// Reply class expected for an issued command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Get,
    Storage,
    Delete,
    Counter,
}

impl ReplyKind {
    /// Whether the accumulated bytes form a complete reply.
    ///
    /// The trailing CRLF is the protocol's framing signal, but a TCP read
    /// may stop on an interior line boundary of a `get` reply, so that
    /// class is only complete once its `END` line has arrived. Escaped
    /// payloads never contain a raw CRLF, which keeps the check
    /// unambiguous.
    pub fn is_complete(self, buf: &[u8]) -> bool {
        if !buf.ends_with(b"\r\n") {
            return false;
        }
        if check_error_line(buf).is_some() {
            return true;
        }
        match self {
            ReplyKind::Get => buf == b"END\r\n" || buf.ends_with(b"\r\nEND\r\n"),
            ReplyKind::Storage | ReplyKind::Delete | ReplyKind::Counter => true,
        }
    }
}

/// Outcome of a storage command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageReply {
    Stored,
    NotStored,
    Exists,
    NotFound,
}

/// Outcome of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReply {
    Deleted,
    NotFound,
}

/// Outcome of incr/decr
///
/// `NotFound` is a marker, not an error: the counter key does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterReply {
    Value(u64),
    NotFound,
}

/// Detect the generic error replies. Checked before any command-specific
/// parsing.
pub fn check_error_line(buf: &[u8]) -> Option<ProtocolError> {
    if buf == b"ERROR\r\n" {
        return Some(ProtocolError::NonexistentCommand);
    }
    if !buf.ends_with(b"\r\n") {
        return None;
    }
    if let Some(text) = buf.strip_prefix(b"CLIENT_ERROR ") {
        return Some(ProtocolError::Client(trim_line(text)));
    }
    if let Some(text) = buf.strip_prefix(b"SERVER_ERROR ") {
        return Some(ProtocolError::Server(trim_line(text)));
    }
    None
}

/// Parse a storage reply (`set` and friends).
pub fn parse_storage(buf: &[u8]) -> Result<StorageReply, ProtocolError> {
    if let Some(err) = check_error_line(buf) {
        return Err(err);
    }
    match buf {
        b"STORED\r\n" => Ok(StorageReply::Stored),
        b"NOT_STORED\r\n" => Ok(StorageReply::NotStored),
        b"EXISTS\r\n" => Ok(StorageReply::Exists),
        b"NOT_FOUND\r\n" => Ok(StorageReply::NotFound),
        other => Err(unknown(other)),
    }
}

/// Parse a delete reply.
pub fn parse_delete(buf: &[u8]) -> Result<DeleteReply, ProtocolError> {
    if let Some(err) = check_error_line(buf) {
        return Err(err);
    }
    match buf {
        b"DELETED\r\n" => Ok(DeleteReply::Deleted),
        b"NOT_FOUND\r\n" => Ok(DeleteReply::NotFound),
        other => Err(unknown(other)),
    }
}

/// Parse an incr/decr reply: `NOT_FOUND` or a decimal counter value.
pub fn parse_counter(buf: &[u8]) -> Result<CounterReply, ProtocolError> {
    if let Some(err) = check_error_line(buf) {
        return Err(err);
    }
    if buf == b"NOT_FOUND\r\n" {
        return Ok(CounterReply::NotFound);
    }
    let line = buf
        .strip_suffix(b"\r\n")
        .ok_or_else(|| ProtocolError::Parse("missing terminator".into()))?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .map(CounterReply::Value)
        .ok_or_else(|| unknown(buf))
}

/// Parse a `get` reply. `Ok(None)` is a miss.
///
/// Expected shape: `VALUE <key> <flags> <bytes>\r\n<data>\r\nEND\r\n`.
/// The echoed key and the declared byte length are both verified before
/// the payload is handed to the value codec; the payload is returned
/// still escaped.
pub fn parse_get<'a>(buf: &'a [u8], key: &str) -> Result<Option<(Flag, &'a [u8])>, ProtocolError> {
    if let Some(err) = check_error_line(buf) {
        return Err(err);
    }
    if buf == b"END\r\n" {
        return Ok(None);
    }

    let header_end =
        find_crlf(buf).ok_or_else(|| ProtocolError::Parse("missing VALUE header".into()))?;
    let header = &buf[..header_end];
    let mut parts = header.split(|&b| b == b' ').filter(|p| !p.is_empty());

    if parts.next() != Some(b"VALUE".as_slice()) {
        return Err(ProtocolError::Parse(format!(
            "expected VALUE header, got: {}",
            String::from_utf8_lossy(header)
        )));
    }
    let echoed = parts
        .next()
        .ok_or_else(|| ProtocolError::Parse("missing key in VALUE header".into()))?;
    if echoed != key.as_bytes() {
        return Err(ProtocolError::Parse(format!(
            "reply for key {}, requested {key}",
            String::from_utf8_lossy(echoed)
        )));
    }
    let flag_bits = parts
        .next()
        .and_then(parse_u32)
        .ok_or_else(|| ProtocolError::Parse("bad flags in VALUE header".into()))?;
    let flag = Flag::from_bits(flag_bits)
        .ok_or_else(|| ProtocolError::Parse(format!("unknown value flag: {flag_bits}")))?;
    let declared = parts
        .next()
        .and_then(parse_usize)
        .ok_or_else(|| ProtocolError::Parse("bad length in VALUE header".into()))?;
    if parts.next().is_some() {
        return Err(ProtocolError::Parse("unexpected VALUE header field".into()));
    }

    let body = &buf[header_end + 2..];
    let payload = body
        .strip_suffix(b"\r\nEND\r\n")
        .ok_or_else(|| ProtocolError::Parse("missing END terminator".into()))?;
    if payload.len() != declared {
        return Err(ProtocolError::Parse(format!(
            "declared {declared} bytes, got {}",
            payload.len()
        )));
    }

    Ok(Some((flag, payload)))
}

/// Find \r\n in buffer using SIMD-accelerated search
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    memchr::memchr(b'\r', buf).filter(|&i| buf.get(i + 1) == Some(&b'\n'))
}

fn trim_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r\n").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

fn unknown(buf: &[u8]) -> ProtocolError {
    ProtocolError::UnknownResponse(String::from_utf8_lossy(buf).into_owned())
}

fn parse_u32(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn parse_usize(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_lines_take_precedence() {
        assert_eq!(
            parse_storage(b"ERROR\r\n"),
            Err(ProtocolError::NonexistentCommand)
        );
        assert_eq!(
            parse_delete(b"CLIENT_ERROR bad data chunk\r\n"),
            Err(ProtocolError::Client("bad data chunk".to_string()))
        );
        assert_eq!(
            parse_counter(b"SERVER_ERROR out of memory\r\n"),
            Err(ProtocolError::Server("out of memory".to_string()))
        );
        assert_eq!(
            parse_get(b"ERROR\r\n", "k"),
            Err(ProtocolError::NonexistentCommand)
        );
    }

    #[test]
    fn test_parse_storage() {
        assert_eq!(parse_storage(b"STORED\r\n"), Ok(StorageReply::Stored));
        assert_eq!(parse_storage(b"NOT_STORED\r\n"), Ok(StorageReply::NotStored));
        assert_eq!(parse_storage(b"EXISTS\r\n"), Ok(StorageReply::Exists));
        assert_eq!(parse_storage(b"NOT_FOUND\r\n"), Ok(StorageReply::NotFound));
        assert!(matches!(
            parse_storage(b"WHATEVER\r\n"),
            Err(ProtocolError::UnknownResponse(_))
        ));
    }

    #[test]
    fn test_parse_delete() {
        assert_eq!(parse_delete(b"DELETED\r\n"), Ok(DeleteReply::Deleted));
        assert_eq!(parse_delete(b"NOT_FOUND\r\n"), Ok(DeleteReply::NotFound));
        assert!(matches!(
            parse_delete(b"STORED\r\n"),
            Err(ProtocolError::UnknownResponse(_))
        ));
    }

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter(b"1000\r\n"), Ok(CounterReply::Value(1000)));
        assert_eq!(parse_counter(b"0\r\n"), Ok(CounterReply::Value(0)));
        assert_eq!(parse_counter(b"NOT_FOUND\r\n"), Ok(CounterReply::NotFound));
        assert!(matches!(
            parse_counter(b"minus one\r\n"),
            Err(ProtocolError::UnknownResponse(_))
        ));
    }

    #[test]
    fn test_parse_get_miss() {
        assert_eq!(parse_get(b"END\r\n", "k"), Ok(None));
    }

    #[test]
    fn test_parse_get_hit() {
        let buf = b"VALUE mykey 0 5\r\nhello\r\nEND\r\n";
        let (flag, payload) = parse_get(buf, "mykey").unwrap().unwrap();
        assert_eq!(flag, Flag::String);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn test_parse_get_escaped_payload() {
        // escaped line breaks ride along inside the payload
        let buf = b"VALUE k 0 6\r\na\\\r\\\nb\r\nEND\r\n";
        let (_, payload) = parse_get(buf, "k").unwrap().unwrap();
        assert_eq!(payload, b"a\\\r\\\nb");
    }

    #[test]
    fn test_parse_get_key_mismatch() {
        let buf = b"VALUE other 0 5\r\nhello\r\nEND\r\n";
        assert!(matches!(
            parse_get(buf, "mykey"),
            Err(ProtocolError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_get_length_mismatch() {
        let buf = b"VALUE k 0 99\r\nhello\r\nEND\r\n";
        assert!(matches!(parse_get(buf, "k"), Err(ProtocolError::Parse(_))));
    }

    #[test]
    fn test_parse_get_unknown_flag() {
        let buf = b"VALUE k 7 5\r\nhello\r\nEND\r\n";
        assert!(matches!(parse_get(buf, "k"), Err(ProtocolError::Parse(_))));
    }

    #[test]
    fn test_get_completeness() {
        // a chunk ending on the header line boundary is not complete
        assert!(!ReplyKind::Get.is_complete(b"VALUE k 0 5\r\n"));
        assert!(!ReplyKind::Get.is_complete(b"VALUE k 0 5\r\nhello\r\n"));
        assert!(ReplyKind::Get.is_complete(b"VALUE k 0 5\r\nhello\r\nEND\r\n"));
        assert!(ReplyKind::Get.is_complete(b"END\r\n"));
        // a payload that merely ends in "END" does not terminate the reply
        assert!(!ReplyKind::Get.is_complete(b"VALUE k 0 6\r\nfooEND\r\n"));
        assert!(ReplyKind::Get.is_complete(b"SERVER_ERROR oom\r\n"));
    }

    #[test]
    fn test_line_completeness() {
        assert!(!ReplyKind::Storage.is_complete(b"STOR"));
        assert!(!ReplyKind::Storage.is_complete(b"STORED\r"));
        assert!(ReplyKind::Storage.is_complete(b"STORED\r\n"));
        assert!(ReplyKind::Counter.is_complete(b"42\r\n"));
        assert!(ReplyKind::Delete.is_complete(b"DELETED\r\n"));
    }
}
