//! Typed values and their wire encoding
//!
//! Every stored value carries a numeric flag so the original type can be
//! reconstructed on read:
//!   - string : 0
//!   - json   : 2
//!   - binary : 4
//!   - number : 8
//!
//! The wire protocol is line-delimited, so payloads are escaped before
//! transmission: raw `\r` and `\n` bytes get a backslash prefix, which
//! decode strips again. This applies to every flag, string values
//! included, because a value may itself contain line breaks.

use crate::error::{ProtocolError, ValueError};
use serde::Serialize;

/// Maximum escaped payload size in bytes (memcached limit, 1 MiB)
pub const MAX_VALUE_SIZE: usize = 1_048_576;

/// Value type tag stored alongside every entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    String = 0,
    Json = 2,
    Binary = 4,
    Numeric = 8,
}

impl Flag {
    /// Parse the flag field of a `VALUE` header.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Flag::String),
            2 => Some(Flag::Json),
            4 => Some(Flag::Binary),
            8 => Some(Flag::Numeric),
            _ => None,
        }
    }

    /// The numeric form sent on the `set` command line.
    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// A typed cache value
///
/// The tag is resolved once when the value is built and travels with it
/// through encode and decode; no runtime type inspection happens later.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(serde_json::Number),
    Bytes(Vec<u8>),
    Structured(serde_json::Value),
}

impl Value {
    /// Build a `Structured` value from any serializable type.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self, ValueError> {
        serde_json::to_value(value)
            .map(Value::Structured)
            .map_err(|e| ValueError::Type(e.to_string()))
    }

    /// Encode into a `(flag, escaped payload)` pair ready for a `set` line.
    ///
    /// Fails with [`ValueError::Length`] when the escaped payload is empty
    /// or exceeds [`MAX_VALUE_SIZE`].
    pub fn encode(&self) -> Result<(Flag, Vec<u8>), ValueError> {
        let (flag, raw) = match self {
            Value::Bytes(bytes) => (Flag::Binary, bytes.clone()),
            Value::Number(number) => (Flag::Numeric, number.to_string().into_bytes()),
            Value::Text(text) => (Flag::String, text.clone().into_bytes()),
            Value::Structured(json) => (
                Flag::Json,
                serde_json::to_vec(json).map_err(|e| ValueError::Type(e.to_string()))?,
            ),
        };
        let escaped = escape(&raw);
        if escaped.is_empty() || escaped.len() > MAX_VALUE_SIZE {
            return Err(ValueError::Length);
        }
        Ok((flag, escaped))
    }

    /// Decode an unescaped payload back into the type named by `flag`.
    pub fn decode(flag: Flag, raw: &[u8]) -> Result<Self, ProtocolError> {
        match flag {
            Flag::Binary => Ok(Value::Bytes(raw.to_vec())),
            Flag::Numeric => {
                let text = std::str::from_utf8(raw)
                    .map_err(|_| ProtocolError::Parse("numeric payload is not UTF-8".into()))?;
                text.parse::<serde_json::Number>()
                    .map(Value::Number)
                    .map_err(|_| ProtocolError::Parse(format!("bad numeric payload: {text}")))
            }
            Flag::Json => serde_json::from_slice(raw)
                .map(Value::Structured)
                .map_err(|e| ProtocolError::Parse(format!("bad json payload: {e}"))),
            Flag::String => String::from_utf8(raw.to_vec())
                .map(Value::Text)
                .map_err(|_| ProtocolError::Parse("string payload is not UTF-8".into())),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Value::Number(number.into())
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::Number(number.into())
    }
}

impl From<u32> for Value {
    fn from(number: u32) -> Self {
        Value::Number(number.into())
    }
}

impl From<u64> for Value {
    fn from(number: u64) -> Self {
        Value::Number(number.into())
    }
}

impl TryFrom<f64> for Value {
    type Error = ValueError;

    /// Non-finite floats have no decimal representation on the wire.
    fn try_from(number: f64) -> Result<Self, Self::Error> {
        serde_json::Number::from_f64(number)
            .map(Value::Number)
            .ok_or_else(|| ValueError::Type(format!("non-finite number: {number}")))
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Structured(json)
    }
}

/// Escape raw `\r` / `\n` bytes with a backslash prefix.
pub fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &byte in raw {
        if byte == b'\r' || byte == b'\n' {
            out.push(b'\\');
        }
        out.push(byte);
    }
    out
}

/// Inverse of [`escape`].
pub fn unescape(escaped: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut i = 0;
    while i < escaped.len() {
        if escaped[i] == b'\\' && matches!(escaped.get(i + 1), Some(&(b'\r' | b'\n'))) {
            out.push(escaped[i + 1]);
            i += 2;
        } else {
            out.push(escaped[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_unescape_roundtrip() {
        let raw = b"line one\r\nline two\nend\r";
        let escaped = escape(raw);
        assert!(!escaped.windows(2).any(|w| w == b"\r\n"));
        assert_eq!(unescape(&escaped), raw);
    }

    #[test]
    fn test_escape_preserves_backslashes() {
        // a literal backslash before a CR must survive the round trip
        let raw = b"tail\\\rmore";
        assert_eq!(unescape(&escape(raw)), raw);
        let raw = b"just a backslash \\";
        assert_eq!(unescape(&escape(raw)), raw);
    }

    #[test]
    fn test_encode_string() {
        let (flag, payload) = Value::from("hello").encode().unwrap();
        assert_eq!(flag, Flag::String);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn test_encode_string_with_line_breaks() {
        let (flag, payload) = Value::from("a\r\nb").encode().unwrap();
        assert_eq!(flag, Flag::String);
        assert_eq!(payload, b"a\\\r\\\nb");
    }

    #[test]
    fn test_encode_number() {
        let (flag, payload) = Value::from(42u64).encode().unwrap();
        assert_eq!(flag, Flag::Numeric);
        assert_eq!(payload, b"42");
    }

    #[test]
    fn test_encode_bytes() {
        let (flag, payload) = Value::from(vec![0u8, 13, 10, 255]).encode().unwrap();
        assert_eq!(flag, Flag::Binary);
        assert_eq!(payload, &[0, b'\\', 13, b'\\', 10, 255]);
    }

    #[test]
    fn test_encode_structured() {
        let value = Value::structured(&serde_json::json!({"a": [1, 2]})).unwrap();
        let (flag, payload) = value.encode().unwrap();
        assert_eq!(flag, Flag::Json);
        assert_eq!(payload, br#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_encode_empty_rejected() {
        assert_eq!(Value::from("").encode(), Err(ValueError::Length));
    }

    #[test]
    fn test_encode_oversized_rejected() {
        let value = Value::Bytes(vec![b'x'; MAX_VALUE_SIZE + 1]);
        assert_eq!(value.encode(), Err(ValueError::Length));
        // escaping counts against the limit too
        let value = Value::Bytes(vec![b'\n'; MAX_VALUE_SIZE / 2 + 1]);
        assert_eq!(value.encode(), Err(ValueError::Length));
    }

    #[test]
    fn test_encode_at_limit() {
        let value = Value::Bytes(vec![b'x'; MAX_VALUE_SIZE]);
        assert!(value.encode().is_ok());
    }

    #[test]
    fn test_decode_roundtrip() {
        for value in [
            Value::from("text with\r\nbreaks"),
            Value::from(-7i64),
            Value::from(vec![1u8, 2, 3, 13, 10]),
            Value::Structured(serde_json::json!({"k": "v"})),
        ] {
            let (flag, escaped) = value.encode().unwrap();
            let decoded = Value::decode(flag, &unescape(&escaped)).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_decode_bad_payloads() {
        assert!(Value::decode(Flag::Numeric, b"not-a-number").is_err());
        assert!(Value::decode(Flag::Json, b"{broken").is_err());
        assert!(Value::decode(Flag::String, &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_flag_bits() {
        assert_eq!(Flag::from_bits(0), Some(Flag::String));
        assert_eq!(Flag::from_bits(2), Some(Flag::Json));
        assert_eq!(Flag::from_bits(4), Some(Flag::Binary));
        assert_eq!(Flag::from_bits(8), Some(Flag::Numeric));
        assert_eq!(Flag::from_bits(3), None);
        assert_eq!(Flag::Numeric.bits(), 8);
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(Value::try_from(f64::NAN).is_err());
        assert!(Value::try_from(f64::INFINITY).is_err());
        assert!(Value::try_from(1.5f64).is_ok());
    }
}
