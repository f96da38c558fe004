use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SatchelError, SatchelResult};

/// A single metadata value.
///
/// The enum is untagged so the MessagePack wire form is the plain value,
/// readable by any off-the-shelf msgpack implementation. Variant order
/// matters for decoding: integers must be tried before floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

/// The metadata map attached to every queued message. Always contains a
/// numeric `sent` entry (epoch seconds) injected at push time.
pub type Metadata = BTreeMap<String, FieldValue>;

/// Encodes a metadata map to MessagePack.
pub fn encode_metadata(metadata: &Metadata) -> SatchelResult<Vec<u8>> {
    Ok(rmp_serde::to_vec(metadata)?)
}

/// Decodes a MessagePack blob back into a metadata map.
pub fn decode_metadata(bytes: &[u8]) -> SatchelResult<Metadata> {
    Ok(rmp_serde::from_slice(bytes)?)
}

const B36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Encodes a non-negative integer in base 36 using digits `0-9a-z`.
pub fn b36_encode(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    // 36^13 > u64::MAX, so 13 digits always suffice.
    let mut digits = [0u8; 13];
    let mut i = digits.len();
    while n > 0 {
        i -= 1;
        digits[i] = B36_DIGITS[(n % 36) as usize];
        n /= 36;
    }
    digits[i..].iter().map(|&d| d as char).collect()
}

/// Decodes a base-36 string (case-insensitive). Inverse of [`b36_encode`].
pub fn b36_decode(s: &str) -> SatchelResult<u64> {
    if s.is_empty() {
        return Err(SatchelError::InvalidArgument(
            "empty base-36 string".to_string(),
        ));
    }
    let mut value: u64 = 0;
    for c in s.chars() {
        let digit = c.to_digit(36).ok_or_else(|| {
            SatchelError::InvalidArgument(format!("invalid base-36 character '{c}'"))
        })?;
        value = value
            .checked_mul(36)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| {
                SatchelError::InvalidArgument(format!("base-36 value '{s}' overflows u64"))
            })?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b36_encode_known_values() {
        assert_eq!(b36_encode(0), "0");
        assert_eq!(b36_encode(35), "z");
        assert_eq!(b36_encode(36), "10");
    }

    #[test]
    fn test_b36_decode_case_insensitive() {
        assert_eq!(b36_decode("Z").unwrap(), 35);
        assert_eq!(b36_decode("z").unwrap(), 35);
        assert_eq!(b36_decode("10").unwrap(), 36);
    }

    #[test]
    fn test_b36_decode_rejects_garbage() {
        assert!(b36_decode("").is_err());
        assert!(b36_decode("foo!").is_err());
        assert!(b36_decode("zzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut nested = Metadata::new();
        nested.insert("count".to_string(), FieldValue::Int(7));

        let mut metadata = Metadata::new();
        metadata.insert("sent".to_string(), FieldValue::Int(1_700_000_000));
        metadata.insert("ratio".to_string(), FieldValue::Float(0.5));
        metadata.insert("source".to_string(), FieldValue::Str("api".to_string()));
        metadata.insert("flags".to_string(), FieldValue::Bool(true));
        metadata.insert(
            "tags".to_string(),
            FieldValue::List(vec![
                FieldValue::Str("a".to_string()),
                FieldValue::Str("b".to_string()),
            ]),
        );
        metadata.insert("extra".to_string(), FieldValue::Map(nested));

        let encoded = encode_metadata(&metadata).unwrap();
        let decoded = decode_metadata(&encoded).unwrap();
        assert_eq!(decoded, metadata);
    }
}
