//! Canonical JSON hashing
//!
//! Provides [`ContentHash`], a strongly-typed SHA-256 digest computed over
//! the canonical JSON encoding of a value. Canonical means object keys
//! sorted recursively, no insignificant whitespace, UTF-8 output.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Prefix carried by the string form of every [`ContentHash`].
pub const HASH_PREFIX: &str = "sha256:";

/// A 32-byte content hash (SHA-256)
///
/// Displayed as `sha256:<64 lowercase hex>`. Immutable and `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// SHA-256 of arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Hash the canonical encoding of `value`, dropping `exclude_keys`
    /// from the top-level object first.
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn of_json(value: &Value, exclude_keys: &[&str]) -> Result<Self, HashError> {
        let bytes = to_canonical_bytes(value, exclude_keys)?;
        Ok(Self::compute(&bytes))
    }

    /// Hash any serializable value through its canonical JSON form
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn of_serializable<T>(value: &T, exclude_keys: &[&str]) -> Result<Self, HashError>
    where
        T: serde::Serialize,
    {
        let value = serde_json::to_value(value)?;
        Self::of_json(&value, exclude_keys)
    }

    /// Bare lowercase hex digest, without the `sha256:` prefix
    #[inline]
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{HASH_PREFIX}{}", hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    /// Accepts both `sha256:<hex>` and bare hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digest = s.strip_prefix(HASH_PREFIX).unwrap_or(s);
        let bytes = hex::decode(digest)?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Rebuild `value` with every object's keys in sorted order.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical UTF-8 bytes of `value` with `exclude_keys` removed from the
/// top-level object.
///
/// # Errors
/// Returns error if serialization fails
pub fn to_canonical_bytes(value: &Value, exclude_keys: &[&str]) -> Result<Vec<u8>, HashError> {
    let canonical = match value {
        Value::Object(map) if !exclude_keys.is_empty() => {
            let filtered: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !exclude_keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            canonicalize(&Value::Object(filtered))
        }
        other => canonicalize(other),
    };
    Ok(serde_json::to_vec(&canonical)?)
}

/// Hex digest of the canonical encoding, the plain `hash(value, exclude)`
/// operation used by stores that want a bare digest.
///
/// # Errors
/// Returns error if serialization fails
pub fn hash_hex(value: &Value, exclude_keys: &[&str]) -> Result<String, HashError> {
    Ok(ContentHash::of_json(value, exclude_keys)?.hex())
}

/// Errors that can occur when working with content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_sort_keys_and_strip_whitespace() {
        let value = json!({"b": 1, "a": {"d": [3, 2], "c": null}});
        let bytes = to_canonical_bytes(&value, &[]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"c":null,"d":[3,2]},"b":1}"#
        );
    }

    #[test]
    fn canonical_bytes_keep_utf8_unescaped() {
        let value = json!({"summary": "café ✓"});
        let bytes = to_canonical_bytes(&value, &[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"summary":"café ✓"}"#);
    }

    #[test]
    fn exclude_keys_only_touch_top_level() {
        let with_hash = json!({"a": 1, "content_hash": "x", "inner": {"content_hash": "y"}});
        let bytes = to_canonical_bytes(&with_hash, &["content_hash"]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":1,"inner":{"content_hash":"y"}}"#
        );
    }

    #[test]
    fn known_sha256_vector() {
        // sha256("{}")
        let hash = ContentHash::of_json(&json!({}), &[]).unwrap();
        assert_eq!(
            hash.hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn display_carries_prefix_and_parses_back() {
        let hash = ContentHash::compute(b"test");
        let s = hash.to_string();
        assert!(s.starts_with("sha256:"));
        assert_eq!(s.len(), 7 + 64);
        let parsed: ContentHash = s.parse().unwrap();
        assert_eq!(parsed, hash);
        let bare: ContentHash = hash.hex().parse().unwrap();
        assert_eq!(bare, hash);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let result = ContentHash::from_slice(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(HashError::InvalidLength { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn serde_uses_prefixed_string() {
        let hash = ContentHash::compute(b"test");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        let decoded: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, hash);
    }

    #[test]
    fn hash_hex_is_bare_digest() {
        let value = json!({"k": "v"});
        let hex = hash_hex(&value, &[]).unwrap();
        assert_eq!(hex.len(), 64);
        assert!(!hex.starts_with("sha256:"));
    }
}
