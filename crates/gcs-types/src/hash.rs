use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Fixed 32-byte identifier (MAC) of a stored resource.
///
/// The hash is assigned by the snapshot engine and treated as opaque here:
/// the adapter never recomputes it from content. It only determines where
/// the resource lives in the bucket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Byte length of every content hash.
    pub const LEN: usize = 32;

    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// BLAKE3 digest of `data`. Handy for callers that have no MAC of their own.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First byte of the hash; selects the shard directory.
    pub fn shard_byte(&self) -> u8 {
        self.0[0]
    }

    /// Lowercase hex representation (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for ContentHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<ContentHash> for [u8; 32] {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl TryFrom<&[u8]> for ContentHash {
    type Error = TypeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(ContentHash::digest(b"hello"), ContentHash::digest(b"hello"));
        assert_ne!(ContentHash::digest(b"hello"), ContentHash::digest(b"world"));
    }

    #[test]
    fn hex_roundtrip() {
        let hash = ContentHash::digest(b"test");
        let parsed = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn from_hex_rejects_bad_digits() {
        let err = ContentHash::from_hex("zz").unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn from_hex_rejects_short_input() {
        let err = ContentHash::from_hex("abcd").unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 32, actual: 2 });
    }

    #[test]
    fn shard_byte_is_first_byte() {
        let mut raw = [0u8; 32];
        raw[0] = 0xab;
        raw[31] = 0x01;
        assert_eq!(ContentHash::from_hash(raw).shard_byte(), 0xab);
    }

    #[test]
    fn display_is_full_lowercase_hex() {
        let hash = ContentHash::from_hash([0xAB; 32]);
        let display = format!("{hash}");
        assert_eq!(display.len(), 64);
        assert_eq!(display, "ab".repeat(32));
    }

    #[test]
    fn debug_uses_short_hex() {
        let hash = ContentHash::from_hash([0x01; 32]);
        assert_eq!(format!("{hash:?}"), "ContentHash(01010101)");
    }

    #[test]
    fn serde_roundtrip() {
        let hash = ContentHash::digest(b"serde test");
        let json = serde_json::to_string(&hash).unwrap();
        let parsed: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, parsed);
    }

    mod props {
        use crate::ContentHash;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn hex_parse_inverts_to_hex(raw in any::<[u8; 32]>()) {
                let hash = ContentHash::from_hash(raw);
                prop_assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);
                prop_assert!(hash.to_hex().starts_with(&hash.short_hex()));
                prop_assert_eq!(hash.shard_byte(), raw[0]);
            }
        }
    }
}
