//! Mapping between resource identity and object keys.
//!
//! ```text
//! <root>/CONFIG
//! <root>/states/<hash[0]:02x>/<hash:hex>
//! <root>/packfiles/<hash[0]:02x>/<hash:hex>
//! <root>/locks/<hash[0]:02x>/<hash:hex>
//! ```
//!
//! Existing repositories depend on this layout byte for byte.

use gcs_types::{ContentHash, ResourceKind};

use crate::error::{StoreError, StoreResult};

/// Name of the configuration object under the root.
pub const CONFIG_NAME: &str = "CONFIG";

/// Length of the `/<xx>/` shard segment that follows a shard prefix.
const SHARD_SEGMENT_LEN: usize = 4;

/// Pure key computation for one repository root. No I/O.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyLayout {
    root: String,
}

impl KeyLayout {
    /// Layout rooted at `root` (leading and trailing `/` are ignored).
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn join(&self, rel: &str) -> String {
        if self.root.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{}", self.root, rel)
        }
    }

    /// Key of the repository configuration blob.
    pub fn config_key(&self) -> String {
        self.join(CONFIG_NAME)
    }

    /// `<root>/<prefix>`: the listing prefix for one resource kind.
    pub fn shard_prefix(&self, kind: ResourceKind) -> String {
        self.join(kind.prefix())
    }

    /// `<root>/<prefix>/<xx>/<hash>` for one resource.
    pub fn key_for(&self, kind: ResourceKind, hash: &ContentHash) -> String {
        format!(
            "{}/{:02x}/{}",
            self.shard_prefix(kind),
            hash.shard_byte(),
            hash.to_hex()
        )
    }

    /// Recover the hash from a key listed under `shard_prefix`.
    ///
    /// Returns `Ok(None)` for keys too short to carry a hash (the shard
    /// prefix itself or a `<prefix>/<xx>/` directory marker). Any other key
    /// must decode to exactly one 32-byte hash whose first byte matches its
    /// shard.
    pub fn parse_hash(key: &str, shard_prefix: &str) -> StoreResult<Option<ContentHash>> {
        let offset = shard_prefix.len() + SHARD_SEGMENT_LEN;
        if key.len() <= offset {
            return Ok(None);
        }
        let invalid = |reason: &str| StoreError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if !key.starts_with(shard_prefix) {
            return Err(invalid("outside shard prefix"));
        }
        let (segment, suffix) = match (key.get(shard_prefix.len()..offset), key.get(offset..)) {
            (Some(segment), Some(suffix)) => (segment, suffix),
            _ => return Err(invalid("malformed shard segment")),
        };

        let bytes = hex::decode(suffix).map_err(|e| StoreError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let hash = ContentHash::try_from(bytes.as_slice())
            .map_err(|e| invalid(&e.to_string()))?;

        if segment != format!("/{:02x}/", hash.shard_byte()) {
            return Err(invalid("shard does not match hash"));
        }
        Ok(Some(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hash_with_first(first: u8, fill: u8) -> ContentHash {
        let mut raw = [fill; 32];
        raw[0] = first;
        ContentHash::from_hash(raw)
    }

    #[test]
    fn key_format_is_bit_exact() {
        let layout = KeyLayout::new("backups/repo");
        let hash = hash_with_first(0x0a, 0xff);
        assert_eq!(
            layout.key_for(ResourceKind::State, &hash),
            format!("backups/repo/states/0a/0a{}", "ff".repeat(31))
        );
        assert_eq!(layout.config_key(), "backups/repo/CONFIG");
        assert_eq!(layout.shard_prefix(ResourceKind::Lock), "backups/repo/locks");
    }

    #[test]
    fn empty_root_has_no_leading_separator() {
        let layout = KeyLayout::new("/");
        let hash = hash_with_first(0x00, 0x11);
        assert_eq!(layout.config_key(), "CONFIG");
        assert!(layout
            .key_for(ResourceKind::Packfile, &hash)
            .starts_with("packfiles/00/0011"));
    }

    #[test]
    fn shared_shard_keys_differ_only_after_shard() {
        let layout = KeyLayout::new("r");
        let a = layout.key_for(ResourceKind::Packfile, &hash_with_first(0x7f, 0x01));
        let b = layout.key_for(ResourceKind::Packfile, &hash_with_first(0x7f, 0x02));
        assert_ne!(a, b);
        let shard = "r/packfiles/7f/";
        assert!(a.starts_with(shard) && b.starts_with(shard));
        assert_ne!(a[shard.len()..], b[shard.len()..]);
    }

    #[test]
    fn markers_are_skipped() {
        let prefix = "r/states";
        assert_eq!(KeyLayout::parse_hash("r/states", prefix).unwrap(), None);
        assert_eq!(KeyLayout::parse_hash("r/states/", prefix).unwrap(), None);
        assert_eq!(KeyLayout::parse_hash("r/states/ab/", prefix).unwrap(), None);
    }

    #[test]
    fn bad_hex_is_decode_error() {
        let key = format!("r/states/ab/{}", "zz".repeat(32));
        let err = KeyLayout::parse_hash(&key, "r/states").unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn wrong_length_is_invalid_key() {
        let err = KeyLayout::parse_hash("r/states/ab/abcd", "r/states").unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[test]
    fn mismatched_shard_is_invalid_key() {
        let key = format!("r/states/00/{}", "ab".repeat(32));
        let err = KeyLayout::parse_hash(&key, "r/states").unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    proptest! {
        #[test]
        fn parse_inverts_key_for(raw in any::<[u8; 32]>(), root in "[a-z]{0,8}(/[a-z]{1,8}){0,2}", kind_idx in 0usize..3) {
            let layout = KeyLayout::new(root);
            let kind = ResourceKind::ALL[kind_idx];
            let hash = ContentHash::from_hash(raw);
            let key = layout.key_for(kind, &hash);
            let parsed = KeyLayout::parse_hash(&key, &layout.shard_prefix(kind)).unwrap();
            prop_assert_eq!(parsed, Some(hash));
        }

        #[test]
        fn distinct_hashes_give_distinct_keys(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
            prop_assume!(a != b);
            let layout = KeyLayout::new("root");
            let ka = layout.key_for(ResourceKind::State, &ContentHash::from_hash(a));
            let kb = layout.key_for(ResourceKind::State, &ContentHash::from_hash(b));
            prop_assert_ne!(ka, kb);
        }
    }
}
