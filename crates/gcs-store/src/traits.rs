use async_trait::async_trait;
use bytes::Bytes;
use gcs_client::{ByteRange, ObjectBody};
use gcs_types::{ContentHash, ResourceKind};

use crate::error::StoreResult;

/// Access mode a repository store supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

impl Mode {
    pub fn can_write(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Repository storage as seen by the snapshot engine.
///
/// All implementations must satisfy these invariants:
/// - Resources are immutable once written and named by their content hash.
/// - `put`, `delete` are idempotent from the caller's perspective when
///   retried with the same arguments. `create` is not: it succeeds once.
/// - Every error is returned to the caller, never logged and dropped.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Initialize the repository with `config`.
    ///
    /// Fails with `AlreadyExists` if a configuration is present, including
    /// one written concurrently by another process.
    async fn create(&self, config: &[u8]) -> StoreResult<()>;

    /// Read the repository configuration.
    async fn open(&self) -> StoreResult<Bytes>;

    /// Hashes of every stored resource of `kind`, in no particular order.
    async fn list(&self, kind: ResourceKind) -> StoreResult<Vec<ContentHash>>;

    /// Store the contents of `reader` as resource `hash`. Returns bytes written.
    async fn put(&self, kind: ResourceKind, hash: &ContentHash, reader: ObjectBody)
        -> StoreResult<u64>;

    /// Open resource `hash`, optionally limited to a byte window.
    async fn get(
        &self,
        kind: ResourceKind,
        hash: &ContentHash,
        range: Option<ByteRange>,
    ) -> StoreResult<ObjectBody>;

    async fn delete(&self, kind: ResourceKind, hash: &ContentHash) -> StoreResult<()>;

    /// Check that the backing bucket is reachable, independent of the
    /// repository configuration.
    async fn ping(&self) -> StoreResult<()>;

    /// Logical address, `scheme://bucket/path`.
    fn location(&self) -> String;

    fn mode(&self) -> Mode;

    /// Total repository size in bytes, when cheaply known.
    fn size(&self) -> Option<u64>;

    /// Release the connection. Terminal.
    async fn close(&self) -> StoreResult<()>;
}
