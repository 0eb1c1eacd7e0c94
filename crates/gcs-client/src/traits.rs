use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::ClientResult;

/// Readable body of an object, as returned by [`ObjectStoreClient::get`].
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// Offset/length window of a range read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

/// Metadata of one listed object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub updated: DateTime<Utc>,
    pub owner: String,
}

/// One page of a prefix listing.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Token to pass back for the next page; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Capability the adapter needs from a flat, prefix-listable object store.
///
/// Implementations must be safe for concurrent use once constructed.
/// Writes are all-or-nothing: a failed `put` leaves no visible object.
/// No method retries internally on behalf of the adapter; retry policy
/// belongs to the client or to the host engine.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Write `data` at `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> ClientResult<u64>;

    /// Write `data` at `key` only if no object exists there.
    ///
    /// Fails with [`ClientError::PreconditionFailed`](crate::ClientError::PreconditionFailed)
    /// when the key is taken, even if it was created concurrently.
    async fn put_if_absent(&self, key: &str, data: Bytes) -> ClientResult<u64>;

    /// Stream `body` to `key`, replacing any existing object.
    ///
    /// The object becomes visible only once the body has been read to the
    /// end. A read or write failure part way leaves no object behind.
    async fn put_stream(&self, key: &str, body: ObjectBody) -> ClientResult<u64>;

    /// Open `key` for reading, optionally restricted to a byte window.
    async fn get(&self, key: &str, range: Option<ByteRange>) -> ClientResult<ObjectBody>;

    async fn delete(&self, key: &str) -> ClientResult<()>;

    async fn exists(&self, key: &str) -> ClientResult<bool>;

    /// Fetch one page of objects whose keys start with `prefix`.
    async fn list_page(&self, prefix: &str, page_token: Option<&str>) -> ClientResult<ListPage>;

    /// Verify that the bucket is reachable and exists.
    async fn ping(&self) -> ClientResult<()>;

    /// Release the client. Terminal.
    async fn close(&self) -> ClientResult<()>;

    /// Collect every page of a listing.
    async fn list_all(&self, prefix: &str) -> ClientResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(prefix, token.as_deref()).await?;
            objects.extend(page.objects);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => return Ok(objects),
            }
        }
    }
}
