use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{ClientError, ClientResult};
use crate::traits::{ByteRange, ListPage, ObjectBody, ObjectInfo, ObjectStoreClient};

/// Default number of objects per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct MemoryObject {
    data: Bytes,
    updated: DateTime<Utc>,
    owner: String,
}

#[derive(Debug, Default)]
struct Faults {
    /// Listing pages served successfully before every later page fails.
    list_fail_after: Option<usize>,
    /// Keys whose writes fail.
    failing_writes: HashSet<String>,
    /// The bucket cannot be reached at all.
    unreachable: bool,
}

/// In-memory, `BTreeMap`-based object store client.
///
/// Intended for tests and embedding. Keys list in lexicographic order and
/// listings are paged like a real bucket. Failures can be injected per key
/// (writes), per page (listings) or globally (unreachable bucket).
pub struct InMemoryObjectClient {
    bucket: String,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    page_size: usize,
    faults: RwLock<Faults>,
    pages_served: AtomicUsize,
    closes: AtomicUsize,
    closed: AtomicBool,
}

impl InMemoryObjectClient {
    /// Create an empty bucket.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            faults: RwLock::new(Faults::default()),
            pages_served: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Use `page_size` objects per listing page (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store an object directly, bypassing fault injection.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.insert_with_meta(key, data, Utc::now(), "");
    }

    /// Store an object with explicit metadata.
    pub fn insert_with_meta(
        &self,
        key: impl Into<String>,
        data: impl Into<Bytes>,
        updated: DateTime<Utc>,
        owner: impl Into<String>,
    ) {
        let object = MemoryObject {
            data: data.into(),
            updated,
            owner: owner.into(),
        };
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.into(), object);
    }

    /// Contents of `key`, if present.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(key).map(|obj| obj.data.clone())
    }

    /// All keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Serve `pages` listing pages, then fail every later page.
    pub fn fail_listing_after(&self, pages: usize) {
        self.pages_served.store(0, Ordering::SeqCst);
        self.faults.write().expect("lock poisoned").list_fail_after = Some(pages);
    }

    /// Make every write to `key` fail with a transport error.
    pub fn fail_writes_to(&self, key: impl Into<String>) {
        self.faults
            .write()
            .expect("lock poisoned")
            .failing_writes
            .insert(key.into());
    }

    /// Simulate a bucket that cannot be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults.write().expect("lock poisoned").unreachable = unreachable;
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> ClientResult<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        if self.faults.read().expect("lock poisoned").unreachable {
            return Err(ClientError::Transport(format!(
                "bucket {} is unreachable",
                self.bucket
            )));
        }
        Ok(())
    }

    fn check_writable(&self, key: &str) -> ClientResult<()> {
        self.check_available()?;
        if self
            .faults
            .read()
            .expect("lock poisoned")
            .failing_writes
            .contains(key)
        {
            return Err(ClientError::Transport(format!("write to {key} failed")));
        }
        Ok(())
    }

    fn store(map: &mut BTreeMap<String, MemoryObject>, key: &str, data: Bytes) -> u64 {
        let size = data.len() as u64;
        map.insert(
            key.to_string(),
            MemoryObject {
                data,
                updated: Utc::now(),
                owner: String::new(),
            },
        );
        size
    }
}

impl Default for InMemoryObjectClient {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryObjectClient {
    async fn put(&self, key: &str, data: Bytes) -> ClientResult<u64> {
        self.check_writable(key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(Self::store(&mut map, key, data))
    }

    async fn put_if_absent(&self, key: &str, data: Bytes) -> ClientResult<u64> {
        self.check_writable(key)?;
        // Check and insert under a single write lock.
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(key) {
            return Err(ClientError::PreconditionFailed(key.to_string()));
        }
        Ok(Self::store(&mut map, key, data))
    }

    async fn put_stream(&self, key: &str, mut body: ObjectBody) -> ClientResult<u64> {
        self.check_writable(key)?;
        // Staged aside and published only once the body is exhausted.
        let mut staged = Vec::new();
        tokio::io::copy(&mut body, &mut staged).await?;
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(Self::store(&mut map, key, Bytes::from(staged)))
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> ClientResult<ObjectBody> {
        self.check_available()?;
        let data = self
            .object(key)
            .ok_or_else(|| ClientError::NotFound(key.to_string()))?;
        let body = match range {
            None => data,
            Some(range) => {
                let size = data.len() as u64;
                if range.offset > size {
                    return Err(ClientError::InvalidRange {
                        key: key.to_string(),
                        offset: range.offset,
                        size,
                    });
                }
                let end = range.end().min(size);
                data.slice(range.offset as usize..end as usize)
            }
        };
        Ok(Box::new(Cursor::new(body)))
    }

    async fn delete(&self, key: &str) -> ClientResult<()> {
        self.check_available()?;
        let mut map = self.objects.write().expect("lock poisoned");
        match map.remove(key) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound(key.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> ClientResult<bool> {
        self.check_available()?;
        Ok(self.objects.read().expect("lock poisoned").contains_key(key))
    }

    async fn list_page(&self, prefix: &str, page_token: Option<&str>) -> ClientResult<ListPage> {
        self.check_available()?;
        if let Some(limit) = self.faults.read().expect("lock poisoned").list_fail_after {
            if self.pages_served.load(Ordering::SeqCst) >= limit {
                return Err(ClientError::Transport(format!(
                    "listing {prefix} failed after {limit} pages"
                )));
            }
        }

        let map = self.objects.read().expect("lock poisoned");
        let start = match page_token {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let mut matching = map
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix));

        let objects: Vec<ObjectInfo> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.data.len() as u64,
                updated: obj.updated,
                owner: obj.owner.clone(),
            })
            .collect();
        let next_page_token = match matching.next() {
            Some(_) => objects.last().map(|info| info.key.clone()),
            None => None,
        };

        self.pages_served.fetch_add(1, Ordering::SeqCst);
        Ok(ListPage {
            objects,
            next_page_token,
        })
    }

    async fn ping(&self) -> ClientResult<()> {
        self.check_available()
    }

    async fn close(&self) -> ClientResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryObjectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectClient")
            .field("bucket", &self.bucket)
            .field("object_count", &self.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}
