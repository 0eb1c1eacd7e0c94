use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use gcs_client::{
    ByteRange, ClientError, Connection, Connector, ObjectBody, ObjectStoreClient, StoreConfig,
};
use gcs_types::{ContentHash, ResourceKind};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::layout::KeyLayout;
use crate::traits::{Mode, RepositoryStore};

/// Repository store over a flat, prefix-listable bucket.
///
/// Resources live under the sharded key layout of [`KeyLayout`]. The
/// connection is established on first use and shared by every later
/// operation.
pub struct ContentAddressedStore {
    layout: KeyLayout,
    connection: Connection,
    mode: Mode,
}

impl ContentAddressedStore {
    pub fn new(config: StoreConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            layout: KeyLayout::new(config.path.clone()),
            connection: Connection::new(config, connector),
            mode: Mode::ReadWrite,
        }
    }

    /// Restrict the store to `mode`. A read-only store rejects `create`,
    /// `put` and `delete` without touching the bucket.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Build a store from user-supplied parameters. See [`StoreConfig::from_params`].
    pub fn from_params(
        scheme: &str,
        params: &HashMap<String, String>,
        connector: Arc<dyn Connector>,
    ) -> StoreResult<Self> {
        let config = StoreConfig::from_params(scheme, params)?;
        Ok(Self::new(config, connector))
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn config(&self) -> &StoreConfig {
        self.connection.config()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    async fn client(&self) -> StoreResult<Arc<dyn ObjectStoreClient>> {
        Ok(self.connection.client().await?)
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.mode.can_write() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly(self.location()))
        }
    }
}

#[async_trait]
impl RepositoryStore for ContentAddressedStore {
    async fn create(&self, config: &[u8]) -> StoreResult<()> {
        self.check_writable()?;
        let client = self.client().await?;
        let key = self.layout.config_key();

        if client.exists(&key).await? {
            return Err(StoreError::AlreadyExists(self.location()));
        }
        match client.put_if_absent(&key, Bytes::copy_from_slice(config)).await {
            Ok(_) => {
                info!(location = %self.location(), "repository created");
                Ok(())
            }
            // Lost the race against a concurrent create.
            Err(ClientError::PreconditionFailed(_)) => {
                Err(StoreError::AlreadyExists(self.location()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self) -> StoreResult<Bytes> {
        let client = self.client().await?;
        let key = self.layout.config_key();
        let mut body = client.get(&key, None).await?;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await?;
        debug!(key = %key, size = buf.len(), "read repository config");
        Ok(Bytes::from(buf))
    }

    async fn list(&self, kind: ResourceKind) -> StoreResult<Vec<ContentHash>> {
        let client = self.client().await?;
        let prefix = self.layout.shard_prefix(kind);
        let objects = client.list_all(&format!("{prefix}/")).await?;

        // A single malformed key fails the whole listing.
        let mut hashes = Vec::with_capacity(objects.len());
        for object in &objects {
            if let Some(hash) = KeyLayout::parse_hash(&object.key, &prefix)? {
                hashes.push(hash);
            }
        }
        debug!(kind = %kind, count = hashes.len(), "listed resources");
        Ok(hashes)
    }

    async fn put(
        &self,
        kind: ResourceKind,
        hash: &ContentHash,
        reader: ObjectBody,
    ) -> StoreResult<u64> {
        self.check_writable()?;
        let client = self.client().await?;
        let key = self.layout.key_for(kind, hash);
        let written = client.put_stream(&key, reader).await?;
        debug!(key = %key, size = written, "stored resource");
        Ok(written)
    }

    async fn get(
        &self,
        kind: ResourceKind,
        hash: &ContentHash,
        range: Option<ByteRange>,
    ) -> StoreResult<ObjectBody> {
        let client = self.client().await?;
        let key = self.layout.key_for(kind, hash);
        debug!(key = %key, ?range, "opening resource");
        Ok(client.get(&key, range).await?)
    }

    async fn delete(&self, kind: ResourceKind, hash: &ContentHash) -> StoreResult<()> {
        self.check_writable()?;
        let client = self.client().await?;
        let key = self.layout.key_for(kind, hash);
        client.delete(&key).await?;
        debug!(key = %key, "deleted resource");
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let client = self.client().await?;
        Ok(client.ping().await?)
    }

    fn location(&self) -> String {
        self.config().location()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn size(&self) -> Option<u64> {
        None
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(self.connection.close().await?)
    }
}

impl std::fmt::Debug for ContentAddressedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentAddressedStore")
            .field("location", &self.location())
            .field("mode", &self.mode)
            .field("connected", &self.is_connected())
            .finish()
    }
}
