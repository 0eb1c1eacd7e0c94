use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{ClientError, ClientResult};
use crate::traits::ObjectStoreClient;

/// Builds a client for a parsed configuration.
///
/// This is where a real cloud client applies credentials, endpoint and
/// authentication options.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &StoreConfig) -> ClientResult<Arc<dyn ObjectStoreClient>>;
}

/// Connector that hands out one pre-built client.
///
/// Used to embed the adapter over an existing client, and by tests over
/// [`InMemoryObjectClient`](crate::InMemoryObjectClient).
pub struct SharedClientConnector {
    client: Arc<dyn ObjectStoreClient>,
    connects: AtomicUsize,
}

impl SharedClientConnector {
    pub fn new(client: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            client,
            connects: AtomicUsize::new(0),
        }
    }

    /// How many times `connect` was called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for SharedClientConnector {
    async fn connect(&self, _config: &StoreConfig) -> ClientResult<Arc<dyn ObjectStoreClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.client))
    }
}

/// Lazily established, at-most-once client handle.
///
/// The first caller of [`client`](Self::client) connects; concurrent callers
/// wait for that attempt and then share the handle. A failed attempt is not
/// cached, so the next call tries again. [`close`](Self::close) is terminal:
/// the underlying client is closed exactly once, even when a connect was
/// still in flight, and every later call fails with [`ClientError::Closed`].
pub struct Connection {
    config: StoreConfig,
    connector: Arc<dyn Connector>,
    client: OnceCell<Arc<dyn ObjectStoreClient>>,
    closed: AtomicBool,
    client_closed: AtomicBool,
}

impl Connection {
    pub fn new(config: StoreConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            client: OnceCell::new(),
            closed: AtomicBool::new(false),
            client_closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The client, connecting on first use.
    pub async fn client(&self) -> ClientResult<Arc<dyn ObjectStoreClient>> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let client = self
            .client
            .get_or_try_init(|| async {
                let client = self.connector.connect(&self.config).await?;
                info!(location = %self.config.location(), "connected to object store");
                Ok::<_, ClientError>(client)
            })
            .await?;

        // `close` may have run while the connect was in flight and found
        // nothing to close.
        if self.is_closed() {
            self.close_client(client).await?;
            return Err(ClientError::Closed);
        }
        Ok(Arc::clone(client))
    }

    /// Whether a client has been established.
    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the underlying client. Later calls are no-ops.
    pub async fn close(&self) -> ClientResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.client.get() {
            Some(client) => self.close_client(client).await,
            None => Ok(()),
        }
    }

    async fn close_client(&self, client: &Arc<dyn ObjectStoreClient>) -> ClientResult<()> {
        if self.client_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(location = %self.config.location(), "closing object store connection");
        client.close().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("location", &self.config.location())
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::InMemoryObjectClient;

    struct FailingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for FailingConnector {
        async fn connect(&self, _config: &StoreConfig) -> ClientResult<Arc<dyn ObjectStoreClient>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Transport("no route to host".into()))
        }
    }

    /// Hands out a shared client after a delay.
    struct SlowConnector {
        client: Arc<InMemoryObjectClient>,
        delay: Duration,
    }

    #[async_trait]
    impl Connector for SlowConnector {
        async fn connect(&self, _config: &StoreConfig) -> ClientResult<Arc<dyn ObjectStoreClient>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.client.clone())
        }
    }

    fn setup() -> (Arc<InMemoryObjectClient>, Arc<SharedClientConnector>, Connection) {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        let connector = Arc::new(SharedClientConnector::new(client.clone()));
        let conn = Connection::new(StoreConfig::new("bucket", "root"), connector.clone());
        (client, connector, conn)
    }

    #[tokio::test]
    async fn connects_lazily_and_once() {
        let (_client, connector, conn) = setup();
        assert!(!conn.is_connected());
        assert_eq!(connector.connect_count(), 0);

        conn.client().await.unwrap();
        conn.client().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_use_connects_once() {
        let (_client, connector, conn) = setup();
        let conn = Arc::new(conn);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let conn = conn.clone();
            handles.push(tokio::spawn(async move { conn.client().await.map(|_| ()) }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn failed_connect_is_retried() {
        let connector = Arc::new(FailingConnector {
            attempts: AtomicUsize::new(0),
        });
        let conn = Connection::new(StoreConfig::new("b", ""), connector.clone());
        assert!(matches!(conn.client().await.err().unwrap(), ClientError::Transport(_)));
        assert!(conn.client().await.is_err());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn close_happens_once() {
        let (client, _connector, conn) = setup();
        conn.client().await.unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(client.close_count(), 1);
        assert!(matches!(conn.client().await.err().unwrap(), ClientError::Closed));
    }

    #[tokio::test]
    async fn close_without_connecting() {
        let (client, connector, conn) = setup();
        conn.close().await.unwrap();
        assert_eq!(client.close_count(), 0);
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn close_during_connect_closes_the_late_client() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        let connector = Arc::new(SlowConnector {
            client: client.clone(),
            delay: Duration::from_millis(50),
        });
        let conn = Arc::new(Connection::new(StoreConfig::new("bucket", ""), connector));

        let pending = tokio::spawn({
            let conn = conn.clone();
            async move { conn.client().await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        conn.close().await.unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(ClientError::Closed)));
        assert_eq!(client.close_count(), 1);
        assert!(client.is_closed());

        conn.close().await.unwrap();
        assert!(matches!(conn.client().await.err().unwrap(), ClientError::Closed));
        assert_eq!(client.close_count(), 1);
    }
}
