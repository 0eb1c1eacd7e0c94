use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gcs_client::{Connection, Connector, ObjectStoreClient, StoreConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ImportError, ImportResult};
use crate::record::{ContentHandle, FileRecord, ScanRecord};
use crate::synth::TreeSynthesizer;

/// Default capacity of the scan channel.
pub const DEFAULT_SCAN_BUFFER: usize = 1000;

/// Tuning for [`Importer`].
#[derive(Clone, Debug)]
pub struct ImporterOptions {
    /// Scan records buffered ahead of the consumer.
    pub buffer: usize,
}

impl Default for ImporterOptions {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_SCAN_BUFFER,
        }
    }
}

/// Presents a bucket prefix as a file tree.
///
/// Each [`scan`](Self::scan) walks the listing once in a background task
/// and streams directory and file records. Directories are synthesized,
/// since the bucket has none.
pub struct Importer {
    connection: Arc<Connection>,
    options: ImporterOptions,
    scans: Mutex<Vec<JoinHandle<()>>>,
}

impl Importer {
    pub fn new(config: StoreConfig, connector: Arc<dyn Connector>, options: ImporterOptions) -> Self {
        Self {
            connection: Arc::new(Connection::new(config, connector)),
            options,
            scans: Mutex::new(Vec::new()),
        }
    }

    /// Build an importer from user-supplied parameters.
    pub fn from_params(
        scheme: &str,
        params: &HashMap<String, String>,
        connector: Arc<dyn Connector>,
        options: ImporterOptions,
    ) -> ImportResult<Self> {
        let config = StoreConfig::from_params(scheme, params)?;
        Ok(Self::new(config, connector, options))
    }

    fn config(&self) -> &StoreConfig {
        self.connection.config()
    }

    /// Logical address of the scanned prefix.
    pub fn location(&self) -> String {
        self.config().location()
    }

    /// The bucket name.
    pub fn origin(&self) -> &str {
        &self.config().bucket
    }

    pub fn kind(&self) -> &str {
        &self.config().scheme
    }

    /// The scan root as an absolute path.
    pub fn root(&self) -> String {
        self.config().root()
    }

    /// Start a scan and return its record stream.
    ///
    /// Connection failures are returned here; failures during the walk
    /// arrive as a final [`ScanRecord::Error`]. Dropping the receiver stops
    /// the walk.
    pub async fn scan(&self) -> ImportResult<mpsc::Receiver<ScanRecord>> {
        let client = self.connection.client().await?;
        let (tx, rx) = mpsc::channel(self.options.buffer.max(1));

        let walker = ScanWalker {
            client,
            root: self.root(),
            prefix: listing_prefix(&self.config().path),
        };
        let handle = tokio::spawn(walker.run(tx));
        let mut scans = self.scans.lock().expect("lock poisoned");
        scans.retain(|h| !h.is_finished());
        scans.push(handle);
        Ok(rx)
    }

    /// Stop running scans and close the connection.
    pub async fn close(&self) -> ImportResult<()> {
        for handle in self.scans.lock().expect("lock poisoned").drain(..) {
            handle.abort();
        }
        Ok(self.connection.close().await?)
    }
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("location", &self.location())
            .field("connection", &self.connection)
            .finish()
    }
}

/// `path/` for a non-empty prefix, so `dir1` does not match `dir10/...`.
fn listing_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    }
}

struct ScanWalker {
    client: Arc<dyn ObjectStoreClient>,
    root: String,
    prefix: String,
}

impl ScanWalker {
    async fn run(self, results: mpsc::Sender<ScanRecord>) {
        match self.walk(&results).await {
            Ok(files) => info!(root = %self.root, files, "scan complete"),
            Err(_) => debug!(root = %self.root, "scan consumer went away"),
        }
    }

    async fn walk(
        &self,
        results: &mpsc::Sender<ScanRecord>,
    ) -> Result<usize, mpsc::error::SendError<ScanRecord>> {
        let mut synth = TreeSynthesizer::new();
        for dir in synth.emit_root(&self.root) {
            results.send(ScanRecord::Entry(dir)).await?;
        }

        let mut files = 0;
        let mut token: Option<String> = None;
        loop {
            let page = match self.client.list_page(&self.prefix, token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(root = %self.root, error = %e, "listing failed, ending scan");
                    let record = ScanRecord::Error {
                        path: self.root.clone(),
                        error: ImportError::Client(e),
                    };
                    results.send(record).await?;
                    return Ok(files);
                }
            };

            for object in page.objects {
                if object.key.ends_with('/') {
                    debug!(key = %object.key, "skipping directory placeholder");
                    continue;
                }
                let path = format!("/{}", object.key);
                for dir in synth.ancestors_of(&path) {
                    results.send(ScanRecord::Entry(dir)).await?;
                }
                let content = ContentHandle::new(Arc::clone(&self.client), object.key.as_str());
                let record = FileRecord::file(path, &object, content);
                results.send(ScanRecord::Entry(record)).await?;
                files += 1;
            }

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => return Ok(files),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};
    use gcs_client::{ClientError, InMemoryObjectClient, SharedClientConnector};
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::record::EntryKind;

    fn importer(client: &Arc<InMemoryObjectClient>, path: &str) -> Importer {
        Importer::new(
            StoreConfig::new(client.bucket(), path),
            Arc::new(SharedClientConnector::new(client.clone())),
            ImporterOptions::default(),
        )
    }

    async fn collect(mut rx: mpsc::Receiver<ScanRecord>) -> Vec<ScanRecord> {
        let mut out = Vec::new();
        while let Some(record) = rx.recv().await {
            out.push(record);
        }
        out
    }

    fn entries(records: &[ScanRecord]) -> Vec<&FileRecord> {
        records.iter().filter_map(ScanRecord::entry).collect()
    }

    #[tokio::test]
    async fn scan_synthesizes_tree_under_prefix() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        client.insert("dir1/file1.txt", vec![1u8; 10]);
        client.insert("dir1/dir2/file2.txt", vec![2u8; 20]);
        client.insert("other/file3.txt", vec![3u8; 30]);

        let imp = importer(&client, "dir1");
        let records = collect(imp.scan().await.unwrap()).await;
        let entries = entries(&records);
        assert_eq!(entries.len(), records.len());

        let listed: Vec<(&str, EntryKind)> =
            entries.iter().map(|r| (r.path.as_str(), r.kind)).collect();
        assert_eq!(
            listed,
            [
                ("/", EntryKind::Directory),
                ("/dir1", EntryKind::Directory),
                ("/dir1/dir2", EntryKind::Directory),
                ("/dir1/dir2/file2.txt", EntryKind::Regular),
                ("/dir1/file1.txt", EntryKind::Regular),
            ]
        );
        assert_eq!(entries[3].size, 20);
        assert_eq!(entries[4].size, 10);
        assert_eq!(entries[4].name, "file1.txt");
    }

    #[tokio::test]
    async fn directories_never_repeat_across_pages() {
        let client = Arc::new(InMemoryObjectClient::new("bucket").with_page_size(2));
        for key in ["r/a/1", "r/a/2", "r/a/b/3", "r/c/4", "r/c/5", "r/6"] {
            client.insert(key, &b"x"[..]);
        }
        let records = collect(importer(&client, "r").scan().await.unwrap()).await;

        let mut dirs = HashSet::new();
        let mut seen = HashSet::new();
        for record in entries(&records) {
            if record.is_dir() {
                assert!(dirs.insert(record.path.clone()), "{} repeated", record.path);
            } else {
                let parent = crate::record::parent_dir(&record.path);
                assert!(dirs.contains(parent), "{} before its directory", record.path);
            }
            seen.insert(record.path.clone());
        }
        assert_eq!(seen.len(), entries(&records).len());
        assert_eq!(entries(&records).iter().filter(|r| !r.is_dir()).count(), 6);
    }

    #[tokio::test]
    async fn placeholders_are_not_files() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        client.insert("p/", &b""[..]);
        client.insert("p/folder/", &b""[..]);
        client.insert("p/folder/real.txt", &b"data"[..]);

        let records = collect(importer(&client, "p").scan().await.unwrap()).await;
        let files: Vec<_> = entries(&records)
            .into_iter()
            .filter(|r| !r.is_dir())
            .map(|r| r.path.clone())
            .collect();
        assert_eq!(files, ["/p/folder/real.txt"]);
        assert!(entries(&records).iter().any(|r| r.path == "/p/folder" && r.is_dir()));
    }

    #[tokio::test]
    async fn prefix_does_not_match_siblings() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        client.insert("dir1/a", &b"a"[..]);
        client.insert("dir10/b", &b"b"[..]);

        let records = collect(importer(&client, "dir1").scan().await.unwrap()).await;
        assert!(entries(&records).iter().all(|r| !r.path.starts_with("/dir10")));
    }

    #[tokio::test]
    async fn empty_path_scans_whole_bucket() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        client.insert("top.txt", &b"t"[..]);
        client.insert("nested/deep.txt", &b"d"[..]);

        let imp = importer(&client, "");
        assert_eq!(imp.root(), "/");
        let records = collect(imp.scan().await.unwrap()).await;
        let paths: Vec<_> = entries(&records).iter().map(|r| r.path.clone()).collect();
        assert_eq!(paths, ["/", "/nested", "/nested/deep.txt", "/top.txt"]);
    }

    #[tokio::test]
    async fn file_metadata_comes_from_listing() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        client.insert_with_meta("r/f", &b"abc"[..], when, "alice");

        let records = collect(importer(&client, "r").scan().await.unwrap()).await;
        let file = entries(&records).into_iter().find(|r| !r.is_dir()).unwrap();
        assert_eq!(file.mod_time, when);
        assert_eq!(file.owner, "alice");
        assert_eq!(file.size, 3);
        assert_eq!(file.mode, crate::record::FILE_MODE);
    }

    #[tokio::test]
    async fn content_is_read_on_demand() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        client.insert("r/f", &b"before"[..]);
        let records = collect(importer(&client, "r").scan().await.unwrap()).await;
        let file = entries(&records).into_iter().find(|r| !r.is_dir()).unwrap();
        let handle = file.content.clone().unwrap();
        assert_eq!(handle.key(), "r/f");

        // Bodies are not captured during the scan.
        client.insert("r/f", &b"rewritten"[..]);
        let mut buf = Vec::new();
        handle.open().await.unwrap().read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"rewritten");
    }

    #[tokio::test]
    async fn listing_error_terminates_stream() {
        let client = Arc::new(InMemoryObjectClient::new("bucket").with_page_size(1));
        client.insert("r/a", &b"a"[..]);
        client.insert("r/b", &b"b"[..]);
        client.insert("r/c", &b"c"[..]);
        client.fail_listing_after(1);

        let records = collect(importer(&client, "r").scan().await.unwrap()).await;
        let last = records.last().unwrap();
        assert!(matches!(
            last,
            ScanRecord::Error { path, error: ImportError::Client(ClientError::Transport(_)) }
                if path == "/r"
        ));
        let files = entries(&records).iter().filter(|r| !r.is_dir()).count();
        assert_eq!(files, 1);
        assert_eq!(
            records.iter().filter(|r| matches!(r, ScanRecord::Error { .. })).count(),
            1
        );
    }

    #[tokio::test]
    async fn connection_failure_is_returned_from_scan() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        let imp = importer(&client, "r");
        imp.close().await.unwrap();
        let err = imp.scan().await.unwrap_err();
        assert!(matches!(err, ImportError::Client(ClientError::Closed)));
    }

    #[tokio::test]
    async fn dropping_receiver_stops_scan() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        for i in 0..50 {
            client.insert(format!("r/{i:03}"), &b"x"[..]);
        }
        let imp = Importer::new(
            StoreConfig::new("bucket", "r"),
            Arc::new(SharedClientConnector::new(client.clone())),
            ImporterOptions { buffer: 1 },
        );
        let mut rx = imp.scan().await.unwrap();
        assert!(rx.recv().await.is_some());
        drop(rx);

        let handle = imp.scans.lock().unwrap().pop().unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn finished_scans_are_not_retained() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        client.insert("r/x", &b"x"[..]);
        let imp = importer(&client, "r");
        for _ in 0..5 {
            let records = collect(imp.scan().await.unwrap()).await;
            assert_eq!(records.len(), 3);
            while imp.scans.lock().unwrap().iter().any(|h| !h.is_finished()) {
                tokio::task::yield_now().await;
            }
        }
        assert_eq!(imp.scans.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_closes_once() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        client.insert("r/x", &b"x"[..]);
        let imp = importer(&client, "r");
        collect(imp.scan().await.unwrap()).await;
        imp.close().await.unwrap();
        imp.close().await.unwrap();
        assert_eq!(client.close_count(), 1);
    }

    #[test]
    fn metadata() {
        let client = Arc::new(InMemoryObjectClient::new("bucket"));
        let params: HashMap<String, String> =
            [("location".to_string(), "gcs://bucket/some/prefix/".to_string())].into();
        let imp = Importer::from_params(
            "gcs",
            &params,
            Arc::new(SharedClientConnector::new(client)),
            ImporterOptions::default(),
        )
        .unwrap();
        assert_eq!(imp.location(), "gcs://bucket/some/prefix");
        assert_eq!(imp.origin(), "bucket");
        assert_eq!(imp.kind(), "gcs");
        assert_eq!(imp.root(), "/some/prefix");
    }
}
