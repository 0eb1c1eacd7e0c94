use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::task::Poll;

use gcs_client::{Connection, Connector, ObjectBody, StoreConfig};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::error::ExportError;
use crate::record::EntryKind;

/// Default number of concurrent object writes.
pub const DEFAULT_EXPORT_CONCURRENCY: usize = 8;

/// Default capacity of the result channel.
pub const DEFAULT_RESULT_BUFFER: usize = 1000;

/// Tuning for [`Exporter`].
#[derive(Clone, Debug)]
pub struct ExporterOptions {
    /// Maximum writes in flight.
    pub concurrency: usize,
    /// Results buffered ahead of the consumer.
    pub buffer: usize,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_EXPORT_CONCURRENCY,
            buffer: DEFAULT_RESULT_BUFFER,
        }
    }
}

/// A file handed over by the snapshot engine for export.
pub struct ExportRecord {
    /// Path relative to the export root; leading `/` is ignored.
    pub pathname: String,
    pub kind: EntryKind,
    /// Extended-attribute record rather than file content.
    pub xattr: bool,
    /// Failure the engine already hit while producing this record.
    pub error: Option<String>,
    pub reader: Option<ObjectBody>,
}

impl ExportRecord {
    pub fn file(pathname: impl Into<String>, reader: ObjectBody) -> Self {
        Self {
            pathname: pathname.into(),
            kind: EntryKind::Regular,
            xattr: false,
            error: None,
            reader: Some(reader),
        }
    }

    pub fn directory(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            kind: EntryKind::Directory,
            xattr: false,
            error: None,
            reader: None,
        }
    }

    pub fn failed(pathname: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            kind: EntryKind::Regular,
            xattr: false,
            error: Some(error.into()),
            reader: None,
        }
    }

    pub fn xattr(pathname: impl Into<String>, reader: ObjectBody) -> Self {
        Self {
            xattr: true,
            ..Self::file(pathname, reader)
        }
    }

    /// Whether this record is written to the bucket at all.
    fn needs_write(&self) -> bool {
        self.error.is_none() && !self.xattr && self.kind == EntryKind::Regular
    }
}

impl std::fmt::Debug for ExportRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRecord")
            .field("pathname", &self.pathname)
            .field("kind", &self.kind)
            .field("xattr", &self.xattr)
            .field("error", &self.error)
            .field("has_reader", &self.reader.is_some())
            .finish()
    }
}

/// Outcome for one [`ExportRecord`].
#[derive(Debug)]
pub struct ExportResult {
    pub pathname: String,
    pub outcome: Result<(), ExportError>,
}

impl ExportResult {
    fn success(pathname: String) -> Self {
        Self {
            pathname,
            outcome: Ok(()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Writes a stream of files under a bucket prefix.
pub struct Exporter {
    connection: Arc<Connection>,
    options: ExporterOptions,
    drivers: Mutex<Vec<JoinHandle<()>>>,
}

impl Exporter {
    pub fn new(config: StoreConfig, connector: Arc<dyn Connector>, options: ExporterOptions) -> Self {
        Self {
            connection: Arc::new(Connection::new(config, connector)),
            options,
            drivers: Mutex::new(Vec::new()),
        }
    }

    pub fn from_params(
        scheme: &str,
        params: &HashMap<String, String>,
        connector: Arc<dyn Connector>,
        options: ExporterOptions,
    ) -> Result<Self, ExportError> {
        let config = StoreConfig::from_params(scheme, params)?;
        Ok(Self::new(config, connector, options))
    }

    /// The path prefix objects are written under.
    pub fn root(&self) -> &str {
        &self.connection.config().path
    }

    /// Copy `reader` to the object for `pathname`. Returns bytes written.
    pub async fn store_file(&self, pathname: &str, reader: ObjectBody) -> Result<u64, ExportError> {
        write_object(&self.connection, pathname, reader).await
    }

    /// Export every record of `input`, yielding one result per record.
    ///
    /// Results may arrive out of input order. The returned channel closes
    /// after `input` is exhausted and every write has finished.
    pub fn export(&self, input: mpsc::Receiver<ExportRecord>) -> mpsc::Receiver<ExportResult> {
        let (tx, rx) = mpsc::channel(self.options.buffer.max(1));
        let driver = ExportDriver {
            connection: Arc::clone(&self.connection),
            permits: Arc::new(Semaphore::new(self.options.concurrency.max(1))),
        };
        let handle = tokio::spawn(driver.run(input, tx));
        let mut drivers = self.drivers.lock().expect("lock poisoned");
        drivers.retain(|h| !h.is_finished());
        drivers.push(handle);
        rx
    }

    /// Stop running exports and close the connection.
    ///
    /// Writes in progress are abandoned as-is.
    pub async fn close(&self) -> Result<(), ExportError> {
        for handle in self.drivers.lock().expect("lock poisoned").drain(..) {
            handle.abort();
        }
        Ok(self.connection.close().await?)
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("root", &self.root())
            .field("options", &self.options)
            .field("connection", &self.connection)
            .finish()
    }
}

async fn write_object(
    connection: &Connection,
    pathname: &str,
    reader: ObjectBody,
) -> Result<u64, ExportError> {
    let key = connection.config().key(pathname);
    let client = connection.client().await?;
    let written = client.put_stream(&key, reader).await?;
    debug!(key = %key, bytes = written, "exported object");
    Ok(written)
}

#[derive(Default)]
struct ExportStats {
    written: usize,
    passed: usize,
    failed: usize,
}

struct ExportDriver {
    connection: Arc<Connection>,
    permits: Arc<Semaphore>,
}

impl ExportDriver {
    async fn run(self, mut input: mpsc::Receiver<ExportRecord>, results: mpsc::Sender<ExportResult>) {
        let mut writers: JoinSet<ExportResult> = JoinSet::new();
        let mut stats = ExportStats::default();
        let mut input_open = true;

        loop {
            let result = tokio::select! {
                record = input.recv(), if input_open => match record {
                    Some(record) => match self.dispatch(record, &mut writers).await {
                        Some(result) => {
                            if result.is_ok() {
                                stats.passed += 1;
                            }
                            result
                        }
                        None => continue,
                    },
                    None => {
                        input_open = false;
                        continue;
                    }
                },
                Some(joined) = writers.join_next(), if !writers.is_empty() => {
                    let result = joined.unwrap_or_else(aborted);
                    if result.is_ok() {
                        stats.written += 1;
                    }
                    result
                }
                else => break,
            };

            if let Err(e) = &result.outcome {
                warn!(pathname = %result.pathname, error = %e, "export failed");
                stats.failed += 1;
            }
            if results.send(result).await.is_err() {
                debug!("export consumer went away");
                return;
            }
        }

        info!(
            root = %self.connection.config().path,
            written = stats.written,
            passed = stats.passed,
            failed = stats.failed,
            "export complete"
        );
    }

    /// Answer pass-through records directly; hand regular files to a writer.
    async fn dispatch(
        &self,
        record: ExportRecord,
        writers: &mut JoinSet<ExportResult>,
    ) -> Option<ExportResult> {
        if !record.needs_write() {
            return Some(ExportResult::success(record.pathname));
        }
        let pathname = record.pathname;
        let Some(reader) = record.reader else {
            return Some(ExportResult {
                outcome: Err(ExportError::MissingContent(pathname.clone())),
                pathname,
            });
        };

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                return Some(ExportResult {
                    pathname,
                    outcome: Err(ExportError::Aborted(e.to_string())),
                })
            }
        };
        let connection = Arc::clone(&self.connection);
        writers.spawn(async move {
            let _permit = permit;
            let outcome = guarded(write_object(&connection, &pathname, reader))
                .await
                .map(|_| ());
            ExportResult { pathname, outcome }
        });
        None
    }
}

/// Drive `write` to completion, reporting a panic as [`ExportError::Aborted`].
async fn guarded<F>(write: F) -> Result<u64, ExportError>
where
    F: Future<Output = Result<u64, ExportError>>,
{
    let mut write = std::pin::pin!(write);
    std::future::poll_fn(|cx| {
        panic::catch_unwind(AssertUnwindSafe(|| write.as_mut().poll(cx))).unwrap_or_else(
            |payload| Poll::Ready(Err(ExportError::Aborted(panic_message(payload.as_ref())))),
        )
    })
    .await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    format!("writer panicked: {detail}")
}

/// Writers report their own panics, so this only sees cancelled tasks.
fn aborted(err: JoinError) -> ExportResult {
    ExportResult {
        pathname: String::new(),
        outcome: Err(ExportError::Aborted(err.to_string())),
    }
}
