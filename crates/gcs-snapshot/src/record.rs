use std::sync::Arc;

use chrono::{DateTime, Utc};
use gcs_client::{ClientResult, ObjectBody, ObjectInfo, ObjectStoreClient};

use crate::error::ImportError;

/// Mode bits of a synthesized directory (`drwx------`).
pub const DIRECTORY_MODE: u32 = 0o040700;

/// Mode bits of an imported object (`-rw-r--r--`).
pub const FILE_MODE: u32 = 0o100644;

/// File type of a scan or export record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory,
    Regular,
    Symlink,
    /// Devices, sockets, fifos: anything the bucket cannot represent.
    Other,
}

/// Deferred open-for-read capability bound to one object key.
///
/// Nothing is fetched until [`open`](Self::open) is called.
#[derive(Clone)]
pub struct ContentHandle {
    client: Arc<dyn ObjectStoreClient>,
    key: String,
}

impl ContentHandle {
    pub fn new(client: Arc<dyn ObjectStoreClient>, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
        }
    }

    /// The object key this handle reads.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Open the object body.
    pub async fn open(&self) -> ClientResult<ObjectBody> {
        self.client.get(&self.key, None).await
    }
}

impl std::fmt::Debug for ContentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHandle").field("key", &self.key).finish()
    }
}

/// One entry of the synthesized file tree.
#[derive(Clone, Debug)]
pub struct FileRecord {
    /// Absolute path, rooted at `/`.
    pub path: String,
    /// Last path segment.
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub owner: String,
    pub mode: u32,
    /// Present for regular files only.
    pub content: Option<ContentHandle>,
}

impl FileRecord {
    /// Synthetic directory record for `path`.
    pub fn directory(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path).to_string(),
            path,
            kind: EntryKind::Directory,
            size: 0,
            mod_time: DateTime::<Utc>::default(),
            owner: String::new(),
            mode: DIRECTORY_MODE,
            content: None,
        }
    }

    /// Regular file record for a listed object.
    pub fn file(path: impl Into<String>, info: &ObjectInfo, content: ContentHandle) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path).to_string(),
            path,
            kind: EntryKind::Regular,
            size: info.size,
            mod_time: info.updated,
            owner: info.owner.clone(),
            mode: FILE_MODE,
            content: Some(content),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Item of a scan stream.
#[derive(Debug)]
pub enum ScanRecord {
    Entry(FileRecord),
    /// Terminal: the scan stopped at `path`.
    Error { path: String, error: ImportError },
}

impl ScanRecord {
    /// The record's file entry, if it is not an error.
    pub fn entry(&self) -> Option<&FileRecord> {
        match self {
            Self::Entry(record) => Some(record),
            Self::Error { .. } => None,
        }
    }
}

/// Parent directory of an absolute path; `/` is its own parent.
pub(crate) fn parent_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => {
            let parent = trimmed[..idx].trim_end_matches('/');
            if parent.is_empty() {
                "/"
            } else {
                parent
            }
        }
        None => "/",
    }
}

/// Last segment of an absolute path; `/` for the root.
pub(crate) fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}
