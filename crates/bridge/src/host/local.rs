//! Local filesystem content host.
//!
//! Files are never exposed by path. A file becomes reachable only once it is
//! registered, which issues an opaque `doc://<n>` handle for it.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use protocol::DocumentHandle;
use tracing::debug;

use super::{ContentHost, DocumentStream, MetadataRow, ReaderStream};

/// Scheme prefix of handles issued by [`LocalContentHost`].
pub const HANDLE_SCHEME: &str = "doc://";

/// Content host over registered local files.
#[derive(Debug)]
pub struct LocalContentHost {
    documents: DashMap<DocumentHandle, PathBuf>,
    next_id: AtomicU64,
}

impl LocalContentHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Grant access to a file and return its handle.
    ///
    /// Registering the same file twice returns the handle issued the first
    /// time.
    pub fn register(&self, path: impl AsRef<Path>) -> io::Result<DocumentHandle> {
        let path = fs::canonicalize(path.as_ref())?;
        if !path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        if let Some(existing) = self.documents.iter().find(|entry| *entry.value() == path) {
            return Ok(existing.key().clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = DocumentHandle::new(format!("{HANDLE_SCHEME}{id}"));
        debug!(handle = %handle, path = %path.display(), "Registered document");
        self.documents.insert(handle.clone(), path);
        Ok(handle)
    }

    /// Withdraw access to a handle. Returns whether it was registered.
    pub fn revoke(&self, handle: &DocumentHandle) -> bool {
        self.documents.remove(handle).is_some()
    }

    /// Number of registered documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether no documents are registered.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn path_of(&self, handle: &DocumentHandle) -> Option<PathBuf> {
        self.documents.get(handle).map(|entry| entry.value().clone())
    }
}

impl Default for LocalContentHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHost for LocalContentHost {
    fn query(&self, handle: &DocumentHandle) -> io::Result<Option<MetadataRow>> {
        let Some(path) = self.path_of(handle) else {
            return Ok(None);
        };

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(MetadataRow {
            display_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            size: Some(metadata.len()),
        }))
    }

    fn open_stream(&self, handle: &DocumentHandle) -> io::Result<Option<Box<dyn DocumentStream>>> {
        let Some(path) = self.path_of(handle) else {
            return Ok(None);
        };

        let file = File::open(&path)?;
        Ok(Some(Box::new(ReaderStream::new(file))))
    }
}
