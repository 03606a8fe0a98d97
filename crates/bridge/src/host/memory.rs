//! In-memory content host for unit tests.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use protocol::DocumentHandle;

use super::{ContentHost, DocumentStream, MetadataRow};

#[derive(Clone)]
struct Entry {
    row: Option<MetadataRow>,
    content: Arc<Vec<u8>>,
    open_error: Option<String>,
    fail_after: Option<usize>,
}

/// Content host backed by a map of handles to byte buffers.
///
/// Counts opened and closed streams so tests can verify every stream is
/// released.
pub(crate) struct MemoryHost {
    entries: Mutex<HashMap<DocumentHandle, Entry>>,
    max_read: Option<usize>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl MemoryHost {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_read: None,
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Streams return at most `n` bytes per read call.
    pub(crate) fn with_short_reads(mut self, n: usize) -> Self {
        self.max_read = Some(n);
        self
    }

    fn put(&self, handle: &str, row: Option<MetadataRow>, content: &[u8]) -> DocumentHandle {
        let handle = DocumentHandle::new(handle);
        self.entries.lock().unwrap().insert(
            handle.clone(),
            Entry {
                row,
                content: Arc::new(content.to_vec()),
                open_error: None,
                fail_after: None,
            },
        );
        handle
    }

    /// A document with a full metadata row.
    pub(crate) fn insert(&self, handle: &str, name: &str, content: &[u8]) -> DocumentHandle {
        let row = MetadataRow {
            display_name: Some(name.to_string()),
            size: Some(content.len() as u64),
        };
        self.put(handle, Some(row), content)
    }

    /// A document with an explicit (possibly partial) metadata row.
    pub(crate) fn insert_row(&self, handle: &str, row: MetadataRow, content: &[u8]) -> DocumentHandle {
        self.put(handle, Some(row), content)
    }

    /// A document whose content opens but whose metadata query yields no row.
    pub(crate) fn insert_without_row(&self, handle: &str, content: &[u8]) -> DocumentHandle {
        self.put(handle, None, content)
    }

    /// Opening the stream fails with an I/O error.
    pub(crate) fn fail_open(&self, handle: &DocumentHandle, message: &str) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(handle) {
            entry.open_error = Some(message.to_string());
        }
    }

    /// Reads fail once `n` bytes have been delivered.
    pub(crate) fn fail_after(&self, handle: &DocumentHandle, n: usize) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(handle) {
            entry.fail_after = Some(n);
        }
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ContentHost for MemoryHost {
    fn query(&self, handle: &DocumentHandle) -> io::Result<Option<MetadataRow>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(handle)
            .and_then(|e| e.row.clone()))
    }

    fn open_stream(&self, handle: &DocumentHandle) -> io::Result<Option<Box<dyn DocumentStream>>> {
        let entry = match self.entries.lock().unwrap().get(handle) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };
        if let Some(message) = entry.open_error {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, message));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(MemoryStream {
            content: entry.content,
            position: 0,
            max_read: self.max_read,
            fail_after: entry.fail_after,
            closed: Arc::clone(&self.closed),
        })))
    }
}

struct MemoryStream {
    content: Arc<Vec<u8>>,
    position: usize,
    max_read: Option<usize>,
    fail_after: Option<usize>,
    closed: Arc<AtomicUsize>,
}

impl DocumentStream for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_after.is_some_and(|limit| self.position >= limit) {
            return Err(io::Error::other("storage went away"));
        }

        let remaining = &self.content[self.position.min(self.content.len())..];
        let mut n = remaining.len().min(buf.len());
        if let Some(max) = self.max_read {
            n = n.min(max);
        }
        if let Some(limit) = self.fail_after {
            n = n.min(limit - self.position);
        }

        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
