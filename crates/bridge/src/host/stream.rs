//! Scoped stream guard and a `Read` adapter.

use std::io::{self, Read};

use protocol::DocumentHandle;
use tracing::warn;

use super::{ContentHost, DocumentStream};

/// A document stream that is closed on every exit path.
///
/// Dropping the guard closes the stream; close failures are logged and
/// never replace the result of the read that preceded them.
pub struct ScopedStream {
    handle: DocumentHandle,
    inner: Box<dyn DocumentStream>,
    closed: bool,
}

impl ScopedStream {
    /// Open a stream for `handle`. `Ok(None)` when the host produced none.
    pub fn open<H: ContentHost + ?Sized>(
        host: &H,
        handle: &DocumentHandle,
    ) -> io::Result<Option<Self>> {
        Ok(host.open_stream(handle)?.map(|inner| Self {
            handle: handle.clone(),
            inner,
            closed: false,
        }))
    }

    /// Close the stream now and report the outcome.
    pub fn close(mut self) -> io::Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}

impl Read for ScopedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other("stream already closed"));
        }
        self.inner.read(buf)
    }
}

impl Drop for ScopedStream {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            warn!(handle = %self.handle, error = %e, "Failed to close document stream");
        }
    }
}

/// Adapts any [`Read`] into a [`DocumentStream`]; closing drops the reader.
pub struct ReaderStream<R> {
    inner: Option<R>,
}

impl<R: Read + Send> ReaderStream<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            inner: Some(reader),
        }
    }
}

impl<R: Read + Send> DocumentStream for ReaderStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(reader) => reader.read(buf),
            None => Err(io::Error::other("stream already closed")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner = None;
        Ok(())
    }
}
