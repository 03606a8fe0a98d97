use std::io::{self, Read};

use protocol::{ByteRange, DocumentHandle};

use crate::error::{BridgeError, BridgeResult};
use crate::host::{ContentHost, ScopedStream};

/// Reads document content through scoped, forward-only streams.
///
/// Every call opens its own stream and closes it before returning, so
/// concurrent reads of one handle never share a cursor.
#[derive(Debug, Clone)]
pub struct ContentReader<H> {
    host: H,
}

impl<H: ContentHost> ContentReader<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    /// Read the whole document.
    pub fn read_all(&self, handle: &DocumentHandle) -> BridgeResult<Vec<u8>> {
        let read_failed = |reason: String| BridgeError::ReadFailed {
            handle: handle.to_string(),
            reason,
        };

        let mut stream = ScopedStream::open(&self.host, handle)
            .map_err(|e| read_failed(e.to_string()))?
            .ok_or_else(|| read_failed("host returned no stream".to_string()))?;

        let mut content = Vec::new();
        stream
            .read_to_end(&mut content)
            .map_err(|e| read_failed(e.to_string()))?;
        Ok(content)
    }

    /// Read up to `range.length` bytes starting `range.offset` bytes in.
    ///
    /// The offset is consumed, never seeked. `Ok(None)` is the end-of-data
    /// signal: the offset lies at or past the end, or nothing was read.
    pub fn read_range(
        &self,
        handle: &DocumentHandle,
        range: ByteRange,
    ) -> BridgeResult<Option<Vec<u8>>> {
        let stream_error = |reason: String| BridgeError::StreamError {
            handle: handle.to_string(),
            reason,
        };

        let mut stream = ScopedStream::open(&self.host, handle)
            .map_err(|e| stream_error(e.to_string()))?
            .ok_or_else(|| stream_error("host returned no stream".to_string()))?;

        let skipped = io::copy(&mut stream.by_ref().take(range.offset), &mut io::sink())
            .map_err(|e| stream_error(e.to_string()))?;
        if skipped < range.offset {
            return Ok(None);
        }

        let mut chunk = Vec::new();
        stream
            .by_ref()
            .take(u64::from(range.length))
            .read_to_end(&mut chunk)
            .map_err(|e| stream_error(e.to_string()))?;

        Ok((!chunk.is_empty()).then_some(chunk))
    }
}
