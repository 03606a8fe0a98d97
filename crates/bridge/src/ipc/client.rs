//! IPC client for calling a running bridge over its Unix Domain Socket.

use std::io;
use std::path::Path;
use std::time::Duration;

use protocol::{Body, ByteRange, DocumentHandle, DocumentMetadata, Envelope, MethodCall, Payload, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use super::server::{IpcError, MALFORMED_REQUEST_ID};

/// A client for the bridge's call channel.
///
/// Calls are issued one at a time; each reply is matched to its request by
/// id. There is no per-call timeout unless one is set, since a picker call
/// legitimately waits for as long as the user takes.
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
    timeout: Option<Duration>,
}

impl IpcClient {
    /// Connect to the bridge at the specified socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    /// This typically indicates that the bridge is not running.
    pub async fn connect(path: &Path) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_stream(stream, None))
    }

    /// Connect with a timeout that also applies to every call.
    pub async fn connect_with_timeout(path: &Path, timeout: Duration) -> Result<Self, IpcError> {
        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| {
                IpcError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection timed out",
                ))
            })??;

        Ok(Self::from_stream(stream, Some(timeout)))
    }

    fn from_stream(stream: UnixStream, timeout: Option<Duration>) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_id: 1,
            timeout,
        }
    }

    /// Set or clear the per-call timeout.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Send a call and wait for its reply.
    pub async fn call(&mut self, call: MethodCall) -> Result<Response, IpcError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.call_internal(call))
                .await
                .map_err(|_| {
                    IpcError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "operation timed out",
                    ))
                })?,
            None => self.call_internal(call).await,
        }
    }

    async fn call_internal(&mut self, call: MethodCall) -> Result<Response, IpcError> {
        let id = self.next_id;
        self.next_id += 1;

        let line = Envelope::request(id, call).to_json_line()?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(IpcError::ConnectionClosed);
            }
            if line.trim().is_empty() {
                continue;
            }

            let envelope = Envelope::from_json(&line)?;
            match envelope.body {
                Body::Reply(response) if envelope.id == id => return Ok(response),
                // Requests are encoded here, so a malformed-line reply
                // belongs to some earlier writer on this stream.
                Body::Reply(response) if envelope.id == MALFORMED_REQUEST_ID => {
                    warn!(?response, "Bridge rejected a line this call did not send");
                }
                _ => debug!(id = envelope.id, expected = id, "Skipping unrelated envelope"),
            }
        }
    }

    async fn call_for_payload(&mut self, call: MethodCall) -> Result<Payload, IpcError> {
        Ok(self.call(call).await?.into_result()?)
    }

    /// Ask the bridge to present the picker and wait for the selection.
    pub async fn pick_documents(
        &mut self,
        allow_multiple: Option<bool>,
    ) -> Result<Vec<DocumentHandle>, IpcError> {
        match self
            .call_for_payload(MethodCall::pick_documents(allow_multiple))
            .await?
        {
            Payload::Handles(handles) => Ok(handles),
            _ => Err(IpcError::UnexpectedPayload("handles")),
        }
    }

    /// Resolve display metadata for a handle.
    pub async fn get_metadata(
        &mut self,
        handle: &DocumentHandle,
    ) -> Result<DocumentMetadata, IpcError> {
        match self.call_for_payload(MethodCall::get_metadata(handle)).await? {
            Payload::Metadata(metadata) => Ok(metadata),
            _ => Err(IpcError::UnexpectedPayload("metadata")),
        }
    }

    /// Read a whole document.
    pub async fn read_all(&mut self, handle: &DocumentHandle) -> Result<Vec<u8>, IpcError> {
        match self.call_for_payload(MethodCall::read_all(handle)).await? {
            Payload::Bytes(bytes) => Ok(bytes),
            _ => Err(IpcError::UnexpectedPayload("bytes")),
        }
    }

    /// Read one range. `None` signals end of data.
    pub async fn read_range(
        &mut self,
        handle: &DocumentHandle,
        range: ByteRange,
    ) -> Result<Option<Vec<u8>>, IpcError> {
        match self
            .call_for_payload(MethodCall::read_range(handle, range))
            .await?
        {
            Payload::Chunk(chunk) => Ok(chunk),
            _ => Err(IpcError::UnexpectedPayload("chunk")),
        }
    }
}
