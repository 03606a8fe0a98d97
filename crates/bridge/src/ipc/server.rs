//! IPC server carrying bridge calls over a Unix Domain Socket.
//!
//! Every connection reads request envelopes one line at a time. Each request
//! is dispatched on its own task, so a call waiting on the picker never
//! blocks reads issued after it; replies go out through a single writer task
//! and may arrive out of request order.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::{Body, Envelope, Failure, FailureKind, ProtocolError, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::host::ContentHost;

/// Id used to answer lines that could not be parsed into an envelope.
pub const MALFORMED_REQUEST_ID: u64 = 0;

/// A server that listens for IPC connections on a Unix Domain Socket.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    /// Bind the server to the specified socket path.
    ///
    /// This will create the socket file and any necessary parent directories.
    /// If a socket file already exists at the path, it will be removed first.
    pub async fn bind(path: &Path) -> Result<Self, io::Error> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        debug!(path = %path.display(), "IPC server bound");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Path of the bound socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept a new incoming connection.
    pub async fn accept(&self) -> Result<IpcConnection, io::Error> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(IpcConnection::new(stream))
    }

    /// Serve connections until `shutdown` resolves.
    ///
    /// Open connections are aborted on shutdown.
    pub async fn serve<H, F>(self, dispatcher: Arc<Dispatcher<H>>, shutdown: F) -> io::Result<()>
    where
        H: ContentHost + 'static,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();
        info!(path = %self.path.display(), "Serving bridge calls");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down IPC server");
                    break;
                }
                accepted = self.accept() => match accepted {
                    Ok(connection) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        connections.spawn(async move {
                            if let Err(e) = connection.serve(dispatcher).await {
                                warn!(error = %e, "IPC connection ended with an error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept IPC connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.shutdown().await;
        Ok(())
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A connection to an IPC client.
///
/// Wraps a Unix stream and reads and writes newline-delimited JSON
/// envelopes.
pub struct IpcConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl IpcConnection {
    /// Create a new IPC connection from a Unix stream.
    fn new(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Read the next envelope. Returns `None` if the client has disconnected.
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>, IpcError> {
        read_envelope(&mut self.reader).await
    }

    /// Send an envelope to the client.
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), IpcError> {
        write_envelope(&mut self.writer, envelope).await
    }

    /// Answer requests until the client disconnects.
    ///
    /// Calls still in flight when the client goes away are aborted.
    pub async fn serve<H>(self, dispatcher: Arc<Dispatcher<H>>) -> Result<(), IpcError>
    where
        H: ContentHost + 'static,
    {
        let IpcConnection { mut reader, mut writer } = self;
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

        let writer_task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if let Err(e) = write_envelope(&mut writer, &envelope).await {
                    warn!(id = envelope.id, error = %e, "Failed to send reply");
                    break;
                }
            }
        });

        let mut calls = JoinSet::new();
        let result = loop {
            let envelope = match read_envelope(&mut reader).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break Ok(()),
                Err(IpcError::Protocol(e)) => {
                    warn!(error = %e, "Malformed request");
                    let reply = Envelope::reply(MALFORMED_REQUEST_ID, Response::Failure(e.into()));
                    let _ = tx.send(reply);
                    continue;
                }
                Err(e) => break Err(e),
            };

            match envelope.body {
                Body::Request(call) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    let tx = tx.clone();
                    let id = envelope.id;
                    calls.spawn(async move {
                        let response = dispatcher.dispatch(call).await;
                        let _ = tx.send(Envelope::reply(id, response));
                    });
                }
                Body::Reply(_) => {
                    warn!(id = envelope.id, "Client sent a reply instead of a request");
                    let failure =
                        Failure::new(FailureKind::InvalidArgument, "expected a request envelope");
                    let _ = tx.send(Envelope::reply(envelope.id, Response::Failure(failure)));
                }
            }

            while calls.try_join_next().is_some() {}
        };

        if !calls.is_empty() {
            debug!(in_flight = calls.len(), "Client disconnected, aborting calls");
        }
        calls.shutdown().await;
        drop(tx);
        let _ = writer_task.await;

        result
    }
}

async fn read_envelope(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<Option<Envelope>, IpcError> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        if !line.trim_ascii().is_empty() {
            break;
        }
    }

    Ok(Some(Envelope::from_json_bytes(&line)?))
}

async fn write_envelope(writer: &mut OwnedWriteHalf, envelope: &Envelope) -> Result<(), IpcError> {
    let line = envelope.to_json_line()?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Errors that can occur during IPC communication.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An envelope could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The bridge answered the call with a failure.
    #[error("call failed: {0}")]
    Failure(#[from] Failure),

    /// The peer closed the connection before replying.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The reply carried a different payload than the call produces.
    #[error("unexpected reply payload, expected {0}")]
    UnexpectedPayload(&'static str),
}
