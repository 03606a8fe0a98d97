//! Request dispatcher: one call in, exactly one response out.

use std::sync::Arc;

use protocol::{args, ByteRange, DocumentHandle, Failure, Method, MethodCall, Payload, Response};
use tracing::debug;

use crate::documents::{ContentReader, MetadataResolver};
use crate::error::{BridgeError, BridgeResult};
use crate::host::ContentHost;
use crate::selection::SelectionSession;

/// Routes method calls to the selection session, the metadata resolver and
/// the content reader.
///
/// Host access blocks, so resolver and reader work runs on the blocking pool.
/// Each call is independent; a pending `pickDocuments` does not hold up
/// reads issued on the same dispatcher.
pub struct Dispatcher<H> {
    resolver: Arc<MetadataResolver<Arc<H>>>,
    reader: Arc<ContentReader<Arc<H>>>,
    session: Arc<SelectionSession>,
}

impl<H: ContentHost + 'static> Dispatcher<H> {
    pub fn new(host: Arc<H>, session: Arc<SelectionSession>) -> Self {
        Self {
            resolver: Arc::new(MetadataResolver::new(Arc::clone(&host))),
            reader: Arc::new(ContentReader::new(host)),
            session,
        }
    }

    /// The selection session picker completions should be delivered to.
    pub fn session(&self) -> &Arc<SelectionSession> {
        &self.session
    }

    /// Handle one call.
    pub async fn dispatch(&self, call: MethodCall) -> Response {
        debug!(method = %call.method, "Dispatching call");

        let result = self.route(&call).await;
        if let Err(e) = &result {
            debug!(method = %call.method, kind = %e.kind(), error = %e, "Call failed");
        }
        Response::from(result.map_err(Failure::from))
    }

    async fn route(&self, call: &MethodCall) -> BridgeResult<Payload> {
        match call.method()? {
            Method::PickDocuments => self.handle_pick_documents(call).await,
            Method::GetMetadata => self.handle_get_metadata(call).await,
            Method::ReadAll => self.handle_read_all(call).await,
            Method::ReadRange => self.handle_read_range(call).await,
        }
    }

    async fn handle_pick_documents(&self, call: &MethodCall) -> BridgeResult<Payload> {
        let allow_multiple = call.bool_arg(args::ALLOW_MULTIPLE)?;
        let ticket = self.session.begin(allow_multiple)?;
        Ok(Payload::Handles(ticket.wait().await?))
    }

    async fn handle_get_metadata(&self, call: &MethodCall) -> BridgeResult<Payload> {
        let handle = required_handle(call)?;
        let resolver = Arc::clone(&self.resolver);
        let name = handle.to_string();

        let metadata = run_blocking(
            move || resolver.resolve(&handle),
            |reason| BridgeError::QueryFailed {
                handle: name,
                reason,
            },
        )
        .await?;
        Ok(Payload::Metadata(metadata))
    }

    async fn handle_read_all(&self, call: &MethodCall) -> BridgeResult<Payload> {
        let handle = required_handle(call)?;
        let reader = Arc::clone(&self.reader);
        let name = handle.to_string();

        let content = run_blocking(
            move || reader.read_all(&handle),
            |reason| BridgeError::ReadFailed {
                handle: name,
                reason,
            },
        )
        .await?;
        Ok(Payload::Bytes(content))
    }

    async fn handle_read_range(&self, call: &MethodCall) -> BridgeResult<Payload> {
        let handle = required_handle(call)?;
        let range = ByteRange::new(
            call.u64_arg(args::OFFSET)?.unwrap_or(0),
            call.u32_arg(args::LENGTH)?.unwrap_or(0),
        );
        let reader = Arc::clone(&self.reader);
        let name = handle.to_string();

        let chunk = run_blocking(
            move || reader.read_range(&handle, range),
            |reason| BridgeError::StreamError {
                handle: name,
                reason,
            },
        )
        .await?;
        Ok(Payload::Chunk(chunk))
    }
}

fn required_handle(call: &MethodCall) -> BridgeResult<DocumentHandle> {
    call.handle_arg()?.ok_or(BridgeError::MissingHandle)
}

/// Run host work on the blocking pool. A task that panics is reported
/// through `on_join_error` with the panic message.
async fn run_blocking<T, F>(
    task: F,
    on_join_error: impl FnOnce(String) -> BridgeError,
) -> BridgeResult<T>
where
    F: FnOnce() -> BridgeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .unwrap_or_else(|e| Err(on_join_error(e.to_string())))
}
