use protocol::{DocumentHandle, DocumentMetadata, UNKNOWN_DOCUMENT_NAME};
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::host::ContentHost;

/// Resolves a handle to its display metadata with one host query.
///
/// A missing row is an error. Missing columns are not: the name falls back
/// to [`UNKNOWN_DOCUMENT_NAME`] and the size to 0.
#[derive(Debug, Clone)]
pub struct MetadataResolver<H> {
    host: H,
}

impl<H: ContentHost> MetadataResolver<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    /// Resolve `handle`.
    pub fn resolve(&self, handle: &DocumentHandle) -> BridgeResult<DocumentMetadata> {
        let query_failed = |reason: String| BridgeError::QueryFailed {
            handle: handle.to_string(),
            reason,
        };

        let row = self
            .host
            .query(handle)
            .map_err(|e| query_failed(e.to_string()))?
            .ok_or_else(|| query_failed("host returned no metadata row".to_string()))?;

        if row.display_name.is_none() || row.size.is_none() {
            debug!(handle = %handle, ?row, "Metadata row is incomplete, using defaults");
        }

        Ok(DocumentMetadata {
            name: row
                .display_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_DOCUMENT_NAME.to_string()),
            size_bytes: row.size.unwrap_or(0),
        })
    }
}
