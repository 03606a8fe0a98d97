//! Host primitives the bridge is built on.
//!
//! The host mediates every document access through opaque handles. The
//! bridge only needs three things from it:
//!
//! - a metadata query per handle ([`ContentHost::query`])
//! - a forward-only byte stream per handle ([`ContentHost::open_stream`])
//! - a document-picker surface it can ask to present ([`PickerSurface`])
//!
//! Picker completions travel the other way: the host hands a
//! [`PickerCompletion`] to the selection session on its own schedule.
//!
//! Implementations provided here:
//! - [`local::LocalContentHost`]: local files behind `doc://<n>` handles
//! - [`surface::ChannelSurface`]: forwards picker requests to a host UI task
//! - [`terminal::TerminalPicker`]: a line-based host UI for the CLI

pub mod local;
mod stream;
pub mod surface;
pub mod terminal;

#[cfg(test)]
pub(crate) mod memory;

use std::io;
use std::sync::Arc;

use protocol::DocumentHandle;
use thiserror::Error;

pub use stream::{ReaderStream, ScopedStream};

/// Request code the bridge tags its picker requests with by default.
pub const DEFAULT_REQUEST_CODE: i32 = 9999;

/// MIME filter that accepts every document type.
pub const ANY_MIME_TYPE: &str = "*/*";

/// One metadata row as returned by the host's content query.
///
/// Either column may be missing; the resolver substitutes defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRow {
    /// Display name column.
    pub display_name: Option<String>,
    /// Size column, in bytes.
    pub size: Option<u64>,
}

/// A forward-only, read-only byte stream opened against a handle.
pub trait DocumentStream: Send {
    /// Read into `buf`, returning the number of bytes read (0 at end of stream).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the stream. Called exactly once by [`ScopedStream`].
    fn close(&mut self) -> io::Result<()>;
}

/// Host content primitives. Both calls may block.
pub trait ContentHost: Send + Sync {
    /// Query the metadata row for a handle. `Ok(None)` means the host has no
    /// row for it (stale or revoked handle).
    fn query(&self, handle: &DocumentHandle) -> io::Result<Option<MetadataRow>>;

    /// Open a stream over the handle's content. `Ok(None)` means the host
    /// produced no stream.
    fn open_stream(&self, handle: &DocumentHandle) -> io::Result<Option<Box<dyn DocumentStream>>>;
}

impl<T: ContentHost + ?Sized> ContentHost for &T {
    fn query(&self, handle: &DocumentHandle) -> io::Result<Option<MetadataRow>> {
        (**self).query(handle)
    }

    fn open_stream(&self, handle: &DocumentHandle) -> io::Result<Option<Box<dyn DocumentStream>>> {
        (**self).open_stream(handle)
    }
}

impl<T: ContentHost + ?Sized> ContentHost for Arc<T> {
    fn query(&self, handle: &DocumentHandle) -> io::Result<Option<MetadataRow>> {
        (**self).query(handle)
    }

    fn open_stream(&self, handle: &DocumentHandle) -> io::Result<Option<Box<dyn DocumentStream>>> {
        (**self).open_stream(handle)
    }
}

/// Configuration the picker surface is asked to present with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerRequest {
    /// Code the completion must carry to be recognized.
    pub request_code: i32,
    /// Whether more than one document may be selected.
    pub allow_multiple: bool,
    /// MIME filter, `*/*` for any type.
    pub mime_filter: String,
}

/// The selection as the host delivers it.
///
/// Hosts report a multi-item list or a single item; when both are present
/// the list wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PickedData {
    /// Multi-item selection list.
    pub items: Option<Vec<DocumentHandle>>,
    /// Single-item selection.
    pub single: Option<DocumentHandle>,
}

impl PickedData {
    /// A multi-item selection.
    pub fn multiple(items: Vec<DocumentHandle>) -> Self {
        Self {
            items: Some(items),
            single: None,
        }
    }

    /// A single-item selection.
    pub fn single(handle: DocumentHandle) -> Self {
        Self {
            items: None,
            single: Some(handle),
        }
    }

    /// Normalize either shape into one ordered sequence.
    pub fn into_handles(self) -> Vec<DocumentHandle> {
        match self.items {
            Some(items) => items,
            None => self.single.into_iter().collect(),
        }
    }
}

/// How the user closed the picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome {
    /// The user confirmed a selection.
    Confirmed(PickedData),
    /// The user dismissed the picker.
    Cancelled,
}

/// Completion signal delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerCompletion {
    /// Code of the request this completes.
    pub request_code: i32,
    /// What the user did.
    pub outcome: PickerOutcome,
}

impl PickerCompletion {
    /// A confirmed selection.
    pub fn confirmed(request_code: i32, data: PickedData) -> Self {
        Self {
            request_code,
            outcome: PickerOutcome::Confirmed(data),
        }
    }

    /// A cancelled picker.
    pub fn cancelled(request_code: i32) -> Self {
        Self {
            request_code,
            outcome: PickerOutcome::Cancelled,
        }
    }
}

/// Errors a surface reports when asked to present the picker.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The surface has been torn down.
    #[error("picker surface is detached")]
    Detached,

    /// The host refused the request.
    #[error("picker surface rejected the request: {0}")]
    Rejected(String),
}

/// The presenting surface that can show the host's document picker.
///
/// `present` must not block until the user answers; the answer arrives
/// later as a [`PickerCompletion`].
pub trait PickerSurface: Send + Sync {
    /// Show the picker configured by `request`.
    fn present(&self, request: &PickerRequest) -> Result<(), SurfaceError>;
}
