//! # docbridge
//!
//! A request/response bridge that lets a caller choose documents through the
//! host's picker and then read their metadata and bytes through opaque
//! handles. The caller never sees a filesystem path.
//!
//! ## Architecture
//!
//! ```text
//!  caller ──call──▶ Dispatcher ──▶ SelectionSession ──present──▶ PickerSurface
//!                     │     ▲              ▲                          │
//!                     │     └── response   └──────── completion ──────┘
//!                     ├──▶ MetadataResolver ──query──────▶ ContentHost
//!                     └──▶ ContentReader ────open_stream─▶ ContentHost
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bridge::host::local::LocalContentHost;
//! use bridge::{Config, Dispatcher, SelectionSession};
//! use protocol::{MethodCall, Response};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let host = Arc::new(LocalContentHost::new());
//!     let handle = host.register("notes.txt")?;
//!
//!     let session = Arc::new(SelectionSession::new(config.picker));
//!     let dispatcher = Dispatcher::new(host, session);
//!
//!     if let Response::Success(payload) = dispatcher.dispatch(MethodCall::get_metadata(&handle)).await {
//!         println!("{payload:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`host`]: host primitives and the local development host
//! - [`documents`]: metadata resolution and content reads
//! - [`selection`]: the pending picker request
//! - [`dispatcher`]: method routing
//! - [`ipc`]: Unix socket transport
//! - [`config`]: configuration loading and defaults

pub mod config;
pub mod dispatcher;
pub mod documents;
pub mod error;
pub mod host;
pub mod ipc;
pub mod selection;

// Re-export protocol for convenience
pub use protocol;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use documents::{ContentReader, MetadataResolver};
pub use error::{BridgeError, BridgeResult};
pub use host::{ContentHost, DocumentStream, MetadataRow, PickerSurface};
pub use selection::{PickTicket, SelectionSession, SelectionState};
