//! # docbridge Protocol Library
//!
//! Wire types shared by docbridge callers and the bridge itself.
//!
//! ## Overview
//!
//! Every interaction is a named call carrying a map of arguments, answered
//! by exactly one success value or one typed failure:
//!
//! ```text
//! caller ──▶ Envelope { id, Request(MethodCall) } ──▶ bridge
//! caller ◀── Envelope { id, Reply(Response) }     ◀── bridge
//! ```
//!
//! Document handles are opaque strings issued by the host; the protocol
//! never carries filesystem paths.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ByteRange, DocumentHandle, Envelope, MethodCall};
//!
//! let handle = DocumentHandle::new("doc://42");
//! let call = MethodCall::read_range(&handle, ByteRange::new(512, 512));
//! let line = Envelope::request(1, call).to_json_line().unwrap();
//! assert!(line.contains("readRange"));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Calls, payloads, failures and the envelope
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    args, Body, ByteRange, DocumentHandle, DocumentMetadata, Envelope, Failure, FailureKind,
    Method, MethodCall, Payload, Response, PROTOCOL_VERSION, UNKNOWN_DOCUMENT_NAME,
};
