//! Call protocol definitions for docbridge.
//!
//! A caller sends a [`MethodCall`] (method name plus named arguments) and
//! receives exactly one [`Response`]: a [`Payload`] on success or a typed
//! [`Failure`]. Both travel inside an [`Envelope`] that carries the protocol
//! version and the call id used to correlate replies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, Result};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Name reported for a document whose display name the host cannot resolve.
pub const UNKNOWN_DOCUMENT_NAME: &str = "unknown";

/// Argument names understood by the bridge.
pub mod args {
    /// Opaque document handle (string).
    pub const HANDLE: &str = "handle";
    /// Byte offset into the document (non-negative integer).
    pub const OFFSET: &str = "offset";
    /// Maximum number of bytes to return (non-negative integer).
    pub const LENGTH: &str = "length";
    /// Whether the picker allows more than one selection (bool).
    pub const ALLOW_MULTIPLE: &str = "allowMultiple";
}

// ============================================================================
// Documents
// ============================================================================

/// Opaque, host-issued reference to a permission-scoped document.
///
/// The bridge never interprets the string; it is handed back to the host
/// verbatim for every query or read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentHandle(String);

impl DocumentHandle {
    /// Wrap a host-issued handle string.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The raw handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DocumentHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DocumentHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Display metadata for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Display name, or [`UNKNOWN_DOCUMENT_NAME`] when unresolvable.
    pub name: String,
    /// Size in bytes, or 0 when unresolvable.
    pub size_bytes: u64,
}

/// A requested slice of a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// Number of bytes to skip from the start of the document.
    pub offset: u64,
    /// Maximum number of bytes to return.
    pub length: u32,
}

impl ByteRange {
    /// Create a new byte range.
    pub fn new(offset: u64, length: u32) -> Self {
        Self { offset, length }
    }
}

// ============================================================================
// Calls
// ============================================================================

/// Methods recognized by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Present the host document picker.
    PickDocuments,
    /// Resolve display name and size for a handle.
    GetMetadata,
    /// Read a document in full.
    ReadAll,
    /// Read an explicit byte range of a document.
    ReadRange,
}

impl Method {
    /// All methods, in protocol order.
    pub const ALL: [Method; 4] = [
        Method::PickDocuments,
        Method::GetMetadata,
        Method::ReadAll,
        Method::ReadRange,
    ];

    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::PickDocuments => "pickDocuments",
            Method::GetMetadata => "getMetadata",
            Method::ReadAll => "readAll",
            Method::ReadRange => "readRange",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMethod(s.to_string()))
    }
}

/// A named call with its argument map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Method name as sent by the caller.
    pub method: String,
    /// Named arguments; strings for handles, integers for offsets and
    /// lengths, booleans for flags.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl MethodCall {
    /// Create a call to a known method with no arguments.
    pub fn new(method: Method) -> Self {
        Self::named(method.as_str())
    }

    /// Create a call by raw method name.
    pub fn named(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Map::new(),
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.to_string(), value.into());
        self
    }

    /// `pickDocuments`, optionally overriding the multi-select default.
    pub fn pick_documents(allow_multiple: Option<bool>) -> Self {
        let call = Self::new(Method::PickDocuments);
        match allow_multiple {
            Some(flag) => call.with_arg(args::ALLOW_MULTIPLE, flag),
            None => call,
        }
    }

    /// `getMetadata` for a handle.
    pub fn get_metadata(handle: &DocumentHandle) -> Self {
        Self::new(Method::GetMetadata).with_arg(args::HANDLE, handle.as_str())
    }

    /// `readAll` for a handle.
    pub fn read_all(handle: &DocumentHandle) -> Self {
        Self::new(Method::ReadAll).with_arg(args::HANDLE, handle.as_str())
    }

    /// `readRange` for a handle.
    pub fn read_range(handle: &DocumentHandle, range: ByteRange) -> Self {
        Self::new(Method::ReadRange)
            .with_arg(args::HANDLE, handle.as_str())
            .with_arg(args::OFFSET, range.offset)
            .with_arg(args::LENGTH, range.length)
    }

    /// Parse the method name.
    pub fn method(&self) -> Result<Method> {
        self.method.parse()
    }

    /// Look up an argument, treating JSON `null` as absent.
    fn arg(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|v| !v.is_null())
    }

    /// String argument.
    pub fn string_arg(&self, name: &str) -> Result<Option<&str>> {
        match self.arg(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(invalid(name, "a string")),
        }
    }

    /// Non-negative integer argument.
    pub fn u64_arg(&self, name: &str) -> Result<Option<u64>> {
        match self.arg(name) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(Some)
                .ok_or_else(|| invalid(name, "a non-negative integer")),
        }
    }

    /// Non-negative integer argument that must fit in 32 bits.
    pub fn u32_arg(&self, name: &str) -> Result<Option<u32>> {
        match self.u64_arg(name)? {
            None => Ok(None),
            Some(v) => u32::try_from(v)
                .map(Some)
                .map_err(|_| invalid(name, "an integer no larger than 4294967295")),
        }
    }

    /// Boolean argument.
    pub fn bool_arg(&self, name: &str) -> Result<Option<bool>> {
        match self.arg(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(invalid(name, "a boolean")),
        }
    }

    /// The `handle` argument. An empty string counts as absent.
    pub fn handle_arg(&self) -> Result<Option<DocumentHandle>> {
        Ok(self
            .string_arg(args::HANDLE)?
            .filter(|s| !s.is_empty())
            .map(DocumentHandle::new))
    }
}

fn invalid(name: &str, expected: &'static str) -> ProtocolError {
    ProtocolError::InvalidArgument {
        name: name.to_string(),
        expected,
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Success value of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Payload {
    /// Ordered handles chosen by the user; empty when the picker was cancelled.
    Handles(Vec<DocumentHandle>),
    /// Resolved document metadata.
    Metadata(DocumentMetadata),
    /// Full document content.
    Bytes(#[serde(with = "bytes_encoding")] Vec<u8>),
    /// A ranged read; `None` signals end of data.
    Chunk(#[serde(with = "bytes_encoding::option")] Option<Vec<u8>>),
}

/// Failure categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// A required handle argument was omitted.
    MissingHandle,
    /// The host could not resolve metadata for the handle.
    QueryFailed,
    /// The document stream could not be opened or read in full.
    ReadFailed,
    /// I/O fault while opening, skipping or reading a ranged stream.
    StreamError,
    /// A picker request is already outstanding on this bridge.
    AlreadyPending,
    /// The host surface refused to present the picker.
    PickerUnavailable,
    /// An argument was present with the wrong type or range.
    InvalidArgument,
    /// The method name is not recognized.
    NotImplemented,
}

impl FailureKind {
    /// Stable string form of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MissingHandle => "MissingHandle",
            FailureKind::QueryFailed => "QueryFailed",
            FailureKind::ReadFailed => "ReadFailed",
            FailureKind::StreamError => "StreamError",
            FailureKind::AlreadyPending => "AlreadyPending",
            FailureKind::PickerUnavailable => "PickerUnavailable",
            FailureKind::InvalidArgument => "InvalidArgument",
            FailureKind::NotImplemented => "NotImplemented",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure category for programmatic handling.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
}

impl Failure {
    /// Create a new failure.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

impl From<ProtocolError> for Failure {
    fn from(err: ProtocolError) -> Self {
        let kind = match err {
            ProtocolError::UnknownMethod(_) => FailureKind::NotImplemented,
            _ => FailureKind::InvalidArgument,
        };
        Failure::new(kind, err.to_string())
    }
}

/// Exactly one of these is produced per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result")]
pub enum Response {
    /// The call succeeded.
    Success(Payload),
    /// The call failed.
    Failure(Failure),
}

impl Response {
    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    /// Convert into a standard result.
    pub fn into_result(self) -> std::result::Result<Payload, Failure> {
        match self {
            Response::Success(payload) => Ok(payload),
            Response::Failure(failure) => Err(failure),
        }
    }
}

impl From<std::result::Result<Payload, Failure>> for Response {
    fn from(result: std::result::Result<Payload, Failure>) -> Self {
        match result {
            Ok(payload) => Response::Success(payload),
            Err(failure) => Response::Failure(failure),
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// What an envelope carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Body {
    /// A call from the caller.
    Request(MethodCall),
    /// The bridge's answer to the call with the same id.
    Reply(Response),
}

/// Envelope wrapper for every message on the call channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version for compatibility checking.
    pub version: u8,
    /// Call id; a reply carries the id of its request.
    pub id: u64,
    /// The message itself.
    pub body: Body,
}

impl Envelope {
    /// Wrap a request.
    pub fn request(id: u64, call: MethodCall) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id,
            body: Body::Request(call),
        }
    }

    /// Wrap a reply.
    pub fn reply(id: u64, response: Response) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id,
            body: Body::Reply(response),
        }
    }

    fn check_version(self) -> Result<Self> {
        if self.version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                got: self.version,
            });
        }
        Ok(self)
    }

    /// Serialize to a single JSON line (newline appended).
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse a JSON envelope, rejecting other protocol versions.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_json_bytes(text.as_bytes())
    }

    /// Parse a JSON envelope from raw line bytes. Bytes that are not UTF-8
    /// are a decode error like any other malformed input.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(bytes.trim_ascii())?;
        envelope.check_version()
    }

    /// Serialize the envelope to MessagePack bytes.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = rmp_serde::from_slice(bytes)?;
        envelope.check_version()
    }
}

// ============================================================================
// Serialization helpers
// ============================================================================

/// Byte payload encoding: base64 text for human-readable formats, native
/// binary otherwise.
pub mod bytes_encoding {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(bytes))
        } else {
            serde_bytes::serialize(bytes, serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            STANDARD.decode(text.as_bytes()).map_err(D::Error::custom)
        } else {
            serde_bytes::ByteBuf::deserialize(deserializer).map(serde_bytes::ByteBuf::into_vec)
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        struct Encoded<'a>(&'a [u8]);

        impl Serialize for Encoded<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                super::serialize(self.0, serializer)
            }
        }

        struct Decoded(Vec<u8>);

        impl<'de> Deserialize<'de> for Decoded {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                super::deserialize(deserializer).map(Decoded)
            }
        }

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => serializer.serialize_some(&Encoded(b)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Ok(Option::<Decoded>::deserialize(deserializer)?.map(|d| d.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names() {
        assert_eq!(Method::PickDocuments.as_str(), "pickDocuments");
        assert_eq!("readRange".parse::<Method>().unwrap(), Method::ReadRange);
        assert!(matches!(
            "readSafChunk".parse::<Method>(),
            Err(ProtocolError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_read_range_call_arguments() {
        let handle = DocumentHandle::new("doc://42");
        let call = MethodCall::read_range(&handle, ByteRange::new(512, 512));

        assert_eq!(call.method().unwrap(), Method::ReadRange);
        assert_eq!(call.handle_arg().unwrap(), Some(handle));
        assert_eq!(call.u64_arg(args::OFFSET).unwrap(), Some(512));
        assert_eq!(call.u32_arg(args::LENGTH).unwrap(), Some(512));
    }

    #[test]
    fn test_missing_and_null_arguments_are_absent() {
        let call = MethodCall::new(Method::GetMetadata).with_arg(args::HANDLE, Value::Null);
        assert_eq!(call.handle_arg().unwrap(), None);
        assert_eq!(call.u64_arg(args::OFFSET).unwrap(), None);
        assert_eq!(call.bool_arg(args::ALLOW_MULTIPLE).unwrap(), None);
    }

    #[test]
    fn test_empty_handle_is_absent() {
        let call = MethodCall::new(Method::ReadAll).with_arg(args::HANDLE, "");
        assert_eq!(call.handle_arg().unwrap(), None);
    }

    #[test]
    fn test_wrong_argument_types_rejected() {
        let call = MethodCall::new(Method::ReadRange)
            .with_arg(args::HANDLE, 42)
            .with_arg(args::OFFSET, -1)
            .with_arg(args::LENGTH, u64::from(u32::MAX) + 1)
            .with_arg(args::ALLOW_MULTIPLE, "yes");

        assert!(matches!(
            call.handle_arg(),
            Err(ProtocolError::InvalidArgument { .. })
        ));
        assert!(matches!(
            call.u64_arg(args::OFFSET),
            Err(ProtocolError::InvalidArgument { .. })
        ));
        assert!(matches!(
            call.u32_arg(args::LENGTH),
            Err(ProtocolError::InvalidArgument { .. })
        ));
        assert!(matches!(
            call.bool_arg(args::ALLOW_MULTIPLE),
            Err(ProtocolError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_call_parses_from_plain_json() {
        let call: MethodCall = serde_json::from_value(json!({
            "method": "pickDocuments",
            "arguments": { "allowMultiple": true }
        }))
        .unwrap();
        assert_eq!(call.method().unwrap(), Method::PickDocuments);
        assert_eq!(call.bool_arg(args::ALLOW_MULTIPLE).unwrap(), Some(true));

        let bare: MethodCall = serde_json::from_value(json!({ "method": "readAll" })).unwrap();
        assert!(bare.arguments.is_empty());
    }

    #[test]
    fn test_metadata_json_field_names() {
        let metadata = DocumentMetadata {
            name: "report.pdf".to_string(),
            size_bytes: 1024,
        };
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value, json!({ "name": "report.pdf", "sizeBytes": 1024 }));
    }

    #[test]
    fn test_handles_serialize_as_plain_strings() {
        let payload = Payload::Handles(vec![
            DocumentHandle::new("doc://1"),
            DocumentHandle::new("doc://2"),
        ]);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({ "type": "Handles", "value": ["doc://1", "doc://2"] })
        );
    }

    #[test]
    fn test_bytes_are_base64_in_json() {
        let payload = Payload::Bytes(b"hello".to_vec());
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({ "type": "Bytes", "value": "aGVsbG8=" }));

        let decoded: Payload = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_end_of_data_chunk_is_null_in_json() {
        let value = serde_json::to_value(Payload::Chunk(None)).unwrap();
        assert_eq!(value, json!({ "type": "Chunk", "value": null }));

        let decoded: Payload = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, Payload::Chunk(None));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result =
            serde_json::from_value::<Payload>(json!({ "type": "Bytes", "value": "***" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_envelope_msgpack() {
        let data: Vec<u8> = (0..=255).collect();
        let envelope = Envelope::reply(9, Response::Success(Payload::Chunk(Some(data.clone()))));

        let bytes = envelope.to_msgpack().unwrap();
        // Native binary: the 256 payload bytes are not inflated by base64.
        assert!(bytes.len() < 256 + 64);

        let decoded = Envelope::from_msgpack(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_failure_reply_json_line() {
        let envelope = Envelope::reply(
            3,
            Response::Failure(Failure::new(FailureKind::MissingHandle, "handle missing")),
        );
        let line = envelope.to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("MissingHandle"));

        let decoded = Envelope::from_json(&line).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_envelope_version_mismatch_rejected() {
        let mut envelope = Envelope::request(1, MethodCall::pick_documents(None));
        envelope.version = PROTOCOL_VERSION + 1;
        let line = serde_json::to_string(&envelope).unwrap();

        assert!(matches!(
            Envelope::from_json(&line),
            Err(ProtocolError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::new(FailureKind::QueryFailed, "no row for doc://7");
        assert_eq!(failure.to_string(), "QueryFailed: no row for doc://7");
    }

    #[test]
    fn test_protocol_error_to_failure_kind() {
        let unknown: Failure = ProtocolError::UnknownMethod("x".to_string()).into();
        assert_eq!(unknown.kind, FailureKind::NotImplemented);

        let bad: Failure = ProtocolError::InvalidArgument {
            name: "offset".to_string(),
            expected: "a non-negative integer",
        }
        .into();
        assert_eq!(bad.kind, FailureKind::InvalidArgument);
    }
}
