//! Bridge error type and its mapping onto wire failures.

use protocol::{Failure, FailureKind, ProtocolError};
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised by the bridge components.
///
/// Cancellation and unresolvable metadata fields are not errors; they are
/// reported through the success value.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The caller omitted the handle argument.
    #[error("handle argument is missing")]
    MissingHandle,

    /// The host returned no metadata row, or the query itself failed.
    #[error("cannot resolve metadata for {handle}: {reason}")]
    QueryFailed { handle: String, reason: String },

    /// The stream for a full read could not be opened or read.
    #[error("cannot read {handle}: {reason}")]
    ReadFailed { handle: String, reason: String },

    /// I/O fault during a ranged read.
    #[error("stream error on {handle}: {reason}")]
    StreamError { handle: String, reason: String },

    /// A picker request is already outstanding.
    #[error("a document picker request is already pending")]
    AlreadyPending,

    /// The host surface refused to present the picker.
    #[error("document picker unavailable: {0}")]
    PickerUnavailable(String),

    /// The pending picker slot was dropped without a completion.
    #[error("document picker request was abandoned")]
    PickerAbandoned,

    /// Malformed call.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// The wire failure kind for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            BridgeError::MissingHandle => FailureKind::MissingHandle,
            BridgeError::QueryFailed { .. } => FailureKind::QueryFailed,
            BridgeError::ReadFailed { .. } => FailureKind::ReadFailed,
            BridgeError::StreamError { .. } => FailureKind::StreamError,
            BridgeError::AlreadyPending => FailureKind::AlreadyPending,
            BridgeError::PickerUnavailable(_) | BridgeError::PickerAbandoned => {
                FailureKind::PickerUnavailable
            }
            BridgeError::Protocol(ProtocolError::UnknownMethod(_)) => FailureKind::NotImplemented,
            BridgeError::Protocol(_) => FailureKind::InvalidArgument,
        }
    }

    /// Convert the error to a wire failure.
    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

impl From<BridgeError> for Failure {
    fn from(err: BridgeError) -> Self {
        err.to_failure()
    }
}
