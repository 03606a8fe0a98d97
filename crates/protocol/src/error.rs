//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering encoding and argument decoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Serialization errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Envelope errors
    /// Envelope was produced by an incompatible protocol version.
    #[error("unsupported protocol version: expected {expected}, got {got}")]
    UnsupportedVersion {
        /// Version this build speaks.
        expected: u8,
        /// Version found in the envelope.
        got: u8,
    },

    // Argument errors
    /// A call argument is present but has the wrong shape.
    #[error("invalid argument `{name}`: expected {expected}")]
    InvalidArgument {
        /// Argument name.
        name: String,
        /// Human-readable description of the accepted shape.
        expected: &'static str,
    },

    /// The method name is not part of the protocol.
    #[error("unknown method: {0}")]
    UnknownMethod(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ProtocolError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ProtocolError::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_display() {
        let err = ProtocolError::Serialization("invalid utf-8".to_string());
        assert_eq!(err.to_string(), "serialization failed: invalid utf-8");
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = ProtocolError::UnsupportedVersion {
            expected: 1,
            got: 7,
        };
        assert_eq!(
            err.to_string(),
            "unsupported protocol version: expected 1, got 7"
        );
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = ProtocolError::InvalidArgument {
            name: "offset".to_string(),
            expected: "a non-negative integer",
        };
        assert_eq!(
            err.to_string(),
            "invalid argument `offset`: expected a non-negative integer"
        );
    }

    #[test]
    fn test_unknown_method_display() {
        let err = ProtocolError::UnknownMethod("pickFilesSaf".to_string());
        assert_eq!(err.to_string(), "unknown method: pickFilesSaf");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let protocol_err: ProtocolError = json_err.into();
        assert!(matches!(protocol_err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_from_rmp_serde_decode_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct TestStruct {
            field: String,
        }
        let msgpack_err = rmp_serde::from_slice::<TestStruct>(&[0x00]).unwrap_err();
        let protocol_err: ProtocolError = msgpack_err.into();
        assert!(matches!(protocol_err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProtocolError>();
    }
}
