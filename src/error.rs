//! Error types for rsocket-mux.
//!
//! [`RSocketError`] covers both the wire error-code space (anything that can
//! travel inside an ERROR frame) and purely local conditions such as lease
//! exhaustion or a closed connection. [`DecodeError`] describes malformed
//! frame bytes and is always fatal to the connection.

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::{ErrorCode, FrameType};

/// Reasons a byte buffer could not be decoded into a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not enough bytes for a fixed-size field.
    #[error("frame too short: need {needed} bytes for {field}, {available} available")]
    TooShort {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    /// Frame type value outside the known enumeration.
    #[error("unknown frame type 0x{0:02X}")]
    UnknownType(u8),

    /// The reserved frame type (0x00) must never appear on the wire.
    #[error("reserved frame type")]
    ReservedType,

    /// Metadata flag set on a frame type whose body cannot carry metadata.
    #[error("metadata flag not allowed on {0:?} frame")]
    MetadataNotAllowed(FrameType),

    /// Advertised metadata length runs past the end of the frame.
    #[error("metadata length {declared} exceeds remaining {remaining} bytes")]
    MetadataLength { declared: usize, remaining: usize },

    /// Frame length prefix is zero or larger than the configured maximum.
    #[error("invalid frame length {length} (max {max})")]
    FrameLength { length: usize, max: usize },

    /// A length-prefixed ASCII field (mime type) is not ASCII.
    #[error("{0} is not valid ASCII")]
    NotAscii(&'static str),

    /// A text field is not valid UTF-8.
    #[error("{0} is not valid UTF-8")]
    NotUtf8(&'static str),

    /// A connection-level frame carried a non-zero stream id.
    #[error("{frame_type:?} frame must use stream 0, got stream {stream_id}")]
    UnexpectedStreamId { frame_type: FrameType, stream_id: u32 },
}

/// Main error type for all rsocket operations.
#[derive(Debug, Clone, Error)]
pub enum RSocketError {
    /// Setup frame was malformed or carried invalid values.
    #[error("Invalid setup: {0}")]
    InvalidSetup(String),

    /// Setup parameters are valid but not supported by the server.
    #[error("Unsupported setup: {0}")]
    UnsupportedSetup(String),

    /// Server refused the connection.
    #[error("Rejected setup: {0}")]
    RejectedSetup(String),

    /// Server refused a resumption attempt.
    #[error("Rejected resume: {0}")]
    RejectedResume(String),

    /// Connection-fatal failure (protocol violation, keepalive timeout, ...).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Peer is closing the connection gracefully.
    #[error("Connection close: {0}")]
    ConnectionClose(String),

    /// Failure raised by application handler logic.
    #[error("Application error: {0}")]
    ApplicationError(String),

    /// Request refused by the responder without being processed.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Request was canceled.
    #[error("Canceled: {0}")]
    Canceled(String),

    /// Request was invalid.
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Application-defined error code from the custom range.
    #[error("Custom error 0x{code:08X}: {message}")]
    Custom { code: u32, message: String },

    /// No lease allowance remains for a new request (local only).
    #[error("Lease exhausted")]
    LeaseExhausted,

    /// The connection is closed; no further frames can be sent.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed frame bytes.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Payload (de)serialization failure.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),
}

impl RSocketError {
    /// Build an error from the code and message of a received ERROR frame.
    pub fn from_error_frame(code: ErrorCode, message: String) -> Self {
        match code {
            ErrorCode::InvalidSetup => Self::InvalidSetup(message),
            ErrorCode::UnsupportedSetup => Self::UnsupportedSetup(message),
            ErrorCode::RejectedSetup => Self::RejectedSetup(message),
            ErrorCode::RejectedResume => Self::RejectedResume(message),
            ErrorCode::ConnectionError => Self::ConnectionError(message),
            ErrorCode::ConnectionClose => Self::ConnectionClose(message),
            ErrorCode::ApplicationError => Self::ApplicationError(message),
            ErrorCode::Rejected => Self::Rejected(message),
            ErrorCode::Canceled => Self::Canceled(message),
            ErrorCode::Invalid => Self::Invalid(message),
            ErrorCode::Other(code) => Self::Custom { code, message },
        }
    }

    /// Error code used when this error has to be reported in an ERROR frame.
    ///
    /// Local conditions without a wire representation map to
    /// `APPLICATION_ERROR` when they are stream scoped.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidSetup(_) => ErrorCode::InvalidSetup,
            Self::UnsupportedSetup(_) => ErrorCode::UnsupportedSetup,
            Self::RejectedSetup(_) => ErrorCode::RejectedSetup,
            Self::RejectedResume(_) => ErrorCode::RejectedResume,
            Self::ConnectionError(_) | Self::Decode(_) | Self::Io(_) => {
                ErrorCode::ConnectionError
            }
            Self::ConnectionClose(_) | Self::ConnectionClosed => ErrorCode::ConnectionClose,
            Self::Rejected(_) | Self::LeaseExhausted => ErrorCode::Rejected,
            Self::Canceled(_) => ErrorCode::Canceled,
            Self::Invalid(_) => ErrorCode::Invalid,
            Self::Custom { code, .. } => ErrorCode::from(*code),
            Self::ApplicationError(_) | Self::Codec(_) | Self::Config(_) => {
                ErrorCode::ApplicationError
            }
        }
    }

    /// Message carried in an ERROR frame for this error.
    pub fn message(&self) -> String {
        match self {
            Self::InvalidSetup(m)
            | Self::UnsupportedSetup(m)
            | Self::RejectedSetup(m)
            | Self::RejectedResume(m)
            | Self::ConnectionError(m)
            | Self::ConnectionClose(m)
            | Self::ApplicationError(m)
            | Self::Rejected(m)
            | Self::Canceled(m)
            | Self::Invalid(m)
            | Self::Codec(m)
            | Self::Config(m) => m.clone(),
            Self::Custom { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this error terminates the whole connection.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidSetup(_)
                | Self::UnsupportedSetup(_)
                | Self::RejectedSetup(_)
                | Self::RejectedResume(_)
                | Self::ConnectionError(_)
                | Self::ConnectionClose(_)
                | Self::ConnectionClosed
                | Self::Decode(_)
                | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for RSocketError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<rmp_serde::encode::Error> for RSocketError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec(format!("MsgPack encode: {err}"))
    }
}

impl From<rmp_serde::decode::Error> for RSocketError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec(format!("MsgPack decode: {err}"))
    }
}

impl From<serde_json::Error> for RSocketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias using RSocketError.
pub type Result<T> = std::result::Result<T, RSocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_frame_mapping_is_lossless_for_known_codes() {
        let err = RSocketError::from_error_frame(ErrorCode::ApplicationError, "d".into());
        assert!(matches!(err, RSocketError::ApplicationError(ref m) if m == "d"));
        assert_eq!(err.error_code(), ErrorCode::ApplicationError);
        assert_eq!(err.message(), "d");
    }

    #[test]
    fn test_custom_code_passthrough() {
        let err = RSocketError::from_error_frame(ErrorCode::from(0x0000_0301), "custom".into());
        assert_eq!(err.error_code().as_u32(), 0x0000_0301);
        assert!(err.to_string().contains("00000301"));
    }

    #[test]
    fn test_connection_fatal_classification() {
        assert!(RSocketError::ConnectionError("x".into()).is_connection_fatal());
        assert!(RSocketError::from(DecodeError::ReservedType).is_connection_fatal());
        assert!(!RSocketError::ApplicationError("x".into()).is_connection_fatal());
        assert!(!RSocketError::LeaseExhausted.is_connection_fatal());
        assert!(!RSocketError::Canceled("x".into()).is_connection_fatal());
    }

    #[test]
    fn test_io_error_is_clone() {
        let err: RSocketError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        let cloned = err.clone();
        assert!(cloned.to_string().contains("gone"));
        assert_eq!(cloned.error_code(), ErrorCode::ConnectionError);
    }
}
