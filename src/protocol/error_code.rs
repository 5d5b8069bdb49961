//! Error code space carried in ERROR frame bodies.
//!
//! Known codes decode into named variants; anything else is kept verbatim in
//! [`ErrorCode::Other`] so it survives a decode/encode cycle unchanged.

use std::fmt;

/// Error code of an ERROR frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 0x00000001 - setup frame is invalid for the server.
    InvalidSetup,
    /// 0x00000002 - some setup parameters are not supported.
    UnsupportedSetup,
    /// 0x00000003 - server rejected the setup.
    RejectedSetup,
    /// 0x00000004 - server rejected the resume.
    RejectedResume,
    /// 0x00000101 - connection is being terminated.
    ConnectionError,
    /// 0x00000102 - connection is being closed gracefully.
    ConnectionClose,
    /// 0x00000201 - application layer failure.
    ApplicationError,
    /// 0x00000202 - request rejected before processing.
    Rejected,
    /// 0x00000203 - responder canceled the request.
    Canceled,
    /// 0x00000204 - request is invalid.
    Invalid,
    /// Any other code, including the custom range.
    Other(u32),
}

impl ErrorCode {
    /// Lowest code of the application-defined range.
    pub const MIN_CUSTOM: u32 = 0x0000_0301;
    /// Highest code of the application-defined range.
    pub const MAX_CUSTOM: u32 = 0xFFFF_FFFE;

    /// Numeric wire value.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::InvalidSetup => 0x0000_0001,
            Self::UnsupportedSetup => 0x0000_0002,
            Self::RejectedSetup => 0x0000_0003,
            Self::RejectedResume => 0x0000_0004,
            Self::ConnectionError => 0x0000_0101,
            Self::ConnectionClose => 0x0000_0102,
            Self::ApplicationError => 0x0000_0201,
            Self::Rejected => 0x0000_0202,
            Self::Canceled => 0x0000_0203,
            Self::Invalid => 0x0000_0204,
            Self::Other(code) => code,
        }
    }

    /// Codes only valid on stream 0.
    pub fn is_connection_scoped(self) -> bool {
        matches!(
            self,
            Self::InvalidSetup
                | Self::UnsupportedSetup
                | Self::RejectedSetup
                | Self::RejectedResume
                | Self::ConnectionError
                | Self::ConnectionClose
        )
    }

    /// Whether the code lies in the application-defined range.
    pub fn is_custom(self) -> bool {
        (Self::MIN_CUSTOM..=Self::MAX_CUSTOM).contains(&self.as_u32())
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            0x0000_0001 => Self::InvalidSetup,
            0x0000_0002 => Self::UnsupportedSetup,
            0x0000_0003 => Self::RejectedSetup,
            0x0000_0004 => Self::RejectedResume,
            0x0000_0101 => Self::ConnectionError,
            0x0000_0102 => Self::ConnectionClose,
            0x0000_0201 => Self::ApplicationError,
            0x0000_0202 => Self::Rejected,
            0x0000_0203 => Self::Canceled,
            0x0000_0204 => Self::Invalid,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code.as_u32()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "0x{code:08X}"),
            known => write!(f, "{known:?}"),
        }
    }
}
