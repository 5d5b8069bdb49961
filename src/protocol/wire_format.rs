//! Wire format encoding and decoding of the frame header.
//!
//! Implements the 6-byte header:
//! ```text
//! ┌───────────┬────────┬────────────┐
//! │ Stream ID │ Type   │ Flags      │
//! │ 4 bytes   │ 6 bits │ 10 bits    │
//! │ uint32 BE │ uint16 BE (packed)  │
//! └───────────┴─────────────────────┘
//! ```
//!
//! For byte-stream transports every frame is additionally preceded by a
//! 3-byte (uint24 BE) length prefix, see [`FRAME_LENGTH_SIZE`].
//!
//! All multi-byte integers are Big Endian.

use crate::error::{DecodeError, RSocketError, Result};

/// Header size in bytes (stream id + type/flags).
pub const HEADER_SIZE: usize = 6;

/// Size of the length prefix used on byte-stream transports.
pub const FRAME_LENGTH_SIZE: usize = 3;

/// Size of a metadata length field.
pub const METADATA_LENGTH_SIZE: usize = 3;

/// Largest value representable in 24 bits.
pub const MAX_U24: usize = 0x00FF_FFFF;

/// Largest valid stream id (31 bits).
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Largest requestN / lease count (31 bits, positive i32).
pub const MAX_REQUEST_N: u32 = 0x7FFF_FFFF;

/// Stream id reserved for connection-scoped frames.
pub const CONNECTION_STREAM_ID: u32 = 0;

const FRAME_TYPE_SHIFT: u16 = 10;
const FLAGS_MASK: u16 = 0x03FF;

/// Flag constants for the protocol (lower 10 bits of the type/flags field).
pub mod flags {
    /// (I)gnore: frame may be ignored if not understood.
    pub const IGNORE: u16 = 0b10_0000_0000;
    /// (M)etadata present.
    pub const METADATA: u16 = 0b01_0000_0000;
    /// (F)ollows: more fragments of this payload follow.
    pub const FOLLOWS: u16 = 0b00_1000_0000;
    /// (C)omplete: stream completion.
    pub const COMPLETE: u16 = 0b00_0100_0000;
    /// (N)ext: frame carries a payload item.
    pub const NEXT: u16 = 0b00_0010_0000;
    /// (R)esume enable, SETUP only.
    pub const RESUME_ENABLE: u16 = 0b00_1000_0000;
    /// (L)ease, SETUP only.
    pub const LEASE: u16 = 0b00_0100_0000;
    /// (R)espond, KEEPALIVE only.
    pub const RESPOND: u16 = 0b00_1000_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u16, flag: u16) -> bool {
        flags & flag != 0
    }
}

/// Frame type (upper 6 bits of the type/flags field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Reserved,
    Setup,
    Lease,
    KeepAlive,
    RequestResponse,
    RequestFnF,
    RequestStream,
    RequestChannel,
    RequestN,
    Cancel,
    Payload,
    Error,
    MetadataPush,
    Resume,
    ResumeOk,
    Extension,
}

impl FrameType {
    /// Numeric 6-bit encoding.
    pub fn encoded(self) -> u8 {
        match self {
            Self::Reserved => 0x00,
            Self::Setup => 0x01,
            Self::Lease => 0x02,
            Self::KeepAlive => 0x03,
            Self::RequestResponse => 0x04,
            Self::RequestFnF => 0x05,
            Self::RequestStream => 0x06,
            Self::RequestChannel => 0x07,
            Self::RequestN => 0x08,
            Self::Cancel => 0x09,
            Self::Payload => 0x0A,
            Self::Error => 0x0B,
            Self::MetadataPush => 0x0C,
            Self::Resume => 0x0D,
            Self::ResumeOk => 0x0E,
            Self::Extension => 0x3F,
        }
    }

    /// Parse the 6-bit encoding.
    pub fn from_encoded(value: u8) -> std::result::Result<Self, DecodeError> {
        Ok(match value {
            0x00 => Self::Reserved,
            0x01 => Self::Setup,
            0x02 => Self::Lease,
            0x03 => Self::KeepAlive,
            0x04 => Self::RequestResponse,
            0x05 => Self::RequestFnF,
            0x06 => Self::RequestStream,
            0x07 => Self::RequestChannel,
            0x08 => Self::RequestN,
            0x09 => Self::Cancel,
            0x0A => Self::Payload,
            0x0B => Self::Error,
            0x0C => Self::MetadataPush,
            0x0D => Self::Resume,
            0x0E => Self::ResumeOk,
            0x3F => Self::Extension,
            other => return Err(DecodeError::UnknownType(other)),
        })
    }

    /// Whether the body format of this type supports metadata.
    pub fn can_have_metadata(self) -> bool {
        matches!(
            self,
            Self::Setup
                | Self::Lease
                | Self::RequestResponse
                | Self::RequestFnF
                | Self::RequestStream
                | Self::RequestChannel
                | Self::Payload
                | Self::MetadataPush
                | Self::Extension
        )
    }

    /// Whether payloads of this type may be split into fragments.
    pub fn is_fragmentable(self) -> bool {
        matches!(
            self,
            Self::RequestResponse
                | Self::RequestFnF
                | Self::RequestStream
                | Self::RequestChannel
                | Self::Payload
        )
    }

    /// Whether this type opens a new stream.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::RequestResponse | Self::RequestFnF | Self::RequestStream | Self::RequestChannel
        )
    }

    /// Whether the body starts with an initial requestN field.
    pub fn has_initial_request(self) -> bool {
        matches!(self, Self::RequestStream | Self::RequestChannel)
    }

    /// Whether frames of this type are only valid on stream 0.
    pub fn is_connection_scoped(self) -> bool {
        matches!(
            self,
            Self::Setup
                | Self::Lease
                | Self::KeepAlive
                | Self::MetadataPush
                | Self::Resume
                | Self::ResumeOk
        )
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Stream identifier (0 = connection).
    pub stream_id: u32,
    /// Frame type.
    pub frame_type: FrameType,
    /// Flags (10 bits, see `flags` module).
    pub flags: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(stream_id: u32, frame_type: FrameType, flags: u16) -> Self {
        Self {
            stream_id,
            frame_type,
            flags,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// Fails if the metadata flag is set on a type that cannot carry
    /// metadata, or if the type is `Reserved`.
    ///
    /// # Example
    ///
    /// ```
    /// use rsocket_mux::protocol::{Header, FrameType};
    ///
    /// let header = Header::new(1, FrameType::RequestN, 0);
    /// let bytes = header.encode().unwrap();
    /// assert_eq!(bytes, [0, 0, 0, 1, 0x20, 0x00]);
    /// ```
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (6 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        self.validate()?;
        let type_and_flags =
            (u16::from(self.frame_type.encoded()) << FRAME_TYPE_SHIFT) | (self.flags & FLAGS_MASK);
        buf[0..4].copy_from_slice(&self.stream_id.to_be_bytes());
        buf[4..6].copy_from_slice(&type_and_flags.to_be_bytes());
        Ok(())
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use rsocket_mux::protocol::{Header, FrameType};
    ///
    /// let header = Header::decode(&[0, 0, 0, 1, 0x2C, 0x00]).unwrap();
    /// assert_eq!(header.stream_id, 1);
    /// assert_eq!(header.frame_type, FrameType::Error);
    /// ```
    pub fn decode(buf: &[u8]) -> std::result::Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort {
                field: "header",
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }
        let stream_id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let type_and_flags = u16::from_be_bytes([buf[4], buf[5]]);
        let frame_type = FrameType::from_encoded((type_and_flags >> FRAME_TYPE_SHIFT) as u8)?;
        let header = Self {
            stream_id,
            frame_type,
            flags: type_and_flags & FLAGS_MASK,
        };

        if header.frame_type == FrameType::Reserved {
            return Err(DecodeError::ReservedType);
        }
        if header.has_metadata() && !header.frame_type.can_have_metadata() {
            return Err(DecodeError::MetadataNotAllowed(header.frame_type));
        }
        Ok(header)
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Type is not `Reserved`
    /// - Metadata flag only on types that support metadata
    pub fn validate(&self) -> Result<()> {
        if self.frame_type == FrameType::Reserved {
            return Err(RSocketError::Invalid(
                "Reserved frame type must not be encoded".to_string(),
            ));
        }
        if self.has_metadata() && !self.frame_type.can_have_metadata() {
            return Err(RSocketError::Invalid(format!(
                "Metadata flag not allowed on {:?} frame",
                self.frame_type
            )));
        }
        Ok(())
    }

    /// Check if the metadata flag is set.
    #[inline]
    pub fn has_metadata(&self) -> bool {
        flags::has_flag(self.flags, flags::METADATA)
    }

    /// Check if the ignore flag is set.
    #[inline]
    pub fn is_ignorable(&self) -> bool {
        flags::has_flag(self.flags, flags::IGNORE)
    }

    /// Check if this header addresses the connection (stream 0).
    #[inline]
    pub fn is_connection_scoped(&self) -> bool {
        self.stream_id == CONNECTION_STREAM_ID
    }
}

/// Render flags as a fixed-width binary string, e.g. `0b0100100000`.
pub(crate) fn flags_to_binary(flags: u16) -> String {
    format!("0b{:010b}", flags & FLAGS_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(7, FrameType::Payload, flags::NEXT | flags::COMPLETE);
        let encoded = original.encode().unwrap();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(0x0102_0304, FrameType::Error, 0);
        let bytes = header.encode().unwrap();

        // Stream ID: 0x01020304 in BE
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);

        // Type 0x0B shifted left by 10 = 0x2C00
        assert_eq!(bytes[4], 0x2C);
        assert_eq!(bytes[5], 0x00);
    }

    #[test]
    fn test_flags_occupy_lower_ten_bits() {
        let header = Header::new(0, FrameType::KeepAlive, flags::RESPOND);
        let bytes = header.encode().unwrap();
        // 0x03 << 10 | 0x80 = 0x0C80
        assert_eq!(bytes[4], 0x0C);
        assert_eq!(bytes[5], 0x80);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 5];
        assert!(matches!(
            Header::decode(&buf),
            Err(DecodeError::TooShort { needed: 6, .. })
        ));
    }

    #[test]
    fn test_metadata_flag_rejected_on_encode() {
        for frame_type in [
            FrameType::KeepAlive,
            FrameType::RequestN,
            FrameType::Cancel,
            FrameType::Error,
            FrameType::Resume,
            FrameType::ResumeOk,
        ] {
            let header = Header::new(1, frame_type, flags::METADATA);
            let result = header.encode();
            assert!(result.is_err(), "{frame_type:?} accepted metadata flag");
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("Metadata flag not allowed"));
        }
    }

    #[test]
    fn test_metadata_flag_rejected_on_decode() {
        // KeepAlive (0x03 << 10) with metadata flag 0x100 => 0x0D00
        let bytes = [0, 0, 0, 0, 0x0D, 0x00];
        assert_eq!(
            Header::decode(&bytes),
            Err(DecodeError::MetadataNotAllowed(FrameType::KeepAlive))
        );
    }

    #[test]
    fn test_reserved_type_rejected() {
        assert_eq!(
            Header::decode(&[0, 0, 0, 1, 0x00, 0x00]),
            Err(DecodeError::ReservedType)
        );
        assert!(Header::new(1, FrameType::Reserved, 0).encode().is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        // type 0x10 << 10 = 0x4000
        assert_eq!(
            Header::decode(&[0, 0, 0, 1, 0x40, 0x00]),
            Err(DecodeError::UnknownType(0x10))
        );
    }

    #[test]
    fn test_frame_type_encoding_is_bijective() {
        for value in 0u8..=0x3F {
            if let Ok(frame_type) = FrameType::from_encoded(value) {
                assert_eq!(frame_type.encoded(), value);
            }
        }
    }

    #[test]
    fn test_frame_type_capabilities() {
        assert!(FrameType::RequestStream.has_initial_request());
        assert!(FrameType::RequestChannel.has_initial_request());
        assert!(!FrameType::RequestResponse.has_initial_request());
        assert!(FrameType::Payload.is_fragmentable());
        assert!(!FrameType::Error.is_fragmentable());
        assert!(FrameType::RequestFnF.is_request());
        assert!(!FrameType::Payload.is_request());
    }

    #[test]
    fn test_flags_to_binary() {
        assert_eq!(flags_to_binary(flags::METADATA), "0b0100000000");
        assert_eq!(flags_to_binary(flags::NEXT | flags::COMPLETE), "0b0001100000");
    }
}
