//! Protocol module - wire format, frame codec and framing helpers.
//!
//! - 6-byte header encoding/decoding and frame type/flag constants
//! - [`Frame`] enum with per-type bodies and a lossless binary codec
//! - [`FrameBuffer`] for 24-bit length-prefixed byte streams
//! - fragmentation of large payloads and bounded reassembly

mod error_code;
mod fragment;
mod frame;
mod frame_buffer;
mod wire_format;

pub use error_code::ErrorCode;
pub use fragment::{encoded_len, fragment, Reassembly, MIN_FRAGMENT_SIZE};
pub use frame::{
    CancelFrame, ErrorFrame, ExtensionFrame, Frame, KeepAliveFrame, LeaseFrame,
    MetadataPushFrame, RequestFrame, RequestNFrame, ResumeFrame, ResumeOkFrame, SetupFrame,
    Version,
};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, FrameType, Header, CONNECTION_STREAM_ID, FRAME_LENGTH_SIZE, HEADER_SIZE,
    MAX_REQUEST_N, MAX_STREAM_ID, MAX_U24, METADATA_LENGTH_SIZE,
};
