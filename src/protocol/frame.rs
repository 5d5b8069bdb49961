//! Frame types and the binary codec.
//!
//! [`Frame`] is a closed enum over every frame type. Each body owns its bytes
//! (`bytes::Bytes`) so decoding slices the received buffer without copying.
//!
//! # Example
//!
//! ```
//! use rsocket_mux::protocol::{ErrorCode, ErrorFrame, Frame};
//!
//! let frame = Frame::Error(ErrorFrame::new(1, ErrorCode::ApplicationError, "d"));
//! let bytes = frame.encode_with_length().unwrap();
//! assert_eq!(bytes.as_ref(), &[0, 0, 11, 0, 0, 0, 1, 0x2C, 0, 0, 0, 2, 1, 0x64]);
//!
//! let decoded = Frame::decode_with_length(bytes).unwrap();
//! assert_eq!(decoded, frame);
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error_code::ErrorCode;
use super::wire_format::{
    flags, flags_to_binary, FrameType, Header, CONNECTION_STREAM_ID, FRAME_LENGTH_SIZE,
    HEADER_SIZE, MAX_U24, METADATA_LENGTH_SIZE,
};
use crate::error::{DecodeError, RSocketError, Result};
use crate::payload::Payload;

/// Protocol version carried in SETUP and RESUME frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    /// Version 1.0, the only version this implementation speaks.
    pub const CURRENT: Version = Version { major: 1, minor: 0 };
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// SETUP: first frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFrame {
    pub version: Version,
    pub honor_lease: bool,
    /// Keepalive interval in milliseconds.
    pub keep_alive_interval: u32,
    /// Maximum time without keepalive in milliseconds.
    pub max_lifetime: u32,
    pub resume_token: Option<Bytes>,
    pub metadata_mime_type: String,
    pub data_mime_type: String,
    pub payload: Payload,
}

/// LEASE: grants the peer a number of requests for a time-to-live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseFrame {
    /// Validity of the lease in milliseconds.
    pub ttl: u32,
    pub number_of_requests: u32,
    pub metadata: Option<Bytes>,
}

/// KEEPALIVE: liveness probe, echoed when `respond` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveFrame {
    pub respond: bool,
    pub last_position: u64,
    pub data: Bytes,
}

/// Request-style frame: the four request types plus PAYLOAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub frame_type: FrameType,
    pub stream_id: u32,
    pub follows: bool,
    pub complete: bool,
    pub next: bool,
    /// Only meaningful for REQUEST_STREAM and REQUEST_CHANNEL.
    pub initial_request: u32,
    pub payload: Payload,
}

impl RequestFrame {
    fn new(frame_type: FrameType, stream_id: u32, payload: Payload) -> Self {
        Self {
            frame_type,
            stream_id,
            follows: false,
            complete: false,
            next: false,
            initial_request: 0,
            payload,
        }
    }

    /// REQUEST_RESPONSE frame.
    pub fn request_response(stream_id: u32, payload: Payload) -> Self {
        Self::new(FrameType::RequestResponse, stream_id, payload)
    }

    /// REQUEST_FNF frame.
    pub fn fire_and_forget(stream_id: u32, payload: Payload) -> Self {
        Self::new(FrameType::RequestFnF, stream_id, payload)
    }

    /// REQUEST_STREAM frame with initial credit.
    pub fn request_stream(stream_id: u32, initial_request: u32, payload: Payload) -> Self {
        Self {
            initial_request,
            ..Self::new(FrameType::RequestStream, stream_id, payload)
        }
    }

    /// REQUEST_CHANNEL frame with initial credit.
    pub fn request_channel(
        stream_id: u32,
        initial_request: u32,
        payload: Payload,
        complete: bool,
    ) -> Self {
        Self {
            initial_request,
            complete,
            ..Self::new(FrameType::RequestChannel, stream_id, payload)
        }
    }

    /// PAYLOAD frame.
    pub fn payload(stream_id: u32, payload: Payload, next: bool, complete: bool) -> Self {
        Self {
            next,
            complete,
            ..Self::new(FrameType::Payload, stream_id, payload)
        }
    }

    /// Set the follows flag (builder style, used by fragmentation).
    pub fn with_follows(mut self, follows: bool) -> Self {
        self.follows = follows;
        self
    }

    fn flags(&self) -> u16 {
        let mut value = 0;
        if self.payload.has_metadata() {
            value |= flags::METADATA;
        }
        if self.follows {
            value |= flags::FOLLOWS;
        }
        if self.complete {
            value |= flags::COMPLETE;
        }
        if self.next {
            value |= flags::NEXT;
        }
        value
    }
}

/// REQUEST_N: grants additional credit on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestNFrame {
    pub stream_id: u32,
    pub request_n: u32,
}

/// CANCEL: cancels an outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelFrame {
    pub stream_id: u32,
}

/// ERROR: stream or connection error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    pub stream_id: u32,
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorFrame {
    /// Create an error frame.
    pub fn new(stream_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            stream_id,
            code,
            message: message.into(),
        }
    }

    /// Error frame describing `error` on `stream_id`.
    pub fn from_error(stream_id: u32, error: &RSocketError) -> Self {
        Self::new(stream_id, error.error_code(), error.message())
    }

    /// Convert into the matching local error.
    pub fn into_error(self) -> RSocketError {
        RSocketError::from_error_frame(self.code, self.message)
    }
}

/// METADATA_PUSH: connection-scoped metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPushFrame {
    pub metadata: Bytes,
}

/// RESUME: request to resume a previous session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFrame {
    pub version: Version,
    pub resume_token: Bytes,
    pub last_received_server_position: u64,
    pub first_available_client_position: u64,
}

/// RESUME_OK: server accepted a resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeOkFrame {
    pub last_received_client_position: u64,
}

/// EXT: extension frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFrame {
    pub stream_id: u32,
    pub ignore: bool,
    pub extended_type: u32,
    pub payload: Payload,
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Setup(SetupFrame),
    Lease(LeaseFrame),
    KeepAlive(KeepAliveFrame),
    Request(RequestFrame),
    RequestN(RequestNFrame),
    Cancel(CancelFrame),
    Error(ErrorFrame),
    MetadataPush(MetadataPushFrame),
    Resume(ResumeFrame),
    ResumeOk(ResumeOkFrame),
    Extension(ExtensionFrame),
}

impl Frame {
    /// Stream id of this frame (0 for connection frames).
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Request(f) => f.stream_id,
            Frame::RequestN(f) => f.stream_id,
            Frame::Cancel(f) => f.stream_id,
            Frame::Error(f) => f.stream_id,
            Frame::Extension(f) => f.stream_id,
            Frame::Setup(_)
            | Frame::Lease(_)
            | Frame::KeepAlive(_)
            | Frame::MetadataPush(_)
            | Frame::Resume(_)
            | Frame::ResumeOk(_) => CONNECTION_STREAM_ID,
        }
    }

    /// Frame type.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Setup(_) => FrameType::Setup,
            Frame::Lease(_) => FrameType::Lease,
            Frame::KeepAlive(_) => FrameType::KeepAlive,
            Frame::Request(f) => f.frame_type,
            Frame::RequestN(_) => FrameType::RequestN,
            Frame::Cancel(_) => FrameType::Cancel,
            Frame::Error(_) => FrameType::Error,
            Frame::MetadataPush(_) => FrameType::MetadataPush,
            Frame::Resume(_) => FrameType::Resume,
            Frame::ResumeOk(_) => FrameType::ResumeOk,
            Frame::Extension(_) => FrameType::Extension,
        }
    }

    /// Flags derived from the frame body.
    pub fn flags(&self) -> u16 {
        match self {
            Frame::Setup(f) => {
                let mut value = 0;
                if f.payload.has_metadata() {
                    value |= flags::METADATA;
                }
                if f.resume_token.is_some() {
                    value |= flags::RESUME_ENABLE;
                }
                if f.honor_lease {
                    value |= flags::LEASE;
                }
                value
            }
            Frame::Lease(f) if f.metadata.is_some() => flags::METADATA,
            Frame::KeepAlive(f) if f.respond => flags::RESPOND,
            Frame::Request(f) => f.flags(),
            Frame::MetadataPush(_) => flags::METADATA,
            Frame::Extension(f) => {
                let mut value = 0;
                if f.ignore {
                    value |= flags::IGNORE;
                }
                if f.payload.has_metadata() {
                    value |= flags::METADATA;
                }
                value
            }
            _ => 0,
        }
    }

    /// Header of this frame.
    pub fn header(&self) -> Header {
        Header::new(self.stream_id(), self.frame_type(), self.flags())
    }

    /// Whether this frame belongs to the priority (connection control) lane.
    pub fn is_connection_scoped(&self) -> bool {
        self.stream_id() == CONNECTION_STREAM_ID
    }

    /// Encode the frame without a length prefix.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.body_size_hint());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode the frame preceded by its 24-bit length.
    pub fn encode_with_length(&self) -> Result<Bytes> {
        let mut buf =
            BytesMut::with_capacity(FRAME_LENGTH_SIZE + HEADER_SIZE + self.body_size_hint());
        buf.put_slice(&[0u8; FRAME_LENGTH_SIZE]);
        self.encode_into(&mut buf)?;
        let length = buf.len() - FRAME_LENGTH_SIZE;
        if length > MAX_U24 {
            return Err(RSocketError::Invalid(format!(
                "frame length {length} exceeds 24-bit limit"
            )));
        }
        put_u24_at(&mut buf[..FRAME_LENGTH_SIZE], length);
        Ok(buf.freeze())
    }

    /// Append the encoded frame (no length prefix) to `buf`.
    ///
    /// A rejected frame leaves `buf` at its original length.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        let result = self.put_frame(buf);
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    fn put_frame(&self, buf: &mut BytesMut) -> Result<()> {
        let header = self.header().encode()?;
        buf.put_slice(&header);

        match self {
            Frame::Setup(f) => {
                buf.put_u16(f.version.major);
                buf.put_u16(f.version.minor);
                buf.put_u32(f.keep_alive_interval);
                buf.put_u32(f.max_lifetime);
                if let Some(token) = &f.resume_token {
                    let len = u16::try_from(token.len()).map_err(|_| {
                        RSocketError::Invalid("resume token longer than 65535 bytes".into())
                    })?;
                    buf.put_u16(len);
                    buf.put_slice(token);
                }
                put_mime_type(buf, &f.metadata_mime_type)?;
                put_mime_type(buf, &f.data_mime_type)?;
                put_payload(buf, &f.payload)?;
            }
            Frame::Lease(f) => {
                buf.put_u32(f.ttl);
                buf.put_u32(f.number_of_requests);
                if let Some(metadata) = &f.metadata {
                    buf.put_slice(metadata);
                }
            }
            Frame::KeepAlive(f) => {
                buf.put_u64(f.last_position);
                buf.put_slice(&f.data);
            }
            Frame::Request(f) => {
                if f.frame_type.has_initial_request() {
                    buf.put_u32(f.initial_request);
                }
                put_payload(buf, &f.payload)?;
            }
            Frame::RequestN(f) => buf.put_u32(f.request_n),
            Frame::Cancel(_) => {}
            Frame::Error(f) => {
                buf.put_u32(f.code.as_u32());
                buf.put_slice(f.message.as_bytes());
            }
            Frame::MetadataPush(f) => buf.put_slice(&f.metadata),
            Frame::Resume(f) => {
                buf.put_u16(f.version.major);
                buf.put_u16(f.version.minor);
                let len = u16::try_from(f.resume_token.len()).map_err(|_| {
                    RSocketError::Invalid("resume token longer than 65535 bytes".into())
                })?;
                buf.put_u16(len);
                buf.put_slice(&f.resume_token);
                buf.put_u64(f.last_received_server_position);
                buf.put_u64(f.first_available_client_position);
            }
            Frame::ResumeOk(f) => buf.put_u64(f.last_received_client_position),
            Frame::Extension(f) => {
                buf.put_u32(f.extended_type);
                put_payload(buf, &f.payload)?;
            }
        }
        Ok(())
    }

    /// Decode a frame (no length prefix) from a complete buffer.
    pub fn decode(mut buf: Bytes) -> std::result::Result<Frame, DecodeError> {
        let header = Header::decode(&buf)?;
        buf.advance(HEADER_SIZE);
        let has_metadata = header.has_metadata();
        let stream_id = header.stream_id;
        if header.frame_type.is_connection_scoped() && stream_id != CONNECTION_STREAM_ID {
            return Err(DecodeError::UnexpectedStreamId {
                frame_type: header.frame_type,
                stream_id,
            });
        }

        let frame = match header.frame_type {
            FrameType::Reserved => return Err(DecodeError::ReservedType),
            FrameType::Setup => {
                let version = take_version(&mut buf)?;
                let keep_alive_interval = take_u32(&mut buf, "keepalive interval")?;
                let max_lifetime = take_u32(&mut buf, "max lifetime")?;
                let resume_token = if flags::has_flag(header.flags, flags::RESUME_ENABLE) {
                    let len = take_u16(&mut buf, "resume token length")? as usize;
                    Some(take_bytes(&mut buf, len, "resume token")?)
                } else {
                    None
                };
                let metadata_mime_type = take_mime_type(&mut buf, "metadata mime type")?;
                let data_mime_type = take_mime_type(&mut buf, "data mime type")?;
                Frame::Setup(SetupFrame {
                    version,
                    honor_lease: flags::has_flag(header.flags, flags::LEASE),
                    keep_alive_interval,
                    max_lifetime,
                    resume_token,
                    metadata_mime_type,
                    data_mime_type,
                    payload: take_payload(buf, has_metadata)?,
                })
            }
            FrameType::Lease => {
                let ttl = take_u32(&mut buf, "lease ttl")?;
                let number_of_requests = take_u32(&mut buf, "lease requests")?;
                Frame::Lease(LeaseFrame {
                    ttl,
                    number_of_requests,
                    metadata: has_metadata.then_some(buf),
                })
            }
            FrameType::KeepAlive => {
                let last_position = take_u64(&mut buf, "last received position")?;
                Frame::KeepAlive(KeepAliveFrame {
                    respond: flags::has_flag(header.flags, flags::RESPOND),
                    last_position,
                    data: buf,
                })
            }
            frame_type @ (FrameType::RequestResponse
            | FrameType::RequestFnF
            | FrameType::RequestStream
            | FrameType::RequestChannel
            | FrameType::Payload) => {
                let initial_request = if frame_type.has_initial_request() {
                    take_u32(&mut buf, "initial request n")?
                } else {
                    0
                };
                Frame::Request(RequestFrame {
                    frame_type,
                    stream_id,
                    follows: flags::has_flag(header.flags, flags::FOLLOWS),
                    complete: flags::has_flag(header.flags, flags::COMPLETE),
                    next: flags::has_flag(header.flags, flags::NEXT),
                    initial_request,
                    payload: take_payload(buf, has_metadata)?,
                })
            }
            FrameType::RequestN => Frame::RequestN(RequestNFrame {
                stream_id,
                request_n: take_u32(&mut buf, "request n")?,
            }),
            FrameType::Cancel => Frame::Cancel(CancelFrame { stream_id }),
            FrameType::Error => {
                let code = ErrorCode::from(take_u32(&mut buf, "error code")?);
                Frame::Error(ErrorFrame {
                    stream_id,
                    code,
                    message: String::from_utf8(buf.to_vec())
                        .map_err(|_| DecodeError::NotUtf8("error message"))?,
                })
            }
            FrameType::MetadataPush => Frame::MetadataPush(MetadataPushFrame { metadata: buf }),
            FrameType::Resume => {
                let version = take_version(&mut buf)?;
                let len = take_u16(&mut buf, "resume token length")? as usize;
                let resume_token = take_bytes(&mut buf, len, "resume token")?;
                Frame::Resume(ResumeFrame {
                    version,
                    resume_token,
                    last_received_server_position: take_u64(&mut buf, "server position")?,
                    first_available_client_position: take_u64(&mut buf, "client position")?,
                })
            }
            FrameType::ResumeOk => Frame::ResumeOk(ResumeOkFrame {
                last_received_client_position: take_u64(&mut buf, "client position")?,
            }),
            FrameType::Extension => {
                let extended_type = take_u32(&mut buf, "extended type")?;
                Frame::Extension(ExtensionFrame {
                    stream_id,
                    ignore: header.is_ignorable(),
                    extended_type,
                    payload: take_payload(buf, has_metadata)?,
                })
            }
        };
        Ok(frame)
    }

    /// Decode a single frame preceded by its 24-bit length.
    pub fn decode_with_length(mut buf: Bytes) -> std::result::Result<Frame, DecodeError> {
        if buf.len() < FRAME_LENGTH_SIZE {
            return Err(DecodeError::TooShort {
                field: "frame length",
                needed: FRAME_LENGTH_SIZE,
                available: buf.len(),
            });
        }
        let length = get_u24(&buf[..FRAME_LENGTH_SIZE]);
        buf.advance(FRAME_LENGTH_SIZE);
        if length != buf.len() {
            return Err(DecodeError::FrameLength {
                length,
                max: buf.len(),
            });
        }
        Frame::decode(buf)
    }

    fn body_size_hint(&self) -> usize {
        match self {
            Frame::Setup(f) => 64 + f.payload.len(),
            Frame::Request(f) => 4 + METADATA_LENGTH_SIZE + f.payload.len(),
            Frame::Extension(f) => 4 + METADATA_LENGTH_SIZE + f.payload.len(),
            Frame::Error(f) => 4 + f.message.len(),
            Frame::KeepAlive(f) => 8 + f.data.len(),
            Frame::MetadataPush(f) => f.metadata.len(),
            Frame::Lease(f) => 8 + f.metadata.as_ref().map_or(0, Bytes::len),
            Frame::Resume(f) => 22 + f.resume_token.len(),
            _ => 8,
        }
    }
}

impl From<RequestFrame> for Frame {
    fn from(frame: RequestFrame) -> Self {
        Frame::Request(frame)
    }
}

impl From<ErrorFrame> for Frame {
    fn from(frame: ErrorFrame) -> Self {
        Frame::Error(frame)
    }
}

/// Human-readable dump used for trace logging.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} frame -> Stream Id: {} Flags: {}",
            self.frame_type(),
            self.stream_id(),
            flags_to_binary(self.flags())
        )?;
        match self {
            Frame::Setup(s) => write!(
                f,
                " Version: {} Honor lease: {} Keep alive: interval={}ms max lifetime={}ms \
                 Data mime type: {} Metadata mime type: {}{}",
                s.version,
                s.honor_lease,
                s.keep_alive_interval,
                s.max_lifetime,
                s.data_mime_type,
                s.metadata_mime_type,
                PayloadDump(&s.payload)
            ),
            Frame::Lease(l) => write!(
                f,
                " TTL: {}ms Requests: {}",
                l.ttl, l.number_of_requests
            ),
            Frame::KeepAlive(k) => write!(
                f,
                " (R{}) Position: {} Data(length={})",
                u8::from(k.respond),
                k.last_position,
                k.data.len()
            ),
            Frame::Request(r) => write!(
                f,
                " (F{} C{} N{}){}{}",
                u8::from(r.follows),
                u8::from(r.complete),
                u8::from(r.next),
                if r.frame_type.has_initial_request() {
                    format!(" Initial request: {}", r.initial_request)
                } else {
                    String::new()
                },
                PayloadDump(&r.payload)
            ),
            Frame::RequestN(n) => write!(f, " RequestN: {}", n.request_n),
            Frame::Cancel(_) => Ok(()),
            Frame::Error(e) => write!(f, " Error code: {} Message: {}", e.code, e.message),
            Frame::MetadataPush(m) => write!(f, " Metadata(length={})", m.metadata.len()),
            Frame::Resume(r) => write!(
                f,
                " Version: {} Token(length={}) Server position: {} Client position: {}",
                r.version,
                r.resume_token.len(),
                r.last_received_server_position,
                r.first_available_client_position
            ),
            Frame::ResumeOk(r) => write!(f, " Client position: {}", r.last_received_client_position),
            Frame::Extension(e) => write!(
                f,
                " Extended type: {}{}",
                e.extended_type,
                PayloadDump(&e.payload)
            ),
        }
    }
}

struct PayloadDump<'a>(&'a Payload);

impl fmt::Display for PayloadDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(metadata) = self.0.metadata() {
            write!(f, " Metadata(length={})", metadata.len())?;
        }
        write!(f, " Data(length={})", self.0.data().len())
    }
}

fn put_u24_at(dst: &mut [u8], value: usize) {
    dst[0] = (value >> 16) as u8;
    dst[1] = (value >> 8) as u8;
    dst[2] = value as u8;
}

pub(crate) fn get_u24(src: &[u8]) -> usize {
    (usize::from(src[0]) << 16) | (usize::from(src[1]) << 8) | usize::from(src[2])
}

fn put_payload(buf: &mut BytesMut, payload: &Payload) -> Result<()> {
    if let Some(metadata) = payload.metadata() {
        if metadata.len() > MAX_U24 {
            return Err(RSocketError::Invalid(format!(
                "metadata length {} exceeds 24-bit limit",
                metadata.len()
            )));
        }
        let mut len = [0u8; METADATA_LENGTH_SIZE];
        put_u24_at(&mut len, metadata.len());
        buf.put_slice(&len);
        buf.put_slice(metadata);
    }
    buf.put_slice(payload.data());
    Ok(())
}

fn put_mime_type(buf: &mut BytesMut, mime_type: &str) -> Result<()> {
    if !mime_type.is_ascii() {
        return Err(RSocketError::Invalid(format!(
            "mime type {mime_type:?} is not ASCII"
        )));
    }
    let len = u8::try_from(mime_type.len())
        .map_err(|_| RSocketError::Invalid("mime type longer than 255 bytes".into()))?;
    buf.put_u8(len);
    buf.put_slice(mime_type.as_bytes());
    Ok(())
}

fn ensure(buf: &Bytes, needed: usize, field: &'static str) -> std::result::Result<(), DecodeError> {
    if buf.len() < needed {
        return Err(DecodeError::TooShort {
            field,
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

fn take_u16(buf: &mut Bytes, field: &'static str) -> std::result::Result<u16, DecodeError> {
    ensure(buf, 2, field)?;
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut Bytes, field: &'static str) -> std::result::Result<u32, DecodeError> {
    ensure(buf, 4, field)?;
    Ok(buf.get_u32())
}

fn take_u64(buf: &mut Bytes, field: &'static str) -> std::result::Result<u64, DecodeError> {
    ensure(buf, 8, field)?;
    Ok(buf.get_u64())
}

fn take_bytes(
    buf: &mut Bytes,
    len: usize,
    field: &'static str,
) -> std::result::Result<Bytes, DecodeError> {
    ensure(buf, len, field)?;
    Ok(buf.split_to(len))
}

fn take_version(buf: &mut Bytes) -> std::result::Result<Version, DecodeError> {
    ensure(buf, 4, "version")?;
    Ok(Version {
        major: buf.get_u16(),
        minor: buf.get_u16(),
    })
}

fn take_mime_type(buf: &mut Bytes, field: &'static str) -> std::result::Result<String, DecodeError> {
    ensure(buf, 1, field)?;
    let len = usize::from(buf.get_u8());
    let raw = take_bytes(buf, len, field)?;
    if !raw.is_ascii() {
        return Err(DecodeError::NotAscii(field));
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn take_payload(mut buf: Bytes, has_metadata: bool) -> std::result::Result<Payload, DecodeError> {
    let metadata = if has_metadata {
        ensure(&buf, METADATA_LENGTH_SIZE, "metadata length")?;
        let declared = get_u24(&buf[..METADATA_LENGTH_SIZE]);
        buf.advance(METADATA_LENGTH_SIZE);
        if declared > buf.len() {
            return Err(DecodeError::MetadataLength {
                declared,
                remaining: buf.len(),
            });
        }
        Some(buf.split_to(declared))
    } else {
        None
    };
    Ok(Payload::new(buf, metadata))
}
