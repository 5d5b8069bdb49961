//! Frame buffer for accumulating partial reads on byte-stream transports.
//!
//! Every frame on a byte stream is preceded by a 24-bit big-endian length.
//! The buffer is a small state machine:
//! - `WaitingForLength`: need at least 3 bytes
//! - `WaitingForFrame`: length parsed, need N more bytes
//!
//! Complete frames are returned as `Bytes` split off the internal buffer
//! without copying; decoding happens later in [`Frame::decode`](super::Frame::decode).
//!
//! # Example
//!
//! ```
//! use rsocket_mux::protocol::{ErrorCode, ErrorFrame, Frame, FrameBuffer};
//!
//! let bytes = Frame::Error(ErrorFrame::new(1, ErrorCode::ApplicationError, "d"))
//!     .encode_with_length()
//!     .unwrap();
//!
//! let mut buffer = FrameBuffer::new();
//! assert!(buffer.push(&bytes[..4]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[4..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::{Bytes, BytesMut};

use super::frame::get_u24;
use super::wire_format::{FRAME_LENGTH_SIZE, HEADER_SIZE, MAX_U24};
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForLength,
    WaitingForFrame { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_frame_length: usize,
}

impl FrameBuffer {
    /// Create a frame buffer accepting frames up to the 24-bit maximum.
    pub fn new() -> Self {
        Self::with_max_frame_length(MAX_U24)
    }

    /// Create a frame buffer with a custom maximum frame length.
    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForLength,
            max_frame_length: max_frame_length.min(MAX_U24),
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Fails if a length prefix is smaller than a header or larger than the
    /// configured maximum. The stream cannot be resynchronized after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>, DecodeError> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>, DecodeError> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < FRAME_LENGTH_SIZE {
                        return Ok(None);
                    }
                    let length = get_u24(&self.buffer[..FRAME_LENGTH_SIZE]);
                    if length < HEADER_SIZE || length > self.max_frame_length {
                        return Err(DecodeError::FrameLength {
                            length,
                            max: self.max_frame_length,
                        });
                    }
                    let _ = self.buffer.split_to(FRAME_LENGTH_SIZE);
                    self.state = State::WaitingForFrame { remaining: length };
                }
                State::WaitingForFrame { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }
                    self.state = State::WaitingForLength;
                    return Ok(Some(self.buffer.split_to(remaining).freeze()));
                }
            }
        }
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForFrame { .. } => "WaitingForFrame",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
