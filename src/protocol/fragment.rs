//! Payload fragmentation and reassembly.
//!
//! Outbound: [`fragment`] splits a request or payload frame whose encoded size
//! exceeds the maximum fragment size. The first fragment keeps the original
//! frame type (and initial requestN); every following fragment is a PAYLOAD
//! frame. All fragments except the last carry the FOLLOWS flag; COMPLETE is
//! only ever set on the last one. Metadata is sent before data.
//!
//! ```text
//! REQUEST_STREAM (F, M)  ─┐
//! PAYLOAD        (F, M)   ├─ one logical request
//! PAYLOAD        (N)     ─┘
//! ```
//!
//! Inbound: a [`Reassembly`] slot accumulates fragments for one stream until a
//! fragment without FOLLOWS arrives. The slot enforces an upper bound on the
//! assembled size.

use bytes::{Bytes, BytesMut};

use super::frame::RequestFrame;
use super::wire_format::{FrameType, HEADER_SIZE, METADATA_LENGTH_SIZE};
use crate::error::{RSocketError, Result};
use crate::payload::Payload;

/// Smallest accepted non-zero maximum fragment size.
pub const MIN_FRAGMENT_SIZE: usize = 64;

const INITIAL_REQUEST_SIZE: usize = 4;

/// Encoded size of a request-style frame without length prefix.
pub fn encoded_len(frame: &RequestFrame) -> usize {
    let mut len = HEADER_SIZE + frame.payload.data().len();
    if frame.frame_type.has_initial_request() {
        len += INITIAL_REQUEST_SIZE;
    }
    if let Some(metadata) = frame.payload.metadata() {
        len += METADATA_LENGTH_SIZE + metadata.len();
    }
    len
}

/// Split `frame` into fragments no larger than `max_fragment_size` bytes.
///
/// A `max_fragment_size` of 0 disables fragmentation. Frames that already
/// fit are returned unchanged.
pub fn fragment(frame: RequestFrame, max_fragment_size: usize) -> Vec<RequestFrame> {
    if max_fragment_size == 0 || encoded_len(&frame) <= max_fragment_size {
        return vec![frame];
    }
    let max_fragment_size = max_fragment_size.max(MIN_FRAGMENT_SIZE);

    let RequestFrame {
        frame_type,
        stream_id,
        complete,
        next,
        initial_request,
        payload,
        ..
    } = frame;
    let (mut data, mut metadata) = payload.into_parts();
    let follow_up_next = frame_type != FrameType::Payload || next;

    let mut fragments = Vec::new();
    loop {
        let first = fragments.is_empty();
        let mut budget = max_fragment_size - HEADER_SIZE;
        if first && frame_type.has_initial_request() {
            budget -= INITIAL_REQUEST_SIZE;
        }

        let fragment_metadata = match metadata.as_mut() {
            Some(remaining) => {
                budget -= METADATA_LENGTH_SIZE;
                let take = remaining.len().min(budget);
                budget -= take;
                Some(remaining.split_to(take))
            }
            None => None,
        };
        if metadata.as_ref().is_some_and(Bytes::is_empty) {
            metadata = None;
        }

        let take = data.len().min(budget);
        let fragment_data = data.split_to(take);
        let last = metadata.is_none() && data.is_empty();

        let fragment = RequestFrame {
            frame_type: if first { frame_type } else { FrameType::Payload },
            stream_id,
            follows: !last,
            complete: last && complete,
            next: if first { next } else { follow_up_next },
            initial_request: if first { initial_request } else { 0 },
            payload: Payload::new(fragment_data, fragment_metadata),
        };
        fragments.push(fragment);

        if last {
            return fragments;
        }
    }
}

/// Reassembly slot for one stream's in-flight fragmented payload.
#[derive(Debug)]
pub struct Reassembly {
    data: BytesMut,
    metadata: Option<BytesMut>,
    size: usize,
    max_size: usize,
}

impl Reassembly {
    /// Create an empty slot accepting at most `max_size` bytes in total.
    pub fn new(max_size: usize) -> Self {
        Self {
            data: BytesMut::new(),
            metadata: None,
            size: 0,
            max_size,
        }
    }

    /// Append a fragment.
    ///
    /// # Errors
    ///
    /// `ConnectionError` when the accumulated size would exceed the limit.
    pub fn push(&mut self, fragment: Payload) -> Result<()> {
        self.size += fragment.len();
        if self.size > self.max_size {
            return Err(RSocketError::ConnectionError(format!(
                "reassembled payload exceeds {} bytes",
                self.max_size
            )));
        }
        let (data, metadata) = fragment.into_parts();
        if let Some(metadata) = metadata {
            self.metadata
                .get_or_insert_with(BytesMut::new)
                .extend_from_slice(&metadata);
        }
        self.data.extend_from_slice(&data);
        Ok(())
    }

    /// Append the final fragment and produce the complete payload.
    pub fn finish(mut self, last: Payload) -> Result<Payload> {
        self.push(last)?;
        Ok(Payload::new(
            self.data.freeze(),
            self.metadata.map(BytesMut::freeze),
        ))
    }

    /// Bytes accumulated so far.
    pub fn size(&self) -> usize {
        self.size
    }
}
