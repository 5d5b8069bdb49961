//! Transport module - the narrow interface between the protocol engine and
//! whatever carries frames.
//!
//! A transport is split into two halves owned by different tasks:
//! - [`FrameSink`] - driven by the writer task, takes encoded frames
//! - [`FrameSource`] - driven by the reader task, yields encoded frames
//!
//! Frames cross this boundary as `Bytes` without the length prefix. Byte
//! stream transports add and strip the 24-bit prefix themselves.
//!
//! Adapters:
//! - [`StreamTransport`] - any `AsyncRead + AsyncWrite` byte stream (TCP,
//!   Unix socket, `tokio::io::duplex`)
//! - [`LocalTransport`] - in-process message channel pair

mod local;
mod stream;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

pub use local::LocalTransport;
pub use stream::{StreamSink, StreamSource, StreamTransport};

/// Boxed future used by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half of a transport.
pub trait FrameSink: Send + 'static {
    /// Write a batch of encoded frames, in order.
    fn send_frames<'a>(&'a mut self, frames: &'a [Bytes]) -> BoxFuture<'a, Result<()>>;

    /// Release the outbound resource. Called exactly once by the writer task.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Inbound half of a transport.
pub trait FrameSource: Send + 'static {
    /// Next complete frame, or `None` at end of stream.
    fn receive_frame(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>>;
}

/// A bidirectional frame transport.
pub trait Transport: Send + 'static {
    /// Split into independently owned outbound and inbound halves.
    fn into_parts(self) -> (Box<dyn FrameSink>, Box<dyn FrameSource>);
}
