//! Byte-stream transport: frames carry a 24-bit length prefix.
//!
//! Outbound batches are written with scatter/gather I/O (`write_vectored`),
//! one prefix slice plus one frame slice per frame, then flushed once.
//! Inbound bytes go through a [`FrameBuffer`] that splits complete frames.
//!
//! # Example
//!
//! ```
//! use rsocket_mux::transport::StreamTransport;
//!
//! let (client_io, server_io) = tokio::io::duplex(64 * 1024);
//! let client_side = StreamTransport::new(client_io);
//! let server_side = StreamTransport::new(server_io);
//! ```

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use super::{BoxFuture, FrameSink, FrameSource, Transport};
use crate::error::{RSocketError, Result};
use crate::protocol::{FrameBuffer, FRAME_LENGTH_SIZE, MAX_U24};

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Transport over any async byte stream.
pub struct StreamTransport<S> {
    io: S,
    max_frame_length: usize,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a byte stream.
    pub fn new(io: S) -> Self {
        Self {
            io,
            max_frame_length: MAX_U24,
        }
    }

    /// Limit the size of accepted inbound frames.
    ///
    /// Default: 16 MiB - 1 (the 24-bit maximum).
    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn into_parts(self) -> (Box<dyn FrameSink>, Box<dyn FrameSource>) {
        let (reader, writer) = tokio::io::split(self.io);
        (
            Box::new(StreamSink { writer }),
            Box::new(StreamSource {
                reader,
                buffer: FrameBuffer::with_max_frame_length(self.max_frame_length),
                ready: VecDeque::new(),
                chunk: vec![0u8; READ_CHUNK_SIZE],
            }),
        )
    }
}

/// Write half of a [`StreamTransport`].
pub struct StreamSink<S> {
    writer: WriteHalf<S>,
}

impl<S> FrameSink for StreamSink<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn send_frames<'a>(&'a mut self, frames: &'a [Bytes]) -> BoxFuture<'a, Result<()>> {
        Box::pin(write_batch(&mut self.writer, frames))
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.writer.shutdown().await?;
            Ok(())
        })
    }
}

/// Read half of a [`StreamTransport`].
pub struct StreamSource<S> {
    reader: ReadHalf<S>,
    buffer: FrameBuffer,
    ready: VecDeque<Bytes>,
    chunk: Vec<u8>,
}

impl<S> FrameSource for StreamSource<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn receive_frame(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move {
            loop {
                if let Some(frame) = self.ready.pop_front() {
                    return Ok(Some(frame));
                }
                let n = self.reader.read(&mut self.chunk).await?;
                if n == 0 {
                    if !self.buffer.is_empty() {
                        return Err(RSocketError::ConnectionError(format!(
                            "stream ended inside a frame ({} bytes buffered)",
                            self.buffer.len()
                        )));
                    }
                    return Ok(None);
                }
                self.ready.extend(self.buffer.push(&self.chunk[..n])?);
            }
        })
    }
}

fn length_prefix(frame: &Bytes) -> [u8; FRAME_LENGTH_SIZE] {
    let len = frame.len();
    [(len >> 16) as u8, (len >> 8) as u8, len as u8]
}

/// Write a batch of frames, each preceded by its length, using
/// scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, frames: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frames.is_empty() {
        return Ok(());
    }
    if let Some(frame) = frames.iter().find(|f| f.len() > MAX_U24) {
        return Err(RSocketError::Invalid(format!(
            "frame length {} exceeds 24-bit limit",
            frame.len()
        )));
    }

    let prefixes: Vec<[u8; FRAME_LENGTH_SIZE]> = frames.iter().map(length_prefix).collect();
    let total_size: usize = frames.iter().map(|f| FRAME_LENGTH_SIZE + f.len()).sum();

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(&prefixes, frames, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )
            .into());
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice array for the bytes not yet written.
fn build_remaining_slices<'a>(
    prefixes: &'a [[u8; FRAME_LENGTH_SIZE]],
    frames: &'a [Bytes],
    skip_bytes: usize,
) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(frames.len() * 2);
    let mut offset = 0;

    for (prefix, frame) in prefixes.iter().zip(frames) {
        for part in [&prefix[..], &frame[..]] {
            let end = offset + part.len();
            if skip_bytes < end && !part.is_empty() {
                slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(offset)..]));
            }
            offset = end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::duplex;

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let frames = vec![Bytes::from_static(b"hello")];
        let prefixes: Vec<_> = frames.iter().map(length_prefix).collect();

        let slices = build_remaining_slices(&prefixes, &frames, 0);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], &[0, 0, 5]);
    }

    #[test]
    fn test_build_remaining_slices_partial_prefix() {
        let frames = vec![Bytes::from_static(b"hello")];
        let prefixes: Vec<_> = frames.iter().map(length_prefix).collect();

        let slices = build_remaining_slices(&prefixes, &frames, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), 1);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_build_remaining_slices_into_second_frame() {
        let frames = vec![Bytes::from_static(b"abc"), Bytes::from_static(b"defg")];
        let prefixes: Vec<_> = frames.iter().map(length_prefix).collect();

        // skip first frame entirely plus one byte of the second prefix
        let slices = build_remaining_slices(&prefixes, &frames, FRAME_LENGTH_SIZE + 3 + 1);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), 2);
        assert_eq!(&*slices[1], b"defg");
    }

    #[tokio::test]
    async fn test_write_batch_prefixes_each_frame() {
        let mut buf = Cursor::new(Vec::new());
        let frames: Vec<_> = (0..3).map(|_| Bytes::from_static(b"abcdef")).collect();

        write_batch(&mut buf, &frames).await.unwrap();

        let written = buf.into_inner();
        assert_eq!(written.len(), 3 * (FRAME_LENGTH_SIZE + 6));
        assert_eq!(&written[..4], &[0, 0, 6, b'a']);
    }

    #[tokio::test]
    async fn test_stream_transport_roundtrip() {
        let (a, b) = duplex(64);
        let (mut sink, _source) = StreamTransport::new(a).into_parts();
        let (_sink, mut source) = StreamTransport::new(b).into_parts();

        let frames = vec![
            Bytes::from(vec![1u8; 100]),
            Bytes::from_static(b"second-frame"),
        ];
        let writer = tokio::spawn(async move {
            sink.send_frames(&frames).await.unwrap();
            sink.close().await.unwrap();
        });

        let first = source.receive_frame().await.unwrap().unwrap();
        assert_eq!(first.len(), 100);
        let second = source.receive_frame().await.unwrap().unwrap();
        assert_eq!(second, "second-frame");
        assert!(source.receive_frame().await.unwrap().is_none());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_truncated_stream_is_error() {
        let (mut a, b) = duplex(64);
        let (_sink, mut source) = StreamTransport::new(b).into_parts();

        a.write_all(&[0, 0, 10, 1, 2]).await.unwrap();
        drop(a);

        assert!(source.receive_frame().await.is_err());
    }
}
