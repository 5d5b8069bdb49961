//! In-process transport built on unbounded tokio channels.
//!
//! Message oriented: one channel message is one frame, so no length prefix.
//!
//! # Example
//!
//! ```
//! use rsocket_mux::transport::LocalTransport;
//!
//! let (client_side, server_side) = LocalTransport::pair();
//! ```

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{BoxFuture, FrameSink, FrameSource, Transport};
use crate::error::{RSocketError, Result};

/// One end of an in-process connection.
pub struct LocalTransport {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl LocalTransport {
    /// Create two connected ends.
    pub fn pair() -> (LocalTransport, LocalTransport) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            LocalTransport { tx: a_tx, rx: b_rx },
            LocalTransport { tx: b_tx, rx: a_rx },
        )
    }
}

impl Transport for LocalTransport {
    fn into_parts(self) -> (Box<dyn FrameSink>, Box<dyn FrameSource>) {
        (
            Box::new(LocalSink { tx: Some(self.tx) }),
            Box::new(LocalSource { rx: self.rx }),
        )
    }
}

struct LocalSink {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

impl FrameSink for LocalSink {
    fn send_frames<'a>(&'a mut self, frames: &'a [Bytes]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let tx = self.tx.as_ref().ok_or(RSocketError::ConnectionClosed)?;
            for frame in frames {
                tx.send(frame.clone())
                    .map_err(|_| RSocketError::ConnectionClosed)?;
            }
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            // dropping the sender ends the peer's receive loop
            self.tx = None;
            Ok(())
        })
    }
}

struct LocalSource {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl FrameSource for LocalSource {
    fn receive_frame(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move { Ok(self.rx.recv().await) })
    }
}
