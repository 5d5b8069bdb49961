use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::config::PrefetchStrategy;
use crate::error::Result;
use crate::payload::Payload;
use crate::protocol::{Frame, RequestNFrame};
use crate::registry::StreamRegistry;

/// What dropping an unfinished [`InboundStream`] cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelScope {
    /// The whole stream (requester side).
    Stream,
    /// Only the peer's half of a channel (responder side).
    Inbound,
}

/// Payloads received on one stream, exposed as a [`Stream`].
///
/// Replenishes the peer's credit with REQUEST_N as items are consumed,
/// following the connection's [`PrefetchStrategy`]. Dropping it before the
/// peer completed sends CANCEL.
pub(crate) struct InboundStream {
    stream_id: u32,
    rx: mpsc::UnboundedReceiver<Result<Payload>>,
    registry: Arc<StreamRegistry>,
    prefetch: PrefetchStrategy,
    outstanding: u32,
    initial_pending: bool,
    scope: CancelScope,
    done: bool,
}

impl InboundStream {
    /// Response stream of a request-stream or request-channel this peer
    /// started with `prefetch.request_size` initial credit.
    pub(crate) fn requester(
        stream_id: u32,
        rx: mpsc::UnboundedReceiver<Result<Payload>>,
        registry: Arc<StreamRegistry>,
        prefetch: PrefetchStrategy,
    ) -> Self {
        Self {
            stream_id,
            rx,
            registry,
            prefetch,
            outstanding: prefetch.request_size,
            initial_pending: false,
            scope: CancelScope::Stream,
            done: false,
        }
    }

    /// The requester's items on a channel this peer responds to. No credit
    /// has been granted yet; the first poll grants `prefetch.request_size`.
    pub(crate) fn responder_channel(
        stream_id: u32,
        rx: mpsc::UnboundedReceiver<Result<Payload>>,
        registry: Arc<StreamRegistry>,
        prefetch: PrefetchStrategy,
    ) -> Self {
        Self {
            stream_id,
            rx,
            registry,
            prefetch,
            outstanding: 0,
            initial_pending: true,
            scope: CancelScope::Inbound,
            done: false,
        }
    }

    fn request(&mut self, n: u32) {
        let frame = Frame::RequestN(RequestNFrame {
            stream_id: self.stream_id,
            request_n: n,
        });
        if self.registry.emit(self.stream_id, vec![frame]) {
            self.outstanding = self.outstanding.saturating_add(n);
        }
    }
}

impl Stream for InboundStream {
    type Item = Result<Payload>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        if self.initial_pending {
            self.initial_pending = false;
            let n = self.prefetch.request_size;
            self.request(n);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(payload))) => {
                self.outstanding = self.outstanding.saturating_sub(1);
                if let Some(n) = self.prefetch.replenish(self.outstanding) {
                    self.request(n);
                }
                Poll::Ready(Some(Ok(payload)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for InboundStream {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        match self.scope {
            CancelScope::Stream => self.registry.cancel(self.stream_id),
            CancelScope::Inbound => self.registry.cancel_inbound(self.stream_id),
        }
    }
}
