//! Requester side of the four interaction models.
//!
//! Every call allocates a stream id and enqueues its (possibly fragmented)
//! request frames under the registry lock, then waits on a per-stream channel
//! fed by the reader task. Dropping the returned future or stream before the
//! responder finished sends CANCEL.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::trace;

use super::{stream_error, InboundStream, Operation, StreamContext};
use crate::error::{RSocketError, Result};
use crate::handler::{error_stream, PayloadStream};
use crate::limiter::Limiter;
use crate::payload::Payload;
use crate::protocol::{ErrorFrame, FrameType, RequestFrame};
use crate::registry::StreamRegistry;

/// Sends CANCEL for a stream if dropped while still armed.
struct CancelGuard {
    registry: Arc<StreamRegistry>,
    stream_id: u32,
    armed: bool,
}

impl CancelGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            trace!(stream_id = self.stream_id, "request dropped before response");
            self.registry.cancel(self.stream_id);
        }
    }
}

/// Send a fire-and-forget request. Resolves once the frames are queued.
pub(crate) fn fire_and_forget(ctx: &StreamContext, payload: Payload) -> Result<()> {
    ctx.registry.open(
        |_| None,
        |id| ctx.frames(RequestFrame::fire_and_forget(id, payload)),
    )?;
    Ok(())
}

/// Send a request-response and wait for the single response.
pub(crate) async fn request_response(ctx: &StreamContext, payload: Payload) -> Result<Payload> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let max = ctx.max_reassembly_size;
    let stream_id = ctx.registry.open(
        |id| {
            Some(
                Operation::requester(id, FrameType::RequestResponse, Some(tx), None)
                    .with_max_reassembly_size(max),
            )
        },
        |id| ctx.frames(RequestFrame::request_response(id, payload)),
    )?;

    let guard = CancelGuard {
        registry: ctx.registry.clone(),
        stream_id,
        armed: true,
    };
    let result = rx.recv().await;
    guard.disarm();
    match result {
        Some(result) => result,
        None => Err(RSocketError::Canceled(format!(
            "stream {stream_id} ended without a response"
        ))),
    }
}

/// Send a request-stream with the prefetch size as initial credit.
pub(crate) fn request_stream(ctx: &StreamContext, payload: Payload) -> PayloadStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let max = ctx.max_reassembly_size;
    let initial = ctx.prefetch.request_size;
    let opened = ctx.registry.open(
        |id| {
            Some(
                Operation::requester(id, FrameType::RequestStream, Some(tx), None)
                    .with_max_reassembly_size(max),
            )
        },
        |id| ctx.frames(RequestFrame::request_stream(id, initial, payload)),
    );
    match opened {
        Ok(stream_id) => {
            InboundStream::requester(stream_id, rx, ctx.registry.clone(), ctx.prefetch).boxed()
        }
        Err(e) => error_stream(e),
    }
}

/// Open a channel: `initial` rides on the REQUEST_CHANNEL frame, the rest of
/// `payloads` is sent as the responder grants credit.
pub(crate) fn request_channel(
    ctx: &StreamContext,
    initial: Payload,
    payloads: PayloadStream,
) -> PayloadStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let limiter = Arc::new(Limiter::new(0));
    let max = ctx.max_reassembly_size;
    let request_size = ctx.prefetch.request_size;
    let opened = ctx.registry.open(
        |id| {
            Some(
                Operation::requester(id, FrameType::RequestChannel, Some(tx), Some(limiter.clone()))
                    .with_max_reassembly_size(max),
            )
        },
        |id| ctx.frames(RequestFrame::request_channel(id, request_size, initial, false)),
    );
    let stream_id = match opened {
        Ok(stream_id) => stream_id,
        Err(e) => return error_stream(e),
    };

    let task = tokio::spawn(emit(ctx.clone(), stream_id, payloads, limiter));
    ctx.registry.attach_task(stream_id, task.abort_handle());

    InboundStream::requester(stream_id, rx, ctx.registry.clone(), ctx.prefetch).boxed()
}

/// Drive the local sending half of a stream: one PAYLOAD(NEXT) per item,
/// each gated on one credit, then PAYLOAD(COMPLETE) or ERROR.
///
/// Returns early without a terminal frame when the stream was cancelled or
/// the connection closed.
pub(crate) async fn emit(
    ctx: StreamContext,
    stream_id: u32,
    mut items: PayloadStream,
    limiter: Arc<Limiter>,
) {
    loop {
        match items.next().await {
            Some(Ok(payload)) => {
                if limiter.acquire().await.is_err() {
                    return;
                }
                let frames = ctx.frames(RequestFrame::payload(stream_id, payload, true, false));
                if !ctx.registry.emit(stream_id, frames) {
                    return;
                }
            }
            Some(Err(e)) => {
                let e = stream_error(e);
                let frame = ErrorFrame::from_error(stream_id, &e);
                ctx.registry.finish_send(stream_id, vec![frame.into()], Some(e));
                return;
            }
            None => {
                let frame = RequestFrame::payload(stream_id, Payload::empty(), false, true);
                ctx.registry.finish_send(stream_id, vec![frame.into()], None);
                return;
            }
        }
    }
}
