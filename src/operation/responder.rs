//! Responder side: run the application handler for an assembled request.
//!
//! Request-response, stream and channel get a registry entry before their
//! handler task is spawned, so a CANCEL arriving right after the request
//! always finds something to abort. Output goes through
//! [`StreamRegistry::emit`](crate::registry::StreamRegistry::emit) and
//! [`finish_send`](crate::registry::StreamRegistry::finish_send), which drop
//! frames for streams that are already gone: once cancelled, a responder
//! stays silent even if its handler fails afterwards.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::requester::emit;
use super::{stream_error, InboundRequest, InboundStream, Operation, StreamContext};
use crate::handler::{PayloadStream, RSocket};
use crate::limiter::Limiter;
use crate::protocol::{ErrorFrame, FrameType, RequestFrame};

/// Start handling `request` with `handler`.
pub(crate) fn start(ctx: &StreamContext, handler: Arc<dyn RSocket>, request: InboundRequest) {
    let InboundRequest {
        stream_id,
        kind,
        initial_request,
        complete,
        payload,
    } = request;
    debug!(stream_id, ?kind, "request received");

    match kind {
        FrameType::RequestFnF => {
            tokio::spawn(async move {
                if let Err(e) = handler.fire_and_forget(payload).await {
                    // never reported to the requester
                    debug!(stream_id, error = %e, "fire-and-forget handler failed");
                }
            });
        }
        FrameType::RequestResponse => {
            ctx.registry
                .insert(Operation::responder(stream_id, kind, None, None));
            let ctx_task = ctx.clone();
            let task = tokio::spawn(async move {
                let result = handler.request_response(payload).await;
                let registry = &ctx_task.registry;
                match result {
                    Ok(payload) => {
                        let frame = RequestFrame::payload(stream_id, payload, true, true);
                        registry.finish_send(stream_id, ctx_task.frames(frame), None);
                    }
                    Err(e) => {
                        let e = stream_error(e);
                        let frame = ErrorFrame::from_error(stream_id, &e);
                        registry.finish_send(stream_id, vec![frame.into()], Some(e));
                    }
                }
            });
            ctx.registry.attach_task(stream_id, task.abort_handle());
        }
        FrameType::RequestStream => {
            let limiter = Arc::new(Limiter::new(initial_request));
            ctx.registry.insert(Operation::responder(
                stream_id,
                kind,
                None,
                Some(limiter.clone()),
            ));
            let ctx_task = ctx.clone();
            let task = tokio::spawn(async move {
                let items = handler.request_stream(payload);
                emit(ctx_task, stream_id, items, limiter).await;
            });
            ctx.registry.attach_task(stream_id, task.abort_handle());
        }
        FrameType::RequestChannel => {
            let limiter = Arc::new(Limiter::new(initial_request));
            let (inbound, input): (_, PayloadStream) = if complete {
                (None, futures::stream::empty().boxed())
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                let input = InboundStream::responder_channel(
                    stream_id,
                    rx,
                    ctx.registry.clone(),
                    ctx.prefetch,
                );
                (Some(tx), input.boxed())
            };
            ctx.registry.insert(
                Operation::responder(stream_id, kind, inbound, Some(limiter.clone()))
                    .with_max_reassembly_size(ctx.max_reassembly_size),
            );
            let ctx_task = ctx.clone();
            let task = tokio::spawn(async move {
                let items = handler.request_channel(payload, input);
                emit(ctx_task, stream_id, items, limiter).await;
            });
            ctx.registry.attach_task(stream_id, task.abort_handle());
        }
        other => warn!(stream_id, ?other, "not a request type"),
    }
}
