//! Per-stream operation state machines.
//!
//! One [`Operation`] exists per live stream id and is owned by the
//! [`StreamRegistry`](crate::registry::StreamRegistry). Inbound frames are
//! applied through [`Operation::on_frame`], which returns an explicit
//! [`Transition`] for the registry to act on.
//!
//! ```text
//! Requester:  Sent ──PAYLOAD(N)──> Active ──PAYLOAD(C) / ERROR──> gone
//!               └──────── local cancel: CANCEL sent ──────────────> gone
//!
//! Responder:  Received ──(last fragment)──> Executing ──complete/error──> gone
//!                                              └──CANCEL received──> gone (silent)
//! ```
//!
//! A channel has two halves. The operation is removed once both the local
//! sending half and the inbound half are done, or immediately on error or
//! whole-stream cancel.

mod inbound;
pub(crate) mod requester;
pub(crate) mod responder;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{trace, warn};

use crate::config::PrefetchStrategy;
use crate::error::{RSocketError, Result};
use crate::limiter::Limiter;
use crate::payload::Payload;
use crate::protocol::{fragment, Frame, FrameType, Reassembly, RequestFrame};
use crate::registry::StreamRegistry;

pub(crate) use inbound::InboundStream;

/// Sender side of the local consumer of a stream's inbound payloads.
pub(crate) type InboundSender = mpsc::UnboundedSender<Result<Payload>>;

/// Which end of the interaction this peer plays on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Requester,
    Responder,
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Errored,
    Cancelled,
}

/// Result of applying an inbound frame.
#[derive(Debug)]
pub(crate) enum Transition {
    /// Stay registered.
    Keep,
    /// Terminal state reached; remove from the registry.
    Terminate(Outcome),
    /// The fragmented request is complete and the responder must start.
    Execute(InboundRequest),
    /// Frame is not valid for this stream; fatal to the connection.
    Violation(RSocketError),
}

/// A fully assembled request received from the peer.
#[derive(Debug)]
pub(crate) struct InboundRequest {
    pub stream_id: u32,
    pub kind: FrameType,
    pub initial_request: u32,
    pub complete: bool,
    pub payload: Payload,
}

impl From<RequestFrame> for InboundRequest {
    fn from(frame: RequestFrame) -> Self {
        Self {
            stream_id: frame.stream_id,
            kind: frame.frame_type,
            initial_request: frame.initial_request,
            complete: frame.complete,
            payload: frame.payload,
        }
    }
}

#[derive(Debug)]
enum State {
    /// Responder collecting the fragments of the initial request.
    Received {
        kind: FrameType,
        initial_request: u32,
        complete: bool,
        reassembly: Reassembly,
    },
    /// Exchanging payloads.
    Running,
}

/// One live stream.
#[derive(Debug)]
pub(crate) struct Operation {
    stream_id: u32,
    kind: FrameType,
    role: Role,
    state: State,
    inbound: Option<InboundSender>,
    limiter: Option<Arc<Limiter>>,
    task: Option<AbortHandle>,
    fragments: Option<Reassembly>,
    max_reassembly_size: usize,
    send_done: bool,
    recv_done: bool,
}

impl Operation {
    fn new(stream_id: u32, kind: FrameType, role: Role, state: State) -> Self {
        Self {
            stream_id,
            kind,
            role,
            state,
            inbound: None,
            limiter: None,
            task: None,
            fragments: None,
            max_reassembly_size: crate::config::DEFAULT_MAX_REASSEMBLY_SIZE,
            send_done: false,
            recv_done: false,
        }
    }

    /// Requester side of a request-response, stream or channel.
    ///
    /// Only a channel keeps a local sending half; `limiter` gates it.
    pub(crate) fn requester(
        stream_id: u32,
        kind: FrameType,
        inbound: Option<InboundSender>,
        limiter: Option<Arc<Limiter>>,
    ) -> Self {
        let mut operation = Self::new(stream_id, kind, Role::Requester, State::Running);
        operation.inbound = inbound;
        operation.limiter = limiter;
        operation.send_done = kind != FrameType::RequestChannel;
        operation
    }

    /// Responder side of an assembled request.
    ///
    /// A channel whose request carried the complete flag has no inbound half.
    pub(crate) fn responder(
        stream_id: u32,
        kind: FrameType,
        inbound: Option<InboundSender>,
        limiter: Option<Arc<Limiter>>,
    ) -> Self {
        let mut operation = Self::new(stream_id, kind, Role::Responder, State::Running);
        operation.recv_done = inbound.is_none();
        operation.inbound = inbound;
        operation.limiter = limiter;
        operation
    }

    /// Responder waiting for the remaining fragments of `first`.
    pub(crate) fn assembling(first: RequestFrame, max_reassembly_size: usize) -> Result<Self> {
        let mut reassembly = Reassembly::new(max_reassembly_size);
        reassembly.push(first.payload)?;
        let state = State::Received {
            kind: first.frame_type,
            initial_request: first.initial_request,
            complete: first.complete,
            reassembly,
        };
        let mut operation = Self::new(first.stream_id, first.frame_type, Role::Responder, state);
        operation.max_reassembly_size = max_reassembly_size;
        Ok(operation)
    }

    /// Bound on reassembled inbound payloads.
    pub(crate) fn with_max_reassembly_size(mut self, max: usize) -> Self {
        self.max_reassembly_size = max;
        self
    }

    pub(crate) fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub(crate) fn set_task(&mut self, task: AbortHandle) {
        self.task = Some(task);
    }

    /// Apply one inbound frame.
    pub(crate) fn on_frame(&mut self, frame: Frame) -> Transition {
        trace!(stream_id = self.stream_id, frame = %frame, "apply");
        if let State::Received { .. } = self.state {
            return self.on_fragment(frame);
        }
        match frame {
            Frame::RequestN(frame) => {
                if frame.request_n == 0 {
                    return Transition::Violation(RSocketError::ConnectionError(format!(
                        "REQUEST_N of 0 on stream {}",
                        self.stream_id
                    )));
                }
                if let Some(limiter) = &self.limiter {
                    limiter.grant(frame.request_n);
                }
                Transition::Keep
            }
            Frame::Cancel(_) => self.on_cancel(),
            Frame::Error(frame) => {
                self.deliver(Err(frame.into_error()));
                Transition::Terminate(Outcome::Errored)
            }
            Frame::Request(frame) if frame.frame_type == FrameType::Payload => self.on_payload(frame),
            Frame::Extension(frame) if frame.ignore => Transition::Keep,
            other => Transition::Violation(RSocketError::ConnectionError(format!(
                "unexpected {:?} frame on stream {}",
                other.frame_type(),
                self.stream_id
            ))),
        }
    }

    fn on_fragment(&mut self, frame: Frame) -> Transition {
        match frame {
            Frame::Cancel(_) | Frame::Error(_) => Transition::Terminate(Outcome::Cancelled),
            Frame::Request(frame) if frame.frame_type == FrameType::Payload => {
                let State::Received { reassembly, .. } = &mut self.state else {
                    return Transition::Keep;
                };
                if frame.follows {
                    return match reassembly.push(frame.payload) {
                        Ok(()) => Transition::Keep,
                        Err(e) => Transition::Violation(e),
                    };
                }
                let State::Received {
                    kind,
                    initial_request,
                    complete,
                    reassembly,
                } = std::mem::replace(&mut self.state, State::Running)
                else {
                    return Transition::Keep;
                };
                match reassembly.finish(frame.payload) {
                    Ok(payload) => Transition::Execute(InboundRequest {
                        stream_id: self.stream_id,
                        kind,
                        initial_request,
                        complete: complete || frame.complete,
                        payload,
                    }),
                    Err(e) => Transition::Violation(e),
                }
            }
            other => Transition::Violation(RSocketError::ConnectionError(format!(
                "unexpected {:?} frame while reassembling stream {}",
                other.frame_type(),
                self.stream_id
            ))),
        }
    }

    fn on_cancel(&mut self) -> Transition {
        match (self.role, self.kind) {
            (Role::Responder, _) => {
                self.deliver(Err(RSocketError::Canceled("cancelled by requester".to_string())));
                Transition::Terminate(Outcome::Cancelled)
            }
            // the responder no longer wants our channel items
            (Role::Requester, FrameType::RequestChannel) => {
                self.stop_sending();
                if self.complete_send() {
                    Transition::Terminate(Outcome::Completed)
                } else {
                    Transition::Keep
                }
            }
            (Role::Requester, _) => {
                warn!(stream_id = self.stream_id, "ignoring CANCEL sent to requester");
                Transition::Keep
            }
        }
    }

    fn on_payload(&mut self, frame: RequestFrame) -> Transition {
        let accepts_payloads = match self.role {
            Role::Requester => true,
            Role::Responder => self.kind == FrameType::RequestChannel,
        };
        if !accepts_payloads || self.recv_done {
            return Transition::Violation(RSocketError::ConnectionError(format!(
                "unexpected PAYLOAD on stream {}",
                self.stream_id
            )));
        }

        if frame.follows {
            let max = self.max_reassembly_size;
            return match self
                .fragments
                .get_or_insert_with(|| Reassembly::new(max))
                .push(frame.payload)
            {
                Ok(()) => Transition::Keep,
                Err(e) => Transition::Violation(e),
            };
        }

        let payload = match self.fragments.take() {
            Some(reassembly) => match reassembly.finish(frame.payload) {
                Ok(payload) => payload,
                Err(e) => return Transition::Violation(e),
            },
            None => frame.payload,
        };

        if self.kind == FrameType::RequestResponse {
            // a bare COMPLETE resolves to an empty response
            if frame.next || frame.complete {
                let payload = if frame.next { payload } else { Payload::empty() };
                self.deliver(Ok(payload));
                return Transition::Terminate(Outcome::Completed);
            }
        } else if frame.next {
            self.deliver(Ok(payload));
        }

        if !frame.next && !frame.complete {
            return Transition::Violation(RSocketError::ConnectionError(format!(
                "PAYLOAD without NEXT or COMPLETE on stream {}",
                self.stream_id
            )));
        }

        if frame.complete && self.complete_receive() {
            return Transition::Terminate(Outcome::Completed);
        }
        Transition::Keep
    }

    fn deliver(&self, item: Result<Payload>) {
        if let Some(inbound) = &self.inbound {
            // consumer gone means it is cancelling; nothing to deliver to
            let _ = inbound.send(item);
        }
    }

    fn stop_sending(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(limiter) = &self.limiter {
            limiter.close();
        }
    }

    /// Mark the local sending half done. Returns `true` when both halves are.
    pub(crate) fn complete_send(&mut self) -> bool {
        self.send_done = true;
        self.recv_done
    }

    /// Mark the inbound half done. Returns `true` when both halves are.
    pub(crate) fn complete_receive(&mut self) -> bool {
        self.recv_done = true;
        self.inbound = None;
        self.fragments = None;
        self.send_done
    }

    /// Stop all local activity. Pending consumers see their channel end.
    pub(crate) fn abort(&mut self) {
        self.stop_sending();
        self.inbound = None;
        self.fragments = None;
    }

    /// Terminate with `cause`, surfacing it to the local consumer.
    pub(crate) fn fail(&mut self, cause: RSocketError) {
        self.deliver(Err(cause));
        self.abort();
    }
}

/// Stream-independent settings shared by every operation of a connection.
#[derive(Clone)]
pub(crate) struct StreamContext {
    pub registry: Arc<StreamRegistry>,
    pub max_fragment_size: usize,
    pub max_reassembly_size: usize,
    pub prefetch: PrefetchStrategy,
}

impl StreamContext {
    /// Split `frame` into wire frames according to the fragment size.
    pub(crate) fn frames(&self, frame: RequestFrame) -> Vec<Frame> {
        if self.max_fragment_size == 0 {
            return vec![frame.into()];
        }
        fragment(frame, self.max_fragment_size)
            .into_iter()
            .map(Frame::from)
            .collect()
    }
}

/// Error as reported on a stream: connection-scoped codes are not allowed
/// in a stream ERROR frame.
pub(crate) fn stream_error(error: RSocketError) -> RSocketError {
    if error.error_code().is_connection_scoped() {
        RSocketError::ApplicationError(error.message())
    } else {
        error
    }
}
