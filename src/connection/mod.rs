//! Connection coordinator.
//!
//! Owns everything shared by the tasks of one physical connection:
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!  FrameSource ────► │ reader task: decode+dispatch │──► operations / handler
//!                    └──────────────────────────────┘
//!                    ┌──────────────────────────────┐
//!                    │ keepalive task               │──┐
//!                    └──────────────────────────────┘  │
//!  operations ─────────────────────────────────────────┴─► WriterHandle ─► FrameSink
//! ```
//!
//! The first connection-fatal cause wins: it is recorded once, optionally
//! reported to the peer on stream 0, closes the output queue and fails every
//! live operation with that same cause.

mod keepalive;
mod lease;
mod setup;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{RSocketError, Result};
use crate::handler::{EmptyHandler, RSocket};
use crate::operation::{responder, InboundRequest, Operation, StreamContext};
use crate::protocol::{
    ErrorCode, ErrorFrame, Frame, FrameType, KeepAliveFrame, LeaseFrame, RequestFrame,
};
use crate::registry::{Routed, StreamIdAllocator, StreamRegistry};
use crate::transport::FrameSource;
use crate::writer::WriterHandle;

pub use setup::ConnectionSetup;
pub(crate) use setup::{accept_setup, setup_frame};

use keepalive::KeepAliveTracker;
use lease::LeaseState;

/// State shared by the reader, keepalive and writer-supervisor tasks and by
/// every requester handle of one connection.
pub(crate) struct ConnectionShared {
    pub(crate) ctx: StreamContext,
    pub(crate) writer: WriterHandle,
    pub(crate) config: ConnectionConfig,
    pub(crate) is_client: bool,
    handler: OnceLock<Arc<dyn RSocket>>,
    /// Lease granted by the peer; gates our requests.
    lease_received: LeaseState,
    /// Lease we granted; gates the peer's requests.
    lease_granted: LeaseState,
    keepalive: KeepAliveTracker,
    close_tx: watch::Sender<Option<RSocketError>>,
}

impl ConnectionShared {
    pub(crate) fn new(is_client: bool, writer: WriterHandle, config: ConnectionConfig) -> Arc<Self> {
        let ids = if is_client {
            StreamIdAllocator::client()
        } else {
            StreamIdAllocator::server()
        };
        let ctx = StreamContext {
            registry: StreamRegistry::new(ids, writer.clone()),
            max_fragment_size: config.max_fragment_size,
            max_reassembly_size: config.max_reassembly_size,
            prefetch: config.prefetch,
        };
        let (lease_received, lease_granted) = if config.honor_lease {
            (LeaseState::enabled(), LeaseState::enabled())
        } else {
            (LeaseState::disabled(), LeaseState::disabled())
        };
        let (close_tx, _) = watch::channel(None);

        Arc::new(Self {
            ctx,
            writer,
            config,
            is_client,
            handler: OnceLock::new(),
            lease_received,
            lease_granted,
            keepalive: KeepAliveTracker::new(),
            close_tx,
        })
    }

    /// Install the responder for requests from the peer. Only the first call
    /// has an effect.
    pub(crate) fn set_handler(&self, handler: Arc<dyn RSocket>) {
        if self.handler.set(handler).is_err() {
            warn!("responder already installed");
        }
    }

    fn handler(&self) -> Arc<dyn RSocket> {
        match self.handler.get() {
            Some(handler) => handler.clone(),
            None => Arc::new(EmptyHandler),
        }
    }

    /// Spawn the reader, keepalive and writer-supervisor tasks.
    pub(crate) fn start(
        self: &Arc<Self>,
        source: Box<dyn FrameSource>,
        writer_task: JoinHandle<Result<()>>,
    ) {
        // max lifetime counts from here, not from the SETUP exchange
        self.keepalive.mark();
        tokio::spawn(read_loop(self.clone(), source));
        tokio::spawn(keepalive::keepalive_loop(self.clone()));

        let shared = self.clone();
        tokio::spawn(async move {
            let cause = match writer_task.await {
                Ok(Ok(())) => RSocketError::ConnectionClosed,
                Ok(Err(e)) => {
                    error!(error = %e, "writer failed");
                    e
                }
                Err(e) => RSocketError::ConnectionError(format!("writer task failed: {e}")),
            };
            shared.close_with(cause, false, false);
        });
    }

    /// Cause the connection was closed with, if it is closed.
    pub(crate) fn close_cause(&self) -> Option<RSocketError> {
        self.close_tx.borrow().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.close_tx.borrow().is_some()
    }

    /// Wait until the connection is closed and return the cause.
    pub(crate) async fn closed(&self) -> RSocketError {
        let mut rx = self.close_tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(cause) = current {
                return cause;
            }
            if rx.changed().await.is_err() {
                return RSocketError::ConnectionClosed;
            }
        }
    }

    /// Close the connection with `cause`. Only the first call has an effect.
    ///
    /// With `notify_peer` the cause is sent as an ERROR frame on stream 0.
    /// A graceful close flushes queued frames before the transport is
    /// released.
    pub(crate) fn close_with(&self, cause: RSocketError, notify_peer: bool, graceful: bool) {
        let mut first = false;
        self.close_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause.clone());
            first = true;
            true
        });
        if !first {
            return;
        }

        if cause.is_connection_fatal() && !matches!(cause, RSocketError::ConnectionClosed) {
            warn!(error = %cause, "connection closing");
        } else {
            debug!(cause = %cause, "connection closing");
        }
        if notify_peer {
            let _ = self.writer.send(&Frame::Error(ErrorFrame::from_error(0, &cause)));
        }
        self.writer.close(graceful);

        let operations = self.ctx.registry.drain();
        debug!(count = operations.len(), "terminating streams");
        for mut operation in operations {
            operation.fail(cause.clone());
        }
    }

    /// Check that a new outbound request may be sent right now.
    pub(crate) fn check_request(&self) -> Result<()> {
        if let Some(cause) = self.close_cause() {
            return Err(cause);
        }
        self.lease_received.try_use()
    }

    /// Grant the peer `number_of_requests` requests for `ttl`.
    pub(crate) fn send_lease(&self, ttl: Duration, number_of_requests: u32) -> Result<()> {
        if !self.lease_granted.is_enabled() {
            return Err(RSocketError::Invalid("lease was not negotiated".to_string()));
        }
        let ttl_ms = u32::try_from(ttl.as_millis()).unwrap_or(u32::MAX);
        self.writer.send(&Frame::Lease(LeaseFrame {
            ttl: ttl_ms,
            number_of_requests,
            metadata: None,
        }))?;
        self.lease_granted.update(ttl, number_of_requests);
        Ok(())
    }

    /// Requests left in the lease received from the peer.
    pub(crate) fn available_lease(&self) -> u32 {
        self.lease_received.available()
    }

    /// Route one decoded frame. An error is a protocol violation fatal to the
    /// connection.
    fn dispatch(&self, frame: Frame) -> Result<()> {
        trace!(frame = %frame, "received");
        let stream_id = frame.stream_id();
        if stream_id == 0 {
            return self.on_connection_frame(frame);
        }
        match frame {
            Frame::Request(request) if request.frame_type.is_request() => self.on_request(request),
            other => self.on_stream_frame(stream_id, other),
        }
    }

    fn on_connection_frame(&self, frame: Frame) -> Result<()> {
        match frame {
            Frame::KeepAlive(keep_alive) => {
                self.keepalive.mark();
                if keep_alive.respond {
                    self.writer.send(&Frame::KeepAlive(KeepAliveFrame {
                        respond: false,
                        last_position: 0,
                        data: keep_alive.data,
                    }))?;
                }
                Ok(())
            }
            Frame::Lease(lease) => {
                if self.lease_received.is_enabled() {
                    debug!(
                        ttl_ms = lease.ttl,
                        requests = lease.number_of_requests,
                        "lease received"
                    );
                    self.lease_received
                        .update(Duration::from_millis(u64::from(lease.ttl)), lease.number_of_requests);
                } else {
                    warn!("dropping LEASE, lease was not negotiated");
                }
                Ok(())
            }
            Frame::MetadataPush(push) => {
                let handler = self.handler();
                tokio::spawn(async move {
                    if let Err(e) = handler.metadata_push(push.metadata).await {
                        debug!(error = %e, "metadata push handler failed");
                    }
                });
                Ok(())
            }
            Frame::Error(frame) => {
                let cause = frame.into_error();
                debug!(error = %cause, "peer closed the connection");
                self.close_with(cause, false, false);
                Ok(())
            }
            Frame::Setup(_) => Err(RSocketError::ConnectionError(
                "unexpected SETUP on an established connection".to_string(),
            )),
            Frame::Resume(_) | Frame::ResumeOk(_) => Err(RSocketError::ConnectionError(
                "resumption is not supported".to_string(),
            )),
            Frame::Extension(frame) if frame.ignore => {
                trace!(extended_type = frame.extended_type, "ignoring extension frame");
                Ok(())
            }
            other => Err(RSocketError::ConnectionError(format!(
                "unexpected {:?} frame on stream 0",
                other.frame_type()
            ))),
        }
    }

    fn on_request(&self, request: RequestFrame) -> Result<()> {
        let stream_id = request.stream_id;
        self.ctx.registry.accept_remote(stream_id)?;

        if self.lease_granted.try_use().is_err() {
            debug!(stream_id, "rejecting request, lease exhausted");
            if request.frame_type != FrameType::RequestFnF {
                self.writer.send(&Frame::Error(ErrorFrame::new(
                    stream_id,
                    ErrorCode::Rejected,
                    "lease exhausted",
                )))?;
            }
            return Ok(());
        }

        if request.follows {
            let operation = Operation::assembling(request, self.ctx.max_reassembly_size)?;
            self.ctx.registry.insert(operation);
            return Ok(());
        }
        self.execute(request.into());
        Ok(())
    }

    fn on_stream_frame(&self, stream_id: u32, frame: Frame) -> Result<()> {
        let frame_type = frame.frame_type();
        match self.ctx.registry.apply(stream_id, frame) {
            Routed::Handled => Ok(()),
            Routed::Execute(request) => {
                self.execute(request);
                Ok(())
            }
            Routed::Violation(e) => Err(e),
            Routed::Unknown => {
                let benign = matches!(frame_type, FrameType::Cancel | FrameType::RequestN);
                if benign || self.ctx.registry.was_used(stream_id) {
                    trace!(stream_id, ?frame_type, "dropping frame for finished stream");
                    Ok(())
                } else {
                    Err(RSocketError::ConnectionError(format!(
                        "{frame_type:?} frame for unknown stream {stream_id}"
                    )))
                }
            }
        }
    }

    fn execute(&self, request: InboundRequest) {
        responder::start(&self.ctx, self.handler(), request);
    }
}

async fn read_loop(shared: Arc<ConnectionShared>, mut source: Box<dyn FrameSource>) {
    loop {
        let received = tokio::select! {
            biased;
            _ = shared.closed() => return,
            received = source.receive_frame() => received,
        };
        let bytes = match received {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("transport closed by peer");
                shared.close_with(RSocketError::ConnectionClosed, false, false);
                return;
            }
            Err(e) => {
                error!(error = %e, "transport read failed");
                shared.close_with(e, false, false);
                return;
            }
        };

        let result = match Frame::decode(bytes) {
            Ok(frame) => shared.dispatch(frame),
            Err(e) => Err(RSocketError::ConnectionError(format!("malformed frame: {e}"))),
        };
        if let Err(e) = result {
            error!(error = %e, "protocol violation");
            let cause = if e.is_connection_fatal() {
                e
            } else {
                RSocketError::ConnectionError(e.message())
            };
            shared.close_with(cause, true, false);
            return;
        }
    }
}
