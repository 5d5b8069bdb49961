//! Stream registry and per-connection stream id allocation.
//!
//! The registry exclusively owns every live [`Operation`], keyed by stream
//! id. It is the only place frames for a non-zero stream are enqueued from,
//! and enqueueing happens under the registry lock: once an operation has been
//! removed (completed, errored, cancelled, connection closed) nothing more
//! can be written for its stream.
//!
//! Stream ids:
//! - client-originated ids are odd, server-originated ids are even
//! - ids from one originator strictly increase and are never reused
//! - running past `MAX_STREAM_ID` is a connection error, never a wrap

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::error::{RSocketError, Result};
use crate::operation::{InboundRequest, Operation, Outcome, Transition};
use crate::protocol::{CancelFrame, Frame, MAX_STREAM_ID};
use crate::writer::WriterHandle;

/// Allocates local stream ids: 1, 3, 5, ... for clients and 2, 4, 6, ... for
/// servers.
#[derive(Debug)]
pub struct StreamIdAllocator {
    next: u32,
    last: u32,
}

impl StreamIdAllocator {
    /// Allocator for the client role.
    pub fn client() -> Self {
        Self { next: 1, last: 0 }
    }

    /// Allocator for the server role.
    pub fn server() -> Self {
        Self { next: 2, last: 0 }
    }

    /// Next unused id.
    ///
    /// # Errors
    ///
    /// `ConnectionError` once the 31-bit id space is exhausted.
    pub fn next_id(&mut self) -> Result<u32> {
        let id = self.next;
        if id > MAX_STREAM_ID {
            return Err(RSocketError::ConnectionError(
                "stream ids exhausted".to_string(),
            ));
        }
        self.next = id + 2;
        self.last = id;
        Ok(id)
    }

    /// Whether `id` has the parity of this allocator.
    pub fn is_local(&self, id: u32) -> bool {
        id % 2 == self.next % 2
    }

    /// Whether `id` was handed out by this allocator.
    pub fn was_allocated(&self, id: u32) -> bool {
        self.is_local(id) && id != 0 && id <= self.last
    }

    #[cfg(test)]
    fn starting_at(next: u32) -> Self {
        Self { next, last: 0 }
    }
}

struct Inner {
    streams: HashMap<u32, Operation>,
    ids: StreamIdAllocator,
    last_remote_id: u32,
}

/// Maps stream ids to live operations.
pub(crate) struct StreamRegistry {
    inner: Mutex<Inner>,
    writer: WriterHandle,
}

/// What happened to an inbound frame routed by [`StreamRegistry::apply`].
pub(crate) enum Routed {
    /// No live operation for the stream.
    Unknown,
    /// Handled by the operation.
    Handled,
    /// Responder request is fully assembled and must start.
    Execute(InboundRequest),
    /// Protocol violation.
    Violation(RSocketError),
}

impl StreamRegistry {
    pub(crate) fn new(ids: StreamIdAllocator, writer: WriterHandle) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                streams: HashMap::new(),
                ids,
                last_remote_id: 0,
            }),
            writer,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panic while holding the lock leaves the map consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate an id, register the operation built for it and enqueue its
    /// opening frames, all under one lock so ids hit the wire in order.
    ///
    /// `make` may return `None` for interactions that keep no state
    /// (fire-and-forget).
    pub(crate) fn open<M, F>(&self, make: M, frames: F) -> Result<u32>
    where
        M: FnOnce(u32) -> Option<Operation>,
        F: FnOnce(u32) -> Vec<Frame>,
    {
        let mut inner = self.lock();
        let id = inner.ids.next_id()?;
        self.writer.send_all(frames(id))?;
        if let Some(operation) = make(id) {
            inner.streams.insert(id, operation);
        }
        debug!(stream_id = id, "stream opened");
        Ok(id)
    }

    /// Validate the id of a request received from the peer and record it.
    pub(crate) fn accept_remote(&self, id: u32) -> Result<()> {
        let mut inner = self.lock();
        if inner.ids.is_local(id) {
            return Err(RSocketError::ConnectionError(format!(
                "peer used locally owned stream id {id}"
            )));
        }
        if inner.streams.contains_key(&id) {
            return Err(RSocketError::ConnectionError(format!(
                "stream {id} is already active"
            )));
        }
        if id <= inner.last_remote_id {
            return Err(RSocketError::ConnectionError(format!(
                "stream id {id} is not above previous id {}",
                inner.last_remote_id
            )));
        }
        inner.last_remote_id = id;
        Ok(())
    }

    /// Register an operation for a stream accepted with [`accept_remote`](Self::accept_remote).
    pub(crate) fn insert(&self, operation: Operation) {
        let mut inner = self.lock();
        debug!(stream_id = operation.stream_id(), "stream registered");
        inner.streams.insert(operation.stream_id(), operation);
    }

    /// Route an inbound frame to the stream's operation.
    pub(crate) fn apply(&self, id: u32, frame: Frame) -> Routed {
        let mut inner = self.lock();
        let Some(operation) = inner.streams.get_mut(&id) else {
            return Routed::Unknown;
        };
        match operation.on_frame(frame) {
            Transition::Keep => Routed::Handled,
            Transition::Terminate(outcome) => {
                if let Some(mut operation) = inner.streams.remove(&id) {
                    if outcome == Outcome::Errored || outcome == Outcome::Cancelled {
                        operation.abort();
                    }
                }
                debug!(stream_id = id, ?outcome, "stream closed");
                Routed::Handled
            }
            Transition::Execute(request) => {
                inner.streams.remove(&id);
                Routed::Execute(request)
            }
            Transition::Violation(error) => Routed::Violation(error),
        }
    }

    /// Whether frames for `id` may legitimately still arrive late.
    pub(crate) fn was_used(&self, id: u32) -> bool {
        let inner = self.lock();
        inner.ids.was_allocated(id) || (!inner.ids.is_local(id) && id <= inner.last_remote_id)
    }

    /// Attach the task driving an operation so it can be aborted.
    pub(crate) fn attach_task(&self, id: u32, task: AbortHandle) {
        let mut inner = self.lock();
        match inner.streams.get_mut(&id) {
            Some(operation) => operation.set_task(task),
            // finished before we got here
            None => trace!(stream_id = id, "task finished before attach"),
        }
    }

    /// Enqueue frames for a live stream. Returns `false` (and sends nothing)
    /// once the stream is gone.
    pub(crate) fn emit(&self, id: u32, frames: Vec<Frame>) -> bool {
        let inner = self.lock();
        if !inner.streams.contains_key(&id) {
            return false;
        }
        self.writer.send_all(frames).is_ok()
    }

    /// Enqueue the terminal frames of the local sending half.
    ///
    /// With `error` set the whole stream terminates and the local inbound
    /// half, if any, observes the error. Otherwise the sending half is marked
    /// complete and the operation is removed once both halves are done.
    pub(crate) fn finish_send(&self, id: u32, frames: Vec<Frame>, error: Option<RSocketError>) {
        let mut inner = self.lock();
        let Some(operation) = inner.streams.get_mut(&id) else {
            return;
        };
        let _ = self.writer.send_all(frames);

        let remove = match error {
            Some(error) => {
                operation.fail(error);
                true
            }
            None => operation.complete_send(),
        };
        if remove {
            inner.streams.remove(&id);
            debug!(stream_id = id, "stream closed");
        }
    }

    /// Local cancel of a whole stream: remove it, tell the peer, stop its
    /// tasks. No-op if the stream already finished.
    pub(crate) fn cancel(&self, id: u32) {
        let mut inner = self.lock();
        if let Some(mut operation) = inner.streams.remove(&id) {
            let _ = self.writer.send(&Frame::Cancel(CancelFrame { stream_id: id }));
            operation.abort();
            debug!(stream_id = id, "stream cancelled locally");
        }
    }

    /// Local cancel of the inbound half of a channel only.
    pub(crate) fn cancel_inbound(&self, id: u32) {
        let mut inner = self.lock();
        let Some(operation) = inner.streams.get_mut(&id) else {
            return;
        };
        let _ = self.writer.send(&Frame::Cancel(CancelFrame { stream_id: id }));
        if operation.complete_receive() {
            inner.streams.remove(&id);
            debug!(stream_id = id, "stream closed");
        }
    }

    /// Remove every operation, for connection teardown.
    pub(crate) fn drain(&self) -> Vec<Operation> {
        let mut inner = self.lock();
        inner.streams.drain().map(|(_, operation)| operation).collect()
    }

    /// Number of live streams.
    pub(crate) fn len(&self) -> usize {
        self.lock().streams.len()
    }

    pub(crate) fn contains(&self, id: u32) -> bool {
        self.lock().streams.contains_key(&id)
    }
}
