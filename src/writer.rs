//! Frame output queue and the dedicated writer task.
//!
//! Every operation shares one [`WriterHandle`]. Frames are encoded on the
//! caller's side and pushed into one of two lanes:
//!
//! ```text
//! stream 0 (keepalive, lease, error) ──► priority lane ─┐
//!                                                        ├─► Writer Task ─► FrameSink
//! stream N (requests, payloads)      ──► data lane ─────┘
//! ```
//!
//! The writer task always drains the priority lane first, batches up to
//! `max_batch_size` frames, and hands each batch to the sink in one call.
//! Frames within a lane keep their enqueue order.
//!
//! Closing is explicit: after [`WriterHandle::close`] every send fails fast
//! with `ConnectionClosed`. A graceful close flushes both lanes before the
//! sink is released; an abortive close only flushes the priority lane (which
//! carries the final ERROR frame) and drops queued data frames. Either way
//! the sink is closed exactly once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{RSocketError, Result};
use crate::protocol::Frame;
use crate::transport::FrameSink;

/// Default maximum number of frames handed to the sink in one call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 64;

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum frames per sink write.
    pub max_batch_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Shutdown {
    graceful: bool,
}

/// Handle for enqueueing frames. Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    priority_tx: mpsc::UnboundedSender<Bytes>,
    data_tx: mpsc::UnboundedSender<Bytes>,
    control_tx: mpsc::UnboundedSender<Shutdown>,
    pending: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl WriterHandle {
    /// Encode and enqueue a frame.
    ///
    /// Connection-scoped frames (stream 0) go to the priority lane.
    pub fn send(&self, frame: &Frame) -> Result<()> {
        if self.is_closed() {
            return Err(RSocketError::ConnectionClosed);
        }
        let bytes = frame.encode()?;
        trace!(frame = %frame, "enqueue");
        self.enqueue(frame.is_connection_scoped(), bytes)
    }

    // Fails once the writer task has closed its lanes, which also covers a
    // close racing with the check in `send`.
    fn enqueue(&self, priority: bool, bytes: Bytes) -> Result<()> {
        let lane = if priority {
            &self.priority_tx
        } else {
            &self.data_tx
        };
        self.pending.fetch_add(1, Ordering::AcqRel);
        lane.send(bytes).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            RSocketError::ConnectionClosed
        })
    }

    /// Enqueue several frames of one stream back to back.
    pub fn send_all<I>(&self, frames: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<Frame>,
    {
        for frame in frames {
            self.send(std::borrow::Borrow::borrow(&frame))?;
        }
        Ok(())
    }

    /// Stop accepting frames and tell the writer task to finish.
    ///
    /// Only the first call has an effect.
    pub fn close(&self, graceful: bool) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(graceful, "closing output queue");
        let _ = self.control_tx.send(Shutdown { graceful });
    }

    /// Whether the queue has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Frames enqueued but not yet handed to the sink.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

struct Lanes {
    priority: mpsc::UnboundedReceiver<Bytes>,
    data: mpsc::UnboundedReceiver<Bytes>,
    control: mpsc::UnboundedReceiver<Shutdown>,
}

impl Lanes {
    /// Refuse further frames and drop whatever is still queued.
    fn discard(&mut self) -> usize {
        self.priority.close();
        self.data.close();
        let mut dropped = 0;
        while self.priority.try_recv().is_ok() {
            dropped += 1;
        }
        while self.data.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Spawn the writer task and return a handle for enqueueing frames.
///
/// The task ends after [`WriterHandle::close`] or once every handle is
/// dropped; its result reports the first sink failure.
pub fn spawn_writer_task(
    sink: Box<dyn FrameSink>,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let (priority_tx, priority) = mpsc::unbounded_channel();
    let (data_tx, data) = mpsc::unbounded_channel();
    let (control_tx, control) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        priority_tx,
        data_tx,
        control_tx,
        pending: pending.clone(),
        closed: Arc::new(AtomicBool::new(false)),
    };
    let lanes = Lanes {
        priority,
        data,
        control,
    };
    let max_batch_size = config.max_batch_size.max(1);

    let task = tokio::spawn(writer_loop(lanes, sink, pending, max_batch_size));
    (handle, task)
}

async fn writer_loop(
    mut lanes: Lanes,
    mut sink: Box<dyn FrameSink>,
    pending: Arc<AtomicUsize>,
    max_batch_size: usize,
) -> Result<()> {
    let result = run(&mut lanes, sink.as_mut(), &pending, max_batch_size).await;
    let dropped = lanes.discard();
    pending.fetch_sub(dropped, Ordering::Release);
    if dropped > 0 {
        debug!(dropped, "discarded queued frames");
    }
    let closed = sink.close().await;
    debug!("writer task finished");
    result.and(closed)
}

async fn run(
    lanes: &mut Lanes,
    sink: &mut dyn FrameSink,
    pending: &AtomicUsize,
    max_batch_size: usize,
) -> Result<()> {
    loop {
        let first = tokio::select! {
            biased;
            shutdown = lanes.control.recv() => {
                // all handles dropped counts as a graceful close
                let graceful = shutdown.map_or(true, |s| s.graceful);
                return drain(lanes, sink, pending, max_batch_size, graceful).await;
            }
            Some(frame) = lanes.priority.recv() => frame,
            Some(frame) = lanes.data.recv() => frame,
            else => return Ok(()),
        };

        let mut batch = Vec::with_capacity(max_batch_size);
        batch.push(first);
        fill_batch(&mut lanes.priority, &mut batch, max_batch_size);
        fill_batch(&mut lanes.data, &mut batch, max_batch_size);

        let sent = sink.send_frames(&batch).await;
        pending.fetch_sub(batch.len(), Ordering::Release);
        sent?;
    }
}

fn fill_batch(lane: &mut mpsc::UnboundedReceiver<Bytes>, batch: &mut Vec<Bytes>, max: usize) {
    while batch.len() < max {
        match lane.try_recv() {
            Ok(frame) => batch.push(frame),
            Err(_) => break,
        }
    }
}

async fn drain(
    lanes: &mut Lanes,
    sink: &mut dyn FrameSink,
    pending: &AtomicUsize,
    max_batch_size: usize,
    graceful: bool,
) -> Result<()> {
    loop {
        let mut batch = Vec::with_capacity(max_batch_size);
        fill_batch(&mut lanes.priority, &mut batch, max_batch_size);
        if graceful {
            fill_batch(&mut lanes.data, &mut batch, max_batch_size);
        }
        if batch.is_empty() {
            return Ok(());
        }
        let sent = sink.send_frames(&batch).await;
        pending.fetch_sub(batch.len(), Ordering::Release);
        sent?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use crate::protocol::{ErrorCode, ErrorFrame, KeepAliveFrame, RequestFrame};
    use crate::transport::BoxFuture;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        written: Arc<Mutex<Vec<Vec<Bytes>>>>,
        closes: Arc<AtomicUsize>,
    }

    impl FrameSink for RecordingSink {
        fn send_frames<'a>(&'a mut self, frames: &'a [Bytes]) -> BoxFuture<'a, Result<()>> {
            self.written.lock().unwrap().push(frames.to_vec());
            Box::pin(async { Ok(()) })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<()>> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<Frame> {
            self.written
                .lock()
                .unwrap()
                .iter()
                .flatten()
                .map(|b| Frame::decode(b.clone()).unwrap())
                .collect()
        }
    }

    fn payload_frame(stream_id: u32) -> Frame {
        RequestFrame::payload(stream_id, Payload::from("x"), true, false).into()
    }

    fn keepalive() -> Frame {
        Frame::KeepAlive(KeepAliveFrame {
            respond: true,
            last_position: 0,
            data: Bytes::new(),
        })
    }

    #[test]
    fn test_writer_config_default() {
        assert_eq!(WriterConfig::default().max_batch_size, DEFAULT_MAX_BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_frames_written_in_order() {
        let sink = RecordingSink::default();
        let (handle, task) = spawn_writer_task(Box::new(sink.clone()), WriterConfig::default());

        for id in [1, 3, 1, 5] {
            handle.send(&payload_frame(id)).unwrap();
        }
        handle.close(true);
        task.await.unwrap().unwrap();

        let ids: Vec<u32> = sink.frames().iter().map(Frame::stream_id).collect();
        assert_eq!(ids, vec![1, 3, 1, 5]);
        assert_eq!(handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_priority_lane_first_in_batch() {
        let sink = RecordingSink::default();
        let (handle, task) = spawn_writer_task(Box::new(sink.clone()), WriterConfig::default());

        // enqueue synchronously so the writer sees both lanes populated
        for _ in 0..3 {
            handle.send(&payload_frame(1)).unwrap();
        }
        handle.send(&keepalive()).unwrap();
        handle.close(true);
        task.await.unwrap().unwrap();

        let frames = sink.frames();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].stream_id(), 0);
    }

    #[tokio::test]
    async fn test_send_after_close_fails_fast() {
        let sink = RecordingSink::default();
        let (handle, task) = spawn_writer_task(Box::new(sink.clone()), WriterConfig::default());

        handle.close(true);
        assert!(matches!(
            handle.send(&payload_frame(1)),
            Err(RSocketError::ConnectionClosed)
        ));
        task.await.unwrap().unwrap();
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_keeps_priority_frames_only() {
        let sink = RecordingSink::default();
        let (handle, task) = spawn_writer_task(Box::new(sink.clone()), WriterConfig::default());

        handle.send(&payload_frame(1)).unwrap();
        handle
            .send(&ErrorFrame::new(0, ErrorCode::ConnectionError, "bye").into())
            .unwrap();
        handle.close(false);
        handle.close(true);
        task.await.unwrap().unwrap();

        let frames = sink.frames();
        assert!(frames.iter().any(|f| matches!(f, Frame::Error(_))));
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
        assert_eq!(handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_handles_closes_sink() {
        let sink = RecordingSink::default();
        let (handle, task) = spawn_writer_task(Box::new(sink.clone()), WriterConfig::default());

        handle.send(&payload_frame(1)).unwrap();
        drop(handle);
        task.await.unwrap().unwrap();

        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[derive(Clone, Default)]
    struct FailingSink;

    impl FrameSink for FailingSink {
        fn send_frames<'a>(&'a mut self, _frames: &'a [Bytes]) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(RSocketError::ConnectionError("broken pipe".into())) })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    /// Sink whose close waits for the test to release it.
    #[derive(Clone, Default)]
    struct GatedSink {
        closing: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    impl FrameSink for GatedSink {
        fn send_frames<'a>(&'a mut self, _frames: &'a [Bytes]) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<()>> {
            self.closing.notify_one();
            let release = self.release.clone();
            Box::pin(async move {
                release.notified().await;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_enqueue_while_sink_closing_is_not_counted() {
        let sink = GatedSink::default();
        let (handle, task) = spawn_writer_task(Box::new(sink.clone()), WriterConfig::default());

        handle.send(&payload_frame(1)).unwrap();
        handle.close(true);
        sink.closing.notified().await;

        // a send that passed the closed check just before close
        let bytes = payload_frame(3).encode().unwrap();
        assert!(matches!(
            handle.enqueue(false, bytes),
            Err(RSocketError::ConnectionClosed)
        ));
        assert_eq!(handle.pending_count(), 0);

        sink.release.notify_one();
        task.await.unwrap().unwrap();
        assert_eq!(handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_sink_failure_releases_pending() {
        let (handle, task) = spawn_writer_task(Box::new(FailingSink), WriterConfig {
            max_batch_size: 1,
        });

        for id in [1, 3, 5] {
            handle.send(&payload_frame(id)).unwrap();
        }
        handle.send(&keepalive()).unwrap();
        assert_eq!(handle.pending_count(), 4);

        assert!(task.await.unwrap().is_err());
        assert_eq!(handle.pending_count(), 0);
        assert!(handle.send(&payload_frame(7)).is_err());
        assert_eq!(handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_frame_rejected_before_enqueue() {
        let sink = RecordingSink::default();
        let (handle, _task) = spawn_writer_task(Box::new(sink), WriterConfig::default());

        let oversized = Payload::new(Bytes::new(), Some(Bytes::from(vec![0u8; 0x0100_0000])));
        let frame: Frame = RequestFrame::request_response(1, oversized).into();
        assert!(handle.send(&frame).is_err());
        assert_eq!(handle.pending_count(), 0);
    }
}
