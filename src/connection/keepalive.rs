//! Keepalive timer.
//!
//! The client sends KEEPALIVE with the respond flag every interval; the
//! server only echoes (see the dispatcher). Both sides fail the connection
//! when no KEEPALIVE has been received for the max lifetime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, trace};

use super::ConnectionShared;
use crate::error::RSocketError;
use crate::protocol::{Frame, KeepAliveFrame};

/// Time of the last KEEPALIVE received from the peer.
#[derive(Debug)]
pub(crate) struct KeepAliveTracker {
    last_received: Mutex<Instant>,
}

impl KeepAliveTracker {
    pub(crate) fn new() -> Self {
        Self {
            last_received: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn mark(&self) {
        *self.last_received.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.last_received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }
}

pub(crate) async fn keepalive_loop(shared: Arc<ConnectionShared>) {
    let keep_alive = shared.config.keep_alive;
    let mut ticker = tokio::time::interval(keep_alive.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.closed() => return,
            _ = ticker.tick() => {}
        }

        let elapsed = shared.keepalive.elapsed();
        if elapsed > keep_alive.max_lifetime {
            error!(
                elapsed_ms = elapsed.as_millis() as u64,
                "keepalive timeout"
            );
            shared.close_with(
                RSocketError::ConnectionError(format!(
                    "No keep-alive acks for {} ms",
                    keep_alive.max_lifetime.as_millis()
                )),
                true,
                false,
            );
            return;
        }

        if shared.is_client {
            trace!("sending keepalive");
            let frame = Frame::KeepAlive(KeepAliveFrame {
                respond: true,
                last_position: 0,
                data: bytes::Bytes::new(),
            });
            if shared.writer.send(&frame).is_err() {
                return;
            }
        }
    }
}
