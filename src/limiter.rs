//! Flow-control limiter for request credits.
//!
//! One [`Limiter`] is owned by each streaming operation. Credits are granted
//! by the reader task (initial requestN, inbound REQUEST_N frames) and
//! consumed by the task emitting payloads. The counter is a saturating
//! `AtomicU32` capped at `MAX_REQUEST_N`, paired with a `tokio::sync::Notify`
//! so a producer parked on zero credit wakes as soon as more is granted.
//!
//! ```text
//! reader task ── grant(n) ──► [ credits ] ◄── acquire() ── emitter task
//!                               │                 ▲
//!                               └──── notify ─────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::Notify;

use crate::error::{RSocketError, Result};
use crate::protocol::MAX_REQUEST_N;

/// Saturating request-credit counter with an async wake signal.
#[derive(Debug)]
pub struct Limiter {
    credits: AtomicU32,
    closed: AtomicBool,
    notify: Notify,
}

impl Limiter {
    /// Create a limiter holding `initial` credits (clamped to the maximum).
    pub fn new(initial: u32) -> Self {
        Self {
            credits: AtomicU32::new(initial.min(MAX_REQUEST_N)),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Add `n` credits, saturating at `MAX_REQUEST_N`.
    ///
    /// A grant of zero is ignored.
    pub fn grant(&self, n: u32) {
        if n == 0 {
            return;
        }
        // the closure always returns Some, so this never fails
        let _ = self
            .credits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n).min(MAX_REQUEST_N))
            });
        self.notify.notify_waiters();
    }

    /// Take one credit if available.
    pub fn try_consume_one(&self) -> bool {
        self.credits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .is_ok()
    }

    /// Wait until one credit is available and take it.
    ///
    /// Fails with `Canceled` once the limiter has been closed.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking so a concurrent grant is not lost
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return Err(RSocketError::Canceled("limiter closed".to_string()));
            }
            if self.try_consume_one() {
                return Ok(());
            }
            notified.await;
        }
    }

    /// Wake every parked producer and fail their pending `acquire`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Currently available credits.
    #[inline]
    pub fn available(&self) -> u32 {
        self.credits.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_consume_until_empty() {
        let limiter = Limiter::new(2);
        assert!(limiter.try_consume_one());
        assert!(limiter.try_consume_one());
        assert!(!limiter.try_consume_one());
        assert_eq!(limiter.available(), 0);
    }

    #[test]
    fn test_grant_saturates() {
        let limiter = Limiter::new(MAX_REQUEST_N - 1);
        limiter.grant(10);
        assert_eq!(limiter.available(), MAX_REQUEST_N);
        limiter.grant(u32::MAX);
        assert_eq!(limiter.available(), MAX_REQUEST_N);
    }

    #[test]
    fn test_initial_is_clamped() {
        let limiter = Limiter::new(u32::MAX);
        assert_eq!(limiter.available(), MAX_REQUEST_N);
    }

    #[test]
    fn test_zero_grant_ignored() {
        let limiter = Limiter::new(0);
        limiter.grant(0);
        assert!(!limiter.try_consume_one());
    }

    #[test]
    fn test_concurrent_consumes_never_exceed_grants() {
        let limiter = Arc::new(Limiter::new(0));
        let granter = {
            let limiter = limiter.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    limiter.grant(1);
                }
            })
        };
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    let mut taken = 0u32;
                    for _ in 0..2000 {
                        if limiter.try_consume_one() {
                            taken += 1;
                        }
                    }
                    taken
                })
            })
            .collect();

        granter.join().unwrap();
        let taken: u32 = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        assert!(taken <= 1000);
        assert_eq!(taken + limiter.available(), 1000);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_grant() {
        let limiter = Arc::new(Limiter::new(0));
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        limiter.grant(1);
        waiter.await.unwrap().unwrap();
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    async fn test_close_wakes_waiter() {
        let limiter = Arc::new(Limiter::new(0));
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        limiter.close();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(RSocketError::Canceled(_))));
    }
}
