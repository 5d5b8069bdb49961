//! Connection-scoped lease allowance.
//!
//! Two instances exist per connection: the lease received from the peer
//! gates outbound requests, the lease granted to the peer gates inbound
//! ones. Both are inert unless lease was negotiated in SETUP.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{RSocketError, Result};

#[derive(Debug, Clone, Copy)]
struct Allowance {
    remaining: u32,
    expires_at: Instant,
}

/// Remaining requests plus expiry of the current lease.
#[derive(Debug)]
pub(crate) struct LeaseState {
    enabled: bool,
    current: Mutex<Option<Allowance>>,
}

impl LeaseState {
    /// Lease semantics in effect: no request passes until a lease arrives.
    pub(crate) fn enabled() -> Self {
        Self {
            enabled: true,
            current: Mutex::new(None),
        }
    }

    /// Lease not negotiated: every request passes.
    pub(crate) fn disabled() -> Self {
        Self {
            enabled: false,
            current: Mutex::new(None),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replace the allowance with a fresh lease.
    pub(crate) fn update(&self, ttl: Duration, number_of_requests: u32) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = Some(Allowance {
            remaining: number_of_requests,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Take one request from the allowance.
    ///
    /// # Errors
    ///
    /// `LeaseExhausted` when no lease was received yet, the lease expired, or
    /// its request count is used up.
    pub(crate) fn try_use(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match current.as_mut() {
            Some(allowance) if allowance.remaining > 0 && Instant::now() < allowance.expires_at => {
                allowance.remaining -= 1;
                Ok(())
            }
            _ => Err(RSocketError::LeaseExhausted),
        }
    }

    /// Requests left in a still valid lease.
    pub(crate) fn available(&self) -> u32 {
        if !self.enabled {
            return u32::MAX;
        }
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match *current {
            Some(allowance) if Instant::now() < allowance.expires_at => allowance.remaining,
            _ => 0,
        }
    }
}
