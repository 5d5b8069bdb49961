//! SETUP exchange.
//!
//! The client's first frame is SETUP; the server validates it before any
//! stream traffic is processed. Rejections are reported with an ERROR frame
//! on stream 0 carrying one of the setup error codes, after which the
//! connection is closed.

use std::time::Duration;

use crate::config::{ConnectionConfig, KeepAlive};
use crate::error::{RSocketError, Result};
use crate::payload::Payload;
use crate::protocol::{Frame, SetupFrame, Version};

/// Parameters the client announced in its SETUP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSetup {
    pub version: Version,
    pub keep_alive: KeepAlive,
    pub honor_lease: bool,
    pub metadata_mime_type: String,
    pub data_mime_type: String,
    /// Setup payload (application defined, may be empty).
    pub payload: Payload,
}

/// SETUP frame announcing `config`.
pub(crate) fn setup_frame(config: &ConnectionConfig, payload: Payload) -> Frame {
    Frame::Setup(SetupFrame {
        version: Version::CURRENT,
        honor_lease: config.honor_lease,
        keep_alive_interval: config.keep_alive.interval_millis(),
        max_lifetime: config.keep_alive.max_lifetime_millis(),
        resume_token: None,
        metadata_mime_type: config.metadata_mime_type.clone(),
        data_mime_type: config.data_mime_type.clone(),
        payload,
    })
}

/// Validate the first frame a server received.
///
/// `lease_supported` tells whether the server accepts lease semantics.
pub(crate) fn accept_setup(first: Frame, lease_supported: bool) -> Result<ConnectionSetup> {
    let setup = match first {
        Frame::Setup(setup) => setup,
        Frame::Resume(_) => {
            return Err(RSocketError::RejectedResume(
                "resumption is not supported".to_string(),
            ))
        }
        other => {
            return Err(RSocketError::InvalidSetup(format!(
                "expected SETUP, got {:?}",
                other.frame_type()
            )))
        }
    };

    if setup.version.major != Version::CURRENT.major {
        return Err(RSocketError::UnsupportedSetup(format!(
            "unsupported version {}",
            setup.version
        )));
    }
    if setup.keep_alive_interval == 0 || setup.max_lifetime == 0 {
        return Err(RSocketError::InvalidSetup(format!(
            "invalid keepalive: interval {} ms, max lifetime {} ms",
            setup.keep_alive_interval, setup.max_lifetime
        )));
    }
    if setup.honor_lease && !lease_supported {
        return Err(RSocketError::UnsupportedSetup(
            "lease is not supported".to_string(),
        ));
    }

    Ok(ConnectionSetup {
        version: setup.version,
        keep_alive: KeepAlive::new(
            Duration::from_millis(u64::from(setup.keep_alive_interval)),
            Duration::from_millis(u64::from(setup.max_lifetime)),
        ),
        honor_lease: setup.honor_lease,
        metadata_mime_type: setup.metadata_mime_type,
        data_mime_type: setup.data_mime_type,
        payload: setup.payload,
    })
}

impl ConnectionSetup {
    /// Connection configuration of the server side: negotiated values from
    /// SETUP, local tuning from `local`.
    pub(crate) fn negotiated(&self, local: &ConnectionConfig) -> ConnectionConfig {
        ConnectionConfig {
            keep_alive: self.keep_alive,
            metadata_mime_type: self.metadata_mime_type.clone(),
            data_mime_type: self.data_mime_type.clone(),
            honor_lease: self.honor_lease,
            ..local.clone()
        }
    }
}
