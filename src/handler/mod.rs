//! Handler module - the application-facing side of a connection.
//!
//! Provides:
//! - [`RSocket`] - the four interaction models plus metadata push, implemented
//!   by application responders and by the [`RSocketClient`](crate::RSocketClient)
//!   requester handle alike
//! - [`RequestHandler`] - closure-based `RSocket` built with a fluent builder
//!
//! # Example
//!
//! ```
//! use futures::StreamExt;
//! use rsocket_mux::handler::RequestHandler;
//! use rsocket_mux::Payload;
//!
//! let handler = RequestHandler::builder()
//!     .request_response(|payload: Payload| async move {
//!         Ok(Payload::from(format!("echo: {}", payload.data_utf8())))
//!     })
//!     .request_stream(|_payload| {
//!         futures::stream::iter((0..3).map(|i| Ok(Payload::from(i.to_string())))).boxed()
//!     })
//!     .build();
//! ```

mod request_handler;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::{RSocketError, Result};
use crate::payload::Payload;

pub use crate::transport::BoxFuture;
pub use request_handler::{RequestHandler, RequestHandlerBuilder};

/// Lazy sequence of payloads, used for streamed responses and channel input.
pub type PayloadStream = BoxStream<'static, Result<Payload>>;

fn not_implemented(what: &str) -> RSocketError {
    RSocketError::ApplicationError(format!("{what} is not implemented"))
}

/// The interaction models of the protocol.
///
/// Every method has a default that fails with an application error, so
/// responders implement only what they support.
pub trait RSocket: Send + Sync + 'static {
    /// Connection-scoped metadata from the peer.
    fn metadata_push(&self, metadata: Bytes) -> BoxFuture<'_, Result<()>> {
        let _ = metadata;
        Box::pin(async { Err(not_implemented("metadata push")) })
    }

    /// One-way request. Failures are never reported to the peer.
    fn fire_and_forget(&self, payload: Payload) -> BoxFuture<'_, Result<()>> {
        let _ = payload;
        Box::pin(async { Err(not_implemented("fire and forget")) })
    }

    /// Single response.
    fn request_response(&self, payload: Payload) -> BoxFuture<'_, Result<Payload>> {
        let _ = payload;
        Box::pin(async { Err(not_implemented("request response")) })
    }

    /// Stream of responses, emitted as the peer grants credit.
    fn request_stream(&self, payload: Payload) -> PayloadStream {
        let _ = payload;
        error_stream(not_implemented("request stream"))
    }

    /// Bidirectional stream. `payloads` yields the peer's items after
    /// `initial`.
    fn request_channel(&self, initial: Payload, payloads: PayloadStream) -> PayloadStream {
        let _ = (initial, payloads);
        error_stream(not_implemented("request channel"))
    }
}

/// A stream that fails immediately with `error`.
pub fn error_stream(error: RSocketError) -> PayloadStream {
    Box::pin(futures::stream::once(async move { Err(error) }))
}

/// Responder that implements nothing; every request fails.
pub(crate) struct EmptyHandler;

impl RSocket for EmptyHandler {}
