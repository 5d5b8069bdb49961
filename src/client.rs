//! Connection entry points and the requester handle.
//!
//! [`RSocketConnector`] opens the client side of a connection: it sends
//! SETUP and starts the connection tasks right away. [`RSocketServer`]
//! accepts the server side: it waits for SETUP, validates it, asks the
//! acceptor for a responder and only then starts processing streams.
//!
//! Both yield an [`RSocketClient`], the handle for issuing requests to the
//! peer. Connections are symmetric: a server can request from its client
//! through the handle passed to its acceptor.
//!
//! # Example
//!
//! ```
//! use rsocket_mux::handler::RequestHandler;
//! use rsocket_mux::transport::LocalTransport;
//! use rsocket_mux::{Payload, RSocketConnector, RSocketServer};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rsocket_mux::Result<()> {
//! let (client_side, server_side) = LocalTransport::pair();
//!
//! let server = RSocketServer::new().handler(
//!     RequestHandler::builder()
//!         .request_response(|p: Payload| async move { Ok(p) })
//!         .build(),
//! );
//! tokio::spawn(async move { server.accept(server_side).await });
//!
//! let client = RSocketConnector::new().connect(client_side).await?;
//! let response = client.request_response(Payload::from("ping")).await?;
//! assert_eq!(response.data(), b"ping");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::config::{ConnectionConfig, KeepAlive, PrefetchStrategy};
use crate::connection::{accept_setup, setup_frame, ConnectionSetup, ConnectionShared};
use crate::error::{RSocketError, Result};
use crate::handler::{error_stream, BoxFuture, PayloadStream, RSocket};
use crate::operation::requester;
use crate::payload::Payload;
use crate::protocol::{ErrorFrame, Frame, MetadataPushFrame};
use crate::transport::{FrameSink, Transport};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

type Acceptor = Arc<
    dyn Fn(ConnectionSetup, RSocketClient) -> BoxFuture<'static, Result<Arc<dyn RSocket>>>
        + Send
        + Sync,
>;

/// Builder for the client side of a connection.
pub struct RSocketConnector {
    config: ConnectionConfig,
    setup_payload: Payload,
    handler: Option<Arc<dyn RSocket>>,
}

impl RSocketConnector {
    /// Create a connector with default configuration.
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            setup_payload: Payload::empty(),
            handler: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set keepalive interval and max lifetime.
    ///
    /// Default: 20 s / 90 s
    pub fn keep_alive(mut self, interval: Duration, max_lifetime: Duration) -> Self {
        self.config.keep_alive = KeepAlive::new(interval, max_lifetime);
        self
    }

    /// Set the data mime type announced in SETUP.
    ///
    /// Default: `application/binary`
    pub fn data_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.config.data_mime_type = mime_type.into();
        self
    }

    /// Set the metadata mime type announced in SETUP.
    ///
    /// Default: `application/binary`
    pub fn metadata_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.config.metadata_mime_type = mime_type.into();
        self
    }

    /// Payload carried by the SETUP frame.
    pub fn setup_payload(mut self, payload: Payload) -> Self {
        self.setup_payload = payload;
        self
    }

    /// Request lease semantics: no request is sent without a lease from the
    /// server.
    ///
    /// Default: false
    pub fn honor_lease(mut self, honor: bool) -> Self {
        self.config.honor_lease = honor;
        self
    }

    /// Fragment outbound payloads into frames of at most this many bytes.
    ///
    /// Default: 0 (no fragmentation)
    pub fn max_fragment_size(mut self, size: usize) -> Self {
        self.config.max_fragment_size = size;
        self
    }

    /// Upper bound on a reassembled inbound payload.
    ///
    /// Default: 16 MiB
    pub fn max_reassembly_size(mut self, size: usize) -> Self {
        self.config.max_reassembly_size = size;
        self
    }

    /// Credit policy for inbound streams.
    ///
    /// Default: request 64, replenish at 16
    pub fn prefetch(mut self, prefetch: PrefetchStrategy) -> Self {
        self.config.prefetch = prefetch;
        self
    }

    /// Maximum frames per transport write.
    ///
    /// Default: 64
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.writer.max_batch_size = size;
        self
    }

    /// Responder for requests the server sends to this client.
    pub fn handler(mut self, handler: impl RSocket) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Send SETUP over `transport` and start the connection.
    ///
    /// SETUP is not acknowledged; a rejection arrives later as the close
    /// cause of the returned handle.
    pub async fn connect<T: Transport>(self, transport: T) -> Result<RSocketClient> {
        self.config.validate()?;
        let (sink, source) = transport.into_parts();
        let (writer, writer_task) = spawn_writer_task(sink, self.config.writer.clone());

        writer.send(&setup_frame(&self.config, self.setup_payload))?;
        debug!(
            keepalive_ms = self.config.keep_alive.interval_millis(),
            lease = self.config.honor_lease,
            "setup sent"
        );

        let shared = ConnectionShared::new(true, writer, self.config);
        if let Some(handler) = self.handler {
            shared.set_handler(handler);
        }
        shared.start(source, writer_task);
        Ok(RSocketClient { shared })
    }
}

impl Default for RSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder and acceptor for the server side of connections.
///
/// Keepalive timing and mime types are taken from each client's SETUP; the
/// remaining tuning applies to every accepted connection.
pub struct RSocketServer {
    config: ConnectionConfig,
    acceptor: Option<Acceptor>,
}

impl RSocketServer {
    /// Create a server whose connections reject every request until a
    /// handler or acceptor is set.
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            acceptor: None,
        }
    }

    /// Replace the local tuning.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept clients that request lease semantics.
    ///
    /// Default: false (such clients are rejected)
    pub fn honor_lease(mut self, honor: bool) -> Self {
        self.config.honor_lease = honor;
        self
    }

    /// Fragment outbound payloads into frames of at most this many bytes.
    ///
    /// Default: 0 (no fragmentation)
    pub fn max_fragment_size(mut self, size: usize) -> Self {
        self.config.max_fragment_size = size;
        self
    }

    /// Upper bound on a reassembled inbound payload.
    ///
    /// Default: 16 MiB
    pub fn max_reassembly_size(mut self, size: usize) -> Self {
        self.config.max_reassembly_size = size;
        self
    }

    /// Credit policy for inbound streams (channel input).
    ///
    /// Default: request 64, replenish at 16
    pub fn prefetch(mut self, prefetch: PrefetchStrategy) -> Self {
        self.config.prefetch = prefetch;
        self
    }

    /// Maximum frames per transport write.
    ///
    /// Default: 64
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.writer.max_batch_size = size;
        self
    }

    /// Serve every connection with the same responder.
    pub fn handler(self, handler: impl RSocket) -> Self {
        let handler: Arc<dyn RSocket> = Arc::new(handler);
        self.acceptor(move |_setup, _client| {
            let handler = handler.clone();
            async move { Ok(handler) }
        })
    }

    /// Decide per connection: inspect SETUP, keep the handle for requests to
    /// the client, and return the responder. An error rejects the
    /// connection with `REJECTED_SETUP`.
    ///
    /// The connection does not process frames until the acceptor returns, so
    /// it must not wait on requests of its own.
    pub fn acceptor<F, Fut>(mut self, acceptor: F) -> Self
    where
        F: Fn(ConnectionSetup, RSocketClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn RSocket>>> + Send + 'static,
    {
        self.acceptor = Some(Arc::new(
            move |setup, client| -> BoxFuture<'static, Result<Arc<dyn RSocket>>> {
                Box::pin(acceptor(setup, client))
            },
        ));
        self
    }

    /// Run the SETUP exchange on `transport` and start the connection.
    ///
    /// # Errors
    ///
    /// The setup error that was sent to the client, or `ConnectionClosed` if
    /// the transport ended before SETUP.
    pub async fn accept<T: Transport>(&self, transport: T) -> Result<RSocketClient> {
        let (sink, mut source) = transport.into_parts();

        let first = match source.receive_frame().await? {
            Some(bytes) => Frame::decode(bytes)
                .map_err(|e| RSocketError::InvalidSetup(format!("malformed setup: {e}"))),
            None => {
                debug!("transport closed before setup");
                return Err(RSocketError::ConnectionClosed);
            }
        };

        let setup = match first.and_then(|frame| accept_setup(frame, self.config.honor_lease)) {
            Ok(setup) => setup,
            Err(e) => return Err(reject(sink, e).await),
        };
        let config = setup.negotiated(&self.config);
        config.validate()?;

        let (writer, writer_task) = spawn_writer_task(sink, config.writer.clone());
        let shared = ConnectionShared::new(false, writer, config);
        let client = RSocketClient {
            shared: shared.clone(),
        };

        if let Some(acceptor) = &self.acceptor {
            match acceptor(setup, client.clone()).await {
                Ok(handler) => shared.set_handler(handler),
                Err(e) => {
                    let e = RSocketError::RejectedSetup(e.message());
                    shared.close_with(e.clone(), true, true);
                    let _ = writer_task.await;
                    return Err(e);
                }
            }
        }

        debug!("setup accepted");
        shared.start(source, writer_task);
        Ok(client)
    }
}

impl Default for RSocketServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Report `error` on stream 0, flush and release the transport.
async fn reject(sink: Box<dyn FrameSink>, error: RSocketError) -> RSocketError {
    debug!(error = %error, "rejecting setup");
    let (writer, writer_task): (WriterHandle, _) = spawn_writer_task(sink, WriterConfig::default());
    let _ = writer.send(&Frame::Error(ErrorFrame::from_error(0, &error)));
    writer.close(true);
    let _ = writer_task.await;
    error
}

/// Handle for sending requests to the peer of one connection. Cheap to
/// clone; every clone addresses the same connection.
#[derive(Clone)]
pub struct RSocketClient {
    shared: Arc<ConnectionShared>,
}

impl std::fmt::Debug for RSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RSocketClient").finish_non_exhaustive()
    }
}

impl RSocketClient {
    /// Send a one-way request.
    pub async fn fire_and_forget(&self, payload: Payload) -> Result<()> {
        self.shared.check_request()?;
        requester::fire_and_forget(&self.shared.ctx, payload)
    }

    /// Send a request and wait for its single response.
    ///
    /// Dropping the future before it resolves cancels the request.
    pub async fn request_response(&self, payload: Payload) -> Result<Payload> {
        self.shared.check_request()?;
        requester::request_response(&self.shared.ctx, payload).await
    }

    /// Request a stream of responses. Credit is requested as items are
    /// consumed; dropping the stream cancels it.
    pub fn request_stream(&self, payload: Payload) -> PayloadStream {
        if let Err(e) = self.shared.check_request() {
            return error_stream(e);
        }
        requester::request_stream(&self.shared.ctx, payload)
    }

    /// Open a channel. `initial` goes out with the request; `payloads` is
    /// sent as the responder grants credit.
    pub fn request_channel(&self, initial: Payload, payloads: PayloadStream) -> PayloadStream {
        if let Err(e) = self.shared.check_request() {
            return error_stream(e);
        }
        requester::request_channel(&self.shared.ctx, initial, payloads)
    }

    /// Push connection-scoped metadata to the peer.
    pub fn metadata_push(&self, metadata: Bytes) -> Result<()> {
        if let Some(cause) = self.shared.close_cause() {
            return Err(cause);
        }
        self.shared
            .writer
            .send(&Frame::MetadataPush(MetadataPushFrame { metadata }))
    }

    /// Allow the peer `number_of_requests` requests during `ttl`.
    ///
    /// Only valid when lease semantics were negotiated.
    pub fn send_lease(&self, ttl: Duration, number_of_requests: u32) -> Result<()> {
        self.shared.send_lease(ttl, number_of_requests)
    }

    /// Requests still allowed by the lease received from the peer
    /// (`u32::MAX` without lease semantics).
    pub fn available_lease(&self) -> u32 {
        self.shared.available_lease()
    }

    /// Close the connection gracefully: queued frames are flushed, live
    /// streams fail with `ConnectionClosed`.
    pub fn dispose(&self) {
        self.shared
            .close_with(RSocketError::ConnectionClosed, false, true);
    }

    /// Whether the connection is still open.
    pub fn is_active(&self) -> bool {
        !self.shared.is_closed()
    }

    /// Wait for the connection to close and return the cause.
    pub async fn on_close(&self) -> RSocketError {
        self.shared.closed().await
    }

    /// Number of live streams on the connection.
    pub fn active_streams(&self) -> usize {
        self.shared.ctx.registry.len()
    }
}

impl RSocket for RSocketClient {
    fn metadata_push(&self, metadata: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { RSocketClient::metadata_push(self, metadata) })
    }

    fn fire_and_forget(&self, payload: Payload) -> BoxFuture<'_, Result<()>> {
        Box::pin(RSocketClient::fire_and_forget(self, payload))
    }

    fn request_response(&self, payload: Payload) -> BoxFuture<'_, Result<Payload>> {
        Box::pin(RSocketClient::request_response(self, payload))
    }

    fn request_stream(&self, payload: Payload) -> PayloadStream {
        RSocketClient::request_stream(self, payload)
    }

    fn request_channel(&self, initial: Payload, payloads: PayloadStream) -> PayloadStream {
        RSocketClient::request_channel(self, initial, payloads)
    }
}
