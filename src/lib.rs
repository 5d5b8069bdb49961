//! # rsocket-mux
//!
//! Multiplexed, flow-controlled RPC over a single connection, following the
//! RSocket frame protocol.
//!
//! Both peers of a connection can issue requests in four interaction models:
//! fire-and-forget, request-response, request-stream and request-channel.
//! Streams are multiplexed by stream id over one transport and every stream
//! is governed by REQUEST_N credit, so no side buffers without bound.
//!
//! ## Architecture
//!
//! - **Frame codec** ([`protocol`]): 6-byte header plus per-type bodies,
//!   24-bit length prefix on byte streams, fragmentation of large payloads
//! - **Output queue** (`writer`): one writer task per connection, connection
//!   frames ahead of stream frames, batched vectored writes
//! - **Streams**: per-stream requester/responder state machines owned by a
//!   registry that allocates ids and routes inbound frames
//! - **Connection**: SETUP exchange, keepalive, lease and teardown
//!
//! ## Example
//!
//! ```
//! use futures::StreamExt;
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
//!         .request_stream(|p: Payload| {
//!             let prefix = p.data_utf8();
//!             futures::stream::iter((0..3).map(move |i| Ok(Payload::from(format!("{prefix}-{i}")))))
//!                 .boxed()
//!         })
//!         .build(),
//! );
//! tokio::spawn(async move { server.accept(server_side).await });
//!
//! let client = RSocketConnector::new().connect(client_side).await?;
//! let items: Vec<String> = client
//!     .request_stream(Payload::from("item"))
//!     .map(|r| r.map(|p| p.data_utf8()))
//!     .collect::<Vec<_>>()
//!     .await
//!     .into_iter()
//!     .collect::<rsocket_mux::Result<_>>()?;
//! assert_eq!(items, ["item-0", "item-1", "item-2"]);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod limiter;
pub mod payload;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod connection;
mod operation;
mod registry;

pub use client::{RSocketClient, RSocketConnector, RSocketServer};
pub use config::{ConnectionConfig, KeepAlive, PrefetchStrategy};
pub use connection::ConnectionSetup;
pub use error::{RSocketError, Result};
pub use handler::{PayloadStream, RSocket, RequestHandler};
pub use payload::Payload;
