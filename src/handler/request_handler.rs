//! Closure-based responder.
//!
//! Each interaction model is registered as a closure; unregistered models
//! fall back to the [`RSocket`] defaults. Closures are boxed once at build
//! time so dispatch is a single dynamic call.

use std::future::Future;

use bytes::Bytes;

use super::{BoxFuture, PayloadStream, RSocket};
use crate::error::Result;
use crate::payload::Payload;

type MetadataPushFn = Box<dyn Fn(Bytes) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type FireAndForgetFn = Box<dyn Fn(Payload) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type RequestResponseFn = Box<dyn Fn(Payload) -> BoxFuture<'static, Result<Payload>> + Send + Sync>;
type RequestStreamFn = Box<dyn Fn(Payload) -> PayloadStream + Send + Sync>;
type RequestChannelFn = Box<dyn Fn(Payload, PayloadStream) -> PayloadStream + Send + Sync>;

/// Responder assembled from closures.
#[derive(Default)]
pub struct RequestHandler {
    metadata_push: Option<MetadataPushFn>,
    fire_and_forget: Option<FireAndForgetFn>,
    request_response: Option<RequestResponseFn>,
    request_stream: Option<RequestStreamFn>,
    request_channel: Option<RequestChannelFn>,
}

impl RequestHandler {
    /// Start a builder.
    pub fn builder() -> RequestHandlerBuilder {
        RequestHandlerBuilder::default()
    }
}

impl RSocket for RequestHandler {
    fn metadata_push(&self, metadata: Bytes) -> BoxFuture<'_, Result<()>> {
        match &self.metadata_push {
            Some(f) => f(metadata),
            None => RSocket::metadata_push(&super::EmptyHandler, metadata),
        }
    }

    fn fire_and_forget(&self, payload: Payload) -> BoxFuture<'_, Result<()>> {
        match &self.fire_and_forget {
            Some(f) => f(payload),
            None => RSocket::fire_and_forget(&super::EmptyHandler, payload),
        }
    }

    fn request_response(&self, payload: Payload) -> BoxFuture<'_, Result<Payload>> {
        match &self.request_response {
            Some(f) => f(payload),
            None => RSocket::request_response(&super::EmptyHandler, payload),
        }
    }

    fn request_stream(&self, payload: Payload) -> PayloadStream {
        match &self.request_stream {
            Some(f) => f(payload),
            None => RSocket::request_stream(&super::EmptyHandler, payload),
        }
    }

    fn request_channel(&self, initial: Payload, payloads: PayloadStream) -> PayloadStream {
        match &self.request_channel {
            Some(f) => f(initial, payloads),
            None => RSocket::request_channel(&super::EmptyHandler, initial, payloads),
        }
    }
}

/// Fluent builder for [`RequestHandler`].
#[derive(Default)]
pub struct RequestHandlerBuilder {
    handler: RequestHandler,
}

impl RequestHandlerBuilder {
    /// Handle connection-scoped metadata pushes.
    pub fn metadata_push<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handler.metadata_push = Some(Box::new(
            move |metadata| -> BoxFuture<'static, Result<()>> { Box::pin(f(metadata)) },
        ));
        self
    }

    /// Handle fire-and-forget requests.
    pub fn fire_and_forget<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handler.fire_and_forget = Some(Box::new(
            move |payload| -> BoxFuture<'static, Result<()>> { Box::pin(f(payload)) },
        ));
        self
    }

    /// Handle request-response.
    pub fn request_response<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload>> + Send + 'static,
    {
        self.handler.request_response = Some(Box::new(
            move |payload| -> BoxFuture<'static, Result<Payload>> { Box::pin(f(payload)) },
        ));
        self
    }

    /// Handle request-stream.
    pub fn request_stream<F>(mut self, f: F) -> Self
    where
        F: Fn(Payload) -> PayloadStream + Send + Sync + 'static,
    {
        self.handler.request_stream = Some(Box::new(f));
        self
    }

    /// Handle request-channel.
    pub fn request_channel<F>(mut self, f: F) -> Self
    where
        F: Fn(Payload, PayloadStream) -> PayloadStream + Send + Sync + 'static,
    {
        self.handler.request_channel = Some(Box::new(f));
        self
    }

    /// Finish building.
    pub fn build(self) -> RequestHandler {
        self.handler
    }
}
