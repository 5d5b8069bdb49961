//! Application payload: data plus optional metadata.
//!
//! Uses `bytes::Bytes` for zero-copy sharing between the codec, the queue and
//! the application.
//!
//! # Example
//!
//! ```
//! use rsocket_mux::Payload;
//!
//! let payload = Payload::builder().data("hello").metadata("route").build();
//! assert_eq!(payload.data(), b"hello");
//! assert_eq!(payload.metadata(), Some(&b"route"[..]));
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::Result;

/// A payload: `data` (always present, possibly empty) and optional `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    data: Bytes,
    metadata: Option<Bytes>,
}

impl Payload {
    /// Create a payload from data and optional metadata.
    pub fn new(data: impl Into<Bytes>, metadata: Option<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata,
        }
    }

    /// Payload with only data.
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self::new(data, None)
    }

    /// Empty payload (no data, no metadata).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start a builder.
    pub fn builder() -> PayloadBuilder {
        PayloadBuilder::default()
    }

    /// Serialize a value with MessagePack into the data section.
    pub fn from_msgpack<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::from_data(MsgPackCodec::encode(value)?))
    }

    /// Deserialize the data section with MessagePack.
    pub fn data_msgpack<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.data)
    }

    /// Data bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Metadata bytes, if present.
    #[inline]
    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    /// Whether metadata is present (even if empty).
    #[inline]
    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// Data interpreted as UTF-8 (lossy).
    pub fn data_utf8(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Combined byte length of data and metadata.
    pub fn len(&self) -> usize {
        self.data.len() + self.metadata.as_ref().map_or(0, Bytes::len)
    }

    /// True when there is no data and no metadata.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.metadata.is_none()
    }

    /// Split into owned parts.
    pub fn into_parts(self) -> (Bytes, Option<Bytes>) {
        (self.data, self.metadata)
    }
}

impl From<&'static str> for Payload {
    fn from(data: &'static str) -> Self {
        Self::from_data(Bytes::from_static(data.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(data: String) -> Self {
        Self::from_data(data)
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::from_data(data)
    }
}

/// Fluent builder for [`Payload`].
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    data: Bytes,
    metadata: Option<Bytes>,
}

impl PayloadBuilder {
    /// Set the data section.
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Set the metadata section.
    pub fn metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Finish building.
    pub fn build(self) -> Payload {
        Payload {
            data: self.data,
            metadata: self.metadata,
        }
    }
}
