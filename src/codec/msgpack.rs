//! MsgPack codec for payload data using `rmp-serde`.
//!
//! Structs are written with `to_vec_named` (struct-as-map) so peers written
//! in dynamically typed languages can read them without a shared schema.
//!
//! # Example
//!
//! ```
//! use rsocket_mux::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Tick {
//!     seq: u32,
//!     symbol: String,
//! }
//!
//! let tick = Tick { seq: 42, symbol: "RS".to_string() };
//! let encoded = MsgPackCodec::encode(&tick).unwrap();
//! let decoded: Tick = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, tick);
//! ```

use bytes::Bytes;

use crate::error::Result;
use crate::payload::Payload;

/// MessagePack codec for structured payload data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Build a payload whose data and metadata are both MsgPack encoded.
    pub fn payload_with_metadata<D, M>(data: &D, metadata: &M) -> Result<Payload>
    where
        D: serde::Serialize,
        M: serde::Serialize,
    {
        Ok(Payload::new(
            Self::encode(data)?,
            Some(Bytes::from(Self::encode(metadata)?)),
        ))
    }

    /// Decode the metadata section of a payload, `None` when absent.
    pub fn decode_metadata<T: serde::de::DeserializeOwned>(payload: &Payload) -> Result<Option<T>> {
        payload.metadata().map(Self::decode).transpose()
    }
}
