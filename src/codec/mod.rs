//! Codec module - typed encoding of payload data and metadata.
//!
//! - [`RawCodec`] - pass-through for raw bytes (zero-copy)
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde`
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so codec selection happens at compile time.
//!
//! # Example
//!
//! ```
//! use rsocket_mux::codec::{MsgPackCodec, RawCodec};
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let raw = RawCodec::copy_from_slice(b"binary data");
//! assert_eq!(RawCodec::data(&raw), b"binary data");
//! ```

mod msgpack;
mod raw;

pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;
