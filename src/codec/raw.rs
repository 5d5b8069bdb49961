//! Raw codec - pass-through for binary and UTF-8 payloads.
//!
//! Used when payload data is already serialized or is plain bytes.
//!
//! # Example
//!
//! ```
//! use rsocket_mux::codec::RawCodec;
//! use bytes::Bytes;
//!
//! let bytes = Bytes::from_static(b"zero copy");
//! let payload = RawCodec::payload(bytes.clone(), None);
//! assert_eq!(RawCodec::data(&payload).as_ptr(), bytes.as_ptr());
//! ```

use bytes::Bytes;

use crate::error::{RSocketError, Result};
use crate::payload::Payload;

/// Raw codec that passes bytes through without transformation.
pub struct RawCodec;

impl RawCodec {
    /// Wrap bytes into a payload without copying.
    #[inline]
    pub fn payload(data: Bytes, metadata: Option<Bytes>) -> Payload {
        Payload::new(data, metadata)
    }

    /// Copy a byte slice into a data-only payload.
    #[inline]
    pub fn copy_from_slice(data: &[u8]) -> Payload {
        Payload::from_data(Bytes::copy_from_slice(data))
    }

    /// Borrow the data section.
    #[inline]
    pub fn data(payload: &Payload) -> &[u8] {
        payload.data()
    }

    /// Strict UTF-8 view of the data section.
    pub fn utf8(payload: &Payload) -> Result<&str> {
        std::str::from_utf8(payload.data())
            .map_err(|e| RSocketError::Codec(format!("payload data is not UTF-8: {e}")))
    }
}
