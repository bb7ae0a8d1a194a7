//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The services don't care HOW requests and responses are serialized, they
//! just need something that implements [`Codec`]. [`JsonCodec`] is the only
//! implementation: both services and every legacy client speak JSON.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use keystone_protocol::{Codec, JsonCodec, Request};
///
/// let codec = JsonCodec;
/// let request = Request::new("login", "alice").with_password("Valid123!");
///
/// let bytes = codec.encode(&request).unwrap();
/// let decoded: Request = codec.decode(&bytes).unwrap();
/// assert_eq!(request, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response};

    #[test]
    fn test_json_codec_decode_garbage_returns_decode_error() {
        let result: Result<Request, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_encodes_response_compactly() {
        let bytes = JsonCodec.encode(&Response::ok("hi")).unwrap();
        assert_eq!(bytes, br#"{"success":true,"message":"hi"}"#);
    }

    #[test]
    fn test_json_codec_decodes_legacy_request_with_trailing_whitespace() {
        let req: Request = JsonCodec
            .decode(b"{\"action\":\"login\",\"username\":\"bob\"}\n")
            .unwrap();
        assert_eq!(req.action, "login");
    }
}
