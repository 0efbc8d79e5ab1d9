//! JSON body encoding for [`Message`]s.
//!
//! Framing is handled separately by `drivepipe-frame`; this module only turns
//! a message into the bytes of one frame body and back.

use crate::message::Message;

/// Failure to turn a message into bytes or back.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(#[source] serde_json::Error),

    /// Malformed JSON, a field of the wrong type, or an invalid field
    /// combination.
    #[error("decode: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serialize a message as compact JSON.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(CodecError::Encode)
}

/// Parse a frame body into a message.
pub fn decode(body: &[u8]) -> Result<Message, CodecError> {
    serde_json::from_slice(body).map_err(CodecError::Decode)
}
