//! Length-prefixed framing for talking to a driver process over a pipe pair.
//!
//! Every message travels as one frame:
//! - A 4-byte little-endian payload length
//! - Exactly that many bytes of UTF-8 JSON
//!
//! JSON documents do not self-delimit on a raw byte stream, so the length
//! header is what lets both sides find message boundaries. Readers never hand
//! out a partial frame.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
