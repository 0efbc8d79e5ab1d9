use drivepipe_frame::FrameError;
use drivepipe_process::ProcessError;

use crate::codec::CodecError;

/// Errors surfaced by a [`PipeTransport`](crate::PipeTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The driver process could not be launched or its pipes were missing.
    #[error("failed to start driver: {0}")]
    Start(#[source] ProcessError),

    /// Writing a frame to the driver's stdin failed. The transport should be
    /// treated as broken.
    #[error("failed to write frame: {0}")]
    Write(#[source] FrameError),

    /// Reading a frame from the driver's stdout failed, including EOF.
    #[error("failed to read frame: {0}")]
    Read(#[source] FrameError),

    /// The outgoing message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The incoming frame was not a valid message.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// The transport was already closed.
    #[error("transport closed")]
    Closed,

    /// The driver did not shut down cleanly on close.
    #[error("driver process failed: {0}")]
    Process(#[source] ProcessError),
}

impl TransportError {
    /// True when the driver closed its end of the stream.
    pub fn is_eof(&self) -> bool {
        matches!(self, TransportError::Read(err) if err.is_eof())
    }
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encode(e) => TransportError::Encode(e),
            CodecError::Decode(e) => TransportError::Decode(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
