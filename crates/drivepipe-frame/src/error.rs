/// Failures while moving frames over a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A body, or a declared length, above the configured limit.
    #[error("frame body of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("pipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a header or payload.
    #[error("truncated frame ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },
}

impl FrameError {
    /// True when the peer went away, cleanly or mid-frame.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            FrameError::ConnectionClosed | FrameError::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
