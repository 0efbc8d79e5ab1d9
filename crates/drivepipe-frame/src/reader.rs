use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::codec::{decode_frame, pending_frame_size, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Blocking frame reader, typically over a child's stdout.
///
/// Bytes that arrive past the end of one frame stay buffered for the next
/// call, so a single pipe read may yield several frames.
pub struct FrameReader<T> {
    inner: T,
    pending: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Reader with the default 16 MiB frame limit.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Reader enforcing `config.max_payload_size` on every header.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
        }
    }

    /// Block until one whole frame body is available and return it.
    ///
    /// EOF with nothing buffered is [`FrameError::ConnectionClosed`]; EOF
    /// partway through a header or body is [`FrameError::Truncated`].
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(body) = decode_frame(&mut self.pending, self.config.max_payload_size)? {
                tracing::trace!(size = body.len(), "frame read");
                return Ok(body);
            }
            if !self.fill()? {
                return Err(self.eof_error());
            }
        }
    }

    /// Pull one chunk from the stream. `false` means EOF.
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn eof_error(&self) -> FrameError {
        if self.pending.is_empty() {
            FrameError::ConnectionClosed
        } else {
            FrameError::Truncated {
                expected: pending_frame_size(&self.pending),
                received: self.pending.len(),
            }
        }
    }

    /// Limits this reader was built with.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Give back the stream. Any partially buffered frame is discarded.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
