use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Blocking frame writer, typically over a child's stdin.
///
/// Each frame is assembled in one buffer and written out whole, then the
/// stream is flushed. After any error the stream position is unknown and the
/// writer must not be used again.
pub struct FrameWriter<T> {
    inner: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Writer with the default 16 MiB frame limit.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Writer that refuses bodies over `config.max_payload_size`.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            scratch: BytesMut::new(),
            config,
        }
    }

    /// Write `body` as one frame and flush.
    pub fn write_frame(&mut self, body: &[u8]) -> Result<()> {
        let max = self.config.max_payload_size;
        if body.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: body.len(),
                max,
            });
        }

        self.scratch.clear();
        encode_frame(body, &mut self.scratch)?;
        write_all(&mut self.inner, &self.scratch)?;
        retry(|| self.inner.flush())?;

        tracing::trace!(size = body.len(), "frame written");
        Ok(())
    }

    /// Limits this writer was built with.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Give back the stream. Dropping it closes the driver's stdin.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// `Write::write_all`, except a zero-length write means the peer is gone.
fn write_all(out: &mut impl Write, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        match retry(|| out.write(bytes))? {
            0 => return Err(FrameError::ConnectionClosed),
            n => bytes = &bytes[n..],
        }
    }
    Ok(())
}

fn retry<R>(mut op: impl FnMut() -> std::io::Result<R>) -> Result<R> {
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::codec::HEADER_SIZE;
    use crate::reader::FrameReader;

    /// In-memory pipe end with scripted misbehaviour.
    #[derive(Default)]
    struct Pipe {
        data: Vec<u8>,
        max_write: Option<usize>,
        interrupts: usize,
        fail_with: Option<ErrorKind>,
        flushes: usize,
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(kind) = self.fail_with {
                return Err(kind.into());
            }
            if self.interrupts > 0 {
                self.interrupts -= 1;
                return Err(ErrorKind::Interrupted.into());
            }
            let n = self.max_write.unwrap_or(buf.len()).min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn frame_is_length_then_body_and_flushed() {
        let body = br#"{"id":1,"guid":"","method":"initialize"}"#;
        let mut writer = FrameWriter::new(Pipe::default());
        writer.write_frame(body).unwrap();

        let pipe = writer.into_inner();
        assert_eq!(pipe.data[..HEADER_SIZE], (body.len() as u32).to_le_bytes());
        assert_eq!(&pipe.data[HEADER_SIZE..], body);
        assert_eq!(pipe.flushes, 1);
    }

    #[test]
    fn short_and_interrupted_writes_still_produce_whole_frames() {
        let mut writer = FrameWriter::new(Pipe {
            max_write: Some(3),
            interrupts: 2,
            ..Pipe::default()
        });
        writer.write_frame(br#"{"id":1}"#).unwrap();
        writer.write_frame(br#"{"id":2}"#).unwrap();

        let mut reader = FrameReader::new(io::Cursor::new(writer.into_inner().data));
        assert_eq!(reader.read_frame().unwrap(), br#"{"id":1}"#.as_slice());
        assert_eq!(reader.read_frame().unwrap(), br#"{"id":2}"#.as_slice());
    }

    #[test]
    fn oversized_body_writes_nothing() {
        let mut writer = FrameWriter::with_config(
            Pipe::default(),
            FrameConfig {
                max_payload_size: 8,
            },
        );

        let err = writer.write_frame(br#"{"params":{}}"#).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 13, max: 8 }));
        assert!(writer.into_inner().data.is_empty());
    }

    #[test]
    fn closed_driver_stdin_is_an_error() {
        let mut broken = FrameWriter::new(Pipe {
            fail_with: Some(ErrorKind::BrokenPipe),
            ..Pipe::default()
        });
        assert!(matches!(
            broken.write_frame(b"{}"),
            Err(FrameError::Io(e)) if e.kind() == ErrorKind::BrokenPipe
        ));

        let mut zero = FrameWriter::new(Pipe {
            max_write: Some(0),
            ..Pipe::default()
        });
        assert!(matches!(
            zero.write_frame(b"{}"),
            Err(FrameError::ConnectionClosed)
        ));
    }
}
