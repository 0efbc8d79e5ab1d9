//! `tokio_util::codec` adapter for the same wire format.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, pending_frame_size, FrameConfig};
use crate::error::FrameError;

/// Frame codec for `FramedRead` / `FramedWrite`.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: FrameConfig,
}

impl FrameCodec {
    /// Codec with the default 16 MiB frame limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec enforcing `config.max_payload_size` in both directions.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.config.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::Truncated {
                expected: pending_frame_size(src),
                received: src.len(),
            }),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn frames_flow_through_duplex_in_order() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, FrameCodec::new());
        let mut stream = FramedRead::new(server, FrameCodec::new());

        let writer = tokio::spawn(async move {
            for i in 0..10 {
                sink.send(Bytes::from(format!(r#"{{"id":{i}}}"#)))
                    .await
                    .unwrap();
            }
        });

        for i in 0..10 {
            let frame = stream.next().await.unwrap().unwrap();
            assert_eq!(frame.as_ref(), format!(r#"{{"id":{i}}}"#).as_bytes());
        }
        writer.await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_truncated() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, FrameCodec::new());

        client.write_all(&8u32.to_le_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 12,
                received: 7
            }
        ));
    }

    #[test]
    fn encoder_rejects_oversized_payload() {
        let mut codec = FrameCodec::with_config(FrameConfig {
            max_payload_size: 2,
        });
        let mut dst = BytesMut::new();
        let err = codec.encode(Bytes::from_static(b"abc"), &mut dst).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(dst.is_empty());
    }
}
