//! `tokio_util::codec` integration.
//!
//! [`FrameDecoder`] and [`FrameEncoder`] plug into `FramedRead` / `FramedWrite`
//! directly; [`JsonCodec`] combines both for a `Framed` duplex.
//!
//! A bad payload is yielded as [`Decoded::InvalidPayload`] rather than as an
//! error, because `Framed` streams terminate after the first error and a bad
//! payload does not compromise the frames after it.

use bytes::BytesMut;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{Decoded, FrameConfig, FrameDecoder, FrameEncoder};
use crate::error::FrameError;

impl Decoder for FrameDecoder {
    type Item = Decoded;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, FrameError> {
        FrameDecoder::decode(self, src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, FrameError> {
        FrameDecoder::decode_eof(self, src)
    }
}

impl<T: Serialize> Encoder<T> for FrameEncoder {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.encode_into(&item, dst)
    }
}

/// Decoder and encoder sharing one configuration, for `Framed`.
#[derive(Debug, Default)]
pub struct JsonCodec {
    decoder: FrameDecoder,
    encoder: FrameEncoder,
}

impl JsonCodec {
    /// Create a codec with explicit configuration.
    pub fn new(config: FrameConfig) -> Self {
        Self {
            encoder: FrameEncoder::from_config(&config),
            decoder: FrameDecoder::new(config),
        }
    }
}

impl Decoder for JsonCodec {
    type Item = Decoded;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, FrameError> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, FrameError> {
        self.decoder.decode_eof(src)
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.encoder.encode_into(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_util::codec::{Framed, FramedRead, FramedWrite};

    use super::*;
    use crate::codec::Delimiter;

    #[tokio::test]
    async fn framed_read_over_chunked_duplex() {
        // A 3-byte pipe forces every frame to arrive in several reads.
        let (client, server) = tokio::io::duplex(3);
        let mut sink = FramedWrite::new(client, FrameEncoder::default());
        let mut stream = FramedRead::new(server, FrameDecoder::default());

        let writer = tokio::spawn(async move {
            for i in 0..20 {
                sink.send(json!({"number": i, "text": "é#"})).await.unwrap();
            }
        });

        for i in 0..20 {
            let item = stream.next().await.unwrap().unwrap();
            assert_eq!(item, Decoded::Message(json!({"number": i, "text": "é#"})));
        }
        writer.await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_read_yields_bad_payload_and_continues() {
        let wire: &[u8] = b"4#\"Hel4#true";
        let mut stream = FramedRead::new(wire, FrameDecoder::default());

        match stream.next().await.unwrap().unwrap() {
            Decoded::InvalidPayload { payload, .. } => assert_eq!(payload.as_ref(), b"\"Hel"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Decoded::Message(json!(true))
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_read_ends_on_bad_header() {
        let wire: &[u8] = b"wtf#\"Hello\"";
        let mut stream = FramedRead::new(wire, FrameDecoder::default());
        assert!(matches!(
            stream.next().await,
            Some(Err(FrameError::InvalidHeader { .. }))
        ));
    }

    #[tokio::test]
    async fn framed_read_reports_cut_frame_at_eof() {
        let wire: &[u8] = b"13#\"Hello";
        let mut stream = FramedRead::new(wire, FrameDecoder::default());
        assert!(matches!(
            stream.next().await,
            Some(Err(FrameError::IncompleteFrame { .. }))
        ));
    }

    #[tokio::test]
    async fn json_codec_duplex_with_custom_delimiter() {
        let config = FrameConfig::default().with_delimiter(Delimiter::new(b'|').unwrap());
        let (left, right) = tokio::io::duplex(64);
        let mut left = Framed::new(left, JsonCodec::new(config.clone()));
        let mut right = Framed::new(right, JsonCodec::new(config));

        left.send(json!({"type": "ping"})).await.unwrap();
        let got = right.next().await.unwrap().unwrap();
        assert_eq!(got, Decoded::Message(json!({"type": "ping"})));

        right.send(json!({"type": "pong"})).await.unwrap();
        let got = left.next().await.unwrap().unwrap();
        assert_eq!(got, Decoded::Message(json!({"type": "pong"})));
    }
}
