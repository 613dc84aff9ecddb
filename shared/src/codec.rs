//! Length-prefixed framing for [`Packet`]s over a byte stream
//!
//! Each frame is a 4-byte big-endian length followed by the bincode encoding
//! of one packet. Frames larger than [`MAX_FRAME_LEN`] are refused in both
//! directions.

use crate::{Packet, MAX_FRAME_LEN};
use bytes::{Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec, LengthDelimitedCodecError};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("transport error: {0}")]
    Io(io::Error),

    #[error("frame exceeds {} bytes", MAX_FRAME_LEN)]
    FrameTooLarge,

    #[error("undecodable packet: {0}")]
    Decode(bincode::Error),

    #[error("unencodable packet: {0}")]
    Encode(bincode::Error),
}

impl CodecError {
    /// True when the peer sent bytes that cannot be a valid frame, as opposed
    /// to the transport itself failing.
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::FrameTooLarge | CodecError::Decode(_))
    }
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        let oversized = e
            .get_ref()
            .map(|inner| inner.is::<LengthDelimitedCodecError>())
            .unwrap_or(false);

        if oversized {
            CodecError::FrameTooLarge
        } else {
            CodecError::Io(e)
        }
    }
}

#[derive(Debug)]
pub struct PacketCodec {
    inner: LengthDelimitedCodec,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
        }
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        match self.inner.decode(src)? {
            Some(frame) => bincode::deserialize(&frame)
                .map(Some)
                .map_err(CodecError::Decode),
            None => Ok(None),
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let payload = bincode::serialize(&item).map_err(CodecError::Encode)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge);
        }
        self.inner.encode(Bytes::from(payload), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_test::io::Builder;
    use tokio_util::codec::FramedRead;

    fn encode_all(packets: &[Packet]) -> BytesMut {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        for packet in packets {
            codec.encode(packet.clone(), &mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn test_frame_has_length_prefix() {
        let packet = Packet::Public {
            body: "hello".to_string(),
        };
        let buf = encode_all(&[packet.clone()]);
        let payload = bincode::serialize(&packet).unwrap();

        assert_eq!(buf.len(), 4 + payload.len());
        assert_eq!(&buf[..4], &(payload.len() as u32).to_be_bytes());
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let mut codec = PacketCodec::new();
        let full = encode_all(&[Packet::Join {
            name: "alice".to_string(),
        }]);

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[full.len() - 1..]);
        assert_eq!(
            codec.decode(&mut partial).unwrap(),
            Some(Packet::Join {
                name: "alice".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let packets = vec![
            Packet::Join {
                name: "bob".to_string(),
            },
            Packet::Private {
                recipient: "alice".to_string(),
                body: "a: b, c".to_string(),
            },
            Packet::Leave,
        ];
        let bytes = encode_all(&packets);
        let (first, rest) = bytes.split_at(7);

        let mock = Builder::new().read(first).read(rest).build();
        let mut reader = FramedRead::new(mock, PacketCodec::new());

        let mut decoded = Vec::new();
        while let Some(packet) = reader.next().await {
            decoded.push(packet.unwrap());
        }

        assert_eq!(decoded, packets);
    }

    #[tokio::test]
    async fn test_garbage_payload_is_malformed() {
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&[0xff, 0xff, 0xff]);

        let mock = Builder::new().read(&bytes).build();
        let mut reader = FramedRead::new(mock, PacketCodec::new());

        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_oversized_length_prefix_is_rejected() {
        let mut codec = PacketCodec::new();
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());

        let err = codec.decode(&mut bytes).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_oversized_packet_is_not_encoded() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        let packet = Packet::Public {
            body: "x".repeat(MAX_FRAME_LEN),
        };

        let err = codec.encode(packet, &mut buf).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_io_errors_are_not_malformed() {
        let err = CodecError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(err, CodecError::Io(_)));
        assert!(!err.is_malformed());
    }
}
