//! Length-prefixed multipart codec.
//!
//! Every message is an ordered list of binary frames, mirroring the
//! multipart messages of the status and command channels.
//!
//! Frame format:
//! ```text
//! +----------------+----------------+-----------+----------------+-----------+
//! |  4 bytes       |  4 bytes       |  N bytes  |  4 bytes       |  M bytes  |
//! |  (parts BE)    |  (length BE)   |  (part 0) |  (length BE)   |  (part 1) |
//! +----------------+----------------+-----------+----------------+-----------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum total payload size of one message (16 MB)
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Maximum number of frames in one message
const MAX_PARTS: usize = 64;

/// Length prefix size in bytes
const LENGTH_PREFIX_SIZE: usize = 4;

/// One multipart message
pub type Multipart = Vec<Bytes>;

/// Codec for length-prefixed multipart messages
#[derive(Debug, Default)]
pub struct MultipartCodec {
    _private: (),
}

impl MultipartCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MultipartCodec {
    type Item = Multipart;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let parts = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if parts > MAX_PARTS {
            return Err(CodecError::TooManyParts(parts));
        }

        // Walk the part headers without consuming until the whole message is buffered
        let mut offset = LENGTH_PREFIX_SIZE;
        let mut total = 0usize;
        for _ in 0..parts {
            if src.len() < offset + LENGTH_PREFIX_SIZE {
                src.reserve(offset + LENGTH_PREFIX_SIZE - src.len());
                return Ok(None);
            }
            let len = u32::from_be_bytes([
                src[offset],
                src[offset + 1],
                src[offset + 2],
                src[offset + 3],
            ]) as usize;
            total += len;
            if total > MAX_MESSAGE_SIZE {
                return Err(CodecError::MessageTooLarge(total));
            }
            offset += LENGTH_PREFIX_SIZE + len;
        }

        if src.len() < offset {
            src.reserve(offset - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let mut frames = Vec::with_capacity(parts);
        for _ in 0..parts {
            let len = src.get_u32() as usize;
            frames.push(src.split_to(len).freeze());
        }

        Ok(Some(frames))
    }
}

impl Encoder<Multipart> for MultipartCodec {
    type Error = CodecError;

    // Part count and sizes are checked against MAX_PARTS and MAX_MESSAGE_SIZE (fit in u32)
    #[allow(clippy::cast_possible_truncation)]
    fn encode(&mut self, item: Multipart, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_PARTS {
            return Err(CodecError::TooManyParts(item.len()));
        }

        let total: usize = item.iter().map(Bytes::len).sum();
        if total > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(total));
        }

        dst.reserve(LENGTH_PREFIX_SIZE * (item.len() + 1) + total);
        dst.put_u32(item.len() as u32);
        for frame in item {
            dst.put_u32(frame.len() as u32);
            dst.put_slice(&frame);
        }

        Ok(())
    }
}

/// Errors that can occur during codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Too many frames: {0} (max: {MAX_PARTS})")]
    TooManyParts(usize),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::cast_possible_truncation)] // Test constants bounded to u32

    use super::*;

    fn frames(parts: &[&'static [u8]]) -> Multipart {
        parts.iter().map(|p| Bytes::from_static(p)).collect()
    }

    #[test]
    fn test_encode_decode_two_frames() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(frames(&[b"launcher", b"{\"type\":\"PING\"}"]), &mut buf)
            .unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(&decoded[0][..], b"launcher");
        assert_eq!(&decoded[1][..], b"{\"type\":\"PING\"}");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_frames_survive() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(frames(&[b"", b"x"]), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].is_empty());
    }

    #[test]
    fn test_partial_decode() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(frames(&[b"identity", b"payload"]), &mut buf)
            .unwrap();
        let full = buf.clone();

        let mut partial = BytesMut::new();
        partial.extend_from_slice(&full[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[3..10]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[10..]);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(&decoded[1][..], b"payload");
    }

    #[test]
    fn test_multiple_messages_in_buffer() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(frames(&[b"first"]), &mut buf).unwrap();
        codec.encode(frames(&[b"second"]), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first[0][..], b"first");
        assert_eq!(&second[0][..], b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_empty_buffer() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_too_many_parts() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_PARTS + 1) as u32);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::TooManyParts(_))));
    }

    #[test]
    fn test_message_too_large() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_u32((MAX_MESSAGE_SIZE + 1) as u32);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::MessageTooLarge(_))));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::MessageTooLarge(20_000_000);
        let msg = err.to_string();
        assert!(msg.contains("20000000"));
        assert!(msg.contains("too large"));
    }

    #[test]
    fn test_prefix_format() {
        let mut codec = MultipartCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frames(&[b"abc"]), &mut buf).unwrap();

        assert_eq!(&buf[..4], &[0, 0, 0, 1]);
        assert_eq!(&buf[4..8], &[0, 0, 0, 3]);
        assert_eq!(&buf[8..], b"abc");
    }
}
