use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// Message header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "IS" (0x49 0x53).
pub const MAGIC: [u8; 2] = [0x49, 0x53];

/// Default maximum inbound message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Encode one discrete message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Body             │
/// │ 0x49 0x53    │ (4B BE)   │ (Length bytes)   │
/// └──────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_message(body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if body.len() > u32::MAX as usize {
        return Err(TransportError::MessageTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_slice(&MAGIC);
    dst.put_u32(body.len() as u32);
    dst.put_slice(body);
    Ok(())
}

/// Total wire size of the message at the front of `src`, once its header
/// has arrived.
pub fn frame_len(src: &[u8]) -> Option<usize> {
    let header = src.get(..HEADER_SIZE)?;
    let body_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    Some(HEADER_SIZE + body_len)
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_message: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(TransportError::InvalidMagic);
    }

    let body_len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if body_len > max_message {
        return Err(TransportError::MessageTooLarge {
            size: body_len,
            max: max_message,
        });
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(body_len).freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_message(b"voxels", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 6);
        assert_eq!(&buf[2..6], &[0, 0, 0, 6]);

        let body = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();
        assert_eq!(body.as_ref(), b"voxels");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x49, 0x53, 0x00][..]);
        assert!(decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_incomplete_body() {
        let mut buf = BytesMut::new();
        encode_message(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2, "partial message must stay buffered");
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_message(&mut buf, DEFAULT_MAX_MESSAGE);
        assert!(matches!(result, Err(TransportError::InvalidMagic)));
    }

    #[test]
    fn test_decode_message_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32(1024);

        let result = decode_message(&mut buf, 16);
        assert!(matches!(
            result,
            Err(TransportError::MessageTooLarge { size: 1024, max: 16 })
        ));
    }

    #[test]
    fn test_multiple_messages() {
        let mut buf = BytesMut::new();
        encode_message(b"first", &mut buf).unwrap();
        encode_message(b"OK", &mut buf).unwrap();

        let first = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();
        let second = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();
        assert_eq!(first.as_ref(), b"first");
        assert_eq!(second.as_ref(), b"OK");
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_len_needs_a_full_header() {
        let mut buf = BytesMut::new();
        encode_message(b"abc", &mut buf).unwrap();
        assert_eq!(frame_len(&buf), Some(HEADER_SIZE + 3));
        assert_eq!(frame_len(&buf[..HEADER_SIZE - 1]), None);
    }
}
