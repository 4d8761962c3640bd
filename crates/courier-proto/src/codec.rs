//! Length-prefixed CBOR framing.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Size of the big-endian length prefix.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest envelope body accepted (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode `message` as a complete frame (length prefix + CBOR body).
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Bytes, ProtocolError> {
    let mut body = Vec::new();
    ciborium::into_writer(message, &mut body).map_err(|e| ProtocolError::Encode(e.to_string()))?;

    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: body.len(), max: MAX_FRAME_SIZE });
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
    // Bounded by MAX_FRAME_SIZE above
    #[allow(clippy::cast_possible_truncation)]
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Body length declared by a frame header.
pub fn frame_length(header: [u8; FRAME_HEADER_SIZE]) -> Result<usize, ProtocolError> {
    let size = u32::from_be_bytes(header) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size, max: MAX_FRAME_SIZE });
    }
    Ok(size)
}

/// Decode a frame body (without its length prefix).
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    ciborium::from_reader(body).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;
    use crate::{PROTOCOL_VERSION, ResponseEnvelope};

    #[test]
    fn header_is_big_endian_length() {
        let frame = encode_frame(&ResponseEnvelope::with_payload(1, &b"ok"[..])).unwrap();
        let header: [u8; 4] = frame[..4].try_into().unwrap();
        assert_eq!(frame_length(header).unwrap(), frame.len() - FRAME_HEADER_SIZE);
    }

    #[test]
    fn oversized_header_rejected() {
        let result = frame_length(hex!("ff ff ff ff"));
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn garbage_body_rejected() {
        let result: Result<ResponseEnvelope, _> = decode_body(&hex!("ff 00 13 37"));
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn error_reply_survives_framing() {
        let reply = ResponseEnvelope::with_error(9, 7, None);
        let frame = encode_frame(&reply).unwrap();
        let decoded: ResponseEnvelope = decode_body(&frame[FRAME_HEADER_SIZE..]).unwrap();

        assert_eq!(decoded.version, PROTOCOL_VERSION);
        assert_eq!(decoded.message_id, 9);
        assert_eq!(decoded.error.map(|e| e.code), Some(7));
        assert!(decoded.payload.is_none());
    }

    proptest! {
        #[test]
        fn decode_never_panics(body in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_body::<ResponseEnvelope>(&body);
        }
    }
}
