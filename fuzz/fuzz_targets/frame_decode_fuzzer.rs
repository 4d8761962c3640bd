//! Fuzz target for response frame decoding
//!
//! The reference engine reads a length header and a CBOR body from an
//! untrusted server.
//!
//! # Invariants
//!
//! - NEVER panic on any header or body bytes
//! - Accepted lengths never exceed `MAX_FRAME_SIZE`
//! - A decoded envelope re-encodes into a frame of the declared length

#![no_main]

use courier_proto::{
    FRAME_HEADER_SIZE, MAX_FRAME_SIZE, ResponseEnvelope, decode_body, encode_frame, frame_length,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((header, body)) = data.split_first_chunk::<FRAME_HEADER_SIZE>() else {
        return;
    };

    if let Ok(length) = frame_length(*header) {
        assert!(length <= MAX_FRAME_SIZE);
    }

    let Ok(response) = decode_body::<ResponseEnvelope>(body) else {
        return;
    };

    let Ok(frame) = encode_frame(&response) else {
        return;
    };
    let Some((header, body)) = frame.split_first_chunk::<FRAME_HEADER_SIZE>() else {
        panic!("encoded frame shorter than its header");
    };
    assert_eq!(frame_length(*header).ok(), Some(body.len()));
});
