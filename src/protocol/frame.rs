//! Link-layer frame codec
//!
//! Every frame carried over the air starts with a two-byte header:
//! ```text
//! [kind: u8][sequence: u8][payload...]
//! ```
//!
//! - `kind`: `0x01` for Data, `0x02` for Ack
//! - `sequence`: 8-bit sequence number, wraps at 255
//! - `payload`: 1-253 bytes of user data (Data frames only)

use crate::config::protocol::{
    FRAME_KIND_ACK, FRAME_KIND_DATA, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD,
};
use heapless::Vec;

/// Errors produced while encoding or decoding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the two-byte header
    MalformedFrame,
    /// Header carries a kind tag that is neither Data nor Ack
    UnknownFrameKind(u8),
    /// Data frame with no payload
    EmptyPayload,
    /// Payload does not fit in one physical frame
    PayloadTooLarge,
}

/// Frame kind tag (byte 0 of every frame)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Carries user payload and requires acknowledgment
    Data = FRAME_KIND_DATA,
    /// Confirms a specific sequence number, never acknowledged itself
    Ack = FRAME_KIND_ACK,
}

impl FrameKind {
    /// Try to convert a byte to a FrameKind
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            FRAME_KIND_DATA => Some(Self::Data),
            FRAME_KIND_ACK => Some(Self::Ack),
            _ => None,
        }
    }
}

/// A decoded frame borrowing its payload from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub sequence: u8,
    pub payload: &'a [u8],
}

/// Encode a Data frame: `[Data, sequence, payload...]`
pub fn encode_data(sequence: u8, payload: &[u8]) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge);
    }

    let mut frame = Vec::new();
    frame
        .extend_from_slice(&[FRAME_KIND_DATA, sequence])
        .map_err(|_| FrameError::PayloadTooLarge)?;
    frame
        .extend_from_slice(payload)
        .map_err(|_| FrameError::PayloadTooLarge)?;
    Ok(frame)
}

/// Encode an Ack frame: exactly `[Ack, sequence]`
pub fn encode_ack(sequence: u8) -> [u8; HEADER_SIZE] {
    [FRAME_KIND_ACK, sequence]
}

/// Decode a received frame.
///
/// Anything after the header is returned as payload, whatever the kind.
pub fn decode(bytes: &[u8]) -> Result<Frame<'_>, FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::MalformedFrame);
    }

    let kind = FrameKind::from_byte(bytes[0]).ok_or(FrameError::UnknownFrameKind(bytes[0]))?;

    Ok(Frame {
        kind,
        sequence: bytes[1],
        payload: &bytes[HEADER_SIZE..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_data_layout() {
        let frame = encode_data(7, &[0x41, 0x42]).unwrap();
        assert_eq!(frame.as_slice(), &[0x01, 7, 0x41, 0x42]);
    }

    #[test]
    fn test_encode_ack_layout() {
        assert_eq!(encode_ack(0xFE), [0x02, 0xFE]);
    }

    #[test]
    fn test_data_round_trip_at_boundaries() {
        let max = [0xA5u8; MAX_PAYLOAD];
        for (sequence, payload) in [(0u8, &[0x00u8][..]), (255, &max[..]), (128, &b"hello"[..])] {
            let encoded = encode_data(sequence, payload).unwrap();
            assert!(encoded.len() <= MAX_FRAME_SIZE);

            let frame = decode(&encoded).unwrap();
            assert_eq!(frame.kind, FrameKind::Data);
            assert_eq!(frame.sequence, sequence);
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn test_encode_rejects_bad_payload_sizes() {
        assert_eq!(encode_data(0, &[]), Err(FrameError::EmptyPayload));

        let too_big = [0u8; MAX_PAYLOAD + 1];
        assert_eq!(encode_data(0, &too_big), Err(FrameError::PayloadTooLarge));
    }

    #[test]
    fn test_decode_short_frame() {
        assert_eq!(decode(&[]), Err(FrameError::MalformedFrame));
        assert_eq!(decode(&[0x01]), Err(FrameError::MalformedFrame));
    }

    #[test]
    fn test_decode_unknown_kind() {
        assert_eq!(decode(&[0x07, 1, 2]), Err(FrameError::UnknownFrameKind(0x07)));
    }

    #[test]
    fn test_decode_ack() {
        let ack = encode_ack(9);
        let frame = decode(&ack).unwrap();
        assert_eq!(frame.kind, FrameKind::Ack);
        assert_eq!(frame.sequence, 9);
        assert!(frame.payload.is_empty());
    }
}
