//! # RTCM Frame Encoder
//!
//! Wraps message payloads into complete RTCM 3 transport frames. Used to
//! synthesize correction streams when exercising the analyzer.

use super::crc::crc24q;
use super::protocol::*;
use crate::error::{FieldLinkError, Result};

/// Wrap a payload into a complete RTCM 3 frame
///
/// # Arguments
///
/// * `payload` - Message payload (at most 1023 bytes)
///
/// # Returns
///
/// * `Result<Vec<u8>>` - Preamble + header + payload + CRC-24Q
///
/// # Examples
///
/// ```
/// use fieldlink::rtcm::encoder::{encode_frame, message_payload};
///
/// let payload = message_payload(1077, 42, &[0u8; 8]);
/// let frame = encode_frame(&payload).unwrap();
/// assert_eq!(frame.len(), 3 + payload.len() + 3);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > RTCM_MAX_PAYLOAD_SIZE {
        return Err(FieldLinkError::RtcmProtocol(format!(
            "Payload size {} exceeds maximum {}",
            payload.len(),
            RTCM_MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(RTCM_HEADER_SIZE + payload.len() + RTCM_CRC_SIZE);
    frame.push(RTCM_PREAMBLE);
    frame.push(((payload.len() >> 8) & 0x03) as u8); // Reserved bits stay zero
    frame.push((payload.len() & 0xFF) as u8);
    frame.extend_from_slice(payload);

    let crc = crc24q(&frame);
    frame.extend_from_slice(&crc.to_be_bytes()[1..]);

    Ok(frame)
}

/// Build a payload starting with a 12-bit message type and 12-bit station id
///
/// `body` is appended verbatim after the first three bytes.
pub fn message_payload(message_type: u16, station_id: u16, body: &[u8]) -> Vec<u8> {
    let message_type = message_type & 0x0FFF;
    let station_id = station_id & 0x0FFF;

    let mut payload = Vec::with_capacity(3 + body.len());
    payload.push((message_type >> 4) as u8);
    payload.push((((message_type & 0x0F) << 4) | (station_id >> 8)) as u8);
    payload.push((station_id & 0xFF) as u8);
    payload.extend_from_slice(body);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_structure() {
        let payload = message_payload(RTCM_MSG_STATION_ARP, 2003, &[0u8; 16]);
        let frame = encode_frame(&payload).unwrap();

        assert_eq!(frame[0], RTCM_PREAMBLE, "First byte should be the preamble");
        assert_eq!(payload_length([frame[1], frame[2]]), 19);
        assert_eq!(frame.len(), RTCM_HEADER_SIZE + 19 + RTCM_CRC_SIZE);
        assert_eq!(crc24q(&frame), 0, "Frame with its CRC should have zero residue");
    }

    #[test]
    fn test_encode_frame_long_payload_sets_high_length_bits() {
        let frame = encode_frame(&[0xAA; 700]).unwrap();
        assert_eq!(frame[1], 0x02);
        assert_eq!(frame[2], (700 & 0xFF) as u8);
    }

    #[test]
    fn test_encode_frame_payload_too_large() {
        assert!(encode_frame(&[0u8; 1024]).is_err());
    }

    #[test]
    fn test_message_payload_round_trips_header_fields() {
        let payload = message_payload(RTCM_MSG_GPS_MSM7, 4095, &[]);
        let frame = RtcmFrame::from_payload(&payload).unwrap();
        assert_eq!(frame.message_type, Some(1077));
        assert_eq!(frame.station_id, Some(4095));
    }
}
