//! # RTCM Protocol Constants and Types
//!
//! Core protocol definitions for RTCM 3 transport frames.
//!
//! ```text
//! +----------+-----------+------------+-----------------+---------+
//! | preamble | reserved  | length     | payload         | CRC-24Q |
//! | 8 bits   | 6 bits    | 10 bits    | 0..1023 bytes   | 24 bits |
//! +----------+-----------+------------+-----------------+---------+
//! ```

use bytes::Bytes;

use crate::error::{FieldLinkError, Result};

/// RTCM 3 frame preamble (always 0xD3)
pub const RTCM_PREAMBLE: u8 = 0xD3;

/// Preamble + reserved bits + 10-bit length
pub const RTCM_HEADER_SIZE: usize = 3;

/// CRC-24Q trailer
pub const RTCM_CRC_SIZE: usize = 3;

/// Maximum payload size representable in the 10-bit length field
pub const RTCM_MAX_PAYLOAD_SIZE: usize = 1023;

/// Smallest possible frame: header + empty payload + crc
pub const RTCM_MIN_FRAME_SIZE: usize = RTCM_HEADER_SIZE + RTCM_CRC_SIZE;

/// Largest possible frame
pub const RTCM_MAX_FRAME_SIZE: usize = RTCM_HEADER_SIZE + RTCM_MAX_PAYLOAD_SIZE + RTCM_CRC_SIZE;

/// Message type for the stationary reference station ARP
pub const RTCM_MSG_STATION_ARP: u16 = 1005;

/// Message type for GPS MSM7 observations
pub const RTCM_MSG_GPS_MSM7: u16 = 1077;

/// Message type ranges whose second field (DF003) is the reference station id.
///
/// Ephemeris messages (1019, 1020, 1042..1046) start with a satellite id
/// instead and are deliberately absent.
const STATION_ID_MESSAGE_RANGES: &[(u16, u16)] = &[
    (1001, 1013),
    (1029, 1029),
    (1033, 1033),
    (1071, 1137),
    (1230, 1230),
];

/// Extract the 10-bit payload length from the two bytes following the preamble
pub fn payload_length(header: [u8; 2]) -> usize {
    (((header[0] & 0x03) as usize) << 8) | header[1] as usize
}

/// Whether a message type carries a reference station id after the type field
pub fn carries_station_id(message_type: u16) -> bool {
    STATION_ID_MESSAGE_RANGES
        .iter()
        .any(|&(lo, hi)| (lo..=hi).contains(&message_type))
}

/// One decoded RTCM 3 frame whose CRC checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcmFrame {
    /// Message type (DF002), absent for payloads shorter than 12 bits
    pub message_type: Option<u16>,

    /// Reference station id (DF003), for the message families that carry one
    pub station_id: Option<u16>,

    /// Payload length in bytes
    pub payload_len: usize,
}

impl RtcmFrame {
    /// Build a frame description from a CRC-valid payload
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds RTCM_MAX_PAYLOAD_SIZE (1023 bytes)
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() > RTCM_MAX_PAYLOAD_SIZE {
            return Err(FieldLinkError::RtcmProtocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                RTCM_MAX_PAYLOAD_SIZE
            )));
        }

        let message_type = if payload.len() >= 2 {
            Some(((payload[0] as u16) << 4) | ((payload[1] as u16) >> 4))
        } else {
            None
        };

        let station_id = match message_type {
            Some(t) if payload.len() >= 3 && carries_station_id(t) => {
                Some((((payload[1] & 0x0F) as u16) << 8) | payload[2] as u16)
            }
            _ => None,
        };

        Ok(Self {
            message_type,
            station_id,
            payload_len: payload.len(),
        })
    }
}

/// One unit read off the wire: the raw bytes consumed and, when the
/// integrity check passed, the decoded frame.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Every byte of the frame, preamble through CRC
    pub raw: Bytes,

    /// `None` when the CRC or framing check failed
    pub decoded: Option<RtcmFrame>,
}

impl RawFrame {
    /// Whether the frame passed its integrity check
    pub fn is_valid(&self) -> bool {
        self.decoded.is_some()
    }
}
