//! # RTCM Frame Decoder
//!
//! Validates individual RTCM 3 frames and pulls them one at a time out of a
//! live byte stream.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::crc::{crc24q, read_crc24};
use super::protocol::*;
use crate::error::{FieldLinkError, Result};

/// Initial capacity of the reader buffer, enough for two maximum-size frames
const READ_BUFFER_CAPACITY: usize = 2 * RTCM_MAX_FRAME_SIZE;

/// Decode a complete RTCM 3 frame
///
/// # Arguments
///
/// * `frame` - Complete frame bytes (preamble, header, payload, crc)
///
/// # Returns
///
/// * `Result<RtcmFrame>` - Decoded frame, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - Frame is too short
/// - Preamble is incorrect
/// - Length field disagrees with the frame size
/// - CRC check fails
pub fn decode_frame(frame: &[u8]) -> Result<RtcmFrame> {
    if frame.len() < RTCM_MIN_FRAME_SIZE {
        return Err(FieldLinkError::RtcmProtocol("Frame too short".to_string()));
    }

    if frame[0] != RTCM_PREAMBLE {
        return Err(FieldLinkError::RtcmProtocol(format!(
            "Invalid preamble: 0x{:02X}",
            frame[0]
        )));
    }

    let length = payload_length([frame[1], frame[2]]);
    let expected = RTCM_HEADER_SIZE + length + RTCM_CRC_SIZE;
    if frame.len() != expected {
        return Err(FieldLinkError::RtcmProtocol(format!(
            "Frame size mismatch: expected {} bytes, got {}",
            expected,
            frame.len()
        )));
    }

    let crc_offset = RTCM_HEADER_SIZE + length;
    let received_crc = read_crc24([
        frame[crc_offset],
        frame[crc_offset + 1],
        frame[crc_offset + 2],
    ]);
    let calculated_crc = crc24q(&frame[..crc_offset]);

    if calculated_crc != received_crc {
        return Err(FieldLinkError::RtcmProtocol(format!(
            "CRC mismatch: expected 0x{:06X}, got 0x{:06X}",
            calculated_crc, received_crc
        )));
    }

    RtcmFrame::from_payload(&frame[RTCM_HEADER_SIZE..crc_offset])
}

/// Incremental RTCM 3 reader over an async byte source
///
/// Bytes are accumulated in an internal buffer and a frame is only removed
/// from it once complete, so dropping a pending [`RtcmReader::next_frame`]
/// future never loses stream data.
pub struct RtcmReader<R> {
    inner: R,
    buf: BytesMut,
    discarded: u64,
}

impl<R: AsyncRead + Unpin> RtcmReader<R> {
    /// Wrap a byte source
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            discarded: 0,
        }
    }

    /// Read the next frame off the stream
    ///
    /// # Returns
    ///
    /// * `Ok(Some(RawFrame))` - A frame was consumed; `decoded` is `None` if
    ///   it failed its integrity check
    /// * `Ok(None)` - The stream ended (a trailing partial frame is dropped)
    ///
    /// # Errors
    ///
    /// Returns error if the underlying read fails
    pub async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(Some(frame));
            }

            self.buf.reserve(RTCM_MAX_FRAME_SIZE);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if !self.buf.is_empty() {
                    debug!("Stream ended with {} unframed bytes", self.buf.len());
                }
                return Ok(None);
            }
        }
    }

    /// Bytes skipped while hunting for a preamble since the reader was created
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Give back the underlying byte source
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Split one complete frame off the front of the buffer, if present
    fn take_frame(&mut self) -> Option<RawFrame> {
        match self.buf.iter().position(|&b| b == RTCM_PREAMBLE) {
            Some(0) => {}
            Some(skip) => {
                trace!("Skipping {} bytes before preamble", skip);
                self.discarded += skip as u64;
                self.buf.advance(skip);
            }
            None => {
                self.discarded += self.buf.len() as u64;
                self.buf.clear();
                return None;
            }
        }

        if self.buf.len() < RTCM_HEADER_SIZE {
            return None;
        }

        let length = payload_length([self.buf[1], self.buf[2]]);
        let total = RTCM_HEADER_SIZE + length + RTCM_CRC_SIZE;
        if self.buf.len() < total {
            return None;
        }

        let raw = self.buf.split_to(total).freeze();
        let decoded = match decode_frame(&raw) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("Dropping corrupt frame ({} bytes): {}", raw.len(), e);
                None
            }
        };

        Some(RawFrame { raw, decoded })
    }
}

impl<R> std::fmt::Debug for RtcmReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtcmReader")
            .field("buffered", &self.buf.len())
            .field("discarded", &self.discarded)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtcm::encoder::{encode_frame, message_payload};

    fn msm7_frame(station: u16) -> Vec<u8> {
        encode_frame(&message_payload(RTCM_MSG_GPS_MSM7, station, &[0x55; 20])).unwrap()
    }

    #[test]
    fn test_decode_frame_too_short() {
        let frame = [RTCM_PREAMBLE, 0x00, 0x00];
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_frame_invalid_preamble() {
        let mut frame = msm7_frame(1);
        frame[0] = 0xFF;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_valid_frame() {
        let frame = msm7_frame(77);

        let result = decode_frame(&frame);
        assert!(result.is_ok(), "Decode failed: {:?}", result.err());

        let decoded = result.unwrap();
        assert_eq!(decoded.message_type, Some(RTCM_MSG_GPS_MSM7));
        assert_eq!(decoded.station_id, Some(77));
        assert_eq!(decoded.payload_len, 23);
    }

    #[test]
    fn test_decode_frame_crc_error() {
        let mut frame = msm7_frame(1);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_frame_payload_corruption() {
        let mut frame = msm7_frame(1);
        frame[10] ^= 0x01;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_frame_length_mismatch() {
        let mut frame = msm7_frame(1);
        frame.push(0x00);
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_decode_empty_payload_frame() {
        let frame = encode_frame(&[]).unwrap();
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.message_type, None);
        assert_eq!(decoded.payload_len, 0);
    }

    #[tokio::test]
    async fn test_reader_frames_split_across_reads() {
        let first = msm7_frame(1);
        let second = msm7_frame(2);

        let stream = tokio_test::io::Builder::new()
            .read(&first[..2])
            .read(&first[2..])
            .read(&second[..10])
            .read(&second[10..])
            .build();
        let mut reader = RtcmReader::new(stream);

        let a = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(a.decoded.unwrap().station_id, Some(1));
        assert_eq!(a.raw.len(), first.len());

        let b = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(b.decoded.unwrap().station_id, Some(2));

        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_skips_garbage_before_preamble() {
        let mut bytes = vec![0x00, 0x11, 0x22];
        bytes.extend_from_slice(&msm7_frame(9));

        let stream = tokio_test::io::Builder::new().read(&bytes).build();
        let mut reader = RtcmReader::new(stream);

        let frame = reader.next_frame().await.unwrap().unwrap();
        assert!(frame.is_valid());
        assert_eq!(reader.discarded_bytes(), 3);
    }

    #[tokio::test]
    async fn test_reader_returns_corrupt_frame_without_decoding() {
        let mut corrupt = msm7_frame(3);
        corrupt[8] ^= 0x40;
        let good = msm7_frame(4);

        let mut bytes = corrupt.clone();
        bytes.extend_from_slice(&good);

        let stream = tokio_test::io::Builder::new().read(&bytes).build();
        let mut reader = RtcmReader::new(stream);

        let first = reader.next_frame().await.unwrap().unwrap();
        assert!(first.decoded.is_none(), "Corrupt frame must not decode");
        assert_eq!(first.raw.len(), corrupt.len(), "Raw bytes are still consumed");

        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(second.decoded.unwrap().station_id, Some(4));
    }

    #[tokio::test]
    async fn test_reader_propagates_read_error() {
        let stream = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut reader = RtcmReader::new(stream);

        assert!(matches!(
            reader.next_frame().await,
            Err(FieldLinkError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_reader_drops_trailing_partial_frame_at_eof() {
        let frame = msm7_frame(5);
        let stream = tokio_test::io::Builder::new().read(&frame[..7]).build();
        let mut reader = RtcmReader::new(stream);

        assert!(reader.next_frame().await.unwrap().is_none());
    }
}
