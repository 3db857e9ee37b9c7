//! # CRC-24Q Implementation
//!
//! CRC-24Q (Qualcomm) checksum used by RTCM 3 transport frames.
//!
//! **Polynomial**: 0x1864CFB (x^24 + x^23 + x^18 + x^17 + x^14 + x^11 + x^10 + x^7 + x^6 + x^5 + x^4 + x^3 + x + 1)
//! **Initial Value**: 0x000000
//!
//! The checksum covers the preamble, header and payload and is transmitted
//! big-endian in the last three bytes of the frame.

/// CRC-24Q polynomial (with the implicit x^24 term)
const CRC24Q_POLY: u32 = 0x0186_4CFB;

/// Mask keeping the low 24 bits
const CRC24_MASK: u32 = 0x00FF_FFFF;

/// Precomputed CRC-24Q lookup table for fast calculation
const CRC24Q_TABLE: [u32; 256] = generate_crc24q_table();

/// Generate CRC-24Q lookup table at compile time
const fn generate_crc24q_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut j = 0;

        while j < 8 {
            crc <<= 1;
            if (crc & 0x0100_0000) != 0 {
                crc ^= CRC24Q_POLY;
            }
            j += 1;
        }

        table[i] = crc & CRC24_MASK;
        i += 1;
    }

    table
}

/// Calculate CRC-24Q checksum using lookup table
///
/// # Arguments
///
/// * `data` - Byte slice to calculate CRC for (Preamble + Header + Payload)
///
/// # Returns
///
/// * `u32` - Calculated checksum in the low 24 bits
///
/// # Examples
///
/// ```
/// use fieldlink::rtcm::crc::crc24q;
///
/// assert_eq!(crc24q(b"123456789"), 0xCDE703);
/// ```
pub fn crc24q(data: &[u8]) -> u32 {
    let mut crc: u32 = 0;

    for &byte in data {
        let index = ((crc >> 16) as u8 ^ byte) as usize;
        crc = ((crc << 8) & CRC24_MASK) ^ CRC24Q_TABLE[index];
    }

    crc
}

/// Read the big-endian 24-bit checksum trailer
pub fn read_crc24(trailer: [u8; 3]) -> u32 {
    u32::from_be_bytes([0, trailer[0], trailer[1], trailer[2]])
}

/// Calculate CRC-24Q bit by bit (slow, for verification)
#[allow(dead_code)]
fn crc24q_slow(data: &[u8]) -> u32 {
    let mut crc: u32 = 0;

    for &byte in data {
        crc ^= (byte as u32) << 16;

        for _ in 0..8 {
            crc <<= 1;
            if (crc & 0x0100_0000) != 0 {
                crc ^= CRC24Q_POLY;
            }
        }
    }

    crc & CRC24_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc24q_empty() {
        assert_eq!(crc24q(&[]), 0x000000);
    }

    #[test]
    fn test_crc24q_check_value() {
        // Standard check input for the CRC catalogue
        assert_eq!(crc24q(b"123456789"), 0xCDE703);
        assert_eq!(crc24q_slow(b"123456789"), 0xCDE703);
    }

    #[test]
    fn test_crc24q_lookup_table_matches_slow() {
        let test_data = [
            vec![0xD3, 0x00, 0x13],
            vec![0xFF, 0xFE, 0xFD],
            vec![0xD3, 0x00, 0x02, 0x3E, 0xD0],
            vec![0x00; 64],
            vec![0xFF; 10],
        ];

        for data in test_data.iter() {
            assert_eq!(
                crc24q(data),
                crc24q_slow(data),
                "CRC mismatch for data: {:?}",
                data
            );
        }
    }

    #[test]
    fn test_crc24q_residue_is_zero() {
        // Appending the checksum big-endian yields a zero remainder
        let mut data = vec![0xD3, 0x00, 0x03, 0x43, 0x50, 0x10];
        let crc = crc24q(&data);
        data.extend_from_slice(&crc.to_be_bytes()[1..]);
        assert_eq!(crc24q(&data), 0);
    }

    #[test]
    fn test_crc24q_changes_with_data() {
        let crc1 = crc24q(&[0xD3, 0x00, 0x02, 0x3E, 0xD0]);
        let crc2 = crc24q(&[0xD3, 0x00, 0x02, 0x3E, 0xD1]);
        assert_ne!(crc1, crc2, "CRC should change when data changes");
    }

    #[test]
    fn test_read_crc24() {
        assert_eq!(read_crc24([0xCD, 0xE7, 0x03]), 0xCDE703);
    }
}
