//! # Constellation Lookup
//!
//! Maps RTCM message types to the GNSS constellation they describe.
//!
//! The table covers the MSM4..MSM7 observation families and the proprietary
//! 4070..4077 block. Other message families (legacy observations, ephemerides,
//! MSM1..MSM3, QZSS, SBAS) are not mapped and fall through as unclassified.

use std::fmt;

/// GNSS constellation observed in a correction stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Constellation {
    Gps,
    Glonass,
    Galileo,
    BeiDou,
}

impl Constellation {
    /// Label written into stored statistics
    pub fn label(self) -> &'static str {
        match self {
            Constellation::Gps => "GPS",
            Constellation::Glonass => "GLONASS",
            Constellation::Galileo => "GALILEO",
            Constellation::BeiDou => "BeiDou",
        }
    }
}

impl fmt::Display for Constellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive message type ranges per constellation
const CONSTELLATION_TABLE: &[(u16, u16, Constellation)] = &[
    (1074, 1077, Constellation::Gps),
    (1084, 1087, Constellation::Glonass),
    (1094, 1097, Constellation::Galileo),
    (1124, 1127, Constellation::BeiDou),
    (4070, 4077, Constellation::Gps),
];

/// Classify a message type
///
/// Returns `None` for message types outside every known range.
pub fn classify(message_type: u16) -> Option<Constellation> {
    CONSTELLATION_TABLE
        .iter()
        .find(|&&(lo, hi, _)| (lo..=hi).contains(&message_type))
        .map(|&(_, _, constellation)| constellation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_range_edges() {
        assert_eq!(classify(1074), Some(Constellation::Gps));
        assert_eq!(classify(1077), Some(Constellation::Gps));
        assert_eq!(classify(1073), None);
        assert_eq!(classify(1078), None);
    }

    #[test]
    fn test_classify_each_constellation() {
        assert_eq!(classify(1085), Some(Constellation::Glonass));
        assert_eq!(classify(1096), Some(Constellation::Galileo));
        assert_eq!(classify(1127), Some(Constellation::BeiDou));
        assert_eq!(classify(4070), Some(Constellation::Gps));
    }

    #[test]
    fn test_classify_unmapped_families() {
        // Station ARP, GPS ephemeris, QZSS MSM7
        for message_type in [1005, 1019, 1117, 0, 4095] {
            assert_eq!(classify(message_type), None, "type {}", message_type);
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(Constellation::Gps.to_string(), "GPS");
        assert_eq!(Constellation::BeiDou.label(), "BeiDou");
    }
}
