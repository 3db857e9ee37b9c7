//! # RTCM 3 Protocol Module
//!
//! Implementation of the RTCM 3 framing used by GNSS base stations to
//! broadcast correction data.
//!
//! This module handles:
//! - Frame synchronization on the `0xD3` preamble
//! - CRC-24Q integrity checking
//! - Message type / reference station id extraction
//! - Incremental decoding from a live byte stream
//! - Classifying message types into GNSS constellations

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
pub mod constellation;
