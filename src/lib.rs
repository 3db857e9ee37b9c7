//! # FieldLink Library
//!
//! Unattended telemetry collection for remote field sites.
//!
//! This library provides the building blocks for sampling wireless link
//! quality per client, analyzing an RTCM correction stream, and storing
//! both in shift-partitioned files that operators can read at any time.

pub mod config;
pub mod error;
pub mod logging;
pub mod rtcm;
pub mod source;
pub mod telemetry;
pub mod transport;
pub mod worker;
