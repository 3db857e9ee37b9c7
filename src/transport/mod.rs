//! # Transport Module
//!
//! Byte-stream transports a correction source can be read from.
//!
//! This module handles:
//! - TCP connections to a base station or caster relay
//! - Serial connections to a locally attached receiver
//! - A common [`Connector`] seam so the analyzer can be driven by in-memory
//!   streams in tests

pub mod connector;
pub mod serial;
pub mod tcp;

pub use connector::{ByteStream, Connector};
pub use serial::SerialConnector;
pub use tcp::TcpConnector;
