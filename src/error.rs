//! # Error Types
//!
//! Custom error types for FieldLink using `thiserror`.

use thiserror::Error;

/// Main error type for FieldLink
#[derive(Debug, Error)]
pub enum FieldLinkError {
    /// RTCM framing errors (bad preamble, short frame, CRC mismatch)
    #[error("RTCM protocol error: {0}")]
    RtcmProtocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Row encoding/decoding errors in a partition file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Metric query collaborator failed (unreachable AP, auth failure, bad output)
    #[error("Query failed: {0}")]
    Query(String),

    /// Stream transport could not be opened
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// A remote call exceeded its deadline
    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(std::time::Duration, &'static str),

    /// Position collaborator had no fix for the entity
    #[error("Position unavailable: {0}")]
    Position(String),

    /// An existing partition was created with a different column layout
    #[error("Schema mismatch in {path}: {reason}")]
    SchemaMismatch { path: String, reason: String },

    /// A partition key that is not a `YYYY-MM-DD` date
    #[error("Invalid partition key: {0}")]
    PartitionKey(String),

    /// The byte stream ended or stalled while streaming
    #[error("Stream closed: {0}")]
    StreamClosed(String),
}

/// Result type alias for FieldLink
pub type Result<T> = std::result::Result<T, FieldLinkError>;
