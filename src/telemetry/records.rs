//! # Stored Row Types
//!
//! Rows persisted into partition files. Every table starts with a schema
//! header listing [`Record::COLUMNS`]; the column list of an existing
//! partition is never changed in place.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::rtcm::constellation::Constellation;
use crate::source::LinkMetrics;

/// A row type with a fixed table name and column layout
pub trait Record: Serialize + DeserializeOwned {
    /// Partition file prefix
    const TABLE: &'static str;

    /// Serialized field names, in declaration order
    const COLUMNS: &'static [&'static str];

    /// Bumped whenever `COLUMNS` changes
    const SCHEMA_VERSION: u32 = 1;
}

/// One poll of one wireless client
///
/// Metric fields are `None` when the equipment could not be reached; such
/// rows are still written so outage length can be read off the timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub entity_id: String,
    pub address: String,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    /// Signal strength in dBm
    pub signal_strength: Option<i32>,
    /// Transmit rate in Mbps
    pub tx_rate: Option<f64>,
    /// Receive rate in Mbps
    pub rx_rate: Option<f64>,
}

impl Sample {
    pub fn new(
        timestamp: NaiveDateTime,
        entity_id: &str,
        address: &str,
        position: Option<(f64, f64)>,
        metrics: &LinkMetrics,
    ) -> Self {
        Self {
            timestamp,
            entity_id: entity_id.to_string(),
            address: address.to_string(),
            position_x: position.map(|(x, _)| x),
            position_y: position.map(|(_, y)| y),
            signal_strength: metrics.signal_strength,
            tx_rate: metrics.tx_rate,
            rx_rate: metrics.rx_rate,
        }
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        self.position_x.zip(self.position_y)
    }
}

impl Record for Sample {
    const TABLE: &'static str = "coverage_log";
    const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "entity_id",
        "address",
        "position_x",
        "position_y",
        "signal_strength",
        "tx_rate",
        "rx_rate",
    ];
}

/// Health of the correction stream over one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamStatus {
    Ok,
    Error,
}

/// Rolling statistics for one reporting window of the correction stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatistic {
    pub source: String,
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
    pub status: StreamStatus,
    /// Share of frames in the window that passed CRC, 0-100
    pub quality_pct: f64,
    /// Sorted constellation labels seen in the window
    pub constellations: Vec<String>,
    /// Last reference station id seen on this connection
    pub station_id: Option<u16>,
    pub message_count: u64,
    pub valid_count: u64,
    pub window_secs: f64,
    pub error: Option<String>,
}

impl AggregateStatistic {
    /// Statistic for a healthy window
    pub fn ok(
        source: &str,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        total: u64,
        valid: u64,
        constellations: &BTreeSet<Constellation>,
        station_id: Option<u16>,
    ) -> Self {
        let mut labels: Vec<String> = constellations.iter().map(|c| c.label().to_string()).collect();
        labels.sort();

        Self {
            source: source.to_string(),
            window_start,
            window_end,
            status: StreamStatus::Ok,
            quality_pct: quality_pct(valid, total),
            constellations: labels,
            station_id,
            message_count: total,
            valid_count: valid,
            window_secs: window_secs(window_start, window_end),
            error: None,
        }
    }

    /// Zero-count statistic recorded the moment the stream is lost
    pub fn error(
        source: &str,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        reason: &str,
    ) -> Self {
        Self {
            source: source.to_string(),
            window_start,
            window_end,
            status: StreamStatus::Error,
            quality_pct: 0.0,
            constellations: Vec::new(),
            station_id: None,
            message_count: 0,
            valid_count: 0,
            window_secs: window_secs(window_start, window_end),
            error: Some(reason.to_string()),
        }
    }
}

impl Record for AggregateStatistic {
    const TABLE: &'static str = "rtk_status";
    const COLUMNS: &'static [&'static str] = &[
        "source",
        "window_start",
        "window_end",
        "status",
        "quality_pct",
        "constellations",
        "station_id",
        "message_count",
        "valid_count",
        "window_secs",
        "error",
    ];
}

/// valid / total × 100, or 0 for an empty window
pub fn quality_pct(valid: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (valid.min(total) as f64 / total as f64) * 100.0
}

fn window_secs(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}
