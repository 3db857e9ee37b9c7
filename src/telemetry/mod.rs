//! # Telemetry Module
//!
//! Durable, shift-partitioned storage of health samples.
//!
//! This module handles:
//! - Mapping timestamps onto operational-day partitions (`shift`)
//! - The row types persisted for polled links and the correction stream (`records`)
//! - Append-only JSONL partition files with a fixed schema header (`store`)

pub mod records;
pub mod shift;
pub mod store;

pub use records::{AggregateStatistic, Record, Sample, StreamStatus};
pub use shift::{partition_key, PartitionKey, ShiftClock, ShiftKind};
pub use store::{RecordSink, SampleStore};
