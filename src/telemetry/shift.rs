//! # Shift Clock
//!
//! The operational day runs from the shift boundary hour to the same hour on
//! the next calendar day and is named after the day on which it ends. With a
//! boundary of 20:00, everything from 2024-03-01 20:00 up to (but excluding)
//! 2024-03-02 20:00 belongs to partition `2024-03-02`.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::de::Error;

use crate::error::{FieldLinkError, Result};

/// Date format used for partition keys
const PARTITION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Length of one shift within the operational day
const SHIFT_HOURS: u32 = 12;

/// Identifies one operational day's partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(NaiveDate);

impl PartitionKey {
    /// The calendar date the operational day ends on
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for PartitionKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(PARTITION_DATE_FORMAT))
    }
}

impl FromStr for PartitionKey {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s, PARTITION_DATE_FORMAT)
            .map(Self)
            .map_err(|_| FieldLinkError::PartitionKey(s.to_string()))
    }
}

/// Map a timestamp to its partition key
///
/// Timestamps before `boundary_hour` belong to the current calendar day,
/// timestamps at or after it roll over to the following day.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use fieldlink::telemetry::partition_key;
///
/// let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// let before = day.and_hms_opt(19, 59, 0).unwrap();
/// let at = day.and_hms_opt(20, 0, 0).unwrap();
///
/// assert_eq!(partition_key(before, 20).to_string(), "2024-03-01");
/// assert_eq!(partition_key(at, 20).to_string(), "2024-03-02");
/// ```
pub fn partition_key(timestamp: NaiveDateTime, boundary_hour: u32) -> PartitionKey {
    let date = timestamp.date();
    if timestamp.hour() >= boundary_hour {
        PartitionKey(date.succ_opt().unwrap_or(date))
    } else {
        PartitionKey(date)
    }
}

/// Day or night half of an operational day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Day,
    Night,
}

/// Partition arithmetic for a fixed shift boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftClock {
    boundary_hour: u32,
}

impl ShiftClock {
    /// Create a clock rolling over at `boundary_hour` (0-23)
    ///
    /// # Errors
    ///
    /// Returns error if the hour is not a valid hour of day
    pub fn new(boundary_hour: u32) -> Result<Self> {
        if boundary_hour > 23 {
            return Err(FieldLinkError::Config(toml::de::Error::custom(format!(
                "shift boundary hour {} must be between 0 and 23",
                boundary_hour
            ))));
        }
        Ok(Self { boundary_hour })
    }

    pub fn boundary_hour(&self) -> u32 {
        self.boundary_hour
    }

    /// Partition for `timestamp`
    pub fn partition_key(&self, timestamp: NaiveDateTime) -> PartitionKey {
        partition_key(timestamp, self.boundary_hour)
    }

    /// Half-open `[start, end)` span of wall-clock time stored under `key`
    pub fn shift_window(&self, key: PartitionKey) -> (NaiveDateTime, NaiveDateTime) {
        let boundary = NaiveTime::from_hms_opt(self.boundary_hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let end = key.date().and_time(boundary);
        (end - Duration::days(1), end)
    }

    /// Whether `timestamp` falls in the day shift (the twelve hours leading
    /// up to the boundary) or the night shift
    pub fn shift_kind(&self, timestamp: NaiveDateTime) -> ShiftKind {
        let day_start = (self.boundary_hour + 24 - SHIFT_HOURS) % 24;
        let into_day = (timestamp.hour() + 24 - day_start) % 24;
        if into_day < SHIFT_HOURS {
            ShiftKind::Day
        } else {
            ShiftKind::Night
        }
    }
}

/// Current local wall-clock time; shift boundaries are defined in site time
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}
