//! # Correction Stream Analyzer
//!
//! Connects to an RTCM correction source and summarizes the stream once per
//! reporting interval: frame count, CRC-valid share, the GNSS constellations
//! present, and the reference station id.
//!
//! When the stream drops (end of stream, read error, or nothing received
//! within the read timeout) the analyzer records an `ERROR` statistic right
//! away, closes the connection, and reconnects with exponential backoff.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::io::AsyncWriteExt;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use super::status::{StatusHandle, WorkerState};
use super::{MonotonicClock, Worker};
use crate::config::RtkConfig;
use crate::error::{FieldLinkError, Result};
use crate::rtcm::constellation::{classify, Constellation};
use crate::rtcm::decoder::RtcmReader;
use crate::rtcm::protocol::RawFrame;
use crate::source::StreamSource;
use crate::telemetry::{AggregateStatistic, RecordSink, ShiftClock};

/// Time allowed for closing a dropped connection
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Frame counters for the current reporting window
#[derive(Debug, Default)]
pub struct StreamWindow {
    total: u64,
    valid: u64,
    constellations: BTreeSet<Constellation>,
    station_id: Option<u16>,
}

impl StreamWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame
    ///
    /// Only CRC-valid frames contribute constellations and station id.
    pub fn record(&mut self, frame: &RawFrame) {
        self.total += 1;

        let Some(decoded) = &frame.decoded else {
            return;
        };
        self.valid += 1;

        if let Some(constellation) = decoded.message_type.and_then(classify) {
            self.constellations.insert(constellation);
        }
        if let Some(station_id) = decoded.station_id {
            self.station_id = Some(station_id);
        }
    }

    /// Close the window and start the next one
    ///
    /// Counts and constellations reset; the station id is kept for the
    /// lifetime of the connection.
    pub fn finish(&mut self, source: &str, start: NaiveDateTime, end: NaiveDateTime) -> AggregateStatistic {
        let statistic = AggregateStatistic::ok(
            source,
            start,
            end,
            self.total,
            self.valid,
            &self.constellations,
            self.station_id,
        );

        self.total = 0;
        self.valid = 0;
        self.constellations.clear();
        statistic
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn valid(&self) -> u64 {
        self.valid
    }

    pub fn station_id(&self) -> Option<u16> {
        self.station_id
    }

    pub fn constellations(&self) -> &BTreeSet<Constellation> {
        &self.constellations
    }
}

/// How a connection session ended
enum SessionEnd {
    Cancelled,
    Lost {
        error: FieldLinkError,
        window_start: Option<NaiveDateTime>,
    },
}

/// Worker owning one stream source
pub struct StreamAnalyzer {
    name: String,
    source: StreamSource,
    connect_timeout: Duration,
    read_timeout: Duration,
    report_interval: Duration,
    reconnect_base: Duration,
    reconnect_max: Duration,
    clock: ShiftClock,
    sink: Arc<dyn RecordSink>,
}

impl StreamAnalyzer {
    pub fn new(source: StreamSource, config: &RtkConfig, clock: ShiftClock, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            name: format!("analyzer:{}", source.name),
            source,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            report_interval: config.report_interval(),
            reconnect_base: config.reconnect_base(),
            reconnect_max: config.reconnect_max(),
            clock,
            sink,
        }
    }

    /// Connect once and analyze until the stream is lost or cancelled
    async fn session(&self, status: &StatusHandle, cancel: &CancellationToken, timestamps: &mut MonotonicClock) -> SessionEnd {
        let connect = timeout(self.connect_timeout, self.source.connector.connect());
        let stream = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            result = connect => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(error)) => return SessionEnd::Lost { error, window_start: None },
                Err(_) => {
                    return SessionEnd::Lost {
                        error: FieldLinkError::Timeout(self.connect_timeout, "stream connect"),
                        window_start: None,
                    }
                }
            },
        };

        info!(source = %self.source.name, "Connected to {}", self.source.connector.describe());
        status.set_state(WorkerState::Running);

        let mut reader = RtcmReader::new(stream);
        let mut window = StreamWindow::new();
        let mut window_start = timestamps.now();

        let mut report = interval_at(Instant::now() + self.report_interval, self.report_interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let idle = sleep(self.read_timeout);
        tokio::pin!(idle);

        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
                _ = report.tick() => {
                    let now = timestamps.now();
                    let statistic = window.finish(&self.source.name, window_start, now);
                    window_start = now;
                    if self.persist(&statistic) {
                        status.record_success(now);
                    }
                }
                _ = &mut idle => {
                    break SessionEnd::Lost {
                        error: FieldLinkError::Timeout(self.read_timeout, "correction data"),
                        window_start: Some(window_start),
                    };
                }
                frame = reader.next_frame() => match frame {
                    Ok(Some(frame)) => {
                        idle.as_mut().reset(Instant::now() + self.read_timeout);
                        window.record(&frame);
                    }
                    Ok(None) => {
                        break SessionEnd::Lost {
                            error: FieldLinkError::StreamClosed("remote end closed the connection".to_string()),
                            window_start: Some(window_start),
                        };
                    }
                    Err(error) => break SessionEnd::Lost { error, window_start: Some(window_start) },
                },
            }
        };

        if let SessionEnd::Lost { error, .. } = &end {
            if window.total() > 0 {
                warn!(
                    source = %self.source.name,
                    error = %error,
                    discarded_total = window.total(),
                    discarded_valid = window.valid(),
                    "Discarding partial window"
                );
            }
        }
        if reader.discarded_bytes() > 0 {
            debug!(source = %self.source.name, bytes = reader.discarded_bytes(), "Unframed bytes skipped on this connection");
        }

        let mut stream = reader.into_inner();
        if timeout(SHUTDOWN_GRACE, stream.shutdown()).await.is_err() {
            debug!(source = %self.source.name, "Connection shutdown timed out");
        }

        end
    }

    /// Write a statistic to its shift partition, reporting whether it landed
    fn persist(&self, statistic: &AggregateStatistic) -> bool {
        let key = self.clock.partition_key(statistic.window_end);
        match self.sink.append_statistic(key, statistic) {
            Ok(()) => {
                info!(
                    source = %statistic.source,
                    status = ?statistic.status,
                    quality_pct = statistic.quality_pct,
                    systems = %statistic.constellations.join(","),
                    station_id = ?statistic.station_id,
                    messages = statistic.message_count,
                    window_secs = statistic.window_secs,
                    "Stream statistic"
                );
                true
            }
            Err(e) => {
                error!(source = %statistic.source, partition = %key, error = %e, "Failed to write statistic");
                false
            }
        }
    }
}

#[async_trait]
impl Worker for StreamAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, status: &StatusHandle, cancel: &CancellationToken) -> Result<()> {
        let mut backoff = BackoffPolicy::new(self.reconnect_base, self.reconnect_max, self.report_interval);
        let mut timestamps = MonotonicClock::default();

        loop {
            let started = Instant::now();
            let (error, window_start) = match self.session(status, cancel, &mut timestamps).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Lost { error, window_start } => (error, window_start),
            };

            let now = timestamps.now();
            let reason = error.to_string();
            warn!(source = %self.source.name, error = %reason, "Correction stream lost");
            status.record_error(&reason);

            let statistic = AggregateStatistic::error(&self.source.name, window_start.unwrap_or(now), now, &reason);
            self.persist(&statistic);

            let delay = backoff.on_failure(started.elapsed());
            status.set_state(WorkerState::Backoff);
            info!(source = %self.source.name, attempt = backoff.consecutive_failures(), "Reconnecting in {:?}", delay);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!(source = %self.source.name, "Analyzer stopped");
        Ok(())
    }
}
