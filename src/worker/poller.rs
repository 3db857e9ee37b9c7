//! # Link Poller
//!
//! Samples one wireless client on a fixed interval.
//!
//! A poll never fails as a whole: an unreachable access point or a missing
//! position just leaves the affected fields empty, and the row is written
//! anyway so coverage gaps show up in the data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::status::StatusHandle;
use super::{MonotonicClock, Worker};
use crate::config::PollerConfig;
use crate::error::Result;
use crate::source::{LinkMetrics, PolledSource};
use crate::telemetry::{RecordSink, Sample, ShiftClock};

/// Worker owning one polled source
pub struct Poller {
    name: String,
    source: PolledSource,
    interval: Duration,
    query_timeout: Duration,
    position_timeout: Duration,
    clock: ShiftClock,
    sink: Arc<dyn RecordSink>,
}

impl Poller {
    pub fn new(source: PolledSource, config: &PollerConfig, clock: ShiftClock, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            name: format!("poller:{}", source.entity.id),
            source,
            interval: config.interval(),
            query_timeout: config.query_timeout(),
            position_timeout: config.position_timeout(),
            clock,
            sink,
        }
    }

    /// Take one sample
    ///
    /// The timestamp is taken when the poll starts. Query or position
    /// failures are logged and recorded on `status`; the sample is returned
    /// with the affected fields empty.
    pub async fn poll_once(&self, timestamps: &mut MonotonicClock, status: &StatusHandle) -> Sample {
        let entity = &self.source.entity;
        let timestamp = timestamps.now();

        let query = self
            .source
            .query
            .query(&entity.address, &self.source.credentials, self.query_timeout);
        let metrics = match timeout(self.query_timeout, query).await {
            Ok(Ok(metrics)) => {
                status.record_success(timestamp);
                metrics
            }
            Ok(Err(e)) => {
                warn!(entity = %entity.id, address = %entity.address, error = %e, "Link query failed");
                status.record_error(&e.to_string());
                LinkMetrics::default()
            }
            Err(_) => {
                warn!(entity = %entity.id, address = %entity.address, "Link query timed out after {:?}", self.query_timeout);
                status.record_error("link query timed out");
                LinkMetrics::default()
            }
        };

        let position = match timeout(self.position_timeout, self.source.position.position(&entity.id)).await {
            Ok(Ok(position)) => Some(position),
            Ok(Err(e)) => {
                debug!(entity = %entity.id, error = %e, "No position");
                None
            }
            Err(_) => {
                warn!(entity = %entity.id, "Position lookup timed out after {:?}", self.position_timeout);
                None
            }
        };

        Sample::new(timestamp, &entity.id, &entity.address, position, &metrics)
    }

    /// Write a sample to its shift partition
    ///
    /// A failed write is logged and dropped; the poll loop keeps going.
    fn persist(&self, sample: &Sample, status: &StatusHandle) {
        let key = self.clock.partition_key(sample.timestamp);
        match self.sink.append_sample(key, sample) {
            Ok(()) => debug!(
                entity = %sample.entity_id,
                partition = %key,
                signal = ?sample.signal_strength,
                "Sample written"
            ),
            Err(e) => {
                error!(entity = %sample.entity_id, partition = %key, error = %e, "Failed to write sample");
                status.record_error(&format!("write failed: {}", e));
            }
        }
    }
}

#[async_trait]
impl Worker for Poller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, status: &StatusHandle, cancel: &CancellationToken) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut timestamps = MonotonicClock::default();

        info!(entity = %self.source.entity.id, "Polling {} every {:?}", self.source.entity.address, self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let sample = tokio::select! {
                        _ = cancel.cancelled() => break,
                        sample = self.poll_once(&mut timestamps, status) => sample,
                    };
                    self.persist(&sample, status);
                }
            }
        }

        info!(entity = %self.source.entity.id, "Poller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldLinkError;
    use crate::source::position::MockPositionSource;
    use crate::source::query::MockMetricQuery;
    use crate::source::{Credentials, MonitoredEntity};
    use crate::worker::mocks::{EventLog, RecordingSink};
    use crate::worker::status::StatusRegistry;

    fn source(query: MockMetricQuery, position: MockPositionSource) -> PolledSource {
        PolledSource {
            entity: MonitoredEntity::new("Rig_1", "AA:BB:CC:DD:EE:F1").unwrap(),
            credentials: Credentials::new("monitor_user", "pw"),
            query: Arc::new(query),
            position: Arc::new(position),
        }
    }

    fn config() -> PollerConfig {
        PollerConfig {
            interval_s: 60,
            query_timeout_ms: 5000,
            position_timeout_ms: 2000,
        }
    }

    fn fixed_position() -> MockPositionSource {
        let mut position = MockPositionSource::new();
        position.expect_position().returning(|_| Ok((67.51, 51.91)));
        position
    }

    #[tokio::test]
    async fn test_poll_once_success() {
        let mut query = MockMetricQuery::new();
        query
            .expect_query()
            .withf(|address, _, _| address.to_string() == "AA:BB:CC:DD:EE:F1")
            .times(1)
            .returning(|_, _, _| {
                Ok(LinkMetrics {
                    signal_strength: Some(-67),
                    tx_rate: Some(54.0),
                    rx_rate: Some(48.5),
                })
            });

        let sink = RecordingSink::new(EventLog::default());
        let poller = Poller::new(source(query, fixed_position()), &config(), ShiftClock::new(20).unwrap(), Arc::new(sink));
        let status = StatusRegistry::new().register("poller:Rig_1");

        let sample = poller.poll_once(&mut MonotonicClock::default(), &status).await;
        assert_eq!(sample.entity_id, "Rig_1");
        assert_eq!(sample.signal_strength, Some(-67));
        assert_eq!(sample.position(), Some((67.51, 51.91)));
        assert!(status.report().unwrap().last_success.is_some());
    }

    #[tokio::test]
    async fn test_poll_once_without_position() {
        let mut query = MockMetricQuery::new();
        query.expect_query().returning(|_, _, _| Ok(LinkMetrics::default()));

        let mut position = MockPositionSource::new();
        position
            .expect_position()
            .returning(|id| Err(FieldLinkError::Position(format!("no fix for {}", id))));

        let sink = RecordingSink::new(EventLog::default());
        let poller = Poller::new(source(query, position), &config(), ShiftClock::new(20).unwrap(), Arc::new(sink));
        let status = StatusRegistry::new().register("poller:Rig_1");

        let sample = poller.poll_once(&mut MonotonicClock::default(), &status).await;
        assert_eq!(sample.position(), None);
        assert_eq!(sample.position_x, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_equipment_still_writes_rows() {
        let mut query = MockMetricQuery::new();
        query
            .expect_query()
            .times(3)
            .returning(|_, _, _| Err(FieldLinkError::Query("no route to host".to_string())));

        let sink = RecordingSink::new(EventLog::default());
        let poller = Arc::new(Poller::new(
            source(query, fixed_position()),
            &config(),
            ShiftClock::new(20).unwrap(),
            Arc::new(sink.clone()),
        ));
        let status = StatusRegistry::new().register("poller:Rig_1");
        let cancel = CancellationToken::new();

        let task = {
            let poller = poller.clone();
            let status = status.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(&status, &cancel).await })
        };

        // Polls at 0s, 60s and 120s
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        let samples = sink.samples();
        assert_eq!(samples.len(), 3);
        for sample in &samples {
            assert_eq!(sample.signal_strength, None);
            assert_eq!(sample.tx_rate, None);
            assert_eq!(sample.rx_rate, None);
            assert_eq!(sample.position(), Some((67.51, 51.91)));
        }
        assert!(samples.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));

        let report = status.report().unwrap();
        assert_eq!(report.last_error.as_deref(), Some("Query failed: no route to host"));
        assert!(report.last_success.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_position_is_dropped() {
        let mut query = MockMetricQuery::new();
        query.expect_query().returning(|_, _, _| Ok(LinkMetrics::default()));

        // A position source that never answers within its deadline
        struct SlowPosition;

        #[async_trait]
        impl crate::source::PositionSource for SlowPosition {
            async fn position(&self, _entity_id: &str) -> Result<(f64, f64)> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok((0.0, 0.0))
            }
        }

        let polled = PolledSource {
            entity: MonitoredEntity::new("Rig_1", "AA:BB:CC:DD:EE:F1").unwrap(),
            credentials: Credentials::default(),
            query: Arc::new(query),
            position: Arc::new(SlowPosition),
        };
        let sink = RecordingSink::new(EventLog::default());
        let poller = Poller::new(polled, &config(), ShiftClock::new(20).unwrap(), Arc::new(sink));
        let status = StatusRegistry::new().register("poller:Rig_1");

        let sample = poller.poll_once(&mut MonotonicClock::default(), &status).await;
        assert_eq!(sample.position(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_does_not_stop_polling() {
        let mut query = MockMetricQuery::new();
        query.expect_query().returning(|_, _, _| {
            Ok(LinkMetrics {
                signal_strength: Some(-70),
                ..LinkMetrics::default()
            })
        });

        let sink = RecordingSink::new(EventLog::default());
        sink.set_fail_writes(true);
        let poller = Arc::new(Poller::new(
            source(query, fixed_position()),
            &config(),
            ShiftClock::new(20).unwrap(),
            Arc::new(sink.clone()),
        ));
        let status = StatusRegistry::new().register("poller:Rig_1");
        let cancel = CancellationToken::new();

        let task = {
            let poller = poller.clone();
            let status = status.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(&status, &cancel).await })
        };

        // First poll at 0s fails to write; the disk recovers before 60s
        tokio::time::sleep(Duration::from_secs(30)).await;
        sink.set_fail_writes(false);
        tokio::time::sleep(Duration::from_secs(40)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(sink.samples().len(), 1);
        assert!(status
            .report()
            .unwrap()
            .last_error
            .unwrap()
            .starts_with("write failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_promptly() {
        let mut query = MockMetricQuery::new();
        query.expect_query().returning(|_, _, _| Ok(LinkMetrics::default()));

        let sink = RecordingSink::new(EventLog::default());
        let poller = Poller::new(source(query, fixed_position()), &config(), ShiftClock::new(20).unwrap(), Arc::new(sink));
        let status = StatusRegistry::new().register("poller:Rig_1");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = timeout(Duration::from_secs(1), poller.run(&status, &cancel)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
