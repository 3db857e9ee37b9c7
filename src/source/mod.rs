//! # Metric Sources
//!
//! The two kinds of telemetry origin:
//!
//! - **Polled**: a wireless client whose link metrics are read off the
//!   access point on a fixed interval
//! - **Stream**: a continuously pushed RTCM correction stream

pub mod position;
pub mod query;

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{Config, EntityConfig, RtkConfig, Transport};
use crate::error::{FieldLinkError, Result};
use crate::transport::{Connector, SerialConnector, TcpConnector};

pub use position::{FixedPosition, PositionSource};
pub use query::{CommandQuery, Credentials, LinkMetrics, MetricQuery};

/// A monitored wireless client
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredEntity {
    pub id: String,
    /// Hardware address the access point knows the client by
    pub address: String,
}

impl MonitoredEntity {
    /// # Errors
    ///
    /// Returns error if the id or address is blank
    pub fn new(id: &str, address: &str) -> Result<Self> {
        let id = id.trim();
        let address = address.trim();

        if id.is_empty() {
            return Err(FieldLinkError::Query("entity id cannot be empty".to_string()));
        }
        if address.is_empty() {
            return Err(FieldLinkError::Query(format!("entity {} has no address", id)));
        }

        Ok(Self {
            id: id.to_string(),
            address: address.to_uppercase(),
        })
    }
}

impl TryFrom<&EntityConfig> for MonitoredEntity {
    type Error = FieldLinkError;

    fn try_from(config: &EntityConfig) -> Result<Self> {
        Self::new(&config.id, &config.address)
    }
}

/// A client polled on a fixed interval
#[derive(Clone)]
pub struct PolledSource {
    pub entity: MonitoredEntity,
    pub credentials: Credentials,
    pub query: Arc<dyn MetricQuery>,
    pub position: Arc<dyn PositionSource>,
}

/// A pushed byte stream of correction frames
#[derive(Clone)]
pub struct StreamSource {
    pub name: String,
    pub connector: Arc<dyn Connector>,
}

/// Origin of telemetry, owned by exactly one worker
#[derive(Clone)]
pub enum MetricSource {
    Polled(PolledSource),
    Stream(StreamSource),
}

impl MetricSource {
    /// Worker name, unique across the process
    pub fn name(&self) -> String {
        match self {
            MetricSource::Polled(source) => format!("poller:{}", source.entity.id),
            MetricSource::Stream(source) => format!("analyzer:{}", source.name),
        }
    }
}

/// Fixed positions for every entity that configures one
pub fn fixed_positions(entities: &[EntityConfig]) -> FixedPosition {
    let mut positions = FixedPosition::new();
    for entity in entities {
        if let Some([x, y]) = entity.position {
            positions.insert(entity.id.trim(), (x, y));
        }
    }
    positions
}

/// Build one polled source per configured entity
///
/// Each entry carries the worker name and either the source or the reason
/// that entity cannot be monitored; a bad entry never affects the others.
pub fn polled_sources(
    config: &Config,
    query: Arc<dyn MetricQuery>,
    position: Arc<dyn PositionSource>,
) -> Vec<(String, Result<MetricSource>)> {
    let credentials = Credentials::new(&config.query.username, &config.query.password);
    let mut seen = HashSet::new();

    config
        .entities
        .iter()
        .enumerate()
        .map(|(index, entity)| {
            let name = if entity.id.trim().is_empty() {
                format!("poller:#{}", index)
            } else {
                format!("poller:{}", entity.id.trim())
            };

            let source = MonitoredEntity::try_from(entity).and_then(|entity| {
                if !seen.insert(entity.id.clone()) {
                    return Err(FieldLinkError::Query(format!("duplicate entity id {}", entity.id)));
                }
                Ok(MetricSource::Polled(PolledSource {
                    entity,
                    credentials: credentials.clone(),
                    query: query.clone(),
                    position: position.clone(),
                }))
            });

            (name, source)
        })
        .collect()
}

/// Build the correction stream source
///
/// # Errors
///
/// Returns error if the configured endpoint is incomplete
pub fn stream_source(config: &RtkConfig) -> Result<MetricSource> {
    let connector: Arc<dyn Connector> = match config.transport {
        Transport::Tcp => Arc::new(TcpConnector::new(&config.host, config.port, config.connect_timeout())?),
        Transport::Serial => Arc::new(SerialConnector::new(&config.serial_port, config.baud_rate)?),
    };

    Ok(MetricSource::Stream(StreamSource {
        name: config.name.clone(),
        connector,
    }))
}
