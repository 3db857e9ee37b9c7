//! TCP transport to a base station or a caster relay.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::connector::{ByteStream, Connector};
use crate::error::{FieldLinkError, Result};

/// Connects to `host:port` with a bounded connect time
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector
    ///
    /// # Errors
    ///
    /// Returns error if the host is empty or the port is zero
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(FieldLinkError::Connect("stream source host is not configured".to_string()));
        }
        if port == 0 {
            return Err(FieldLinkError::Connect(format!("invalid port 0 for {}", host)));
        }

        Ok(Self {
            host: host.trim().to_string(),
            port,
            connect_timeout,
        })
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn ByteStream>> {
        debug!("Connecting to {}:{}", self.host, self.port);

        let stream = timeout(self.connect_timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| FieldLinkError::Timeout(self.connect_timeout, "TCP connect"))?
            .map_err(|e| FieldLinkError::Connect(format!("{}: {}", self.describe(), e)))?;

        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}
