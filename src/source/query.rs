//! # Link Metric Query
//!
//! Reads per-client link metrics off the wireless access point.
//!
//! The access point is reached through an external helper program. It is
//! invoked as `<program> <args...> <access_point> <client_address>`, receives
//! credentials through the environment, and prints one JSON object:
//!
//! ```text
//! {"signal_strength": -67, "tx_rate": 54.0, "rx_rate": 48.5}
//! ```
//!
//! Empty output means the client is not currently registered.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::QueryConfig;
use crate::error::{FieldLinkError, Result};

/// Environment variable carrying the access point username
pub const USERNAME_ENV: &str = "FIELDLINK_USERNAME";

/// Environment variable carrying the access point password
pub const PASSWORD_ENV: &str = "FIELDLINK_PASSWORD";

/// Link metrics for one client; any field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkMetrics {
    /// Signal strength in dBm
    pub signal_strength: Option<i32>,
    /// Transmit rate in Mbps
    pub tx_rate: Option<f64>,
    /// Receive rate in Mbps
    pub rx_rate: Option<f64>,
}

impl LinkMetrics {
    /// Whether no metric at all was reported
    pub fn is_empty(&self) -> bool {
        self.signal_strength.is_none() && self.tx_rate.is_none() && self.rx_rate.is_none()
    }
}

/// Access point login
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of link metrics for a client address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricQuery: Send + Sync {
    /// Query the current metrics for `address`
    ///
    /// # Errors
    ///
    /// Returns error if the equipment is unreachable, rejects the login, or
    /// answers with something that cannot be parsed
    async fn query(&self, address: &str, credentials: &Credentials, timeout: Duration) -> Result<LinkMetrics>;
}

/// [`MetricQuery`] backed by an external helper program
#[derive(Debug, Clone)]
pub struct CommandQuery {
    program: String,
    args: Vec<String>,
    access_point: String,
}

impl CommandQuery {
    pub fn new(program: &str, args: &[String], access_point: &str) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            access_point: access_point.to_string(),
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        Self::new(&config.program, &config.args, &config.access_point)
    }
}

#[async_trait]
impl MetricQuery for CommandQuery {
    async fn query(&self, address: &str, credentials: &Credentials, limit: Duration) -> Result<LinkMetrics> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.access_point)
            .arg(address)
            .env(USERNAME_ENV, &credentials.username)
            .env(PASSWORD_ENV, &credentials.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FieldLinkError::Query(format!("failed to start {}: {}", self.program, e)))?;

        // Dropping the future on timeout kills the helper
        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| FieldLinkError::Timeout(limit, "link query"))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FieldLinkError::Query(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let metrics = parse_query_output(&output.stdout)?;
        if metrics.is_empty() {
            warn!(address = %address, "Client not registered on {}", self.access_point);
        } else {
            debug!(address = %address, ?metrics, "Link query answered");
        }
        Ok(metrics)
    }
}

/// Parse the helper's standard output
///
/// # Errors
///
/// Returns error if the output is not UTF-8 or not a JSON metrics object
pub fn parse_query_output(stdout: &[u8]) -> Result<LinkMetrics> {
    let text = std::str::from_utf8(stdout)
        .map_err(|e| FieldLinkError::Query(format!("query output is not UTF-8: {}", e)))?
        .trim();

    if text.is_empty() {
        return Ok(LinkMetrics::default());
    }

    serde_json::from_str(text)
        .map_err(|e| FieldLinkError::Query(format!("unparseable query output {:?}: {}", text, e)))
}
