//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! The configuration is read once at startup and then only ever borrowed;
//! workers copy what they need out of it when they are constructed.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{FieldLinkError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    #[serde(default)]
    pub rtk: RtkConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// Sample storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_shift_boundary_hour")]
    pub shift_boundary_hour: u32,

    #[serde(default)]
    pub sync_writes: bool,

    #[serde(default = "default_status_file")]
    pub status_file: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rolling log files; empty logs to the console only
    #[serde(default)]
    pub log_dir: String,
}

/// Link poller timing
#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval_s")]
    pub interval_s: u64,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    #[serde(default = "default_position_timeout_ms")]
    pub position_timeout_ms: u64,
}

/// Link query helper and the access point it talks to
#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default)]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_access_point")]
    pub access_point: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

/// One monitored wireless client
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EntityConfig {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub position: Option<[f64; 2]>,
}

/// Correction stream transport
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Serial,
}

/// RTCM correction source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RtkConfig {
    #[serde(default = "default_rtk_enabled")]
    pub enabled: bool,

    #[serde(default = "default_rtk_name")]
    pub name: String,

    #[serde(default = "default_transport")]
    pub transport: Transport,

    #[serde(default)]
    pub host: String,

    #[serde(default = "default_rtk_port")]
    pub port: u16,

    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_report_interval_s")]
    pub report_interval_s: u64,

    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

/// Worker restart policy
#[derive(Debug, Deserialize, Clone)]
pub struct SupervisorConfig {
    #[serde(default = "default_restart_base_ms")]
    pub restart_base_ms: u64,

    #[serde(default = "default_restart_max_ms")]
    pub restart_max_ms: u64,

    #[serde(default = "default_reset_after_s")]
    pub reset_after_s: u64,

    #[serde(default = "default_status_interval_s")]
    pub status_interval_s: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

// Default value functions
fn default_data_dir() -> String { "./data".to_string() }
fn default_shift_boundary_hour() -> u32 { 20 }
fn default_status_file() -> String { "worker_status.json".to_string() }

fn default_log_level() -> String { "info".to_string() }

fn default_poll_interval_s() -> u64 { 60 }
fn default_query_timeout_ms() -> u64 { 5000 }
fn default_position_timeout_ms() -> u64 { 2000 }

fn default_access_point() -> String { "192.168.88.1".to_string() }
fn default_username() -> String { "monitor_user".to_string() }

fn default_rtk_enabled() -> bool { true }
fn default_rtk_name() -> String { "rtk_base".to_string() }
fn default_transport() -> Transport { Transport::Tcp }
fn default_rtk_port() -> u16 { 2101 }
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_read_timeout_ms() -> u64 { 30000 }
fn default_report_interval_s() -> u64 { 60 }
fn default_reconnect_base_ms() -> u64 { 10000 }
fn default_reconnect_max_ms() -> u64 { 300000 }

fn default_restart_base_ms() -> u64 { 1000 }
fn default_restart_max_ms() -> u64 { 60000 }
fn default_reset_after_s() -> u64 { 300 }
fn default_status_interval_s() -> u64 { 30 }
fn default_shutdown_timeout_ms() -> u64 { 5000 }

/// Baud rates GNSS receivers commonly expose on their correction output
const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800];

/// Levels accepted by the log filter
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            shift_boundary_hour: default_shift_boundary_hour(),
            sync_writes: false,
            status_file: default_status_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_s: default_poll_interval_s(),
            query_timeout_ms: default_query_timeout_ms(),
            position_timeout_ms: default_position_timeout_ms(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            access_point: default_access_point(),
            username: default_username(),
            password: String::new(),
        }
    }
}

impl Default for RtkConfig {
    fn default() -> Self {
        Self {
            enabled: default_rtk_enabled(),
            name: default_rtk_name(),
            transport: default_transport(),
            host: String::new(),
            port: default_rtk_port(),
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            report_interval_s: default_report_interval_s(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_base_ms: default_restart_base_ms(),
            restart_max_ms: default_restart_max_ms(),
            reset_after_s: default_reset_after_s(),
            status_interval_s: default_status_interval_s(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn position_timeout(&self) -> Duration {
        Duration::from_millis(self.position_timeout_ms)
    }
}

impl RtkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_s)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

impl SupervisorConfig {
    pub fn restart_base(&self) -> Duration {
        Duration::from_millis(self.restart_base_ms)
    }

    pub fn restart_max(&self) -> Duration {
        Duration::from_millis(self.restart_max_ms)
    }

    pub fn reset_after(&self) -> Duration {
        Duration::from_secs(self.reset_after_s)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_s)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn invalid(message: impl std::fmt::Display) -> FieldLinkError {
    FieldLinkError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fieldlink::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate process-wide configuration values
    ///
    /// Problems confined to one monitored entity or to the correction source
    /// endpoint are not checked here; they only disable that one worker.
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Storage
        if self.storage.data_dir.is_empty() {
            return Err(invalid("storage data_dir cannot be empty"));
        }

        if self.storage.shift_boundary_hour > 23 {
            return Err(invalid("shift_boundary_hour must be between 0 and 23"));
        }

        if self.storage.status_file.is_empty() {
            return Err(invalid("storage status_file cannot be empty"));
        }

        // Logging
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "logging level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        // Poller timing
        if self.poller.interval_s == 0 || self.poller.interval_s > 86400 {
            return Err(invalid("poller interval_s must be between 1 and 86400"));
        }

        if self.poller.query_timeout_ms == 0 || self.poller.query_timeout_ms > 120000 {
            return Err(invalid("query_timeout_ms must be between 1 and 120000"));
        }

        if self.poller.position_timeout_ms == 0 || self.poller.position_timeout_ms > 60000 {
            return Err(invalid("position_timeout_ms must be between 1 and 60000"));
        }

        // The query helper is shared by every entity
        if !self.entities.is_empty() && self.query.program.is_empty() {
            return Err(invalid("query program must be set when entities are configured"));
        }

        // Correction stream timing
        if self.rtk.connect_timeout_ms == 0 || self.rtk.connect_timeout_ms > 60000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 60000"));
        }

        if self.rtk.read_timeout_ms == 0 || self.rtk.read_timeout_ms > 600000 {
            return Err(invalid("read_timeout_ms must be between 1 and 600000"));
        }

        if self.rtk.report_interval_s == 0 || self.rtk.report_interval_s > 3600 {
            return Err(invalid("report_interval_s must be between 1 and 3600"));
        }

        if self.rtk.reconnect_base_ms == 0 || self.rtk.reconnect_base_ms > self.rtk.reconnect_max_ms {
            return Err(invalid("reconnect_base_ms must be at least 1 and not exceed reconnect_max_ms"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.rtk.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        // Supervisor
        if self.supervisor.restart_base_ms == 0
            || self.supervisor.restart_base_ms > self.supervisor.restart_max_ms
        {
            return Err(invalid("restart_base_ms must be at least 1 and not exceed restart_max_ms"));
        }

        if self.supervisor.reset_after_s == 0 {
            return Err(invalid("reset_after_s must be greater than 0"));
        }

        if self.supervisor.status_interval_s == 0 {
            return Err(invalid("status_interval_s must be greater than 0"));
        }

        if self.supervisor.shutdown_timeout_ms == 0 {
            return Err(invalid("shutdown_timeout_ms must be greater than 0"));
        }

        Ok(())
    }
}
