//! # Configuration
//!
//! `AppConfig` is the process configuration, loaded once from a JSON file.
//! Every field has a default, so `{}` is a complete configuration.
//!
//! `DeviceConfig` is different: it lives in the configuration store and is
//! re-read at the start of every acquisition cycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CYCLE_INTERVAL, DEFAULT_SERIAL_PORT, EVENT_PACING_DELAY, EXCHANGE_TIMEOUT,
    INTER_REQUEST_DELAY, MAX_EVENTS_PER_CYCLE, POOL_ACQUIRE_ATTEMPTS, POOL_ACQUIRE_DELAY,
    WAVEFORM_SEEK_DELAY,
};
use crate::error::PqError;
use crate::modbus::protocol::Pacing;
use crate::modbus::serial::SerialConfig;
use crate::sink::RetryPolicy;

/// Serial parameters of the active meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub baud_rate: u32,
    pub slave_id: u8,
}

/// Time-series store connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxSettings {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub measurement: String,
    pub tag_key: String,
    pub tag_value: String,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        InfluxSettings {
            url: "http://localhost:8086".to_string(),
            database: "get_sample".to_string(),
            username: None,
            password: None,
            measurement: "power_data".to_string(),
            tag_key: "power".to_string(),
            tag_value: "all".to_string(),
        }
    }
}

/// Relational store location and connection acquisition policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub acquire_attempts: u32,
    pub acquire_delay_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: PathBuf::from("pqmeter.db"),
            acquire_attempts: POOL_ACQUIRE_ATTEMPTS,
            acquire_delay_ms: POOL_ACQUIRE_DELAY.as_millis() as u64,
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial_port: String,
    pub exchange_timeout_ms: u64,
    pub interval_secs: u64,
    pub inter_request_delay_ms: u64,
    pub waveform_seek_delay_ms: u64,
    pub event_pacing_ms: u64,
    pub max_events_per_cycle: usize,
    pub influx: InfluxSettings,
    pub database: DatabaseSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            exchange_timeout_ms: EXCHANGE_TIMEOUT.as_millis() as u64,
            interval_secs: CYCLE_INTERVAL.as_secs(),
            inter_request_delay_ms: INTER_REQUEST_DELAY.as_millis() as u64,
            waveform_seek_delay_ms: WAVEFORM_SEEK_DELAY.as_millis() as u64,
            event_pacing_ms: EVENT_PACING_DELAY.as_millis() as u64,
            max_events_per_cycle: MAX_EVENTS_PER_CYCLE,
            influx: InfluxSettings::default(),
            database: DatabaseSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PqError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PqError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, PqError> {
        let config: AppConfig =
            serde_json::from_str(text).map_err(|e| PqError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PqError> {
        if self.interval_secs == 0 {
            return Err(PqError::Config("interval_secs must be positive".into()));
        }
        if self.max_events_per_cycle == 0 {
            return Err(PqError::Config("max_events_per_cycle must be positive".into()));
        }
        if self.database.acquire_attempts == 0 {
            return Err(PqError::Config("database.acquire_attempts must be positive".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn serial(&self) -> SerialConfig {
        SerialConfig {
            port: self.serial_port.clone(),
            timeout: Duration::from_millis(self.exchange_timeout_ms),
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            inter_request: Duration::from_millis(self.inter_request_delay_ms),
            waveform_seek: Duration::from_millis(self.waveform_seek_delay_ms),
            between_events: Duration::from_millis(self.event_pacing_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.database.acquire_attempts,
            delay: Duration::from_millis(self.database.acquire_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.serial_port, "/dev/ttyS0");
        assert_eq!(config.interval(), Duration::from_secs(10));
        assert_eq!(config.pacing(), Pacing::default());
        assert_eq!(config.influx.measurement, "power_data");
    }

    #[test]
    fn test_partial_override() {
        let config = AppConfig::from_json(
            r#"{ "serial_port": "/dev/ttyUSB1", "influx": { "database": "pq" } }"#,
        )
        .unwrap();
        assert_eq!(config.serial_port, "/dev/ttyUSB1");
        assert_eq!(config.influx.database, "pq");
        assert_eq!(config.influx.url, "http://localhost:8086");
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(matches!(
            AppConfig::from_json(r#"{ "interval_secs": 0 }"#),
            Err(PqError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(AppConfig::from_json("{ serial_port").is_err());
    }
}
