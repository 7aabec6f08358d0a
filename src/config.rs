use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DriverError, Result};
use crate::offsets::OffsetRecord;
use crate::supervisor::Backoff;

/// Serial baud rate the aqsensor firmware opens its port with.
pub const BAUD_RATE: u32 = 57_600;

/// Driver settings. Durations are stored in milliseconds so the struct maps
/// one-to-one onto a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub port: String,
    pub baud_rate: u32,
    /// How long to wait for one reply.
    pub read_timeout_ms: u64,
    /// Timeout of a single serial read call.
    pub io_slice_ms: u64,
    /// Wait after opening while the board resets and boots.
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Give up after this many failed opens in a row; `None` retries forever.
    pub max_connect_attempts: Option<u32>,
    /// Offsets to keep on the device, in `set_offsets` layout.
    pub offsets: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: BAUD_RATE,
            read_timeout_ms: 1_000,
            io_slice_ms: 50,
            settle_delay_ms: 2_000,
            poll_interval_ms: 1_000,
            backoff_base_ms: 500,
            backoff_cap_ms: 8_000,
            max_connect_attempts: None,
            offsets: None,
        }
    }
}

impl DriverConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: DriverConfig = serde_json::from_str(&text)
            .map_err(|e| DriverError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(DriverError::Config("port must not be empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(DriverError::Config("baud_rate must be positive".into()));
        }
        if self.io_slice_ms == 0 || self.read_timeout_ms == 0 {
            return Err(DriverError::Config(
                "read_timeout_ms and io_slice_ms must be positive".into(),
            ));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(DriverError::Config(
                "backoff_cap_ms must not be below backoff_base_ms".into(),
            ));
        }
        self.desired_offsets()?;
        Ok(())
    }

    pub fn desired_offsets(&self) -> Result<Option<OffsetRecord>> {
        self.offsets.as_deref().map(OffsetRecord::decode).transpose()
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn io_slice(&self) -> Duration {
        Duration::from_millis(self.io_slice_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_device() {
        let config = DriverConfig::default();
        assert_eq!(config.baud_rate, 57_600);
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        config.validate().unwrap();
    }

    #[test]
    fn loads_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"port": "/dev/ttyUSB3", "offsets": "t-1.4b0000p0000h000000e000000"}}"#
        )
        .unwrap();

        let config = DriverConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.port, "/dev/ttyUSB3");
        assert_eq!(config.baud_rate, BAUD_RATE);
        assert_eq!(config.desired_offsets().unwrap().unwrap().temperature, -1.4);
    }

    #[test]
    fn rejects_bad_offsets_and_backoff() {
        let config = DriverConfig {
            offsets: Some("t-1.4".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DriverError::MalformedOffsetString(_))
        ));

        let config = DriverConfig {
            backoff_base_ms: 1_000,
            backoff_cap_ms: 10,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DriverError::Config(_))));
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DriverConfig::from_json_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }
}
