//! Engine configuration.
//!
//! Stored as RON so it stays readable and diff-friendly:
//!
//! ```ron
//! (
//!     block_size: 256,
//!     poll_interval_ms: 100,
//!     devices: (input_device: Some(2), output_device: None),
//! )
//! ```
//!
//! Missing fields take their defaults. Mixer parameters are deliberately not
//! part of the file; they always start from defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use rtmix_core::{DeviceSelection, Frames, block_sizes};

/// Audio configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Frames per hardware block
    pub block_size: Frames,
    /// How often the stream manager checks for a device change (ms)
    pub poll_interval_ms: u64,
    /// Capacity of the audio -> control event ring
    pub event_capacity: usize,
    /// Input bridge ring length, in blocks
    pub ring_blocks: usize,
    /// Devices to open at startup
    pub devices: DeviceSelection,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            block_size: block_sizes::BLOCK_512,
            poll_interval_ms: 100,
            event_capacity: 256,
            ring_blocks: 4,
            devices: DeviceSelection::default(),
        }
    }
}

impl AudioConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be at least 1".into(),
            ));
        }
        if self.ring_blocks < 2 {
            return Err(ConfigError::Invalid("ring_blocks must be at least 2".into()));
        }
        Ok(())
    }

    /// Save configuration to a RON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::SerializationFailed(e.to_string()))?;

        std::fs::write(path.as_ref(), ron_string).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Load and validate configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let ron_string = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Self = ron::from_str(&ron_string)
            .map_err(|e| ConfigError::DeserializationFailed(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }
}

/// Errors that can occur while loading or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for rtmix_core::Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();
        assert_eq!(config.block_size, 512);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtmix.ron");

        let config = AudioConfig {
            block_size: 128,
            devices: DeviceSelection::new(Some(3), None),
            ..AudioConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = AudioConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.ron");
        std::fs::write(&path, "(block_size: 64)").unwrap();

        let loaded = AudioConfig::load(&path).unwrap();
        assert_eq!(loaded.block_size, 64);
        assert_eq!(loaded.poll_interval_ms, 100);
        assert_eq!(loaded.devices, DeviceSelection::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        std::fs::write(&path, "(block_size: 0)").unwrap();

        assert!(matches!(
            AudioConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AudioConfig::load("/definitely/not/here.ron"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        std::fs::write(&path, "(block_size: ").unwrap();

        assert!(matches!(
            AudioConfig::load(&path),
            Err(ConfigError::DeserializationFailed(_))
        ));
    }
}
