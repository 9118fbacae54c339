//! Configuration for the wrist relay.

use crate::detector::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Frames per batch the dispatcher cadence is tuned for.
pub const TARGET_BATCH_SIZE: usize = 5;

/// Main configuration for the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Assembler tick (motion sampling target)
    #[serde(with = "millis_serde")]
    pub sample_interval: Duration,

    /// Dispatcher tick
    #[serde(with = "millis_serde")]
    pub dispatch_interval: Duration,

    /// Expected frames per batch; larger batches are logged, not capped
    pub target_batch_size: usize,

    /// Fallback rep detector tuning
    pub detector: DetectorConfig,

    /// Samples per audio peak frame
    pub audio_frame_size: usize,

    /// Address of the companion receiver
    pub companion: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(20), // 50 Hz
            dispatch_interval: Duration::from_millis(100),
            target_batch_size: TARGET_BATCH_SIZE,
            detector: DetectorConfig::default(),
            audio_frame_size: crate::sources::audio::DEFAULT_FRAME_SIZE,
            companion: "127.0.0.1:7878".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults when it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wrist-relay")
            .join("config.json")
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval.is_zero() {
            return Err(ConfigError::Invalid("sample_interval must be positive".into()));
        }
        if self.dispatch_interval.is_zero() {
            return Err(ConfigError::Invalid("dispatch_interval must be positive".into()));
        }
        if self.audio_frame_size == 0 {
            return Err(ConfigError::Invalid("audio_frame_size must be positive".into()));
        }
        let threshold = self.detector.threshold_g;
        if threshold.is_nan() || threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "detector.threshold_g must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Assembler ticks expected per dispatcher tick.
    pub fn frames_per_dispatch(&self) -> f64 {
        self.dispatch_interval.as_secs_f64() / self.sample_interval.as_secs_f64()
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
pub(crate) mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
