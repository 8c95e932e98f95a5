//! Configuration loading for detectors and sessions
//!
//! Two shapes live here: `DetectorConfig`, the validated per-channel detector
//! definition, and `SessionConfig`, the on-disk description of a run (devices,
//! sample rate, channel pairings). Both are JSON. Loading and validation
//! happen on the control path, strictly before a session starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::entry::ChannelEntry;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid detector config: {0}")]
    Invalid(String),
}

fn default_threshold_ratio() -> f32 {
    10.0
}

fn default_attack_ms() -> f32 {
    0.5
}

fn default_release_ms() -> f32 {
    10.0
}

fn default_noise_adapt_ms() -> f32 {
    100.0
}

fn default_refractory_ms() -> f32 {
    100.0
}

/// Validated detector definition for one channel
///
/// The processing core never interprets these values; it hands the whole
/// config to the detector constructor. Validation runs once at load time so
/// that a bad file fails the session before any audio resource is touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Envelope must exceed the noise floor by this factor to count as a syllable
    #[serde(default = "default_threshold_ratio")]
    pub threshold_ratio: f32,
    /// Envelope attack time constant in milliseconds
    #[serde(default = "default_attack_ms")]
    pub attack_ms: f32,
    /// Envelope release time constant in milliseconds
    #[serde(default = "default_release_ms")]
    pub release_ms: f32,
    /// Noise floor adaptation time constant in milliseconds
    #[serde(default = "default_noise_adapt_ms")]
    pub noise_adapt_ms: f32,
    /// Minimum gap between two recognitions in milliseconds
    #[serde(default = "default_refractory_ms")]
    pub refractory_ms: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_ratio: default_threshold_ratio(),
            attack_ms: default_attack_ms(),
            release_ms: default_release_ms(),
            noise_adapt_ms: default_noise_adapt_ms(),
            refractory_ms: default_refractory_ms(),
        }
    }
}

impl DetectorConfig {
    /// Load and validate a detector definition from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded detector config");
        Ok(config)
    }

    /// Check that every parameter is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold_ratio.is_finite() || self.threshold_ratio < 2.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold_ratio must be at least 2.0, got {}",
                self.threshold_ratio
            )));
        }
        for (name, value) in [
            ("attack_ms", self.attack_ms),
            ("release_ms", self.release_ms),
            ("noise_adapt_ms", self.noise_adapt_ms),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !self.refractory_ms.is_finite() || self.refractory_ms < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "refractory_ms must be non-negative, got {}",
                self.refractory_ms
            )));
        }
        Ok(())
    }
}

/// One input/output pairing in the session file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPairing {
    /// Physical input channel index (0-based)
    pub input: usize,
    /// Physical output channel index (0-based)
    pub output: usize,
    /// Path to the detector definition; a pairing without one stays inert
    #[serde(default)]
    pub detector: Option<PathBuf>,
}

fn default_sample_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

/// On-disk description of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Input device name (None = default input device)
    #[serde(default)]
    pub input_device: Option<String>,
    /// Output device name (None = default output device)
    #[serde(default)]
    pub output_device: Option<String>,
    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Channel pairings
    #[serde(default)]
    pub channels: Vec<ChannelPairing>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            sample_rate: default_sample_rate(),
            channels: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Load a session file; a broken file is an error, not a silent default
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        tracing::info!(path = %path.display(), "Loaded session config");
        Ok(config)
    }

    /// Save to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Session config saved");
        Ok(())
    }

    /// Materialize channel entries, loading each referenced detector file
    ///
    /// Detector paths are resolved relative to `base` (normally the directory
    /// the session file was loaded from). Pairings without a detector come
    /// back unconfigured; the session start filters them out.
    pub fn resolve_entries(&self, base: &Path) -> Result<Vec<ChannelEntry>, ConfigError> {
        let mut entries = Vec::with_capacity(self.channels.len());
        for pairing in &self.channels {
            let mut entry = ChannelEntry::new(pairing.input, pairing.output);
            if let Some(ref detector_path) = pairing.detector {
                let full = if detector_path.is_absolute() {
                    detector_path.clone()
                } else {
                    base.join(detector_path)
                };
                entry.config = Some(DetectorConfig::from_file(&full)?);
                entry.label = full
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.threshold_ratio, 10.0);
        assert_eq!(config.attack_ms, 0.5);
        assert_eq!(config.release_ms, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_detector_missing_fields_use_defaults() {
        let json = r#"{"threshold_ratio": 5.0}"#;
        let config: DetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.threshold_ratio, 5.0);
        assert_eq!(config.release_ms, 10.0);
    }

    #[test]
    fn test_detector_rejects_low_ratio() {
        let config = DetectorConfig {
            threshold_ratio: 1.5,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_detector_rejects_nonpositive_times() {
        let config = DetectorConfig {
            attack_ms: 0.0,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            release_ms: -3.0,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.input_device, None);
        assert_eq!(config.sample_rate, crate::DEFAULT_SAMPLE_RATE);
        assert!(config.channels.is_empty());
    }

    #[test]
    fn test_session_round_trip() {
        let config = SessionConfig {
            input_device: Some("Mic Array".to_string()),
            output_device: Some("DAQ Out".to_string()),
            sample_rate: 48_000,
            channels: vec![ChannelPairing {
                input: 0,
                output: 1,
                detector: Some(PathBuf::from("det0.json")),
            }],
        };
        let json = serde_json::to_string(&config).unwrap();
        let loaded: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.input_device, Some("Mic Array".to_string()));
        assert_eq!(loaded.sample_rate, 48_000);
        assert_eq!(loaded.channels.len(), 1);
        assert_eq!(loaded.channels[0].output, 1);
    }
}
