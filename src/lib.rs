//! syllable-trigger - Real-time syllable-triggered hardware pulses
//!
//! Routes live multichannel audio into per-channel syllable detectors and
//! fires a short digital pulse on a paired output channel whenever a detector
//! recognizes its trained pattern. Built for closed-loop bioacoustic
//! experiments where detection latency is bounded by the audio buffer size.
//!
//! The dispatch path runs entirely inside the input stream callback: channel
//! lookup is an array index, detector feed/poll is bounded-time, and the
//! output trigger is a pair of atomic stores. Nothing on that path blocks,
//! allocates, or touches a lock.

pub mod audio;
pub mod config;
pub mod stats;

pub use audio::detector::{Detector, EnvelopeDetector};
pub use audio::device::{list_devices, DeviceInfo};
pub use audio::entry::{ChannelEntry, ConfiguredEntry};
pub use audio::processor::{BufferHandler, DetectionEvent, SessionProcessor};
pub use audio::pulse::{PulseOutput, PulseScheduler};
pub use audio::routing::RoutingTable;
pub use audio::session::{Session, SessionError};
pub use config::{DetectorConfig, SessionConfig};
pub use stats::store::TriggerStats;

use std::time::Duration;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate for audio processing
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Duration of the output pulse fired on each detection. Short enough to be
/// hardware-safe on a TTL line rather than a sustained tone.
pub const PULSE_DURATION: Duration = Duration::from_millis(1);

/// Amplitude of the output pulse (full scale)
pub const PULSE_AMPLITUDE: f32 = 1.0;
