//! Session lifecycle
//!
//! A [`Session`] is one live run: routing table, detectors, and the two cpal
//! streams. Construction brings the output side up before the input side so
//! a detection can never race an unready trigger; teardown reverses that
//! order after flipping the running gate, so no dispatch overlaps resource
//! release. Sessions are never reset: stopping one and starting again always
//! builds a fresh Session.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig};
use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::audio::detector::{Detector, EnvelopeDetector};
use crate::audio::entry::{configured_entries, ChannelEntry};
use crate::audio::processor::{BufferHandler, DetectionEvent, SessionProcessor};
use crate::audio::pulse::PulseScheduler;
use crate::audio::routing::{RoutingError, RoutingTable};
use crate::config::ConfigError;

/// Frames of deinterleave scratch reserved up front; a hardware buffer
/// larger than this would grow the scratch once, then never again.
const SCRATCH_FRAMES: usize = 16_384;

/// Capacity of the detection event channel to the control thread
const EVENT_QUEUE_SIZE: usize = 256;

/// Errors that can occur while constructing a session
///
/// All of these fire synchronously, before the session becomes active; a
/// partially built stream is dropped before the error propagates.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("input channel {channel} exceeds device input channels ({available})")]
    InputChannelOutOfRange { channel: usize, available: usize },

    #[error("output channel {channel} exceeds device output channels ({available})")]
    OutputChannelOutOfRange { channel: usize, available: usize },

    #[error("failed to query device config: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to open stream: {0}")]
    StreamBuild(#[from] cpal::BuildStreamError),

    #[error("failed to start stream: {0}")]
    StreamPlay(#[from] cpal::PlayStreamError),
}

/// Per-channel input peak levels, written by the callback, read by the
/// control thread for the status display
#[derive(Debug)]
pub struct LevelMeter {
    peaks: Vec<AtomicU32>,
}

impl LevelMeter {
    fn new(channels: usize) -> Arc<Self> {
        Arc::new(Self {
            peaks: (0..channels).map(|_| AtomicU32::new(0)).collect(),
        })
    }

    /// Fold a buffer's peak into the channel's meter
    ///
    /// Non-negative f32 bit patterns order like the floats themselves, so
    /// `fetch_max` on the bits is the whole story.
    pub fn update(&self, channel: usize, samples: &[f32]) {
        let Some(slot) = self.peaks.get(channel) else {
            return;
        };
        let mut peak = 0.0f32;
        for &sample in samples {
            peak = peak.max(sample.abs());
        }
        slot.fetch_max(peak.to_bits(), Ordering::Relaxed);
    }

    /// Read and reset a channel's peak
    pub fn take(&self, channel: usize) -> f32 {
        self.peaks
            .get(channel)
            .map(|slot| f32::from_bits(slot.swap(0, Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Number of metered channels
    pub fn channels(&self) -> usize {
        self.peaks.len()
    }
}

/// One live processing run
///
/// Owns its streams, detectors, and routing table; borrows the devices only
/// during construction (the caller keeps them alive). Dropping the session
/// tears it down.
pub struct Session {
    input_stream: Option<Stream>,
    output_stream: Option<Stream>,
    running: Arc<AtomicBool>,
    pulses: Arc<PulseScheduler>,
    events: Receiver<DetectionEvent>,
    levels: Arc<LevelMeter>,
    sample_rate: u32,
    detector_count: usize,
}

impl Session {
    /// Build and start a session
    ///
    /// Entries without a detector assignment are silently dropped; an empty
    /// configured set is legal and yields an inert session that processes
    /// audio but never triggers. Everything that can fail does so here,
    /// before the session is considered active.
    pub fn start(
        input_device: &Device,
        output_device: &Device,
        entries: Vec<ChannelEntry>,
        sample_rate: u32,
    ) -> Result<Session, SessionError> {
        let configured = configured_entries(entries);
        for entry in &configured {
            entry.config.validate()?;
        }

        let table = RoutingTable::build(&configured)?;

        let input_channels = input_device.default_input_config()?.channels() as usize;
        let output_default = output_device.default_output_config()?;
        let output_channels = output_default.channels() as usize;

        for entry in &configured {
            if entry.input_channel >= input_channels {
                return Err(SessionError::InputChannelOutOfRange {
                    channel: entry.input_channel,
                    available: input_channels,
                });
            }
            if entry.output_channel >= output_channels {
                return Err(SessionError::OutputChannelOutOfRange {
                    channel: entry.output_channel,
                    available: output_channels,
                });
            }
        }

        let effective_rate = negotiate_sample_rate(
            output_device,
            output_channels as u16,
            sample_rate,
            output_default.sample_rate().0,
        );

        let detectors: Vec<Box<dyn Detector>> = configured
            .iter()
            .map(|entry| {
                Box::new(EnvelopeDetector::new(&entry.config, effective_rate)) as Box<dyn Detector>
            })
            .collect();

        let pulses = PulseScheduler::new(output_channels, effective_rate);
        let (event_tx, event_rx) = crossbeam_channel::bounded(EVENT_QUEUE_SIZE);
        let detector_count = detectors.len();
        let processor = SessionProcessor::new(
            table,
            configured,
            detectors,
            Arc::clone(&pulses),
            event_tx,
        );

        let running = Arc::new(AtomicBool::new(true));
        let levels = LevelMeter::new(input_channels);

        // Output side first: it must be ready before input can trigger it
        let output_config = StreamConfig {
            channels: output_channels as u16,
            sample_rate: SampleRate(effective_rate),
            buffer_size: BufferSize::Default,
        };
        let output_stream = open_output_stream(
            output_device,
            &output_config,
            Arc::clone(&pulses),
            Arc::clone(&running),
        )?;
        output_stream.play()?;

        let input_config = StreamConfig {
            channels: input_channels as u16,
            sample_rate: SampleRate(effective_rate),
            buffer_size: BufferSize::Default,
        };
        let input_stream = open_input_stream(
            input_device,
            &input_config,
            processor,
            Arc::clone(&running),
            Arc::clone(&levels),
        )?;
        input_stream.play()?;

        tracing::info!(
            input = %input_device.name().unwrap_or_else(|_| "unknown".into()),
            output = %output_device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate = effective_rate,
            detectors = detector_count,
            "Session started"
        );

        Ok(Session {
            input_stream: Some(input_stream),
            output_stream: Some(output_stream),
            running,
            pulses,
            events: event_rx,
            levels,
            sample_rate: effective_rate,
            detector_count,
        })
    }

    /// Stop processing and release both streams
    ///
    /// The running gate flips first so no dispatch runs once teardown has
    /// begun; then the input stream goes away, then the output stream.
    /// Idempotent: a second call is a no-op.
    pub fn stop(&mut self) {
        if self.input_stream.is_none() && self.output_stream.is_none() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);
        self.input_stream = None;
        self.output_stream = None;
        tracing::info!("Session stopped");
    }

    /// True while both streams are held
    pub fn is_active(&self) -> bool {
        self.input_stream.is_some()
    }

    /// Detection events fired since last drained
    pub fn events(&self) -> &Receiver<DetectionEvent> {
        &self.events
    }

    /// Read and reset the peak input level on a channel
    pub fn input_peak(&self, channel: usize) -> f32 {
        self.levels.take(channel)
    }

    /// Number of input channels the device exposes
    pub fn input_channels(&self) -> usize {
        self.levels.channels()
    }

    /// Effective sample rate the session is running at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of active detectors
    pub fn detector_count(&self) -> usize {
        self.detector_count
    }

    /// Output frames rendered so far
    pub fn output_frames(&self) -> u64 {
        self.pulses.frame_position()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Probe which sample rate the output device accepts
///
/// Tries the requested rate first, then the device default; the probe stream
/// is dropped immediately. If neither probes clean, the requested rate is
/// kept and the real stream build reports the error properly.
fn negotiate_sample_rate(
    device: &Device,
    channels: u16,
    requested: u32,
    device_default: u32,
) -> u32 {
    let rates = if requested != device_default {
        vec![requested, device_default]
    } else {
        vec![requested]
    };

    for &rate in &rates {
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(rate),
            buffer_size: BufferSize::Default,
        };
        match device.build_output_stream(
            &config,
            |_: &mut [f32], _: &cpal::OutputCallbackInfo| {},
            |_| {},
            None,
        ) {
            Ok(_probe) => {
                if rate != requested {
                    tracing::warn!(
                        "Requested rate {} Hz failed, using device default {} Hz",
                        requested,
                        rate
                    );
                }
                return rate;
            }
            Err(e) => {
                tracing::warn!("Sample rate {} Hz failed: {}", rate, e);
            }
        }
    }

    requested
}

fn open_output_stream(
    device: &Device,
    config: &StreamConfig,
    pulses: Arc<PulseScheduler>,
    running: Arc<AtomicBool>,
) -> Result<Stream, SessionError> {
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if running.load(Ordering::Relaxed) {
                pulses.render(data, channels);
            } else {
                data.fill(0.0);
            }
        },
        move |err| {
            tracing::error!("Output stream error: {}", err);
        },
        None,
    )?;
    Ok(stream)
}

/// Register `handler` as the input boundary's callback target
///
/// The callback deinterleaves each hardware buffer into a reused scratch
/// buffer and hands the handler one channel at a time, in channel order.
fn open_input_stream<H: BufferHandler + 'static>(
    device: &Device,
    config: &StreamConfig,
    mut handler: H,
    running: Arc<AtomicBool>,
    levels: Arc<LevelMeter>,
) -> Result<Stream, SessionError> {
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::with_capacity(SCRATCH_FRAMES);

    let stream = device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if !running.load(Ordering::Relaxed) || channels == 0 {
                return;
            }
            for channel in 0..channels {
                scratch.clear();
                scratch.extend(data.iter().skip(channel).step_by(channels));
                levels.update(channel, &scratch);
                handler.handle_buffer(channel, &scratch);
            }
        },
        move |err| {
            tracing::error!("Input stream error: {}", err);
        },
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_meter_tracks_peak() {
        let levels = LevelMeter::new(2);
        levels.update(0, &[0.1, -0.6, 0.3]);
        levels.update(0, &[0.2]);

        assert!((levels.take(0) - 0.6).abs() < 1e-6);
        // Taking resets
        assert_eq!(levels.take(0), 0.0);
        assert_eq!(levels.take(1), 0.0);
    }

    #[test]
    fn test_level_meter_ignores_out_of_range() {
        let levels = LevelMeter::new(1);
        levels.update(5, &[0.9]);
        assert_eq!(levels.take(5), 0.0);
        assert_eq!(levels.channels(), 1);
    }
}
