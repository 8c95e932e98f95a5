//! Bounded-duration output pulses
//!
//! The detection side fires-and-forgets: [`PulseScheduler::trigger`] stores a
//! per-channel deadline (in output frames) and returns. The output stream
//! callback calls [`PulseScheduler::render`], which writes full-scale while a
//! channel's deadline is ahead of the frame counter and silence otherwise.
//! Both sides are plain atomic loads and stores, safe to call from either
//! real-time callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::PULSE_AMPLITUDE;

/// Fire-and-forget pulse trigger
///
/// The caller does not wait for the pulse to finish; timing the signal back
/// down to silence is the output side's job.
pub trait PulseOutput: Send {
    /// Schedule an active output on `channel` for `duration`
    fn trigger_pulse(&self, channel: usize, duration: Duration);
}

/// Per-channel pulse timing shared between the trigger and render sides
#[derive(Debug)]
pub struct PulseScheduler {
    /// Output frames rendered so far, advanced only by `render`
    frame_counter: AtomicU64,
    /// Per-channel frame index until which the output stays high
    deadlines: Vec<AtomicU64>,
    sample_rate: u32,
}

impl PulseScheduler {
    /// Create a scheduler for a device with `output_channels` channels
    pub fn new(output_channels: usize, sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            frame_counter: AtomicU64::new(0),
            deadlines: (0..output_channels).map(|_| AtomicU64::new(0)).collect(),
            sample_rate,
        })
    }

    /// Schedule a pulse on `channel` for `duration`
    ///
    /// A channel outside the device's range is a no-op; ranges were validated
    /// when the session was built, so nothing is re-checked per trigger.
    /// Overlapping triggers extend the pulse, never shorten it.
    pub fn trigger(&self, channel: usize, duration: Duration) {
        let Some(deadline) = self.deadlines.get(channel) else {
            return;
        };
        let samples = (duration.as_secs_f64() * self.sample_rate as f64).round() as u64;
        let now = self.frame_counter.load(Ordering::Acquire);
        deadline.fetch_max(now + samples.max(1), Ordering::AcqRel);
    }

    /// Fill an interleaved output buffer; the output callback body
    pub fn render(&self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let start = self.frame_counter.load(Ordering::Acquire);
        let mut frames = 0u64;

        for (i, frame) in data.chunks_mut(channels).enumerate() {
            let now = start + i as u64;
            for (ch, sample) in frame.iter_mut().enumerate() {
                let high = self
                    .deadlines
                    .get(ch)
                    .map(|d| now < d.load(Ordering::Relaxed))
                    .unwrap_or(false);
                *sample = if high { PULSE_AMPLITUDE } else { 0.0 };
            }
            frames += 1;
        }

        self.frame_counter.fetch_add(frames, Ordering::Release);
    }

    /// Output frames rendered so far
    pub fn frame_position(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }

    /// Number of output channels this scheduler serves
    pub fn channels(&self) -> usize {
        self.deadlines.len()
    }

    /// Get sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl PulseOutput for Arc<PulseScheduler> {
    fn trigger_pulse(&self, channel: usize, duration: Duration) {
        self.trigger(channel, duration);
    }
}
