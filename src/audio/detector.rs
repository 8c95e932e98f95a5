//! Streaming syllable detection
//!
//! The processing core only depends on the [`Detector`] contract: append
//! samples, then poll whether the trained pattern was just recognized. The
//! poll is edge-triggered so a single recognition fires exactly one pulse no
//! matter how many buffers the syllable spans.
//!
//! [`EnvelopeDetector`] is the built-in adapter: an envelope follower with
//! fast attack and slow release over an adaptive noise floor. Heavier
//! classifiers (trained feature networks) plug in behind the same trait.

use crate::config::DetectorConfig;

/// Streaming per-channel classifier
///
/// Both calls run inside the real-time input callback and must be
/// bounded-time and non-blocking. An implementation that blocks breaks the
/// whole session's real-time guarantee.
pub trait Detector: Send {
    /// Append a buffer of incoming samples to the detector's stream
    fn feed(&mut self, samples: &[f32]);

    /// Poll whether the pattern was recognized since the last poll
    ///
    /// Edge-triggered: a recognition is reported once, then the latch clears.
    fn has_fired(&mut self) -> bool;
}

/// Envelope-threshold syllable detector
///
/// Tracks the signal envelope with a fast attack and slow release, and an
/// adaptive noise floor during quiet stretches. A rising edge above
/// `noise_floor * threshold_ratio` latches a recognition; a refractory gap
/// suppresses re-triggering on the tail of the same vocalization.
///
/// # Example
/// ```
/// use syllable_trigger::{Detector, DetectorConfig, EnvelopeDetector};
///
/// let mut detector = EnvelopeDetector::new(&DetectorConfig::default(), 44_100);
/// detector.feed(&[0.0; 256]);
/// assert!(!detector.has_fired());
///
/// detector.feed(&[0.5; 256]);
/// assert!(detector.has_fired());
/// ```
#[derive(Debug)]
pub struct EnvelopeDetector {
    sample_rate: u32,
    envelope: f32,
    noise_floor: f32,
    threshold_ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    noise_adapt_coeff: f32,
    refractory_samples: usize,
    samples_since_fire: usize,
    /// Envelope currently above threshold (syllable in progress)
    active: bool,
    /// Latched recognition, cleared by `has_fired`
    fired: bool,
}

impl EnvelopeDetector {
    /// Build a detector from a validated config at the session's sample rate
    pub fn new(config: &DetectorConfig, sample_rate: u32) -> Self {
        let refractory_samples =
            (sample_rate as f64 * config.refractory_ms as f64 / 1000.0) as usize;

        Self {
            sample_rate,
            envelope: 0.0,
            noise_floor: 0.001, // small initial value, avoids a zero threshold
            threshold_ratio: config.threshold_ratio,
            attack_coeff: Self::time_to_coeff(config.attack_ms, sample_rate),
            release_coeff: Self::time_to_coeff(config.release_ms, sample_rate),
            noise_adapt_coeff: Self::time_to_coeff(config.noise_adapt_ms, sample_rate),
            refractory_samples,
            samples_since_fire: refractory_samples, // allow immediate first fire
            active: false,
            fired: false,
        }
    }

    /// Convert time constant to exponential coefficient
    fn time_to_coeff(time_ms: f32, sample_rate: u32) -> f32 {
        let samples = time_ms * sample_rate as f32 / 1000.0;
        (-1.0 / samples).exp()
    }

    fn process(&mut self, sample: f32) {
        let abs = sample.abs();
        self.samples_since_fire = self.samples_since_fire.saturating_add(1);

        if abs > self.envelope {
            self.envelope = self.envelope * self.attack_coeff + abs * (1.0 - self.attack_coeff);
        } else {
            self.envelope = self.envelope * self.release_coeff + abs * (1.0 - self.release_coeff);
        }

        let threshold = self.threshold();

        if !self.active
            && self.envelope > threshold
            && self.samples_since_fire >= self.refractory_samples
        {
            self.active = true;
            self.fired = true;
            self.samples_since_fire = 0;
        }

        // Hysteresis on the falling edge
        if self.active && self.envelope < threshold * 0.5 {
            self.active = false;
        }

        // Adapt the noise floor only outside vocalizations
        if !self.active {
            self.noise_floor =
                self.noise_floor * self.noise_adapt_coeff + abs * (1.0 - self.noise_adapt_coeff);
        }
    }

    /// Current detection threshold
    pub fn threshold(&self) -> f32 {
        self.noise_floor.max(0.001) * self.threshold_ratio
    }

    /// Current envelope level
    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    /// Current noise floor estimate
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// Get sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Reset detector state
    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.noise_floor = 0.001;
        self.active = false;
        self.fired = false;
        self.samples_since_fire = self.refractory_samples;
    }
}

impl Detector for EnvelopeDetector {
    fn feed(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.process(sample);
        }
    }

    fn has_fired(&mut self) -> bool {
        let fired = self.fired;
        self.fired = false;
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector_at(rate: u32) -> EnvelopeDetector {
        EnvelopeDetector::new(&DetectorConfig::default(), rate)
    }

    #[test]
    fn test_silence_never_fires() {
        let mut detector = detector_at(48_000);
        for _ in 0..20 {
            detector.feed(&[0.0; 256]);
            assert!(!detector.has_fired(), "silence must not fire");
        }
    }

    #[test]
    fn test_onset_fires_once() {
        let mut detector = detector_at(48_000);
        detector.feed(&[0.0; 1024]);

        detector.feed(&[0.5; 64]);
        assert!(detector.has_fired(), "loud onset should fire");

        // Poll clears the latch
        assert!(!detector.has_fired());

        // Sustained sound does not re-fire
        detector.feed(&[0.5; 1024]);
        assert!(!detector.has_fired(), "sustained sound must not re-fire");
    }

    #[test]
    fn test_refires_after_silence() {
        let mut detector = detector_at(48_000);

        detector.feed(&[0.5; 256]);
        assert!(detector.has_fired());

        // One second of silence: envelope decays and the refractory gap passes
        detector.feed(&vec![0.0; 48_000]);
        assert!(!detector.has_fired());

        detector.feed(&[0.5; 256]);
        assert!(detector.has_fired(), "new syllable after silence should fire");
    }

    #[test]
    fn test_refractory_suppresses_quick_retrigger() {
        let mut detector = detector_at(48_000);

        detector.feed(&[0.5; 256]);
        assert!(detector.has_fired());

        // Dip long enough for the envelope to release (~62ms) but still
        // inside the 100ms refractory gap
        detector.feed(&[0.0; 3000]);
        detector.feed(&[0.5; 256]);
        assert!(
            !detector.has_fired(),
            "retrigger inside the refractory gap must be suppressed"
        );
    }

    #[test]
    fn test_noise_floor_adapts() {
        let mut detector = detector_at(48_000);
        let initial = detector.noise_floor();

        let noise: Vec<f32> = (0..48_000)
            .map(|i| (i as f32 * 0.1).sin() * 0.01)
            .collect();
        detector.feed(&noise);

        assert!(
            detector.noise_floor() > initial,
            "noise floor should rise with ambient noise"
        );
    }

    #[test]
    fn test_reset() {
        let mut detector = detector_at(48_000);
        detector.feed(&[0.5; 256]);
        detector.reset();
        assert!(!detector.has_fired());
        assert!(detector.envelope() < 0.01);
    }
}
