//! Per-buffer dispatch
//!
//! [`SessionProcessor`] is the real-time half of a session: it owns the
//! routing table and the index-aligned detector array, and runs once per
//! input channel per hardware buffer. Everything here is bounds-checked
//! array access plus the detector's own processing; there is no locking, no
//! allocation, and no failure path.

use std::time::Duration;

use crossbeam_channel::Sender;

use crate::audio::detector::Detector;
use crate::audio::entry::ConfiguredEntry;
use crate::audio::pulse::PulseOutput;
use crate::audio::routing::RoutingTable;
use crate::PULSE_DURATION;

/// Receives one channel's samples from each arriving hardware buffer
///
/// The input boundary holds exactly one handler for its active lifetime and
/// calls it from the real-time thread; implementations must not block.
pub trait BufferHandler: Send {
    fn handle_buffer(&mut self, channel: usize, samples: &[f32]);
}

/// A recognition that fired a pulse, reported to the control thread
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    /// Input channel the syllable arrived on
    pub input_channel: usize,
    /// Output channel the pulse went out on
    pub output_channel: usize,
    /// Canonical detector index
    pub detector: usize,
    /// Pulse duration that was requested
    pub pulse: Duration,
}

/// Routes buffers to detectors and converts recognitions into pulses
///
/// Owns the routing table and detectors for one session. Detection events go
/// out through a bounded channel with `try_send` so a slow control thread
/// can never stall the audio callback; dropped events only affect the status
/// display, never the pulse itself.
pub struct SessionProcessor<O: PulseOutput> {
    table: RoutingTable,
    detectors: Vec<Box<dyn Detector>>,
    entries: Vec<ConfiguredEntry>,
    output: O,
    events: Sender<DetectionEvent>,
}

impl<O: PulseOutput> SessionProcessor<O> {
    /// Assemble the dispatch core from its parts
    ///
    /// `detectors` must be index-aligned with `entries` (both in the filtered
    /// order the routing table was built from).
    pub fn new(
        table: RoutingTable,
        entries: Vec<ConfiguredEntry>,
        detectors: Vec<Box<dyn Detector>>,
        output: O,
        events: Sender<DetectionEvent>,
    ) -> Self {
        debug_assert_eq!(entries.len(), detectors.len());
        Self {
            table,
            detectors,
            entries,
            output,
            events,
        }
    }

    /// Number of active detectors
    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Channel slots covered by the routing table
    pub fn table_len(&self) -> usize {
        self.table.len()
    }
}

impl<O: PulseOutput> BufferHandler for SessionProcessor<O> {
    fn handle_buffer(&mut self, channel: usize, samples: &[f32]) {
        // Out-of-range and unmapped channels are expected, not errors: the
        // hardware may expose more channels than are configured.
        let Some(index) = self.table.lookup(channel) else {
            return;
        };

        self.detectors[index].feed(samples);

        // Poll through the same resolved index the samples went to, so a
        // non-contiguous channel layout cannot misroute the query.
        if self.detectors[index].has_fired() {
            let output_channel = self.entries[index].output_channel;
            self.output.trigger_pulse(output_channel, PULSE_DURATION);

            let _ = self.events.try_send(DetectionEvent {
                input_channel: channel,
                output_channel,
                detector: index,
                pulse: PULSE_DURATION,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::entry::{configured_entries, ChannelEntry};
    use crate::audio::routing::RoutingTable;
    use crate::config::DetectorConfig;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted detector: records feeds, fires per a fixed poll schedule
    struct ScriptedDetector {
        feeds: Arc<Mutex<Vec<usize>>>,
        fire_on_poll: VecDeque<bool>,
    }

    impl ScriptedDetector {
        fn new(fire_on_poll: &[bool]) -> (Self, Arc<Mutex<Vec<usize>>>) {
            let feeds = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    feeds: Arc::clone(&feeds),
                    fire_on_poll: fire_on_poll.iter().copied().collect(),
                },
                feeds,
            )
        }
    }

    impl Detector for ScriptedDetector {
        fn feed(&mut self, samples: &[f32]) {
            self.feeds.lock().unwrap().push(samples.len());
        }

        fn has_fired(&mut self) -> bool {
            self.fire_on_poll.pop_front().unwrap_or(false)
        }
    }

    /// Pulse sink that records every trigger
    #[derive(Clone)]
    struct RecordingPulse {
        triggers: Arc<Mutex<Vec<(usize, Duration)>>>,
    }

    impl RecordingPulse {
        fn new() -> Self {
            Self {
                triggers: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn recorded(&self) -> Vec<(usize, Duration)> {
            self.triggers.lock().unwrap().clone()
        }
    }

    impl PulseOutput for RecordingPulse {
        fn trigger_pulse(&self, channel: usize, duration: Duration) {
            self.triggers.lock().unwrap().push((channel, duration));
        }
    }

    fn configured(input: usize, output: usize) -> ChannelEntry {
        let mut entry = ChannelEntry::new(input, output);
        entry.config = Some(DetectorConfig::default());
        entry
    }

    fn build_processor(
        pairs: &[(usize, usize)],
        scripts: Vec<ScriptedDetector>,
        pulse: RecordingPulse,
    ) -> (
        SessionProcessor<RecordingPulse>,
        crossbeam_channel::Receiver<DetectionEvent>,
    ) {
        let entries = configured_entries(
            pairs
                .iter()
                .map(|&(input, output)| configured(input, output))
                .collect(),
        );
        let table = RoutingTable::build(&entries).unwrap();
        let detectors = scripts
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn Detector>)
            .collect();
        let (tx, rx) = crossbeam_channel::bounded(16);
        (
            SessionProcessor::new(table, entries, detectors, pulse, tx),
            rx,
        )
    }

    #[test]
    fn test_feeds_arrive_in_order() {
        let (det, feeds) = ScriptedDetector::new(&[]);
        let pulse = RecordingPulse::new();
        let (mut processor, _rx) = build_processor(&[(0, 1)], vec![det], pulse.clone());

        processor.handle_buffer(0, &[0.0; 64]);
        processor.handle_buffer(0, &[0.0; 128]);
        processor.handle_buffer(0, &[0.0; 32]);

        assert_eq!(*feeds.lock().unwrap(), vec![64, 128, 32]);
        assert!(pulse.recorded().is_empty());
    }

    #[test]
    fn test_unmapped_channel_is_noop() {
        let (det, feeds) = ScriptedDetector::new(&[true]);
        let pulse = RecordingPulse::new();
        let (mut processor, _rx) = build_processor(&[(0, 1)], vec![det], pulse.clone());

        processor.handle_buffer(1, &[0.5; 64]); // in table, unmapped
        processor.handle_buffer(64, &[0.5; 64]); // past the table entirely

        assert!(feeds.lock().unwrap().is_empty());
        assert!(pulse.recorded().is_empty());
    }

    #[test]
    fn test_fire_triggers_paired_output_once() {
        let (det_a, _) = ScriptedDetector::new(&[false, true, false]);
        let (det_b, feeds_b) = ScriptedDetector::new(&[]);
        let pulse = RecordingPulse::new();
        let (mut processor, rx) =
            build_processor(&[(0, 1), (2, 3)], vec![det_a, det_b], pulse.clone());

        processor.handle_buffer(0, &[0.1; 64]); // poll 1: no fire
        processor.handle_buffer(0, &[0.9; 64]); // poll 2: fire
        processor.handle_buffer(0, &[0.9; 64]); // poll 3: latched off again

        assert_eq!(pulse.recorded(), vec![(1, PULSE_DURATION)]);
        assert!(feeds_b.lock().unwrap().is_empty());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.input_channel, 0);
        assert_eq!(event.output_channel, 1);
        assert_eq!(event.detector, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_noncontiguous_channel_polls_resolved_index() {
        // Single detector mapped to input channel 3; with positional
        // indexing the post-feed poll would reach past the detector array.
        let (det, feeds) = ScriptedDetector::new(&[true]);
        let pulse = RecordingPulse::new();
        let (mut processor, rx) = build_processor(&[(3, 0)], vec![det], pulse.clone());

        processor.handle_buffer(3, &[0.9; 64]);

        assert_eq!(*feeds.lock().unwrap(), vec![64]);
        assert_eq!(pulse.recorded(), vec![(0, PULSE_DURATION)]);
        assert_eq!(rx.try_recv().unwrap().detector, 0);
    }

    #[test]
    fn test_event_overflow_never_blocks_or_drops_pulses() {
        let fire_always = vec![true; 64];
        let (det, _) = ScriptedDetector::new(&fire_always);
        let pulse = RecordingPulse::new();

        let entries = configured_entries(vec![configured(0, 0)]);
        let table = RoutingTable::build(&entries).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut processor = SessionProcessor::new(
            table,
            entries,
            vec![Box::new(det) as Box<dyn Detector>],
            pulse.clone(),
            tx,
        );

        for _ in 0..64 {
            processor.handle_buffer(0, &[0.9; 16]);
        }

        // Every fire pulsed, even though the event channel overflowed
        assert_eq!(pulse.recorded().len(), 64);
        assert_eq!(rx.len(), 4);
    }
}
