//! Trigger history and per-channel counts
//!
//! Control-thread bookkeeping of the pulses a session has fired: totals per
//! input channel and a bounded recent-event history. Never touched from the
//! audio callback; events arrive through the session's detection channel.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};

use crate::audio::processor::DetectionEvent;

/// Maximum number of recent events to keep
const MAX_EVENT_HISTORY: usize = 1024;

/// One recorded trigger with its arrival time
#[derive(Debug, Clone)]
pub struct FiredEvent {
    /// When the control thread drained the event
    pub timestamp: DateTime<Utc>,
    /// Input channel the syllable arrived on
    pub input_channel: usize,
    /// Output channel the pulse went out on
    pub output_channel: usize,
}

/// Running totals and recent history for a session's triggers
#[derive(Debug)]
pub struct TriggerStats {
    started_at: DateTime<Utc>,
    total: u64,
    per_channel: BTreeMap<usize, u64>,
    recent: VecDeque<FiredEvent>,
}

impl TriggerStats {
    /// Create an empty store, stamped with the session start time
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total: 0,
            per_channel: BTreeMap::new(),
            recent: VecDeque::with_capacity(MAX_EVENT_HISTORY),
        }
    }

    /// Record one detection event
    pub fn record(&mut self, event: &DetectionEvent) {
        self.total += 1;
        *self.per_channel.entry(event.input_channel).or_insert(0) += 1;

        if self.recent.len() >= MAX_EVENT_HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(FiredEvent {
            timestamp: Utc::now(),
            input_channel: event.input_channel,
            output_channel: event.output_channel,
        });
    }

    /// Total triggers this session
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Triggers recorded for one input channel
    pub fn count_for(&self, input_channel: usize) -> u64 {
        self.per_channel.get(&input_channel).copied().unwrap_or(0)
    }

    /// Per-channel totals in channel order
    pub fn per_channel(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.per_channel.iter().map(|(&ch, &n)| (ch, n))
    }

    /// Recent events, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &FiredEvent> {
        self.recent.iter()
    }

    /// Time of the most recent trigger
    pub fn last_trigger(&self) -> Option<DateTime<Utc>> {
        self.recent.back().map(|e| e.timestamp)
    }

    /// Seconds since the store was created
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

impl Default for TriggerStats {
    fn default() -> Self {
        Self::new()
    }
}
