//! Channel routing table
//!
//! Maps a physical input channel index to the canonical index of its
//! entry/detector pair. Built once at session start, read-only afterwards;
//! lookup on the real-time path is a bounds check plus an array index.

use thiserror::Error;

use crate::audio::entry::ConfiguredEntry;

/// Errors raised while building the routing table
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("input channel {0} is assigned to more than one detector")]
    DuplicateInputChannel(usize),
}

/// Read-only lookup from input channel to detector index
///
/// Sized to `1 + max(input_channel, output_channel)` over the configured
/// entries (zero when none are configured), so every physically reachable
/// channel either resolves to exactly one detector or is explicitly absent.
///
/// # Example
/// ```
/// use syllable_trigger::{ChannelEntry, DetectorConfig, RoutingTable};
/// use syllable_trigger::audio::entry::configured_entries;
///
/// let mut a = ChannelEntry::new(0, 1);
/// a.config = Some(DetectorConfig::default());
/// let mut b = ChannelEntry::new(2, 3);
/// b.config = Some(DetectorConfig::default());
///
/// let entries = configured_entries(vec![a, b]);
/// let table = RoutingTable::build(&entries).unwrap();
/// assert_eq!(table.len(), 4);
/// assert_eq!(table.lookup(0), Some(0));
/// assert_eq!(table.lookup(1), None);
/// assert_eq!(table.lookup(2), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct RoutingTable {
    slots: Vec<Option<usize>>,
}

impl RoutingTable {
    /// Build the table from the configured entries
    ///
    /// O(n) in entry count, run entirely off the real-time path. Fails if two
    /// configured entries claim the same input channel.
    pub fn build(entries: &[ConfiguredEntry]) -> Result<Self, RoutingError> {
        let size = entries
            .iter()
            .map(|e| e.input_channel.max(e.output_channel) + 1)
            .max()
            .unwrap_or(0);

        let mut slots = vec![None; size];
        for (index, entry) in entries.iter().enumerate() {
            let slot = &mut slots[entry.input_channel];
            if slot.is_some() {
                return Err(RoutingError::DuplicateInputChannel(entry.input_channel));
            }
            *slot = Some(index);
        }

        Ok(Self { slots })
    }

    /// Resolve an input channel to its detector index
    ///
    /// Out-of-range and unmapped channels both come back `None`; the hardware
    /// may legitimately expose more channels than are configured.
    #[inline]
    pub fn lookup(&self, channel: usize) -> Option<usize> {
        self.slots.get(channel).copied().flatten()
    }

    /// Number of channel slots in the table
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no entry is configured (the session is legal but inert)
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
