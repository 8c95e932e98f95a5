//! Channel entry model
//!
//! `ChannelEntry` is the broad, editable shape a front end owns: one row per
//! hardware channel pair, detector assignment optional. `ConfiguredEntry` is
//! the immutable variant the session actually runs on, produced once by
//! filtering out the unassigned rows.

use crate::config::DetectorConfig;

/// One input/output channel pairing, detector assignment optional
///
/// An entry with no config is inert: it never contributes a detector and is
/// dropped from the active session without comment.
#[derive(Debug, Clone)]
pub struct ChannelEntry {
    /// Physical input channel index (0-based, device-relative)
    pub input_channel: usize,
    /// Physical output channel index (0-based, device-relative)
    pub output_channel: usize,
    /// Display name of the loaded detector definition
    pub label: String,
    /// Detector definition, if one has been assigned
    pub config: Option<DetectorConfig>,
}

impl ChannelEntry {
    /// Create an unassigned pairing
    pub fn new(input_channel: usize, output_channel: usize) -> Self {
        Self {
            input_channel,
            output_channel,
            label: String::new(),
            config: None,
        }
    }

    /// Seed one straight-through pairing per shared channel
    ///
    /// Pairs channel i to channel i for every channel both devices expose,
    /// the natural starting table for a new run.
    pub fn seed_pairs(input_channels: usize, output_channels: usize) -> Vec<ChannelEntry> {
        (0..input_channels.min(output_channels))
            .map(|i| ChannelEntry::new(i, i))
            .collect()
    }

    /// Convert into the immutable configured variant, if a config is assigned
    pub fn into_configured(self) -> Option<ConfiguredEntry> {
        let config = self.config?;
        Some(ConfiguredEntry {
            input_channel: self.input_channel,
            output_channel: self.output_channel,
            label: self.label,
            config,
        })
    }
}

/// An entry whose detector assignment is locked in
///
/// Immutable for the life of a session. The ordered list of these is the
/// canonical index space for the session's detectors.
#[derive(Debug, Clone)]
pub struct ConfiguredEntry {
    pub input_channel: usize,
    pub output_channel: usize,
    pub label: String,
    pub config: DetectorConfig,
}

/// Filter to the configured subset, preserving order
pub fn configured_entries(entries: Vec<ChannelEntry>) -> Vec<ConfiguredEntry> {
    entries
        .into_iter()
        .filter_map(ChannelEntry::into_configured)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_pairs_uses_shared_channel_count() {
        let entries = ChannelEntry::seed_pairs(4, 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].input_channel, 1);
        assert_eq!(entries[1].output_channel, 1);

        assert!(ChannelEntry::seed_pairs(0, 8).is_empty());
    }

    #[test]
    fn test_unassigned_entries_are_dropped() {
        let mut assigned = ChannelEntry::new(5, 0);
        assigned.config = Some(DetectorConfig::default());
        assigned.label = "det5.json".to_string();

        let entries = vec![ChannelEntry::new(0, 1), assigned, ChannelEntry::new(2, 3)];
        let configured = configured_entries(entries);

        assert_eq!(configured.len(), 1);
        assert_eq!(configured[0].input_channel, 5);
        assert_eq!(configured[0].label, "det5.json");
    }

    #[test]
    fn test_filter_preserves_order() {
        let entries = (0..4)
            .map(|i| {
                let mut entry = ChannelEntry::new(i, i);
                if i % 2 == 0 {
                    entry.config = Some(DetectorConfig::default());
                }
                entry
            })
            .collect();

        let configured = configured_entries(entries);
        assert_eq!(configured.len(), 2);
        assert_eq!(configured[0].input_channel, 0);
        assert_eq!(configured[1].input_channel, 2);
    }
}
