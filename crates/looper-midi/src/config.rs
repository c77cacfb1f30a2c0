//! MIDI controller configuration
//!
//! Bindings map a controller note or CC to a global transport control or to
//! a channel. Stored as YAML next to the engine config:
//!
//! ```yaml
//! input_port: "Launchpad"
//! output_port: "Launchpad"
//! global:
//!   start_stop: { type: Note, channel: 0, note: 91 }
//!   volume_out: { type: ControlChange, channel: 0, cc: 7 }
//! channels:
//!   - channel: 4
//!     press: { type: Note, channel: 0, note: 36 }
//! ```

use looper_core::engine::{LightBindings, MidiEvent, CONTROL_CHANGE, NOTE_OFF, NOTE_ON};
use looper_core::ChannelId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single controller input a binding listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MidiControlConfig {
    /// Note on/off on a given MIDI channel
    Note { channel: u8, note: u8 },
    /// Control change on a given MIDI channel
    ControlChange { channel: u8, cc: u8 },
}

impl MidiControlConfig {
    pub fn note(channel: u8, note: u8) -> Self {
        Self::Note { channel, note }
    }

    pub fn cc(channel: u8, cc: u8) -> Self {
        Self::ControlChange { channel, cc }
    }

    /// Whether an incoming event comes from this control
    pub fn matches(&self, event: &MidiEvent) -> bool {
        match *self {
            Self::Note { channel, note } => {
                (event.kind() == NOTE_ON || event.kind() == NOTE_OFF)
                    && event.channel() == channel
                    && event.data1 == note
            }
            Self::ControlChange { channel, cc } => {
                event.kind() == CONTROL_CHANGE && event.channel() == channel && event.data1 == cc
            }
        }
    }
}

/// Transport and recorder controls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalBindings {
    pub start_stop: Option<MidiControlConfig>,
    pub rewind: Option<MidiControlConfig>,
    pub action_rec: Option<MidiControlConfig>,
    pub input_rec: Option<MidiControlConfig>,
    pub metronome: Option<MidiControlConfig>,
    pub volume_in: Option<MidiControlConfig>,
    pub volume_out: Option<MidiControlConfig>,
    pub beat_double: Option<MidiControlConfig>,
    pub beat_half: Option<MidiControlConfig>,
}

/// Controls for one channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelBinding {
    /// Engine channel id
    pub channel: u32,
    pub press: Option<MidiControlConfig>,
    pub kill: Option<MidiControlConfig>,
    pub mute: Option<MidiControlConfig>,
    pub solo: Option<MidiControlConfig>,
    pub volume: Option<MidiControlConfig>,
    /// Controller lights mirroring the channel's state
    pub lights: Option<LightBindings>,
}

impl ChannelBinding {
    pub fn id(&self) -> ChannelId {
        ChannelId(self.channel)
    }
}

/// Complete MIDI setup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Substring of the controller input port name
    pub input_port: Option<String>,
    /// Substring of the output port for sync, relays and lights
    pub output_port: Option<String>,
    pub global: GlobalBindings,
    pub channels: Vec<ChannelBinding>,
}

impl MidiConfig {
    /// Load from a YAML file; missing or invalid files yield the default
    pub fn load(path: &Path) -> Self {
        looper_core::config::load_config(path)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        looper_core::config::save_config(self, path)
    }

    pub fn binding_for(&self, channel: ChannelId) -> Option<&ChannelBinding> {
        self.channels.iter().find(|b| b.id() == channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
input_port: "Launchpad"
global:
  start_stop: { type: Note, channel: 0, note: 91 }
  volume_out: { type: ControlChange, channel: 0, cc: 7 }
channels:
  - channel: 4
    press: { type: Note, channel: 0, note: 36 }
    volume: { type: ControlChange, channel: 1, cc: 10 }
"#;

    #[test]
    fn test_parse_yaml() {
        let config: MidiConfig = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        assert_eq!(config.input_port.as_deref(), Some("Launchpad"));
        assert_eq!(config.output_port, None);
        assert_eq!(config.global.start_stop, Some(MidiControlConfig::note(0, 91)));
        assert_eq!(config.global.volume_out, Some(MidiControlConfig::cc(0, 7)));
        assert_eq!(config.global.rewind, None);

        let binding = config.binding_for(ChannelId(4)).unwrap();
        assert_eq!(binding.press, Some(MidiControlConfig::note(0, 36)));
        assert_eq!(binding.volume, Some(MidiControlConfig::cc(1, 10)));
        assert!(config.binding_for(ChannelId(5)).is_none());
    }

    #[test]
    fn test_control_matching() {
        let note = MidiControlConfig::note(2, 60);
        assert!(note.matches(&MidiEvent::note_on(2, 60, 100)));
        assert!(note.matches(&MidiEvent::note_off(2, 60, 0)));
        assert!(!note.matches(&MidiEvent::note_on(3, 60, 100)));
        assert!(!note.matches(&MidiEvent::new(CONTROL_CHANGE | 2, 60, 100)));

        let cc = MidiControlConfig::cc(0, 7);
        assert!(cc.matches(&MidiEvent::new(CONTROL_CHANGE, 7, 64)));
        assert!(!cc.matches(&MidiEvent::new(CONTROL_CHANGE, 8, 64)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midi.yaml");
        let config: MidiConfig = serde_yaml::from_str(SAMPLE_YAML).unwrap();

        config.save(&path).unwrap();
        assert_eq!(MidiConfig::load(&path), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = MidiConfig::load(Path::new("/nonexistent/midi.yaml"));
        assert_eq!(config, MidiConfig::default());
    }
}
