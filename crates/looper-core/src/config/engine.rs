//! Engine behaviour configuration
//!
//! Policies the channel state machine, recorder and synchronizer consult at
//! runtime. A copy lives in every published layout so the audio thread reads
//! it without locks.

use serde::{Deserialize, Serialize};

/// What starts an input recording when the sequencer is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecTriggerMode {
    /// Count in for one loop, then record from the loop point
    #[default]
    Normal,
    /// Wait for the input to cross the trigger level
    Signal,
}

/// How the length of an input recording is decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRecMode {
    /// Recordings are exactly one loop long, aligned to the timeline
    #[default]
    Rigid,
    /// Recording length sets the loop length (and the bpm)
    Free,
}

/// Outgoing MIDI sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiSyncMode {
    #[default]
    None,
    /// Send MIDI clock (24 ppqn) and transport messages
    ClockMaster,
    /// Send MIDI timecode quarter frames
    MtcMaster,
}

/// Engine behaviour settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard-clip the master output to [-1, 1]
    pub limit_output: bool,
    /// Kill playing loops (and channels reading actions) when the sequencer stops
    pub chans_stop_on_seq_halt: bool,
    /// Start/stop reading recorded actions on loop boundaries
    pub treat_recs_as_loops: bool,
    /// New sample channels monitor their input when armed
    pub input_monitor_default_on: bool,
    /// New sample channels refuse to record over an existing wave
    pub overdub_protection_default_on: bool,
    pub rec_trigger_mode: RecTriggerMode,
    /// Input level (dBFS) that starts a signal-triggered recording
    pub rec_trigger_level: f32,
    pub input_rec_mode: InputRecMode,
    pub midi_sync: MidiSyncMode,
    /// MIDI timecode frame rate
    pub midi_tc_fps: f32,
    /// Metronome enabled at startup
    pub metronome: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limit_output: true,
            chans_stop_on_seq_halt: false,
            treat_recs_as_loops: false,
            input_monitor_default_on: false,
            overdub_protection_default_on: false,
            rec_trigger_mode: RecTriggerMode::Normal,
            rec_trigger_level: -10.0,
            input_rec_mode: InputRecMode::Rigid,
            midi_sync: MidiSyncMode::None,
            midi_tc_fps: 25.0,
            metronome: false,
        }
    }
}

impl EngineConfig {
    pub fn with_limit_output(mut self, enabled: bool) -> Self {
        self.limit_output = enabled;
        self
    }

    pub fn with_chans_stop_on_seq_halt(mut self, enabled: bool) -> Self {
        self.chans_stop_on_seq_halt = enabled;
        self
    }

    pub fn with_treat_recs_as_loops(mut self, enabled: bool) -> Self {
        self.treat_recs_as_loops = enabled;
        self
    }

    pub fn with_rec_trigger_mode(mut self, mode: RecTriggerMode) -> Self {
        self.rec_trigger_mode = mode;
        self
    }

    pub fn with_rec_trigger_level(mut self, db: f32) -> Self {
        self.rec_trigger_level = db;
        self
    }

    pub fn with_input_rec_mode(mut self, mode: InputRecMode) -> Self {
        self.input_rec_mode = mode;
        self
    }

    pub fn with_midi_sync(mut self, mode: MidiSyncMode) -> Self {
        self.midi_sync = mode;
        self
    }

    pub fn with_metronome(mut self, enabled: bool) -> Self {
        self.metronome = enabled;
        self
    }
}
