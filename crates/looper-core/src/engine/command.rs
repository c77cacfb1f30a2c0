//! Lock-free command queue for real-time engine control
//!
//! Control threads never touch channel play state directly. Fast intents
//! (key presses, transport, channel MIDI) are pushed onto an rtrb ring and
//! the audio thread drains it at the start of every block, in arrival order.
//! Structural changes (channels, waves, tempo) go through the model store
//! instead.
//!
//! ```ignore
//! // Control thread
//! tx.push(EngineCommand::KeyPress { channel: ChannelId(4), velocity: 127 });
//!
//! // Audio thread, once per block
//! while let Ok(command) = rx.pop() { /* apply */ }
//! ```

use basedrop::Owned;

use super::midi::MidiEvent;
use super::sync::TransportState;
use crate::types::{ChannelId, StereoBuffer};

/// Commands sent from control threads to the audio thread
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────
    KeyPress { channel: ChannelId, velocity: u8 },
    KeyRelease { channel: ChannelId },
    KeyKill { channel: ChannelId },
    /// Start or stop replaying a channel's recorded actions
    ToggleReadActions { channel: ChannelId },
    /// Stop replaying recorded actions at once
    KillReadActions { channel: ChannelId },
    /// Live MIDI for a MIDI channel (plugins, action recording)
    ChannelMidi { channel: ChannelId, event: MidiEvent },

    // ─────────────────────────────────────────────────────────────
    // Sequencer
    // ─────────────────────────────────────────────────────────────
    SequencerStart,
    SequencerStop,
    /// Rewind now, or on the next quantizer step when quantizing
    SequencerRewind,
    /// Rewind and count in one loop before running
    SequencerPreroll,
    SetMetronome(bool),
    /// Follow an external transport master
    ExternalTransport(TransportState),

    // ─────────────────────────────────────────────────────────────
    // Recorder
    // ─────────────────────────────────────────────────────────────
    /// Install a record buffer allocated by the control thread
    ///
    /// Writing starts at frame 0 when `from_start` is set, otherwise at the
    /// current loop frame.
    StartInputRec {
        buffer: Owned<StereoBuffer>,
        from_start: bool,
    },
    /// Hand the record buffer back as `InputRecorded` feedback
    StopInputRec,
    /// Report the next line-in peak above the trigger level
    ArmSignalTrigger,
    DisarmSignalTrigger,

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────
    /// Drop pending quantized actions, clicks and any record buffer
    Reset,
}

impl EngineCommand {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::KeyPress { .. } => "key press",
            EngineCommand::KeyRelease { .. } => "key release",
            EngineCommand::KeyKill { .. } => "key kill",
            EngineCommand::ToggleReadActions { .. } => "toggle read actions",
            EngineCommand::KillReadActions { .. } => "kill read actions",
            EngineCommand::ChannelMidi { .. } => "channel midi",
            EngineCommand::SequencerStart => "sequencer start",
            EngineCommand::SequencerStop => "sequencer stop",
            EngineCommand::SequencerRewind => "sequencer rewind",
            EngineCommand::SequencerPreroll => "sequencer preroll",
            EngineCommand::SetMetronome(_) => "metronome",
            EngineCommand::ExternalTransport(_) => "external transport",
            EngineCommand::StartInputRec { .. } => "start input rec",
            EngineCommand::StopInputRec => "stop input rec",
            EngineCommand::ArmSignalTrigger => "arm signal trigger",
            EngineCommand::DisarmSignalTrigger => "disarm signal trigger",
            EngineCommand::Reset => "reset",
        }
    }
}

/// Capacity of the command queue
///
/// A MIDI controller sweep or a bulk of key presses can burst a few hundred
/// commands between two blocks.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Create a new command channel (producer/consumer pair)
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
