//! MIDI channels: controller, sender and receiver
//!
//! A MIDI channel has no audio of its own. The controller runs the loop
//! play machine (start and stop on the loop point), the sender relays the
//! channel's recorded actions to a MIDI output while playing, and the
//! receiver collects events for the plugin host.

use super::{channel_actions, ChannelState};
use crate::engine::actions::ActionMap;
use crate::engine::event::Outbox;
use crate::engine::midi::{MidiEvent, MidiMessage, CONTROL_CHANGE};
use crate::engine::sequencer::{SequencerEvent, SequencerEventKind};
use crate::types::{ChannelId, PlayStatus};

/// All Notes Off controller number
const CC_ALL_NOTES_OFF: u8 = 0x7B;

/// Max MIDI events collected for plugins in one block
pub const MAX_MIDI_IN_EVENTS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiChannel {
    /// Output MIDI channel (0-15) for relayed actions
    pub out_channel: u8,
    pub out_enabled: bool,
    /// Input MIDI channel to listen on; `None` listens to all
    pub in_channel: Option<u8>,
}

impl Default for MidiChannel {
    fn default() -> Self {
        Self {
            out_channel: 0,
            out_enabled: true,
            in_channel: None,
        }
    }
}

impl MidiChannel {
    pub fn listens_to(&self, event: &MidiEvent) -> bool {
        self.in_channel.map_or(true, |ch| ch == event.channel())
    }

    pub(super) fn press(&self, state: &ChannelState) {
        let next = match state.play_status() {
            PlayStatus::Off => PlayStatus::Wait,
            PlayStatus::Wait => PlayStatus::Off,
            PlayStatus::Play => PlayStatus::Ending,
            PlayStatus::Ending => PlayStatus::Play,
        };
        state.set_play_status(next);
    }

    pub(super) fn kill(&self, state: &ChannelState, muted: bool, outbox: &mut Outbox) {
        state.set_play_status(PlayStatus::Off);
        self.all_notes_off(muted, outbox);
    }

    pub(super) fn on_rewind(&self, state: &ChannelState, muted: bool, outbox: &mut Outbox) {
        self.on_first_beat(state);
        self.all_notes_off(muted, outbox);
    }

    fn on_first_beat(&self, state: &ChannelState) {
        match state.play_status() {
            PlayStatus::Wait => state.set_play_status(PlayStatus::Play),
            PlayStatus::Ending => state.set_play_status(PlayStatus::Off),
            _ => {}
        }
    }

    /// Live MIDI for the plugin stack
    pub(super) fn receive(&self, id: ChannelId, event: MidiEvent, midi_in: &mut MidiInBuffer) {
        midi_in.push(id, event);
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn advance(
        &self,
        id: ChannelId,
        state: &ChannelState,
        muted: bool,
        actions: &ActionMap,
        event: &SequencerEvent,
        outbox: &mut Outbox,
        midi_in: &mut MidiInBuffer,
    ) {
        match event.kind {
            SequencerEventKind::FirstBeat => self.on_first_beat(state),
            SequencerEventKind::Rewind => self.on_rewind(state, muted, outbox),
            SequencerEventKind::Actions if state.is_playing() => {
                for action in channel_actions(actions, id, event.global) {
                    self.send(action.event, muted, outbox);
                    midi_in.push(id, action.event);
                }
            }
            _ => {}
        }
    }

    fn send(&self, event: MidiEvent, muted: bool, outbox: &mut Outbox) {
        if !self.out_enabled || muted {
            return;
        }
        outbox.midi(event.with_channel(self.out_channel));
    }

    fn all_notes_off(&self, muted: bool, outbox: &mut Outbox) {
        if !self.out_enabled || muted {
            return;
        }
        outbox.midi(MidiMessage::from_slice(&[
            CONTROL_CHANGE | (self.out_channel & 0x0F),
            CC_ALL_NOTES_OFF,
            0,
        ]));
    }
}

/// MIDI events gathered during a block, keyed by channel
pub struct MidiInBuffer {
    events: Vec<(ChannelId, MidiEvent)>,
}

impl MidiInBuffer {
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(MAX_MIDI_IN_EVENTS),
        }
    }

    /// Store an event; dropped once the block's capacity is used up
    pub fn push(&mut self, channel: ChannelId, event: MidiEvent) {
        if self.events.len() < self.events.capacity() {
            self.events.push((channel, event));
        }
    }

    /// Copy one channel's events into `out` (cleared first)
    pub fn collect_for(&self, channel: ChannelId, out: &mut Vec<MidiEvent>) {
        out.clear();
        for (ch, event) in &self.events {
            if *ch == channel && out.len() < out.capacity() {
                out.push(*event);
            }
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for MidiInBuffer {
    fn default() -> Self {
        Self::new()
    }
}
