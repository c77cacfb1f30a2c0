//! Synchronizer - outbound MIDI clock / timecode and external transport
//!
//! As clock master the engine sends 24 ticks per beat plus START, STOP and
//! SONG POSITION on transport changes. As MTC master it sends quarter-frame
//! messages at the configured frame rate and a full-frame SysEx on rewind.
//! Nothing is sent while the sequencer is counting in.

use super::event::Outbox;
use super::midi::MidiMessage;
use super::sequencer::{AdvanceReport, SequencerLayout};
use crate::config::MidiSyncMode;
use crate::types::Frame;

pub const MIDI_CLOCK: u8 = 0xF8;
pub const MIDI_START: u8 = 0xFA;
pub const MIDI_STOP: u8 = 0xFC;
pub const MIDI_POSITION_PTR: u8 = 0xF2;
pub const MIDI_MTC_QUARTER: u8 = 0xF1;

/// Clock ticks per quarter note
const CLOCK_PPQ: Frame = 24;

/// MTC full frame at 00:00:00:00
const MTC_FULL_FRAME_ZERO: [u8; 10] = [0xF0, 0x7F, 0x7F, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0xF7];

/// Transport as reported by an external master (e.g. JACK)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransportState {
    pub running: bool,
    /// 0 when the master does not publish a tempo
    pub bpm: f32,
    pub frame: Frame,
}

/// What the engine should do after an external transport change
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransportChange {
    pub rewind: bool,
    pub bpm: Option<f32>,
    /// Some(true) = start, Some(false) = stop
    pub running: Option<bool>,
}

impl TransportChange {
    pub fn is_empty(&self) -> bool {
        !self.rewind && self.bpm.is_none() && self.running.is_none()
    }
}

/// Running MIDI timecode position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Timecode {
    frames: u32,
    seconds: u32,
    minutes: u32,
    hours: u32,
}

impl Timecode {
    /// Four quarter-frame data bytes for the current position
    ///
    /// Even timecode frames carry frames and seconds, odd ones minutes and
    /// hours.
    fn quarter_frames(&self) -> [u8; 4] {
        let nibbles = |value: u32, piece: u8| {
            let value = value as u8;
            [(value & 0x0F) | piece, (value >> 4) | (piece + 0x10)]
        };
        let (lo, hi) = if self.frames % 2 == 0 {
            (nibbles(self.frames, 0x00), nibbles(self.seconds, 0x20))
        } else {
            (nibbles(self.minutes, 0x40), nibbles(self.hours, 0x60))
        };
        [lo[0], lo[1], hi[0], hi[1]]
    }

    fn advance(&mut self, fps: f32) {
        self.frames += 1;
        if self.frames as f32 > fps {
            self.frames = 0;
            self.seconds += 1;
            if self.seconds >= 60 {
                self.seconds = 0;
                self.minutes += 1;
                if self.minutes >= 60 {
                    self.minutes = 0;
                    self.hours += 1;
                }
            }
        }
    }
}

pub struct Synchronizer {
    timecode: Timecode,
    transport: TransportState,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self {
            timecode: Timecode::default(),
            transport: TransportState::default(),
        }
    }

    /// Send clock or timecode for the running part of the last block
    pub fn send_block(
        &mut self,
        mode: MidiSyncMode,
        fps: f32,
        layout: &SequencerLayout,
        report: &AdvanceReport,
        outbox: &mut Outbox,
    ) {
        if report.running_frames <= 0 {
            return;
        }
        let frames_in_loop = layout.frames_in_loop.max(1);
        match mode {
            MidiSyncMode::None => {}
            MidiSyncMode::ClockMaster => {
                let step = (layout.frames_in_beat / CLOCK_PPQ).max(1);
                for i in 0..report.running_frames {
                    if ((report.start + i) % frames_in_loop) % step == 0 {
                        outbox.midi(MidiMessage::single(MIDI_CLOCK));
                    }
                }
            }
            MidiSyncMode::MtcMaster => {
                let rate = ((layout.sample_rate as f32 / fps.max(1.0)) as Frame).max(1);
                for i in 0..report.running_frames {
                    if ((report.start + i) % frames_in_loop) % rate == 0 {
                        for data in self.timecode.quarter_frames() {
                            outbox.midi(MidiMessage::from_slice(&[MIDI_MTC_QUARTER, data]));
                        }
                        self.timecode.advance(fps);
                    }
                }
            }
        }
    }

    pub fn send_start(&mut self, mode: MidiSyncMode, outbox: &mut Outbox) {
        if mode == MidiSyncMode::ClockMaster {
            outbox.midi(MidiMessage::single(MIDI_START));
            outbox.midi(MidiMessage::from_slice(&[MIDI_POSITION_PTR, 0, 0]));
        }
    }

    pub fn send_stop(&mut self, mode: MidiSyncMode, outbox: &mut Outbox) {
        if mode == MidiSyncMode::ClockMaster {
            outbox.midi(MidiMessage::single(MIDI_STOP));
        }
    }

    /// Cue external slaves back to zero
    pub fn send_rewind(&mut self, mode: MidiSyncMode, outbox: &mut Outbox) {
        self.timecode = Timecode::default();
        match mode {
            MidiSyncMode::MtcMaster => {
                outbox.midi(MidiMessage::from_slice(&MTC_FULL_FRAME_ZERO));
            }
            MidiSyncMode::ClockMaster => {
                outbox.midi(MidiMessage::from_slice(&[MIDI_POSITION_PTR, 0, 0]));
            }
            MidiSyncMode::None => {}
        }
    }

    /// Diff an external transport against the last one seen
    pub fn recv_transport(&mut self, state: TransportState) -> TransportChange {
        let prev = std::mem::replace(&mut self.transport, state);
        let mut change = TransportChange::default();
        if state == prev {
            return change;
        }
        if state.frame != prev.frame && state.frame == 0 {
            change.rewind = true;
        }
        if state.bpm != prev.bpm && state.bpm > 1.0 {
            change.bpm = Some(state.bpm);
        }
        if state.running != prev.running {
            change.running = Some(state.running);
        }
        change
    }

    pub fn reset(&mut self) {
        self.timecode = Timecode::default();
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::event::outbox_pair;

    fn drain(midi: &mut rtrb::Consumer<MidiMessage>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Ok(msg) = midi.pop() {
            out.push(msg.as_bytes().to_vec());
        }
        out
    }

    fn running(start: Frame, frames: Frame) -> AdvanceReport {
        AdvanceReport {
            start,
            running_frames: frames,
            ..AdvanceReport::default()
        }
    }

    #[test]
    fn test_clock_sends_24_ticks_per_beat() {
        let (mut outbox, _fb, mut midi) = outbox_pair();
        let mut sync = Synchronizer::new();
        // 48 kHz, 120 bpm: 24000 frames per beat, a tick every 1000
        let layout = SequencerLayout::new(48000);

        sync.send_block(MidiSyncMode::ClockMaster, 25.0, &layout, &running(0, 24000), &mut outbox);
        let sent = drain(&mut midi);
        assert_eq!(sent.len(), 24);
        assert!(sent.iter().all(|m| m == &vec![MIDI_CLOCK]));
    }

    #[test]
    fn test_nothing_sent_without_running_frames() {
        let (mut outbox, _fb, mut midi) = outbox_pair();
        let mut sync = Synchronizer::new();
        let layout = SequencerLayout::new(48000);

        sync.send_block(MidiSyncMode::ClockMaster, 25.0, &layout, &AdvanceReport::default(), &mut outbox);
        assert!(drain(&mut midi).is_empty());
    }

    #[test]
    fn test_mtc_quarter_frames_alternate() {
        let (mut outbox, _fb, mut midi) = outbox_pair();
        let mut sync = Synchronizer::new();
        let layout = SequencerLayout::new(48000);

        // 25 fps at 48 kHz: one timecode frame every 1920 frames
        sync.send_block(MidiSyncMode::MtcMaster, 25.0, &layout, &running(0, 3840), &mut outbox);
        let sent = drain(&mut midi);
        assert_eq!(sent.len(), 8);
        assert_eq!(sent[0], vec![MIDI_MTC_QUARTER, 0x00]);
        assert_eq!(sent[2], vec![MIDI_MTC_QUARTER, 0x20]);
        assert_eq!(sent[4], vec![MIDI_MTC_QUARTER, 0x40]);
        assert_eq!(sent[7], vec![MIDI_MTC_QUARTER, 0x70]);
    }

    #[test]
    fn test_timecode_rolls_into_seconds() {
        let mut tc = Timecode::default();
        for _ in 0..26 {
            tc.advance(25.0);
        }
        assert_eq!(tc, Timecode { frames: 0, seconds: 1, minutes: 0, hours: 0 });
    }

    #[test]
    fn test_rewind_messages() {
        let (mut outbox, _fb, mut midi) = outbox_pair();
        let mut sync = Synchronizer::new();

        sync.send_rewind(MidiSyncMode::MtcMaster, &mut outbox);
        sync.send_rewind(MidiSyncMode::ClockMaster, &mut outbox);
        sync.send_start(MidiSyncMode::ClockMaster, &mut outbox);
        sync.send_stop(MidiSyncMode::MtcMaster, &mut outbox);

        assert_eq!(
            drain(&mut midi),
            vec![
                MTC_FULL_FRAME_ZERO.to_vec(),
                vec![MIDI_POSITION_PTR, 0, 0],
                vec![MIDI_START],
                vec![MIDI_POSITION_PTR, 0, 0],
            ]
        );
    }

    #[test]
    fn test_transport_diff() {
        let mut sync = Synchronizer::new();

        let change = sync.recv_transport(TransportState { running: true, bpm: 128.0, frame: 512 });
        assert_eq!(change.running, Some(true));
        assert_eq!(change.bpm, Some(128.0));
        assert!(!change.rewind);

        let change = sync.recv_transport(TransportState { running: true, bpm: 128.0, frame: 512 });
        assert!(change.is_empty());

        let change = sync.recv_transport(TransportState { running: true, bpm: 0.0, frame: 0 });
        assert!(change.rewind);
        assert_eq!(change.bpm, None);
        assert_eq!(change.running, None);
    }
}
