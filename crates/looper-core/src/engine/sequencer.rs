//! Sequencer - the musical timeline
//!
//! Split in two halves, following the rest of the engine:
//!
//! - [`SequencerLayout`] is part of the published layout. It holds the
//!   musical parameters (bpm, beats, bars, quantize), the frame counts
//!   derived from them and a shared [`SequencerState`] of atomics that the
//!   audio thread advances every block.
//! - [`Sequencer`] lives on the audio thread. It scans each block for loop,
//!   bar and beat boundaries and recorded actions, producing a pre-allocated
//!   list of [`SequencerEvent`]s the channels react to.
//!
//! Derived frame counts are recomputed on the control thread together with
//! the parameter change, inside the same layout edit, so the audio thread
//! can never observe a bpm that disagrees with its loop length.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};

use basedrop::Shared;

use super::actions::ActionMap;
use super::gc::gc_handle;
use super::metronome::{Click, Metronome};
use super::quantizer::{QuantizedAction, Quantizer, MAX_QUANTIZED_ACTIONS};
use crate::types::{Frame, SeqStatus, StereoBuffer, MAX_BUFFER_SIZE};

pub const MIN_BPM: f32 = 20.0;
pub const MAX_BPM: f32 = 999.0;
pub const DEFAULT_BPM: f32 = 120.0;
pub const MAX_BEATS: u32 = 32;
pub const DEFAULT_BEATS: u32 = 4;
pub const DEFAULT_BARS: u32 = 1;
/// Max subdivisions per beat
pub const MAX_QUANTIZE: u32 = 8;
pub const DEFAULT_QUANTIZE: u32 = 0;

/// Worst case per block: a boundary and an action batch on every frame, plus a rewind
const MAX_SEQUENCER_EVENTS: usize = 2 * MAX_BUFFER_SIZE + 1;

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

/// Transport cursors shared between the audio thread and readers
///
/// Written by the audio thread; the control thread only writes while
/// rendering is paused (reset).
#[derive(Debug)]
pub struct SequencerState {
    status: AtomicU8,
    current_frame: AtomicI64,
    current_frame_wait: AtomicI64,
    current_beat: AtomicU32,
    metronome: AtomicBool,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(SeqStatus::Stopped as u8),
            current_frame: AtomicI64::new(0),
            current_frame_wait: AtomicI64::new(0),
            current_beat: AtomicU32::new(0),
            metronome: AtomicBool::new(false),
        }
    }
}

impl SequencerState {
    #[inline]
    pub fn status(&self) -> SeqStatus {
        SeqStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_status(&self, status: SeqStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    #[inline]
    pub fn current_frame(&self) -> Frame {
        self.current_frame.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_current_frame(&self, frame: Frame) {
        self.current_frame.store(frame, Ordering::Relaxed);
    }

    #[inline]
    pub fn current_frame_wait(&self) -> Frame {
        self.current_frame_wait.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_current_frame_wait(&self, frame: Frame) {
        self.current_frame_wait.store(frame, Ordering::Relaxed);
    }

    #[inline]
    pub fn current_beat(&self) -> u32 {
        self.current_beat.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_current_beat(&self, beat: u32) {
        self.current_beat.store(beat, Ordering::Relaxed);
    }

    #[inline]
    pub fn metronome(&self) -> bool {
        self.metronome.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_metronome(&self, enabled: bool) {
        self.metronome.store(enabled, Ordering::Relaxed);
    }

    /// Move every cursor back to the loop start
    pub fn rewind(&self) {
        self.set_current_frame(0);
        self.set_current_beat(0);
        self.set_current_frame_wait(0);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Layout
// ────────────────────────────────────────────────────────────────────────────

/// Musical parameters and derived frame counts
///
/// Cloning shares the same [`SequencerState`], so transport position
/// survives every layout publication.
#[derive(Clone)]
pub struct SequencerLayout {
    pub sample_rate: u32,
    pub bpm: f32,
    pub beats: u32,
    pub bars: u32,
    /// Subdivisions per beat, 0 = off
    pub quantize: u32,
    pub frames_in_loop: Frame,
    pub frames_in_bar: Frame,
    pub frames_in_beat: Frame,
    pub frames_in_seq: Frame,
    pub quantizer_step: Frame,
    pub state: Shared<SequencerState>,
}

impl SequencerLayout {
    pub fn new(sample_rate: u32) -> Self {
        let mut layout = Self {
            sample_rate: sample_rate.max(1),
            bpm: DEFAULT_BPM,
            beats: DEFAULT_BEATS,
            bars: DEFAULT_BARS,
            quantize: DEFAULT_QUANTIZE,
            frames_in_loop: 0,
            frames_in_bar: 0,
            frames_in_beat: 0,
            frames_in_seq: 0,
            quantizer_step: 0,
            state: Shared::new(&gc_handle(), SequencerState::default()),
        };
        layout.recompute();
        layout
    }

    /// Recompute derived frame counts from bpm, beats, bars and quantize
    pub fn recompute(&mut self) {
        let frames_per_beat = self.sample_rate as f32 * (60.0 / self.bpm);
        self.frames_in_loop = ((frames_per_beat * self.beats as f32) as Frame).max(1);
        self.frames_in_bar = (self.frames_in_loop / self.bars.max(1) as Frame).max(1);
        self.frames_in_beat = (self.frames_in_loop / self.beats.max(1) as Frame).max(1);
        self.frames_in_seq = self.frames_in_beat * MAX_BEATS as Frame;
        self.quantizer_step = if self.quantize > 0 {
            self.frames_in_beat / self.quantize as Frame
        } else {
            0
        };
    }

    /// Set the tempo, clamped to [`MIN_BPM`]..=[`MAX_BPM`]
    ///
    /// Returns the value actually applied.
    pub fn set_bpm(&mut self, bpm: f32) -> f32 {
        if bpm.is_finite() {
            self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        }
        self.recompute();
        self.bpm
    }

    /// Set the loop length; bars can never exceed beats
    pub fn set_beats(&mut self, beats: u32, bars: u32) {
        self.beats = beats.clamp(1, MAX_BEATS);
        self.bars = bars.clamp(1, self.beats);
        self.recompute();
    }

    pub fn set_quantize(&mut self, quantize: u32) {
        self.quantize = quantize.min(MAX_QUANTIZE);
        self.recompute();
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.recompute();
    }

    #[inline]
    pub fn status(&self) -> SeqStatus {
        self.state.status()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status() == SeqStatus::Running
    }

    /// Running or in pre-roll
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status() != SeqStatus::Stopped
    }

    #[inline]
    pub fn current_frame(&self) -> Frame {
        self.state.current_frame()
    }

    pub fn can_quantize(&self) -> bool {
        self.quantize > 0 && self.quantizer_step > 0 && self.is_running()
    }

    /// Round a frame to the nearest quantizer step
    ///
    /// Frames that round onto or past the loop end wrap to 0, which keeps
    /// the result a fixed point of this function.
    pub fn quantize(&self, frame: Frame) -> Frame {
        if !self.can_quantize() {
            return frame;
        }
        let step = self.quantizer_step as f64;
        let rounded = ((frame as f64 / step).round() * step) as Frame;
        if rounded >= self.frames_in_loop {
            0
        } else {
            rounded
        }
    }

    /// Longest loop reachable with the current beats (at [`MIN_BPM`])
    pub fn max_frames_in_loop(&self) -> Frame {
        ((self.sample_rate as f32 * (60.0 / MIN_BPM)) * self.beats as f32) as Frame
    }

    /// Tempo that makes `frames` exactly one loop long
    pub fn calc_bpm_from_rec(&self, frames: Frame) -> f32 {
        let seconds = frames.max(1) as f32 / self.sample_rate as f32;
        (60.0 * self.beats as f32) / seconds
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerEventKind {
    /// Loop point (global frame 0)
    FirstBeat,
    Bar,
    /// A quantized rewind landed; channels compensate from `delta`
    Rewind,
    /// Recorded actions exist at `global`
    Actions,
}

/// A timeline event inside the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerEvent {
    pub kind: SequencerEventKind,
    /// Loop frame of the event
    pub global: Frame,
    /// Frame offset inside the block
    pub delta: Frame,
}

/// What one block advance did besides producing events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Loop frame the running part of the block started from
    pub start: Frame,
    /// Block offset where the running part begins
    pub offset: Frame,
    /// Frames scanned while running
    pub running_frames: Frame,
    /// Pre-roll ended inside this block
    pub started: bool,
    /// A quantized rewind fired inside this block
    pub rewound: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Audio-thread sequencer
// ────────────────────────────────────────────────────────────────────────────

/// Audio-thread half of the sequencer: event scan, quantizer and metronome
pub struct Sequencer {
    quantizer: Quantizer,
    events: Vec<SequencerEvent>,
    fired: Vec<(QuantizedAction, Frame)>,
    metronome: Metronome,
}

impl Sequencer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            quantizer: Quantizer::new(),
            events: Vec::with_capacity(MAX_SEQUENCER_EVENTS),
            fired: Vec::with_capacity(MAX_QUANTIZED_ACTIONS),
            metronome: Metronome::new(sample_rate),
        }
    }

    pub fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    pub fn quantizer_mut(&mut self) -> &mut Quantizer {
        &mut self.quantizer
    }

    /// Events produced by the last [`Sequencer::advance`], in frame order
    pub fn events(&self) -> &[SequencerEvent] {
        &self.events
    }

    /// Events of the last block together with the quantizer channels arm
    pub fn timeline(&mut self) -> (&[SequencerEvent], &mut Quantizer) {
        (&self.events, &mut self.quantizer)
    }

    /// Channel actions whose quantization boundary fell in the last block
    pub fn fired(&self) -> &[(QuantizedAction, Frame)] {
        &self.fired
    }

    /// Advance the timeline by one block
    pub fn advance(
        &mut self,
        layout: &SequencerLayout,
        actions: &ActionMap,
        block: usize,
    ) -> AdvanceReport {
        self.events.clear();
        self.fired.clear();

        let state = &layout.state;
        let block = block as Frame;
        let frames_in_loop = layout.frames_in_loop.max(1);
        let frames_in_bar = layout.frames_in_bar.max(1);
        let frames_in_beat = layout.frames_in_beat.max(1);
        let metronome_on = state.metronome();

        let mut report = AdvanceReport::default();

        match state.status() {
            SeqStatus::Stopped => return report,
            SeqStatus::Running => {}
            SeqStatus::Waiting => {
                let wait = state.current_frame_wait().clamp(0, frames_in_loop);
                let remaining = frames_in_loop - wait;
                if metronome_on {
                    for i in 0..block.min(remaining) {
                        if (wait + i) % frames_in_beat == 0 {
                            self.metronome.trigger(Click::Beat, i as usize);
                        }
                    }
                }
                if remaining > block {
                    state.set_current_frame_wait(wait + block);
                    return report;
                }
                // Pre-roll is over: the loop starts `remaining` frames into the block
                state.set_current_frame_wait(0);
                state.set_current_frame(0);
                state.set_current_beat(0);
                state.set_status(SeqStatus::Running);
                report.offset = remaining;
                report.started = true;
            }
        }

        let start = match state.current_frame() {
            f if (0..frames_in_loop).contains(&f) => f,
            _ => 0,
        };
        let len = block - report.offset;

        for i in 0..len {
            let global = (start + i) % frames_in_loop;
            let delta = report.offset + i;

            if global == 0 {
                self.push(SequencerEventKind::FirstBeat, global, delta);
                if metronome_on {
                    self.metronome.trigger(Click::Beat, delta as usize);
                }
            } else if global % frames_in_bar == 0 {
                self.push(SequencerEventKind::Bar, global, delta);
                if metronome_on {
                    self.metronome.trigger(Click::Bar, delta as usize);
                }
            } else if metronome_on && global % frames_in_beat == 0 {
                self.metronome.trigger(Click::Beat, delta as usize);
            }

            if actions.has_at(global) {
                self.push(SequencerEventKind::Actions, global, delta);
            }
        }

        let end = start + len;
        let frame = end % frames_in_loop;
        state.set_current_frame(frame);
        state.set_current_beat((frame / frames_in_beat) as u32);

        report.start = start;
        report.running_frames = len;

        // With quantize off nothing should be armed; anything left fires right away
        let step = if layout.can_quantize() {
            layout.quantizer_step
        } else {
            1
        };
        self.quantizer.advance(start..end, step, &mut self.fired);

        let rewind = self
            .fired
            .iter()
            .find(|(action, _)| *action == QuantizedAction::SequencerRewind)
            .map(|(_, delta)| *delta);
        if let Some(delta) = rewind {
            self.fired
                .retain(|(action, _)| *action != QuantizedAction::SequencerRewind);
            self.rewind_at(layout, report.offset + delta, block);
            report.rewound = true;
        }

        report
    }

    /// Land a quantized rewind at block offset `local`
    ///
    /// Events after the rewind point belong to the abandoned timeline and are
    /// dropped. The cursor ends up where the new timeline is at block end.
    fn rewind_at(&mut self, layout: &SequencerLayout, local: Frame, block: Frame) {
        let keep = self.events.partition_point(|e| e.delta <= local);
        self.events.truncate(keep);

        let frame = (block - local) % layout.frames_in_loop.max(1);
        layout.state.set_current_frame(frame);
        layout
            .state
            .set_current_beat((frame / layout.frames_in_beat.max(1)) as u32);
        layout.state.set_current_frame_wait(0);

        self.push(SequencerEventKind::Rewind, 0, local);
    }

    #[inline]
    fn push(&mut self, kind: SequencerEventKind, global: Frame, delta: Frame) {
        if self.events.len() < self.events.capacity() {
            self.events.push(SequencerEvent { kind, global, delta });
        }
    }

    /// Sum any metronome click into `out`
    pub fn render(&mut self, out: &mut StereoBuffer) {
        self.metronome.render(out);
    }

    /// STOPPED or WAITING → RUNNING
    ///
    /// Returns false if already running.
    pub fn raw_start(&mut self, layout: &SequencerLayout) -> bool {
        match layout.status() {
            SeqStatus::Running => false,
            SeqStatus::Stopped | SeqStatus::Waiting => {
                layout.state.set_current_frame_wait(0);
                layout.state.set_status(SeqStatus::Running);
                true
            }
        }
    }

    /// Any status → STOPPED
    ///
    /// Pending quantized actions are dropped: the boundary they wait for
    /// will not come. Returns false if already stopped.
    pub fn raw_stop(&mut self, layout: &SequencerLayout) -> bool {
        if layout.status() == SeqStatus::Stopped {
            return false;
        }
        layout.state.set_status(SeqStatus::Stopped);
        self.quantizer.clear_all();
        true
    }

    /// Rewind now, or at the next quantizer step when quantizing
    ///
    /// Returns true if the rewind happened immediately.
    pub fn raw_rewind(&mut self, layout: &SequencerLayout) -> bool {
        if layout.can_quantize() {
            self.quantizer.trigger(QuantizedAction::SequencerRewind);
            false
        } else {
            layout.state.rewind();
            true
        }
    }

    /// STOPPED → WAITING: rewind and count in one loop
    ///
    /// Returns false unless the sequencer was stopped.
    pub fn start_with_preroll(&mut self, layout: &SequencerLayout) -> bool {
        if layout.status() != SeqStatus::Stopped {
            return false;
        }
        layout.state.rewind();
        layout.state.set_status(SeqStatus::Waiting);
        true
    }

    /// Drop everything in flight
    pub fn reset(&mut self) {
        self.quantizer.clear_all();
        self.events.clear();
        self.fired.clear();
        self.metronome.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::actions::Action;
    use crate::engine::midi::MidiEvent;
    use crate::types::ChannelId;

    /// 1kHz, 60bpm, 4 beats, 2 bars: loop 4000, bar 2000, beat 1000
    fn small_layout() -> SequencerLayout {
        let mut layout = SequencerLayout::new(1000);
        layout.set_bpm(60.0);
        layout.set_beats(4, 2);
        layout
    }

    fn count(seq: &Sequencer, kind: SequencerEventKind) -> usize {
        seq.events().iter().filter(|e| e.kind == kind).count()
    }

    #[test]
    fn test_frame_math_at_120_bpm() {
        let mut layout = SequencerLayout::new(48000);
        assert_eq!(layout.frames_in_beat, 24_000);
        assert_eq!(layout.frames_in_loop, 96_000);
        assert_eq!(layout.frames_in_bar, 96_000);

        layout.set_quantize(4);
        assert_eq!(layout.quantizer_step, 6000);
    }

    #[test]
    fn test_parameter_clamping() {
        let mut layout = SequencerLayout::new(48000);
        assert_eq!(layout.set_bpm(5.0), MIN_BPM);
        assert_eq!(layout.set_bpm(5000.0), MAX_BPM);
        assert_eq!(layout.set_bpm(f32::NAN), MAX_BPM);

        layout.set_beats(64, 100);
        assert_eq!(layout.beats, MAX_BEATS);
        assert_eq!(layout.bars, MAX_BEATS);

        layout.set_beats(3, 8);
        assert_eq!(layout.bars, 3);

        layout.set_quantize(99);
        assert_eq!(layout.quantize, MAX_QUANTIZE);
    }

    #[test]
    fn test_quantize_only_while_running() {
        let mut layout = SequencerLayout::new(48000);
        layout.set_quantize(4);
        assert_eq!(layout.quantize(6001), 6001);

        layout.state.set_status(SeqStatus::Running);
        assert_eq!(layout.quantize(6001), 6000);
        assert_eq!(layout.quantize(8999), 6000);
        assert_eq!(layout.quantize(9000), 12_000);
        assert_eq!(layout.quantize(95_000), 0);
    }

    #[test]
    fn test_quantize_is_idempotent_with_uneven_step() {
        let mut layout = SequencerLayout::new(44100);
        layout.set_bpm(133.0);
        layout.set_beats(7, 1);
        layout.set_quantize(3);
        layout.state.set_status(SeqStatus::Running);
        assert_ne!(layout.frames_in_loop % layout.quantizer_step, 0);

        for f in (0..layout.frames_in_loop + 5000).step_by(97) {
            let q = layout.quantize(f);
            assert_eq!(layout.quantize(q), q, "frame {f}");
            assert!(q < layout.frames_in_loop);
        }
    }

    #[test]
    fn test_first_beat_never_skipped_with_uneven_blocks() {
        let layout = small_layout();
        let actions = ActionMap::new();
        let mut seq = Sequencer::new(1000);
        seq.raw_start(&layout);

        let mut first_beats = 0;
        let mut bars = 0;
        // 300 does not divide 4000: 40 blocks cover exactly 3 loops
        for _ in 0..40 {
            seq.advance(&layout, &actions, 300);
            first_beats += count(&seq, SequencerEventKind::FirstBeat);
            bars += count(&seq, SequencerEventKind::Bar);
            assert!(layout.current_frame() < layout.frames_in_loop);
        }
        assert_eq!(first_beats, 3);
        assert_eq!(bars, 3);
        assert_eq!(layout.current_frame(), 0);
    }

    #[test]
    fn test_events_carry_block_offsets() {
        let layout = small_layout();
        let mut actions = ActionMap::new();
        actions.record(Action::new(ChannelId(4), 2100, MidiEvent::note_on(0, 60, 100)));
        let mut seq = Sequencer::new(1000);
        seq.raw_start(&layout);
        layout.state.set_current_frame(1900);

        seq.advance(&layout, &actions, 256);

        assert_eq!(
            seq.events(),
            &[
                SequencerEvent { kind: SequencerEventKind::Bar, global: 2000, delta: 100 },
                SequencerEvent { kind: SequencerEventKind::Actions, global: 2100, delta: 200 },
            ]
        );
        assert_eq!(layout.current_frame(), 2156);
        assert_eq!(layout.state.current_beat(), 2);
    }

    #[test]
    fn test_stopped_sequencer_does_not_move() {
        let layout = small_layout();
        let mut seq = Sequencer::new(1000);
        let report = seq.advance(&layout, &ActionMap::new(), 512);
        assert_eq!(report, AdvanceReport::default());
        assert_eq!(layout.current_frame(), 0);
    }

    #[test]
    fn test_preroll_becomes_running_at_loop_point() {
        let layout = small_layout();
        let actions = ActionMap::new();
        let mut seq = Sequencer::new(1000);
        assert!(seq.start_with_preroll(&layout));
        assert_eq!(layout.status(), SeqStatus::Waiting);

        for _ in 0..13 {
            let report = seq.advance(&layout, &actions, 300);
            assert!(!report.started);
            assert!(seq.events().is_empty());
        }
        assert_eq!(layout.state.current_frame_wait(), 3900);

        let report = seq.advance(&layout, &actions, 300);
        assert!(report.started);
        assert_eq!(report.offset, 100);
        assert_eq!(layout.status(), SeqStatus::Running);
        assert_eq!(
            seq.events()[0],
            SequencerEvent { kind: SequencerEventKind::FirstBeat, global: 0, delta: 100 }
        );
        assert_eq!(layout.current_frame(), 200);
    }

    #[test]
    fn test_quantized_rewind_lands_on_step() {
        let mut layout = small_layout();
        layout.set_quantize(1);
        let actions = ActionMap::new();
        let mut seq = Sequencer::new(1000);
        seq.raw_start(&layout);
        layout.state.set_current_frame(1500);

        assert!(!seq.raw_rewind(&layout));
        let report = seq.advance(&layout, &actions, 600);

        assert!(report.rewound);
        // Boundary 2000 is 500 frames in; 100 frames of the new timeline follow
        assert_eq!(
            seq.events(),
            &[
                SequencerEvent { kind: SequencerEventKind::Bar, global: 2000, delta: 500 },
                SequencerEvent { kind: SequencerEventKind::Rewind, global: 0, delta: 500 },
            ]
        );
        assert_eq!(layout.current_frame(), 100);
        assert!(seq.fired().is_empty());
    }

    #[test]
    fn test_rewind_without_quantize_is_immediate() {
        let layout = small_layout();
        let mut seq = Sequencer::new(1000);
        seq.raw_start(&layout);
        layout.state.set_current_frame(1234);

        assert!(seq.raw_rewind(&layout));
        assert_eq!(layout.current_frame(), 0);

        seq.advance(&layout, &ActionMap::new(), 64);
        assert_eq!(count(&seq, SequencerEventKind::FirstBeat), 1);
    }

    #[test]
    fn test_stop_drops_pending_actions() {
        let mut layout = small_layout();
        layout.set_quantize(2);
        let mut seq = Sequencer::new(1000);
        seq.raw_start(&layout);
        seq.quantizer_mut().trigger(QuantizedAction::ChannelPlay(ChannelId(4)));

        assert!(seq.raw_stop(&layout));
        assert!(!seq.raw_stop(&layout));
        assert!(!seq.quantizer().is_triggered(QuantizedAction::ChannelPlay(ChannelId(4))));
    }

    #[test]
    fn test_calc_bpm_from_rec() {
        let layout = SequencerLayout::new(48000);
        // 4 beats in 2 seconds = 120 bpm
        assert!((layout.calc_bpm_from_rec(96_000) - 120.0).abs() < 1e-3);
        assert_eq!(layout.max_frames_in_loop(), 48000 * 3 * 4);
    }
}
