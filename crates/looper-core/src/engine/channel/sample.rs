//! Sample channels: player, reactor and action reader
//!
//! Play status transitions for the manual intents (press, release, kill,
//! sequencer stop) and for the timeline (first beat, bar, rewind, recorded
//! actions), plus the block renderer that copies wave frames into the
//! channel buffer.

use std::fmt;
use std::str::FromStr;

use basedrop::Shared;
use serde::{Deserialize, Serialize};

use super::{channel_actions, ChannelState, RtContext};
use crate::config::EngineConfig;
use crate::engine::actions::ActionMap;
use crate::engine::midi::{MAX_VELOCITY, NOTE_KILL, NOTE_OFF, NOTE_ON};
use crate::engine::model::Layout;
use crate::engine::quantizer::QuantizedAction;
use crate::engine::sequencer::{SequencerEvent, SequencerEventKind};
use crate::types::{ChannelId, Frame, PlayStatus, StereoBuffer};

/// Audio data owned by a sample channel
pub struct Wave {
    pub name: String,
    pub data: StereoBuffer,
    pub rate: u32,
}

impl Wave {
    pub fn new(name: impl Into<String>, data: StereoBuffer, rate: u32) -> Self {
        Self {
            name: name.into(),
            data,
            rate,
        }
    }

    #[inline]
    pub fn len(&self) -> Frame {
        self.data.len() as Frame
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// How a sample channel reacts to presses and the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplePlayerMode {
    /// Loops in sync, started and stopped on the loop point
    LoopBasic,
    /// Plays once from the loop point, then waits for the next one
    LoopOnce,
    /// Like LoopBasic, but restarts on every bar
    LoopRepeat,
    /// Like LoopOnce, but can start on any bar
    LoopOnceBar,
    /// One-shot; a second press stops it
    #[default]
    SingleBasic,
    /// Plays while the key is held
    SinglePress,
    /// One-shot; a second press restarts it
    SingleRetrig,
    /// Keeps looping until pressed again
    SingleEndless,
}

impl SamplePlayerMode {
    pub const ALL: [SamplePlayerMode; 8] = [
        SamplePlayerMode::LoopBasic,
        SamplePlayerMode::LoopOnce,
        SamplePlayerMode::LoopRepeat,
        SamplePlayerMode::LoopOnceBar,
        SamplePlayerMode::SingleBasic,
        SamplePlayerMode::SinglePress,
        SamplePlayerMode::SingleRetrig,
        SamplePlayerMode::SingleEndless,
    ];

    #[inline]
    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            SamplePlayerMode::LoopBasic
                | SamplePlayerMode::LoopOnce
                | SamplePlayerMode::LoopRepeat
                | SamplePlayerMode::LoopOnceBar
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SamplePlayerMode::LoopBasic => "loop-basic",
            SamplePlayerMode::LoopOnce => "loop-once",
            SamplePlayerMode::LoopRepeat => "loop-repeat",
            SamplePlayerMode::LoopOnceBar => "loop-once-bar",
            SamplePlayerMode::SingleBasic => "single-basic",
            SamplePlayerMode::SinglePress => "single-press",
            SamplePlayerMode::SingleRetrig => "single-retrig",
            SamplePlayerMode::SingleEndless => "single-endless",
        }
    }
}

impl fmt::Display for SamplePlayerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SamplePlayerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == wanted)
            .ok_or_else(|| format!("unknown sample mode '{}'", s))
    }
}

/// Sample player configuration
#[derive(Clone, Default)]
pub struct SampleChannel {
    pub wave: Option<Shared<Wave>>,
    pub mode: SamplePlayerMode,
    /// First frame played
    pub begin: Frame,
    /// One past the last frame played
    pub end: Frame,
    pub velocity_as_vol: bool,
    pub input_monitor: bool,
    pub overdub_protection: bool,
}

impl SampleChannel {
    #[inline]
    pub fn has_wave(&self) -> bool {
        self.wave.is_some()
    }

    /// Install a wave and play all of it
    pub fn set_wave(&mut self, wave: Shared<Wave>) {
        self.begin = 0;
        self.end = wave.len();
        self.wave = Some(wave);
    }

    pub fn clear_wave(&mut self) {
        self.wave = None;
        self.begin = 0;
        self.end = 0;
    }

    fn wave_len(&self) -> Frame {
        self.wave.as_ref().map_or(0, |w| w.len())
    }

    /// Clamp begin/end inside the wave, keeping begin <= end
    pub fn set_begin_end(&mut self, begin: Frame, end: Frame) {
        let len = self.wave_len();
        self.end = end.clamp(0, len);
        self.begin = begin.clamp(0, self.end);
    }

    // ── Manual intents ──────────────────────────────────────────────────────

    pub(super) fn press(
        &self,
        id: ChannelId,
        state: &ChannelState,
        ctx: &mut RtContext<'_>,
        velocity: u8,
    ) {
        let status = match state.play_status() {
            PlayStatus::Off => self.press_while_off(id, state, ctx, velocity),
            PlayStatus::Play => self.press_while_play(id, state, ctx),
            PlayStatus::Wait => PlayStatus::Off,
            PlayStatus::Ending => PlayStatus::Play,
        };
        state.set_play_status(status);
    }

    fn press_while_off(
        &self,
        id: ChannelId,
        state: &ChannelState,
        ctx: &mut RtContext<'_>,
        velocity: u8,
    ) -> PlayStatus {
        if self.mode.is_loop() {
            return PlayStatus::Wait;
        }
        if self.velocity_as_vol {
            state.set_volume_i(velocity.min(MAX_VELOCITY) as f32 / MAX_VELOCITY as f32);
        }
        if ctx.layout.sequencer.can_quantize() {
            ctx.quantizer.trigger(QuantizedAction::ChannelPlay(id));
            PlayStatus::Off
        } else {
            PlayStatus::Play
        }
    }

    fn press_while_play(
        &self,
        id: ChannelId,
        state: &ChannelState,
        ctx: &mut RtContext<'_>,
    ) -> PlayStatus {
        match self.mode {
            SamplePlayerMode::SingleRetrig => {
                if ctx.layout.sequencer.can_quantize() {
                    ctx.quantizer.trigger(QuantizedAction::ChannelRewind(id));
                } else {
                    self.rewind(state, 0);
                }
                PlayStatus::Play
            }
            SamplePlayerMode::SingleEndless => PlayStatus::Ending,
            mode if mode.is_loop() => PlayStatus::Ending,
            SamplePlayerMode::SingleBasic => {
                self.rewind_to_begin(state);
                PlayStatus::Off
            }
            _ => PlayStatus::Off,
        }
    }

    /// Only SINGLE_PRESS cares about key release
    pub(super) fn release(&self, id: ChannelId, state: &ChannelState, ctx: &mut RtContext<'_>) {
        if self.mode != SamplePlayerMode::SinglePress {
            return;
        }
        if state.play_status() == PlayStatus::Play {
            self.kill(state);
        } else {
            // A quantized start may still be pending
            ctx.quantizer.clear(QuantizedAction::ChannelPlay(id));
        }
    }

    pub(super) fn kill(&self, state: &ChannelState) {
        state.set_play_status(PlayStatus::Off);
        state.set_rewinding(false);
        state.set_tracker(self.begin);
    }

    pub(super) fn on_sequencer_stop(&self, state: &ChannelState, config: &EngineConfig) {
        let is_loop = self.mode.is_loop();
        match state.play_status() {
            PlayStatus::Wait if is_loop => state.set_play_status(PlayStatus::Off),
            PlayStatus::Play => {
                if config.chans_stop_on_seq_halt && (is_loop || state.read_actions()) {
                    self.kill(state);
                }
            }
            _ => {}
        }
    }

    /// Restart from `begin` at block offset `delta`
    ///
    /// A stopped channel just resets its cursor.
    pub(super) fn rewind(&self, state: &ChannelState, delta: Frame) {
        if state.is_playing() {
            state.set_rewinding(true);
            state.set_offset(delta);
        } else {
            state.set_tracker(self.begin);
        }
    }

    fn rewind_to_begin(&self, state: &ChannelState) {
        state.set_rewinding(false);
        state.set_tracker(self.begin);
    }

    pub(super) fn toggle_read_actions(&self, state: &ChannelState, layout: &Layout) {
        let running = layout.sequencer.is_running();
        let loops = layout.config.treat_recs_as_loops;

        if running && state.rec_status() == PlayStatus::Play && !loops {
            self.kill(state);
        }

        if !state.has_actions() {
            return;
        }

        // With recs-as-loops, read is only switched on at the next first beat, so
        // a second toggle must also cancel a pending (WAIT) start.
        if state.read_actions() || state.rec_status() == PlayStatus::Wait {
            stop_read_actions(state, running, loops);
        } else {
            start_read_actions(state, loops);
        }
    }

    // ── Timeline ────────────────────────────────────────────────────────────

    pub(super) fn advance(
        &self,
        id: ChannelId,
        state: &ChannelState,
        actions: &ActionMap,
        event: &SequencerEvent,
    ) {
        match event.kind {
            SequencerEventKind::FirstBeat => self.on_first_beat(state, event.delta),
            SequencerEventKind::Bar => self.on_bar(state, event.delta),
            SequencerEventKind::Rewind => {
                if self.mode.is_loop() {
                    self.rewind(state, event.delta);
                }
            }
            SequencerEventKind::Actions => {
                if !state.read_actions() {
                    return;
                }
                for action in channel_actions(actions, id, event.global) {
                    self.on_action(state, action.event.kind(), event.delta);
                }
            }
        }
    }

    fn on_first_beat(&self, state: &ChannelState, delta: Frame) {
        let is_loop = self.mode.is_loop();
        match state.play_status() {
            PlayStatus::Play if is_loop => self.rewind(state, delta),
            PlayStatus::Wait => {
                state.set_offset(delta);
                state.set_play_status(PlayStatus::Play);
            }
            PlayStatus::Ending if is_loop => self.kill(state),
            _ => {}
        }

        match state.rec_status() {
            PlayStatus::Wait => {
                state.set_rec_status(PlayStatus::Play);
                state.set_read_actions(true);
            }
            PlayStatus::Ending => {
                state.set_rec_status(PlayStatus::Off);
                state.set_read_actions(false);
            }
            _ => {}
        }
    }

    fn on_bar(&self, state: &ChannelState, delta: Frame) {
        match state.play_status() {
            PlayStatus::Play if self.mode == SamplePlayerMode::LoopRepeat => {
                self.rewind(state, delta)
            }
            PlayStatus::Wait if self.mode == SamplePlayerMode::LoopOnceBar => {
                state.set_offset(delta);
                state.set_play_status(PlayStatus::Play);
            }
            _ => {}
        }
    }

    fn on_action(&self, state: &ChannelState, kind: u8, delta: Frame) {
        match kind {
            NOTE_ON if !self.mode.is_loop() => {
                if state.is_playing() {
                    self.rewind(state, delta);
                } else {
                    state.set_offset(delta);
                    state.set_play_status(PlayStatus::Play);
                }
            }
            NOTE_OFF if self.mode == SamplePlayerMode::SinglePress => self.kill(state),
            NOTE_KILL => self.kill(state),
            _ => {}
        }
    }

    // ── Rendering ───────────────────────────────────────────────────────────

    /// Copy wave frames into `buf`, starting at the pending offset
    pub(super) fn render(&self, state: &ChannelState, buf: &mut StereoBuffer, seq_running: bool) {
        let Some(wave) = self.wave.as_ref() else {
            return;
        };
        let len = buf.len() as Frame;
        let end = self.end.min(wave.len());
        let begin = self.begin.clamp(0, end);
        if end <= begin {
            return;
        }

        let mut tracker = state.tracker();
        let mut pos;

        if state.rewinding() {
            // Play the old position up to the rewind point, then restart
            pos = state.offset().clamp(0, len);
            if state.is_playing() && (begin..end).contains(&tracker) {
                fill(wave, tracker, end, buf, 0, pos);
            }
            tracker = begin;
            state.set_rewinding(false);
        } else {
            if !state.is_playing() {
                return;
            }
            pos = state.offset().clamp(0, len);
        }

        if !(begin..end).contains(&tracker) {
            tracker = begin;
        }

        while pos < len && state.is_playing() {
            let written = fill(wave, tracker, end, buf, pos, len);
            tracker += written;
            pos += written;
            if tracker >= end {
                tracker = begin;
                self.on_last_frame(state, seq_running);
            }
        }

        state.set_tracker(tracker);
        state.set_offset(0);
    }

    fn on_last_frame(&self, state: &ChannelState, seq_running: bool) {
        let is_loop = self.mode.is_loop();
        match state.play_status() {
            PlayStatus::Play => {
                let single_once = !is_loop && self.mode != SamplePlayerMode::SingleEndless;
                if single_once || (is_loop && !seq_running) {
                    state.set_play_status(PlayStatus::Off);
                } else if matches!(
                    self.mode,
                    SamplePlayerMode::LoopOnce | SamplePlayerMode::LoopOnceBar
                ) {
                    state.set_play_status(PlayStatus::Wait);
                }
            }
            PlayStatus::Ending => state.set_play_status(PlayStatus::Off),
            _ => {}
        }
    }
}

fn start_read_actions(state: &ChannelState, loops: bool) {
    if loops {
        state.set_rec_status(PlayStatus::Wait);
    } else {
        state.set_rec_status(PlayStatus::Play);
        state.set_read_actions(true);
    }
}

fn stop_read_actions(state: &ChannelState, running: bool, loops: bool) {
    if !running || !loops {
        state.set_rec_status(PlayStatus::Off);
        state.set_read_actions(false);
        return;
    }
    let next = match state.rec_status() {
        PlayStatus::Wait => PlayStatus::Off,
        PlayStatus::Ending => PlayStatus::Play,
        _ => PlayStatus::Ending,
    };
    state.set_rec_status(next);
}

/// Copy up to `to - from` frames from `wave[tracker..end]` into `buf[from..]`
fn fill(
    wave: &Wave,
    tracker: Frame,
    end: Frame,
    buf: &mut StereoBuffer,
    from: Frame,
    to: Frame,
) -> Frame {
    let count = (end - tracker).min(to - from).max(0);
    if count == 0 {
        return 0;
    }
    let (src_start, dst_start, n) = (tracker as usize, from as usize, count as usize);
    buf.as_mut_slice()[dst_start..dst_start + n]
        .copy_from_slice(&wave.data.as_slice()[src_start..src_start + n]);
    count
}
