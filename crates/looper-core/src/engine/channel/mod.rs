//! Channels and their per-channel state machine
//!
//! A [`Channel`] is part of the published layout and therefore immutable on
//! the audio thread. Everything that changes while rendering (play status,
//! playback cursor, action-reading flags) lives in a shared
//! [`ChannelState`] of atomics, so the state survives every layout
//! publication and the audio thread never needs `&mut Channel`.
//!
//! What a channel can do is decided by its [`ChannelRole`]:
//!
//! | Role    | Sub-roles                                               |
//! |---------|---------------------------------------------------------|
//! | Sample  | player, reactor, audio receiver, action recorder        |
//! | Midi    | controller, sender, receiver, action recorder           |
//! | Master  | bus only (plugins)                                      |
//! | Preview | player, reactor                                         |

mod midi;
mod sample;

pub use midi::*;
pub use sample::*;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};

use basedrop::Shared;
use serde::{Deserialize, Serialize};

use super::actions::{Action, ActionMap};
use super::event::{EngineFeedback, Outbox};
use super::gc::gc_handle;
use super::midi::{MidiEvent, MidiMessage};
use super::model::Layout;
use super::plugin::{PluginHost, PluginId};
use super::quantizer::{QuantizedAction, Quantizer};
use super::sequencer::SequencerEvent;
use crate::config::EngineConfig;
use crate::types::{ChannelId, Frame, PanGain, PlayStatus, Sample, StereoBuffer};

pub const DEFAULT_VOLUME: f32 = 1.0;
pub const DEFAULT_PAN: f32 = 0.5;

/// Lighter cache value meaning "nothing sent yet"
const LIT_UNKNOWN: u8 = 0xFF;

/// Light values sent to a controller for the play state
pub const LIGHT_OFF: u8 = 0x00;
pub const LIGHT_PLAYING_INAUDIBLE: u8 = 0x20;
pub const LIGHT_WAITING: u8 = 0x40;
pub const LIGHT_ENDING: u8 = 0x60;
pub const LIGHT_ON: u8 = 0x7F;

// ────────────────────────────────────────────────────────────────────────────
// Shared per-channel state
// ────────────────────────────────────────────────────────────────────────────

/// Per-channel state mutated while rendering
///
/// Writers: the audio thread, except `has_actions` which the control thread
/// also clears when a channel's actions are deleted.
#[derive(Debug)]
pub struct ChannelState {
    play_status: AtomicU8,
    rec_status: AtomicU8,
    read_actions: AtomicBool,
    has_actions: AtomicBool,
    tracker: AtomicI64,
    offset: AtomicI64,
    rewinding: AtomicBool,
    volume_i: AtomicU32,
    lit_playing: AtomicU8,
    lit_mute: AtomicU8,
    lit_solo: AtomicU8,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            play_status: AtomicU8::new(PlayStatus::Off as u8),
            rec_status: AtomicU8::new(PlayStatus::Off as u8),
            read_actions: AtomicBool::new(false),
            has_actions: AtomicBool::new(false),
            tracker: AtomicI64::new(0),
            offset: AtomicI64::new(0),
            rewinding: AtomicBool::new(false),
            volume_i: AtomicU32::new(DEFAULT_VOLUME.to_bits()),
            lit_playing: AtomicU8::new(LIT_UNKNOWN),
            lit_mute: AtomicU8::new(LIT_UNKNOWN),
            lit_solo: AtomicU8::new(LIT_UNKNOWN),
        }
    }
}

impl ChannelState {
    #[inline]
    pub fn play_status(&self) -> PlayStatus {
        PlayStatus::from_u8(self.play_status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_play_status(&self, status: PlayStatus) {
        self.play_status.store(status as u8, Ordering::Release);
    }

    /// Action-reading status (follows the same OFF/WAIT/PLAY/ENDING machine)
    #[inline]
    pub fn rec_status(&self) -> PlayStatus {
        PlayStatus::from_u8(self.rec_status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_rec_status(&self, status: PlayStatus) {
        self.rec_status.store(status as u8, Ordering::Release);
    }

    #[inline]
    pub fn read_actions(&self) -> bool {
        self.read_actions.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_read_actions(&self, enabled: bool) {
        self.read_actions.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn has_actions(&self) -> bool {
        self.has_actions.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_has_actions(&self, value: bool) {
        self.has_actions.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn tracker(&self) -> Frame {
        self.tracker.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_tracker(&self, frame: Frame) {
        self.tracker.store(frame, Ordering::Relaxed);
    }

    /// Block offset the next render starts writing at
    #[inline]
    pub fn offset(&self) -> Frame {
        self.offset.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_offset(&self, frame: Frame) {
        self.offset.store(frame, Ordering::Relaxed);
    }

    #[inline]
    pub fn rewinding(&self) -> bool {
        self.rewinding.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_rewinding(&self, value: bool) {
        self.rewinding.store(value, Ordering::Relaxed);
    }

    /// Internal volume (velocity-as-volume), multiplied with the channel volume
    #[inline]
    pub fn volume_i(&self) -> f32 {
        f32::from_bits(self.volume_i.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_volume_i(&self, volume: f32) {
        self.volume_i.store(volume.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.play_status().is_playing()
    }

    /// Reading recorded actions (rec status PLAY or ENDING)
    #[inline]
    pub fn is_reading_actions(&self) -> bool {
        self.rec_status().is_playing()
    }

    /// Forget what the lighter last sent, so everything is re-sent
    pub fn reset_lights(&self) {
        self.lit_playing.store(LIT_UNKNOWN, Ordering::Relaxed);
        self.lit_mute.store(LIT_UNKNOWN, Ordering::Relaxed);
        self.lit_solo.store(LIT_UNKNOWN, Ordering::Relaxed);
    }

    /// Copy of the user-visible part of another state (for cloned channels)
    fn snapshot_of(other: &ChannelState) -> Self {
        let state = Self::default();
        state.set_has_actions(other.has_actions());
        state.set_tracker(other.tracker());
        state
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MIDI lights
// ────────────────────────────────────────────────────────────────────────────

/// Where a light message goes: status byte and note/controller number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightTarget {
    pub status: u8,
    pub data1: u8,
}

impl LightTarget {
    fn message(&self, value: u8) -> MidiMessage {
        MidiMessage::from_slice(&[self.status, self.data1, value])
    }
}

/// Controller lights that mirror a channel's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LightBindings {
    pub playing: Option<LightTarget>,
    pub mute: Option<LightTarget>,
    pub solo: Option<LightTarget>,
}

// ────────────────────────────────────────────────────────────────────────────
// Channel
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterBus {
    Out,
    In,
}

/// What a channel is, and the data of its sub-roles
#[derive(Clone)]
pub enum ChannelRole {
    Sample(SampleChannel),
    Midi(MidiChannel),
    Master(MasterBus),
    Preview(SampleChannel),
}

#[derive(Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub volume: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub armed: bool,
    pub plugins: Vec<PluginId>,
    pub lights: Option<LightBindings>,
    pub state: Shared<ChannelState>,
    pub role: ChannelRole,
}

impl Channel {
    fn with_role(id: ChannelId, name: impl Into<String>, role: ChannelRole) -> Self {
        Self {
            id,
            name: name.into(),
            volume: DEFAULT_VOLUME,
            pan: DEFAULT_PAN,
            mute: false,
            solo: false,
            armed: false,
            plugins: Vec::new(),
            lights: None,
            state: Shared::new(&gc_handle(), ChannelState::default()),
            role,
        }
    }

    pub fn sample(id: ChannelId, name: impl Into<String>, config: &EngineConfig) -> Self {
        let sample = SampleChannel {
            input_monitor: config.input_monitor_default_on,
            overdub_protection: config.overdub_protection_default_on,
            ..SampleChannel::default()
        };
        Self::with_role(id, name, ChannelRole::Sample(sample))
    }

    pub fn midi(id: ChannelId, name: impl Into<String>) -> Self {
        Self::with_role(id, name, ChannelRole::Midi(MidiChannel::default()))
    }

    pub fn master_out() -> Self {
        Self::with_role(ChannelId::MASTER_OUT, "Master Out", ChannelRole::Master(MasterBus::Out))
    }

    pub fn master_in() -> Self {
        Self::with_role(ChannelId::MASTER_IN, "Master In", ChannelRole::Master(MasterBus::In))
    }

    pub fn preview() -> Self {
        Self::with_role(
            ChannelId::PREVIEW,
            "Preview",
            ChannelRole::Preview(SampleChannel::default()),
        )
    }

    /// Copy of this channel under a new id, with its own runtime state
    ///
    /// The wave is shared; playback starts from OFF.
    pub fn duplicate(&self, id: ChannelId) -> Self {
        Self {
            id,
            name: format!("{} (copy)", self.name),
            state: Shared::new(&gc_handle(), ChannelState::snapshot_of(&self.state)),
            ..self.clone()
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.role {
            ChannelRole::Sample(_) => "sample",
            ChannelRole::Midi(_) => "midi",
            ChannelRole::Master(MasterBus::Out) => "master-out",
            ChannelRole::Master(MasterBus::In) => "master-in",
            ChannelRole::Preview(_) => "preview",
        }
    }

    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self.role, ChannelRole::Master(_) | ChannelRole::Preview(_))
    }

    /// Internal channels are never muted
    #[inline]
    pub fn is_muted(&self) -> bool {
        !self.is_internal() && self.mute
    }

    /// Whether this channel's output reaches the master bus
    pub fn is_audible(&self, has_solos: bool) -> bool {
        if self.is_internal() {
            return true;
        }
        if self.mute {
            return false;
        }
        !has_solos || self.solo
    }

    pub fn sample_data(&self) -> Option<&SampleChannel> {
        match &self.role {
            ChannelRole::Sample(s) | ChannelRole::Preview(s) => Some(s),
            _ => None,
        }
    }

    pub fn sample_data_mut(&mut self) -> Option<&mut SampleChannel> {
        match &mut self.role {
            ChannelRole::Sample(s) | ChannelRole::Preview(s) => Some(s),
            _ => None,
        }
    }

    pub fn midi_data(&self) -> Option<&MidiChannel> {
        match &self.role {
            ChannelRole::Midi(m) => Some(m),
            _ => None,
        }
    }

    pub fn midi_data_mut(&mut self) -> Option<&mut MidiChannel> {
        match &mut self.role {
            ChannelRole::Midi(m) => Some(m),
            _ => None,
        }
    }

    #[inline]
    pub fn has_wave(&self) -> bool {
        self.sample_data().is_some_and(SampleChannel::has_wave)
    }

    /// Armed sample channel that may receive a recorded wave
    pub fn can_input_rec(&self) -> bool {
        match &self.role {
            ChannelRole::Sample(s) => self.armed && (!s.has_wave() || !s.overdub_protection),
            _ => false,
        }
    }

    /// Sample channel whose presses may be recorded as actions
    pub fn can_action_rec(&self) -> bool {
        match &self.role {
            ChannelRole::Sample(s) => s.has_wave() && !s.mode.is_loop(),
            _ => false,
        }
    }

    // ── Audio-thread reactions ──────────────────────────────────────────────

    pub fn press(&self, ctx: &mut RtContext<'_>, velocity: u8) {
        match &self.role {
            ChannelRole::Sample(s) if s.has_wave() => {
                if ctx.can_record_sample(s) {
                    ctx.record(self, MidiEvent::new(super::midi::NOTE_ON, 0, 0));
                    if s.mode == SamplePlayerMode::SinglePress {
                        self.state.set_read_actions(false);
                    }
                }
                s.press(self.id, &self.state, ctx, velocity);
            }
            ChannelRole::Preview(s) if s.has_wave() => s.press(self.id, &self.state, ctx, velocity),
            ChannelRole::Midi(m) => m.press(&self.state),
            _ => {}
        }
    }

    pub fn release(&self, ctx: &mut RtContext<'_>) {
        match &self.role {
            ChannelRole::Sample(s) if s.has_wave() => {
                if s.mode == SamplePlayerMode::SinglePress && ctx.can_record_sample(s) {
                    ctx.record(self, MidiEvent::new(super::midi::NOTE_OFF, 0, 0));
                }
                s.release(self.id, &self.state, ctx);
            }
            ChannelRole::Preview(s) if s.has_wave() => s.release(self.id, &self.state, ctx),
            _ => {}
        }
    }

    pub fn kill(&self, ctx: &mut RtContext<'_>) {
        match &self.role {
            ChannelRole::Sample(s) if s.has_wave() => {
                if ctx.can_record_sample(s) {
                    ctx.record(self, MidiEvent::note_kill());
                }
                s.kill(&self.state);
            }
            ChannelRole::Preview(s) if s.has_wave() => s.kill(&self.state),
            ChannelRole::Midi(m) => m.kill(&self.state, self.is_muted(), ctx.outbox),
            _ => {}
        }
    }

    pub fn on_sequencer_stop(&self, ctx: &mut RtContext<'_>) {
        match &self.role {
            ChannelRole::Sample(s) | ChannelRole::Preview(s) if s.has_wave() => {
                s.on_sequencer_stop(&self.state, &ctx.layout.config)
            }
            ChannelRole::Midi(m) => m.kill(&self.state, self.is_muted(), ctx.outbox),
            _ => {}
        }
    }

    /// Immediate sequencer rewind (no quantization)
    pub fn on_sequencer_rewind(&self, ctx: &mut RtContext<'_>) {
        if let ChannelRole::Midi(m) = &self.role {
            m.on_rewind(&self.state, self.is_muted(), ctx.outbox);
        }
    }

    pub fn toggle_read_actions(&self, ctx: &mut RtContext<'_>) {
        if let ChannelRole::Sample(s) = &self.role {
            if s.has_wave() {
                s.toggle_read_actions(&self.state, ctx.layout);
            }
        }
    }

    /// Drop out of action reading at once (meaningful with recs-as-loops on)
    pub fn kill_read_actions(&self, ctx: &mut RtContext<'_>) {
        if !ctx.layout.config.treat_recs_as_loops || !self.has_wave() {
            return;
        }
        self.state.set_rec_status(PlayStatus::Off);
        self.state.set_read_actions(false);
    }

    /// Live MIDI addressed to this channel
    pub fn receive_midi(&self, ctx: &mut RtContext<'_>, event: MidiEvent) {
        if let ChannelRole::Midi(m) = &self.role {
            m.receive(self.id, event, ctx.midi_in);
            if ctx.can_record() {
                ctx.record(self, event.with_channel(0));
            }
        }
    }

    /// A quantized action armed by this channel reached its boundary
    pub fn on_quantized(&self, action: QuantizedAction, delta: Frame) {
        let Some(s) = self.sample_data() else {
            return;
        };
        match action {
            QuantizedAction::ChannelPlay(_) => {
                self.state.set_offset(delta);
                self.state.set_play_status(PlayStatus::Play);
            }
            QuantizedAction::ChannelRewind(_) => s.rewind(&self.state, delta),
            QuantizedAction::SequencerRewind => {}
        }
    }

    /// React to the timeline events of the current block, in order
    pub fn advance(&self, ctx: &mut RtContext<'_>, events: &[SequencerEvent]) {
        for event in events {
            match &self.role {
                ChannelRole::Sample(s) | ChannelRole::Preview(s) if s.has_wave() => {
                    s.advance(self.id, &self.state, &ctx.layout.actions, event)
                }
                ChannelRole::Midi(m) => m.advance(
                    self.id,
                    &self.state,
                    self.is_muted(),
                    &ctx.layout.actions,
                    event,
                    ctx.outbox,
                    ctx.midi_in,
                ),
                _ => {}
            }
        }
    }

    /// Render this channel's own audio into `scratch`
    ///
    /// Sample playback, then line-in pass-through, then the plugin stack.
    /// Buses are rendered by the mixer, not here.
    pub fn render(
        &self,
        scratch: &mut StereoBuffer,
        input: &StereoBuffer,
        seq_running: bool,
        plugins: Option<&mut (dyn PluginHost + 'static)>,
        midi: &[MidiEvent],
    ) {
        scratch.fill_silence();
        match &self.role {
            ChannelRole::Sample(s) => {
                s.render(&self.state, scratch, seq_running);
                if self.armed && s.input_monitor {
                    scratch.sum(input, 1.0);
                }
            }
            ChannelRole::Preview(s) => s.render(&self.state, scratch, seq_running),
            ChannelRole::Midi(_) | ChannelRole::Master(_) => {}
        }
        if let Some(host) = plugins {
            if !self.plugins.is_empty() {
                host.process(self.id, &self.plugins, scratch, midi);
            }
        }
    }

    /// Gain pair used when summing into the master bus
    pub fn output_gain(&self) -> (Sample, PanGain) {
        (self.volume * self.state.volume_i(), PanGain::from_pan(self.pan))
    }

    /// Send light updates for whatever changed since the last call
    pub fn update_lights(&self, audible: bool, outbox: &mut Outbox) {
        let Some(lights) = &self.lights else {
            return;
        };
        if let Some(target) = lights.playing {
            let value = match self.state.play_status() {
                PlayStatus::Off => LIGHT_OFF,
                PlayStatus::Wait => LIGHT_WAITING,
                PlayStatus::Ending => LIGHT_ENDING,
                PlayStatus::Play if audible => LIGHT_ON,
                PlayStatus::Play => LIGHT_PLAYING_INAUDIBLE,
            };
            send_light_if_changed(&self.state.lit_playing, target, value, outbox);
        }
        if let Some(target) = lights.mute {
            let value = if self.mute { LIGHT_ON } else { LIGHT_OFF };
            send_light_if_changed(&self.state.lit_mute, target, value, outbox);
        }
        if let Some(target) = lights.solo {
            let value = if self.solo { LIGHT_ON } else { LIGHT_OFF };
            send_light_if_changed(&self.state.lit_solo, target, value, outbox);
        }
    }
}

fn send_light_if_changed(cache: &AtomicU8, target: LightTarget, value: u8, outbox: &mut Outbox) {
    if cache.load(Ordering::Relaxed) == value {
        return;
    }
    if outbox.midi(target.message(value)) {
        cache.store(value, Ordering::Relaxed);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Audio-thread context
// ────────────────────────────────────────────────────────────────────────────

/// What a channel may touch while reacting on the audio thread
pub struct RtContext<'a> {
    pub layout: &'a Layout,
    pub quantizer: &'a mut Quantizer,
    pub outbox: &'a mut Outbox,
    pub midi_in: &'a mut MidiInBuffer,
}

impl RtContext<'_> {
    /// Action recording is on and allowed right now
    pub fn can_record(&self) -> bool {
        self.layout.recorder.recording_actions
            && self.layout.sequencer.is_running()
            && !self.layout.recorder.recording_input
    }

    fn can_record_sample(&self, sample: &SampleChannel) -> bool {
        self.can_record() && !sample.mode.is_loop()
    }

    /// Record an action at the (quantized) current frame
    ///
    /// The action reaches the layout through the control thread.
    pub fn record(&mut self, channel: &Channel, event: MidiEvent) {
        let sequencer = &self.layout.sequencer;
        let frame = sequencer.quantize(sequencer.current_frame());
        let action = Action::new(channel.id, frame, event);
        if self.outbox.feedback(EngineFeedback::ActionRecorded(action)) {
            channel.state.set_has_actions(true);
        }
    }
}

/// Actions of `channel` stored at the loop frame of an ACTIONS event
pub(crate) fn channel_actions<'a>(
    actions: &'a ActionMap,
    channel: ChannelId,
    global: Frame,
) -> impl Iterator<Item = &'a Action> {
    actions.at(global).iter().filter(move |a| a.channel == channel)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::engine::event::outbox_pair;
    use crate::engine::midi::MidiMessage;
    use crate::types::StereoSample;

    /// Everything a channel test needs to build an [`RtContext`]
    pub struct Rig {
        pub layout: Layout,
        pub quantizer: Quantizer,
        pub outbox: Outbox,
        pub midi_in: MidiInBuffer,
        pub feedback: rtrb::Consumer<EngineFeedback>,
        pub midi_out: rtrb::Consumer<MidiMessage>,
    }

    impl Rig {
        pub fn new(sample_rate: u32) -> Self {
            let (outbox, feedback, midi_out) = outbox_pair();
            Self {
                layout: Layout::new(sample_rate, EngineConfig::default()),
                quantizer: Quantizer::new(),
                outbox,
                midi_in: MidiInBuffer::new(),
                feedback,
                midi_out,
            }
        }

        pub fn ctx(&mut self) -> RtContext<'_> {
            RtContext {
                layout: &self.layout,
                quantizer: &mut self.quantizer,
                outbox: &mut self.outbox,
                midi_in: &mut self.midi_in,
            }
        }

        pub fn sent_midi(&mut self) -> Vec<Vec<u8>> {
            let mut out = Vec::new();
            while let Ok(msg) = self.midi_out.pop() {
                out.push(msg.as_bytes().to_vec());
            }
            out
        }
    }

    /// A sample channel holding a ramp wave of `len` frames
    pub fn sample_channel(id: u32, mode: SamplePlayerMode, len: usize) -> Channel {
        let mut channel = Channel::sample(ChannelId(id), "test", &EngineConfig::default());
        let data = (0..len)
            .map(|i| StereoSample::mono((i + 1) as f32))
            .collect::<Vec<_>>();
        let wave = Wave::new("ramp", StereoBuffer::from_vec(data), 48000);
        if let Some(s) = channel.sample_data_mut() {
            s.set_wave(Shared::new(&gc_handle(), wave));
            s.mode = mode;
        }
        channel
    }
}
