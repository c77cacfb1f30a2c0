//! Control-thread handle to the engine
//!
//! [`EngineHandle`] is the only way UI, MIDI and CLI code talks to the
//! engine. It is `Send + Sync`; share it behind an `Arc`.
//!
//! - Fast intents (presses, transport) are queued as [`EngineCommand`]s.
//! - Structural and parameter changes are layout edits on the model store.
//! - [`EngineHandle::poll`] drains the audio thread's feedback, applies the
//!   control-side consequences (merging recorded actions, finalizing input
//!   recordings) and broadcasts [`EngineEvent`]s.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use basedrop::{Owned, Shared};
use crossbeam::channel::Receiver;

use super::actions::Action;
use super::channel::{Channel, LightBindings, SamplePlayerMode, Wave};
use super::command::{command_channel, EngineCommand};
use super::engine::AudioEngine;
use super::error::{EngineError, EngineResult};
use super::event::{outbox_pair, EngineEvent, EngineFeedback, EventBus};
use super::gc::gc_handle;
use super::midi::{MidiEvent, MidiMessage, MAX_VELOCITY};
use super::model::{Layout, ModelStore, SwapType};
use super::plugin::PluginId;
use super::sync::TransportState;
use crate::config::{EngineConfig, InputRecMode, RecTriggerMode};
use crate::types::{ChannelId, Frame, Peak, SeqStatus, StereoBuffer};

/// Consumer end of the outbound MIDI ring, drained by the MIDI output worker
pub type MidiOutConsumer = rtrb::Consumer<MidiMessage>;

/// Kind of user channel to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Sample,
    Midi,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Sample => f.write_str("sample"),
            ChannelKind::Midi => f.write_str("midi"),
        }
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sample" | "audio" => Ok(ChannelKind::Sample),
            "midi" => Ok(ChannelKind::Midi),
            other => Err(format!("unknown channel kind '{}'", other)),
        }
    }
}

/// Create an engine and its control handle
///
/// The [`AudioEngine`] goes to the audio callback, the handle to control
/// threads, and the MIDI consumer to the MIDI output worker.
pub fn create_engine(
    config: EngineConfig,
    sample_rate: u32,
) -> (AudioEngine, EngineHandle, MidiOutConsumer) {
    let model = Arc::new(ModelStore::new(Layout::new(sample_rate, config)));
    let (command_tx, command_rx) = command_channel();
    let (outbox, feedback_rx, midi_rx) = outbox_pair();
    let dropped_feedback = outbox.dropped_feedback();

    let engine = AudioEngine::new(Arc::clone(&model), command_rx, outbox);
    let handle = EngineHandle {
        model,
        commands: Mutex::new(command_tx),
        feedback: Mutex::new(feedback_rx),
        dropped_feedback,
        events: EventBus::default(),
        pending_signal: AtomicBool::new(false),
        takes: AtomicU32::new(0),
        next_action_id: AtomicU32::new(1),
    };
    (engine, handle, midi_rx)
}

pub struct EngineHandle {
    model: Arc<ModelStore>,
    commands: Mutex<rtrb::Producer<EngineCommand>>,
    feedback: Mutex<rtrb::Consumer<EngineFeedback>>,
    /// Feedback the audio thread could not queue
    dropped_feedback: Arc<AtomicU32>,
    events: EventBus,
    /// Input recording armed, waiting for the signal threshold
    pending_signal: AtomicBool,
    /// Recorded takes, for wave names
    takes: AtomicU32,
    next_action_id: AtomicU32,
}

impl EngineHandle {
    // ─────────────────────────────────────────────────────────────
    // Queue plumbing
    // ─────────────────────────────────────────────────────────────

    fn send(&self, command: EngineCommand) -> EngineResult<()> {
        let name = command.name();
        let pushed = self
            .commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command)
            .is_ok();
        if !pushed {
            log::warn!("Engine command queue full, dropping {}", name);
            self.events.publish(EngineEvent::CommandDropped(name));
            return Err(EngineError::QueueFull(name));
        }
        Ok(())
    }

    /// Edit the layout and tell subscribers about it
    fn edit<R>(&self, swap: SwapType, f: impl FnOnce(&mut Layout) -> R) -> R {
        let result = self.model.edit(swap, f);
        if swap.notifies() {
            self.events.publish(EngineEvent::LayoutChanged {
                generation: self.model.generation(),
            });
        }
        result
    }

    /// Edit one channel; fails without touching the layout if it is missing
    fn edit_channel<R>(
        &self,
        id: ChannelId,
        swap: SwapType,
        f: impl FnOnce(&mut Channel) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.require_channel(id)?;
        self.edit(swap, |layout| match layout.channel_mut(id) {
            Some(channel) => f(channel),
            None => Err(EngineError::ChannelNotFound(id)),
        })
    }

    /// Edit one user (non-internal) channel
    fn edit_user_channel<R>(
        &self,
        id: ChannelId,
        swap: SwapType,
        f: impl FnOnce(&mut Channel) -> EngineResult<R>,
    ) -> EngineResult<R> {
        if id.is_internal() {
            return Err(EngineError::InternalChannel(id));
        }
        self.edit_channel(id, swap, f)
    }

    fn require_channel(&self, id: ChannelId) -> EngineResult<()> {
        if self.model.read(|layout| layout.channel(id).is_some()) {
            Ok(())
        } else {
            Err(EngineError::ChannelNotFound(id))
        }
    }

    fn next_action_id(&self) -> u32 {
        self.next_action_id.fetch_add(1, Ordering::Relaxed)
    }

    // ─────────────────────────────────────────────────────────────
    // Channel intents (queued)
    // ─────────────────────────────────────────────────────────────

    pub fn press(&self, channel: ChannelId, velocity: u8) -> EngineResult<()> {
        self.require_channel(channel)?;
        self.send(EngineCommand::KeyPress {
            channel,
            velocity: velocity.min(MAX_VELOCITY),
        })
    }

    pub fn release(&self, channel: ChannelId) -> EngineResult<()> {
        self.require_channel(channel)?;
        self.send(EngineCommand::KeyRelease { channel })
    }

    pub fn kill(&self, channel: ChannelId) -> EngineResult<()> {
        self.require_channel(channel)?;
        self.send(EngineCommand::KeyKill { channel })
    }

    pub fn toggle_read_actions(&self, channel: ChannelId) -> EngineResult<()> {
        self.require_channel(channel)?;
        self.send(EngineCommand::ToggleReadActions { channel })
    }

    pub fn kill_read_actions(&self, channel: ChannelId) -> EngineResult<()> {
        self.require_channel(channel)?;
        self.send(EngineCommand::KillReadActions { channel })
    }

    /// Live MIDI for a MIDI channel
    pub fn send_midi(&self, channel: ChannelId, event: MidiEvent) -> EngineResult<()> {
        self.require_channel(channel)?;
        self.send(EngineCommand::ChannelMidi { channel, event })
    }

    // ─────────────────────────────────────────────────────────────
    // Transport (queued)
    // ─────────────────────────────────────────────────────────────

    pub fn start(&self) -> EngineResult<()> {
        self.send(EngineCommand::SequencerStart)
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.send(EngineCommand::SequencerStop)
    }

    pub fn toggle_play(&self) -> EngineResult<()> {
        if self.status() == SeqStatus::Stopped {
            self.start()
        } else {
            self.stop()
        }
    }

    pub fn rewind(&self) -> EngineResult<()> {
        self.send(EngineCommand::SequencerRewind)
    }

    /// Rewind and count in one loop before running
    pub fn start_with_preroll(&self) -> EngineResult<()> {
        self.send(EngineCommand::SequencerPreroll)
    }

    pub fn set_metronome(&self, enabled: bool) -> EngineResult<()> {
        self.send(EngineCommand::SetMetronome(enabled))
    }

    pub fn toggle_metronome(&self) -> EngineResult<bool> {
        let enabled = !self.model.current().sequencer.state.metronome();
        self.set_metronome(enabled)?;
        Ok(enabled)
    }

    /// Forward an external transport state (e.g. polled from a sync master)
    pub fn external_transport(&self, state: TransportState) -> EngineResult<()> {
        self.send(EngineCommand::ExternalTransport(state))
    }

    // ─────────────────────────────────────────────────────────────
    // Timing
    // ─────────────────────────────────────────────────────────────

    /// Change the tempo; recorded actions keep their musical position
    ///
    /// Refused while input is being recorded. Returns the applied bpm.
    pub fn set_bpm(&self, bpm: f32) -> EngineResult<f32> {
        if self.is_recording_input() {
            return Err(EngineError::InputRecording);
        }
        Ok(self.apply_bpm(bpm))
    }

    fn apply_bpm(&self, bpm: f32) -> f32 {
        let applied = self.edit(SwapType::Hard, |layout| {
            let old_loop = layout.sequencer.frames_in_loop.max(1);
            let applied = layout.sequencer.set_bpm(bpm);
            let new_loop = layout.sequencer.frames_in_loop;
            layout
                .actions
                .rescale(new_loop as f64 / old_loop as f64, new_loop);
            applied
        });
        log::info!("Tempo set to {:.2} bpm", applied);
        self.events.publish(EngineEvent::BpmChanged(applied));
        applied
    }

    pub fn set_beats(&self, beats: u32, bars: u32) -> EngineResult<()> {
        if self.is_recording_input() {
            return Err(EngineError::InputRecording);
        }
        self.edit(SwapType::Hard, |layout| layout.sequencer.set_beats(beats, bars));
        Ok(())
    }

    /// Double the loop length
    pub fn multiply_beats(&self) -> EngineResult<()> {
        let (beats, bars) = self.model.read(|l| (l.sequencer.beats, l.sequencer.bars));
        self.set_beats(beats * 2, bars)
    }

    /// Halve the loop length
    pub fn divide_beats(&self) -> EngineResult<()> {
        let (beats, bars) = self.model.read(|l| (l.sequencer.beats, l.sequencer.bars));
        self.set_beats((beats / 2).max(1), bars)
    }

    /// Subdivisions per beat, 0 = off
    pub fn set_quantize(&self, quantize: u32) {
        self.edit(SwapType::Soft, |layout| layout.sequencer.set_quantize(quantize));
    }

    // ─────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────

    pub fn add_channel(&self, kind: ChannelKind) -> ChannelId {
        let id = self.edit(SwapType::Hard, |layout| {
            let id = next_channel_id(layout);
            let name = format!("{} {}", kind, id);
            let channel = match kind {
                ChannelKind::Sample => Channel::sample(id, name, &layout.config),
                ChannelKind::Midi => Channel::midi(id, name),
            };
            layout.channels.push(channel);
            id
        });
        log::info!("Added {} channel {}", kind, id);
        id
    }

    /// Remove a channel together with its recorded actions
    pub fn remove_channel(&self, id: ChannelId) -> EngineResult<()> {
        if id.is_internal() {
            return Err(EngineError::InternalChannel(id));
        }
        self.require_channel(id)?;
        self.edit(SwapType::Hard, |layout| {
            layout.channels.retain(|c| c.id != id);
            layout.actions.clear_channel(id);
            layout.update_solos();
        });
        log::info!("Removed channel {}", id);
        Ok(())
    }

    /// Duplicate a channel, its wave and its recorded actions
    pub fn clone_channel(&self, id: ChannelId) -> EngineResult<ChannelId> {
        if id.is_internal() {
            return Err(EngineError::InternalChannel(id));
        }
        self.require_channel(id)?;
        self.edit(SwapType::Hard, |layout| {
            let new_id = next_channel_id(layout);
            let Some(index) = layout.channels.iter().position(|c| c.id == id) else {
                return Err(EngineError::ChannelNotFound(id));
            };
            let copy = layout.channels[index].duplicate(new_id);
            layout.channels.insert(index + 1, copy);
            layout
                .actions
                .clone_channel(id, new_id, || self.next_action_id());
            layout.update_solos();
            Ok(new_id)
        })
    }

    pub fn rename_channel(&self, id: ChannelId, name: impl Into<String>) -> EngineResult<()> {
        let name = name.into();
        self.edit_user_channel(id, SwapType::None, |channel| {
            channel.name = name;
            Ok(())
        })
    }

    pub fn set_mute(&self, id: ChannelId, mute: bool) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            channel.mute = mute;
            Ok(())
        })
    }

    pub fn toggle_mute(&self, id: ChannelId) -> EngineResult<bool> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            channel.mute = !channel.mute;
            Ok(channel.mute)
        })
    }

    pub fn set_solo(&self, id: ChannelId, solo: bool) -> EngineResult<()> {
        self.edit_solo(id, |_| solo).map(|_| ())
    }

    pub fn toggle_solo(&self, id: ChannelId) -> EngineResult<bool> {
        self.edit_solo(id, |solo| !solo)
    }

    fn edit_solo(&self, id: ChannelId, f: impl FnOnce(bool) -> bool) -> EngineResult<bool> {
        if id.is_internal() {
            return Err(EngineError::InternalChannel(id));
        }
        self.require_channel(id)?;
        self.edit(SwapType::Soft, |layout| {
            let channel = layout
                .channel_mut(id)
                .ok_or(EngineError::ChannelNotFound(id))?;
            channel.solo = f(channel.solo);
            let solo = channel.solo;
            layout.update_solos();
            Ok(solo)
        })
    }

    /// Arm a sample channel for input recording
    pub fn set_arm(&self, id: ChannelId, armed: bool) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            require_sample(channel)?;
            channel.armed = armed;
            Ok(())
        })
    }

    pub fn toggle_arm(&self, id: ChannelId) -> EngineResult<bool> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            require_sample(channel)?;
            channel.armed = !channel.armed;
            Ok(channel.armed)
        })
    }

    /// Channel volume, clamped to 0..=1 (master channels included)
    pub fn set_volume(&self, id: ChannelId, volume: f32) -> EngineResult<()> {
        self.edit_channel(id, SwapType::Soft, |channel| {
            channel.volume = clamp_unit(volume);
            Ok(())
        })
    }

    /// Channel pan, clamped to 0..=1 (0.5 = center)
    pub fn set_pan(&self, id: ChannelId, pan: f32) -> EngineResult<()> {
        self.edit_channel(id, SwapType::Soft, |channel| {
            channel.pan = clamp_unit(pan);
            Ok(())
        })
    }

    /// Replace the wave of a sample (or the preview) channel
    pub fn set_wave(&self, id: ChannelId, wave: Wave) -> EngineResult<()> {
        self.require_channel(id)?;
        let name = wave.name.clone();
        let wave = Shared::new(&gc_handle(), wave);
        {
            let mut layout = self.model.lock_data();
            let channel = layout
                .channel_mut(id)
                .ok_or(EngineError::ChannelNotFound(id))?;
            match channel.sample_data_mut() {
                Some(sample) => sample.set_wave(wave),
                None => return Err(wrong_kind(id, "sample")),
            }
        }
        self.events.publish(EngineEvent::LayoutChanged {
            generation: self.model.generation(),
        });
        log::info!("Channel {} now plays '{}'", id, name);
        Ok(())
    }

    pub fn clear_wave(&self, id: ChannelId) -> EngineResult<()> {
        self.edit_channel(id, SwapType::Hard, |channel| {
            sample_mut(channel)?.clear_wave();
            Ok(())
        })
    }

    pub fn set_mode(&self, id: ChannelId, mode: SamplePlayerMode) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            sample_mut(channel)?.mode = mode;
            Ok(())
        })
    }

    /// Play only `begin..end` of the wave
    pub fn set_begin_end(&self, id: ChannelId, begin: Frame, end: Frame) -> EngineResult<()> {
        self.edit_channel(id, SwapType::Soft, |channel| {
            let sample = sample_mut(channel)?;
            let len = sample.wave.as_ref().map_or(0, |w| w.len());
            if begin < 0 || end > len || begin >= end {
                return Err(EngineError::InvalidRange { begin, end, len });
            }
            sample.set_begin_end(begin, end);
            Ok(())
        })
    }

    pub fn set_velocity_as_vol(&self, id: ChannelId, enabled: bool) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            sample_mut(channel)?.velocity_as_vol = enabled;
            Ok(())
        })
    }

    pub fn set_input_monitor(&self, id: ChannelId, enabled: bool) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            sample_mut(channel)?.input_monitor = enabled;
            Ok(())
        })
    }

    pub fn set_overdub_protection(&self, id: ChannelId, enabled: bool) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            let sample = sample_mut(channel)?;
            sample.overdub_protection = enabled;
            // A protected channel that already holds a wave cannot stay armed
            if enabled && sample.has_wave() {
                channel.armed = false;
            }
            Ok(())
        })
    }

    /// Output MIDI channel (0-15) of a MIDI channel; `None` disables output
    pub fn set_midi_out_channel(&self, id: ChannelId, out: Option<u8>) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            let midi = channel.midi_data_mut().ok_or_else(|| wrong_kind(id, "midi"))?;
            midi.out_enabled = out.is_some();
            midi.out_channel = out.unwrap_or(midi.out_channel).min(15);
            Ok(())
        })
    }

    /// Input MIDI channel a MIDI channel listens on; `None` listens to all
    pub fn set_midi_in_channel(&self, id: ChannelId, input: Option<u8>) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            let midi = channel.midi_data_mut().ok_or_else(|| wrong_kind(id, "midi"))?;
            midi.in_channel = input.map(|ch| ch.min(15));
            Ok(())
        })
    }

    /// Controller lights mirroring this channel; everything is re-sent
    pub fn set_light_bindings(
        &self,
        id: ChannelId,
        lights: Option<LightBindings>,
    ) -> EngineResult<()> {
        self.edit_user_channel(id, SwapType::Soft, |channel| {
            channel.lights = lights;
            channel.state.reset_lights();
            Ok(())
        })
    }

    /// Plugin stack run by the installed plugin host
    pub fn set_plugins(&self, id: ChannelId, plugins: Vec<PluginId>) -> EngineResult<()> {
        self.edit_channel(id, SwapType::Hard, |channel| {
            channel.plugins = plugins;
            Ok(())
        })
    }

    /// Delete a channel's recorded actions
    pub fn clear_actions(&self, id: ChannelId) -> EngineResult<()> {
        self.require_channel(id)?;
        self.edit(SwapType::Hard, |layout| {
            layout.actions.clear_channel(id);
            if let Some(channel) = layout.channel(id) {
                channel.state.set_has_actions(false);
            }
        });
        Ok(())
    }

    pub fn clear_all_actions(&self) {
        self.edit(SwapType::Hard, |layout| {
            layout.actions.clear_all();
            for channel in &layout.channels {
                channel.state.set_has_actions(false);
            }
        });
    }

    pub fn set_in_to_out(&self, enabled: bool) {
        self.edit(SwapType::Soft, |layout| layout.mixer.in_to_out = enabled);
    }

    pub fn set_limit_output(&self, enabled: bool) {
        self.edit(SwapType::Soft, |layout| layout.mixer.limit_output = enabled);
    }

    pub fn set_rec_trigger_mode(&self, mode: RecTriggerMode) {
        self.edit(SwapType::None, |layout| layout.config.rec_trigger_mode = mode);
    }

    pub fn set_input_rec_mode(&self, mode: InputRecMode) -> EngineResult<()> {
        if self.is_recording_input() {
            return Err(EngineError::InputRecording);
        }
        self.edit(SwapType::Soft, |layout| {
            layout.config.input_rec_mode = mode;
            layout.recorder.input_rec_mode = mode;
        });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Recorder
    // ─────────────────────────────────────────────────────────────

    pub fn is_recording_actions(&self) -> bool {
        self.model.read(|layout| layout.recorder.recording_actions)
    }

    /// Recording input, or waiting for the signal to start it
    pub fn is_recording_input(&self) -> bool {
        self.pending_signal.load(Ordering::Relaxed)
            || self.model.read(|layout| layout.recorder.recording_input)
    }

    /// Record presses as actions; starts the sequencer if needed
    pub fn start_action_recording(&self) -> EngineResult<()> {
        if self.is_recording_actions() {
            return Ok(());
        }
        self.edit(SwapType::Soft, |layout| layout.recorder.recording_actions = true);
        if self.status() != SeqStatus::Running {
            self.start()?;
        }
        log::info!("Action recording started");
        self.events.publish(EngineEvent::ActionRecordingChanged(true));
        Ok(())
    }

    /// Stop recording actions; channels that just got some start reading them
    pub fn stop_action_recording(&self) -> EngineResult<()> {
        if !self.is_recording_actions() {
            return Ok(());
        }
        let to_read = self.edit(SwapType::Soft, |layout| {
            layout.recorder.recording_actions = false;
            layout
                .user_channels()
                .filter(|c| c.state.has_actions() && !c.state.read_actions())
                .map(|c| c.id)
                .collect::<Vec<_>>()
        });
        for channel in to_read {
            self.send(EngineCommand::ToggleReadActions { channel })?;
        }
        log::info!("Action recording stopped");
        self.events.publish(EngineEvent::ActionRecordingChanged(false));
        Ok(())
    }

    pub fn toggle_action_recording(&self) -> EngineResult<bool> {
        if self.is_recording_actions() {
            self.stop_action_recording()?;
            Ok(false)
        } else {
            self.start_action_recording()?;
            Ok(true)
        }
    }

    /// Record the line-in into every armed sample channel
    ///
    /// With the signal trigger and a stopped sequencer, recording starts
    /// when the input crosses the trigger level.
    pub fn start_input_recording(&self) -> EngineResult<()> {
        if self.is_recording_input() {
            return Ok(());
        }
        let (has_target, trigger, active) = self.model.read(|layout| {
            (
                layout.user_channels().any(Channel::can_input_rec),
                layout.config.rec_trigger_mode,
                layout.sequencer.is_active(),
            )
        });
        if !has_target {
            return Err(EngineError::NothingToRecord);
        }

        if trigger == RecTriggerMode::Signal && !active {
            self.send(EngineCommand::ArmSignalTrigger)?;
            self.pending_signal.store(true, Ordering::Relaxed);
            log::info!("Input recording armed, waiting for signal");
            self.events.publish(EngineEvent::InputRecordingChanged(true));
            return Ok(());
        }

        self.begin_input_recording(false)?;
        self.events.publish(EngineEvent::InputRecordingChanged(true));
        Ok(())
    }

    /// Install the record buffer and get the sequencer where it must be
    fn begin_input_recording(&self, triggered: bool) -> EngineResult<()> {
        let (mode, frames, active) = self.model.read(|layout| {
            let mode = layout.recorder.input_rec_mode;
            let frames = match mode {
                InputRecMode::Rigid => layout.sequencer.frames_in_loop,
                InputRecMode::Free => layout.sequencer.max_frames_in_loop(),
            };
            (mode, frames, layout.sequencer.is_active())
        });
        let buffer = Owned::new(&gc_handle(), StereoBuffer::silence(frames.max(1) as usize));

        self.edit(SwapType::Soft, |layout| layout.recorder.recording_input = true);

        if triggered || mode == InputRecMode::Free {
            // The recording defines the loop start
            self.send(EngineCommand::StartInputRec { buffer, from_start: true })?;
            self.rewind()?;
            self.start()?;
        } else if !active {
            self.start_with_preroll()?;
            self.send(EngineCommand::StartInputRec { buffer, from_start: true })?;
        } else {
            self.send(EngineCommand::StartInputRec { buffer, from_start: false })?;
        }
        log::info!("Input recording started ({:?}, {} frames max)", mode, frames);
        Ok(())
    }

    /// Stop recording; the wave is assigned once the buffer comes back
    pub fn stop_input_recording(&self) -> EngineResult<()> {
        if self.pending_signal.swap(false, Ordering::Relaxed) {
            self.send(EngineCommand::DisarmSignalTrigger)?;
            log::info!("Signal-triggered recording cancelled");
            self.events.publish(EngineEvent::InputRecordingChanged(false));
            return Ok(());
        }
        if !self.model.read(|layout| layout.recorder.recording_input) {
            return Err(EngineError::NotRecording);
        }
        self.edit(SwapType::Soft, |layout| layout.recorder.recording_input = false);
        self.send(EngineCommand::StopInputRec)?;
        log::info!("Input recording stopped");
        self.events.publish(EngineEvent::InputRecordingChanged(false));
        Ok(())
    }

    pub fn toggle_input_recording(&self) -> EngineResult<bool> {
        if self.is_recording_input() {
            self.stop_input_recording()?;
            Ok(false)
        } else {
            self.start_input_recording()?;
            Ok(true)
        }
    }

    /// Turn a returned record buffer into waves on the armed channels
    fn finalize_input_recording(&self, buffer: Owned<StereoBuffer>, frames: Frame) {
        let (mode, frames_in_loop, sample_rate) = self.model.read(|layout| {
            (
                layout.recorder.input_rec_mode,
                layout.sequencer.frames_in_loop,
                layout.sequencer.sample_rate,
            )
        });
        let len = match mode {
            InputRecMode::Rigid => frames_in_loop,
            InputRecMode::Free => frames,
        }
        .clamp(0, buffer.len() as Frame) as usize;
        if len == 0 {
            log::warn!("Input recording produced no audio, discarded");
            return;
        }

        if mode == InputRecMode::Free {
            let bpm = self.model.read(|layout| layout.sequencer.calc_bpm_from_rec(len as Frame));
            self.apply_bpm(bpm);
        }

        let data = StereoBuffer::from_vec(buffer.as_slice()[..len].to_vec());
        drop(buffer);
        let take = self.takes.fetch_add(1, Ordering::Relaxed) + 1;

        let (recorded, to_start) = self.edit(SwapType::Hard, |layout| {
            let running = layout.sequencer.is_running();
            let mut recorded = Vec::new();
            let mut to_start = Vec::new();
            for channel in layout.channels.iter_mut().filter(|c| c.can_input_rec()) {
                let playing = channel.state.is_playing();
                let Some(sample) = channel.sample_data_mut() else {
                    continue;
                };
                let wave = match &sample.wave {
                    Some(existing) => overdub(existing, &data),
                    None => Wave::new(format!("TAKE-{}", take), data.clone(), sample_rate),
                };
                sample.set_wave(Shared::new(&gc_handle(), wave));
                let is_loop = sample.mode.is_loop();
                let protect = sample.overdub_protection;
                if protect {
                    channel.armed = false;
                }
                if is_loop && running && !playing {
                    to_start.push(channel.id);
                }
                recorded.push(channel.id);
            }
            (recorded, to_start)
        });

        // Fresh loops join on the next loop point
        for channel in to_start {
            if let Err(e) = self.send(EngineCommand::KeyPress {
                channel,
                velocity: MAX_VELOCITY,
            }) {
                log::warn!("Could not start recorded channel {}: {}", channel, e);
            }
        }

        log::info!("Recorded {} frames into {} channel(s)", len, recorded.len());
        self.events.publish(EngineEvent::InputRecorded {
            frames: len as Frame,
            channels: recorded,
        });
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Back to an empty session: no user channels, no actions, stopped
    ///
    /// Rendering is paused for the duration of the swap.
    pub fn reset(&self) -> EngineResult<()> {
        self.pending_signal.store(false, Ordering::Relaxed);
        {
            let _pause = self.model.pause_rendering();
            self.edit(SwapType::Hard, |layout| {
                let generation = layout.generation;
                *layout = Layout::new(layout.sequencer.sample_rate, layout.config.clone());
                layout.generation = generation;
            });
        }
        log::info!("Engine reset");
        self.send(EngineCommand::Reset)
    }

    /// Apply everything the audio thread reported since the last poll
    ///
    /// Call regularly from a control thread (every ~20 ms). Returns the
    /// number of feedback messages handled.
    pub fn poll(&self) -> usize {
        let drained: Vec<EngineFeedback> = {
            let mut feedback = self.feedback.lock().unwrap_or_else(|e| e.into_inner());
            std::iter::from_fn(|| feedback.pop().ok()).collect()
        };
        let count = drained.len();

        let dropped = self.dropped_feedback.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("Engine feedback ring overflowed, {} messages lost", dropped);
            self.events.publish(EngineEvent::FeedbackOverflow { dropped });
        }

        let mut actions = Vec::new();
        for feedback in drained {
            match feedback {
                EngineFeedback::ActionRecorded(action) => actions.push(action),
                EngineFeedback::SignalThresholdReached => self.on_signal_threshold(),
                EngineFeedback::EndOfRecording => {
                    if self.model.read(|layout| layout.recorder.recording_input) {
                        log::info!("Record buffer full");
                        self.report(self.stop_input_recording());
                    }
                }
                EngineFeedback::InputRecorded { buffer, frames } => {
                    self.finalize_input_recording(buffer, frames)
                }
                EngineFeedback::SequencerStarted { .. } => {
                    self.events.publish(EngineEvent::SequencerStarted)
                }
                EngineFeedback::SequencerStopped => {
                    if self.is_recording_actions() {
                        self.report(self.stop_action_recording());
                    } else if self.is_recording_input() {
                        self.report(self.stop_input_recording());
                    }
                    self.events.publish(EngineEvent::SequencerStopped);
                }
                EngineFeedback::SequencerRewound => {
                    self.events.publish(EngineEvent::SequencerRewound)
                }
                EngineFeedback::BpmChangeRequested(bpm) => self.report(self.set_bpm(bpm).map(|_| ())),
            }
        }

        if !actions.is_empty() {
            self.merge_actions(actions);
        }
        count
    }

    fn merge_actions(&self, actions: Vec<Action>) {
        let recorded: Vec<(ChannelId, Frame)> = actions.iter().map(|a| (a.channel, a.frame)).collect();
        self.edit(SwapType::Soft, |layout| {
            for action in actions {
                layout.actions.record(Action {
                    id: self.next_action_id(),
                    ..action
                });
            }
        });
        for (channel, frame) in recorded {
            self.events.publish(EngineEvent::ActionRecorded { channel, frame });
        }
    }

    fn on_signal_threshold(&self) {
        if !self.pending_signal.swap(false, Ordering::Relaxed) {
            return;
        }
        log::info!("Signal threshold reached, recording");
        self.events.publish(EngineEvent::SignalThresholdReached);
        self.report(self.begin_input_recording(true));
    }

    fn report(&self, result: EngineResult<()>) {
        if let Err(e) = result {
            log::warn!("Engine feedback could not be applied: {}", e);
        }
    }

    /// Receive every [`EngineEvent`] published from now on
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────

    /// The published layout snapshot
    pub fn layout(&self) -> Shared<Layout> {
        self.model.current()
    }

    pub fn status(&self) -> SeqStatus {
        self.model.current().sequencer.status()
    }

    pub fn current_frame(&self) -> Frame {
        self.model.current().sequencer.current_frame()
    }

    pub fn current_beat(&self) -> u32 {
        self.model.current().sequencer.state.current_beat()
    }

    pub fn bpm(&self) -> f32 {
        self.model.current().sequencer.bpm
    }

    pub fn peak_out(&self) -> Peak {
        self.model.current().mixer.state.peak_out()
    }

    pub fn peak_in(&self) -> Peak {
        self.model.current().mixer.state.peak_in()
    }
}

fn next_channel_id(layout: &Layout) -> ChannelId {
    let max = layout.channels.iter().map(|c| c.id.0).max().unwrap_or(0);
    ChannelId(max.max(ChannelId::FIRST_USER.0 - 1) + 1)
}

#[inline]
fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn wrong_kind(channel: ChannelId, expected: &'static str) -> EngineError {
    EngineError::WrongChannelKind { channel, expected }
}

fn require_sample(channel: &Channel) -> EngineResult<()> {
    match channel.sample_data() {
        Some(_) => Ok(()),
        None => Err(wrong_kind(channel.id, "sample")),
    }
}

fn sample_mut(channel: &mut Channel) -> EngineResult<&mut super::channel::SampleChannel> {
    let id = channel.id;
    channel.sample_data_mut().ok_or_else(|| wrong_kind(id, "sample"))
}

/// Sum a new take over an existing wave (the longer length wins)
fn overdub(existing: &Wave, take: &StereoBuffer) -> Wave {
    let len = existing.data.len().max(take.len());
    let mut data = StereoBuffer::silence(len);
    data.as_mut_slice()[..existing.data.len()].copy_from_slice(existing.data.as_slice());
    for (dst, src) in data.iter_mut().zip(take.iter()) {
        *dst += *src;
    }
    Wave::new(existing.name.clone(), data, existing.rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlayStatus, StereoSample};

    fn ramp(len: usize) -> Wave {
        let data = (0..len).map(|i| StereoSample::mono(i as f32)).collect();
        Wave::new("ramp", StereoBuffer::from_vec(data), 1000)
    }

    fn render(engine: &mut AudioEngine, block: usize, input: Option<&StereoBuffer>) {
        let mut out = StereoBuffer::silence(block);
        engine.process(&mut out, input);
    }

    fn drain(rx: &Receiver<EngineEvent>) -> Vec<EngineEvent> {
        rx.try_iter().collect()
    }

    /// 1 kHz, 60 bpm, one beat per loop: the loop is 1000 frames
    fn one_second_loop(config: EngineConfig) -> (AudioEngine, EngineHandle, MidiOutConsumer) {
        let (engine, handle, midi) = create_engine(config.with_limit_output(false), 1000);
        handle.set_bpm(60.0).unwrap();
        handle.set_beats(1, 1).unwrap();
        (engine, handle, midi)
    }

    #[test]
    fn test_handle_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineHandle>();
    }

    #[test]
    fn test_channel_ids_and_internal_channels() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);

        let a = handle.add_channel(ChannelKind::Sample);
        let b = handle.add_channel(ChannelKind::Midi);
        assert_eq!(a, ChannelId(4));
        assert_eq!(b, ChannelId(5));

        assert_eq!(
            handle.set_mute(ChannelId::MASTER_OUT, true),
            Err(EngineError::InternalChannel(ChannelId::MASTER_OUT))
        );
        assert_eq!(handle.remove_channel(ChannelId(42)), Err(EngineError::ChannelNotFound(ChannelId(42))));
        assert_eq!(
            handle.set_arm(b, true),
            Err(EngineError::WrongChannelKind { channel: b, expected: "sample" })
        );

        handle.remove_channel(a).unwrap();
        assert_eq!(handle.add_channel(ChannelKind::Sample), ChannelId(6));
    }

    #[test]
    fn test_solo_updates_mixer_and_events() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let events = handle.subscribe();
        let id = handle.add_channel(ChannelKind::Sample);

        assert_eq!(handle.toggle_solo(id), Ok(true));
        assert!(handle.layout().mixer.has_solos);
        assert_eq!(handle.toggle_solo(id), Ok(false));
        assert!(!handle.layout().mixer.has_solos);

        let changes = drain(&events)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::LayoutChanged { .. }))
            .count();
        assert_eq!(changes, 3);
    }

    #[test]
    fn test_volume_and_pan_are_clamped() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let id = handle.add_channel(ChannelKind::Sample);

        handle.set_volume(id, 1.5).unwrap();
        handle.set_pan(id, -0.2).unwrap();
        handle.set_volume(ChannelId::MASTER_IN, 0.25).unwrap();

        let layout = handle.layout();
        let channel = layout.channel(id).unwrap();
        assert_eq!(channel.volume, 1.0);
        assert_eq!(channel.pan, 0.0);
        assert_eq!(layout.channel(ChannelId::MASTER_IN).unwrap().volume, 0.25);
    }

    #[test]
    fn test_begin_end_range_is_checked() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let id = handle.add_channel(ChannelKind::Sample);
        handle.set_wave(id, ramp(100)).unwrap();

        assert_eq!(
            handle.set_begin_end(id, 50, 120),
            Err(EngineError::InvalidRange { begin: 50, end: 120, len: 100 })
        );
        handle.set_begin_end(id, 10, 90).unwrap();
        let layout = handle.layout();
        let sample = layout.channel(id).unwrap().sample_data().unwrap();
        assert_eq!((sample.begin, sample.end), (10, 90));
    }

    #[test]
    fn test_bpm_change_rescales_actions() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let id = handle.add_channel(ChannelKind::Sample);
        handle.merge_actions(vec![Action::new(id, 24000, MidiEvent::new(0x90, 0, 0))]);

        // Half the tempo, twice the loop: the action keeps its beat
        assert_eq!(handle.set_bpm(60.0), Ok(60.0));
        let layout = handle.layout();
        let action = layout.actions.iter().next().unwrap();
        assert_eq!(action.frame, 48000);
        assert_eq!(action.id, 1);
    }

    #[test]
    fn test_clone_channel_copies_actions() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let id = handle.add_channel(ChannelKind::Sample);
        handle.set_wave(id, ramp(10)).unwrap();
        handle.merge_actions(vec![
            Action::new(id, 0, MidiEvent::new(0x90, 0, 0)),
            Action::new(id, 500, MidiEvent::new(0x80, 0, 0)),
        ]);

        let copy = handle.clone_channel(id).unwrap();
        let layout = handle.layout();
        assert_eq!(layout.channels.iter().filter(|c| !c.is_internal()).count(), 2);
        assert!(layout.channel(copy).unwrap().has_wave());
        assert!(layout.actions.has_actions(copy));
        assert_eq!(layout.actions.len(), 4);

        let mut ids: Vec<u32> = layout.actions.iter().map(|a| a.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_full_queue_reports_dropped_command() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let events = handle.subscribe();

        for _ in 0..crate::engine::command::COMMAND_QUEUE_CAPACITY {
            handle.rewind().unwrap();
        }
        assert_eq!(handle.rewind(), Err(EngineError::QueueFull("sequencer rewind")));
        assert!(drain(&events).contains(&EngineEvent::CommandDropped("sequencer rewind")));
    }

    #[test]
    fn test_feedback_overflow_is_reported() {
        let (mut engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let events = handle.subscribe();

        // Every start/stop pair reports twice: two full queues overflow the ring
        for _ in 0..2 {
            for _ in 0..crate::engine::command::COMMAND_QUEUE_CAPACITY / 2 {
                handle.start().unwrap();
                handle.stop().unwrap();
            }
            render(&mut engine, 16, None);
        }

        assert_eq!(handle.poll(), crate::engine::event::FEEDBACK_QUEUE_CAPACITY);
        assert!(drain(&events).contains(&EngineEvent::FeedbackOverflow {
            dropped: crate::engine::command::COMMAND_QUEUE_CAPACITY as u32,
        }));

        // The counter starts over once reported
        assert_eq!(handle.poll(), 0);
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_action_recording_end_to_end() {
        let (mut engine, handle, _midi) = one_second_loop(EngineConfig::default());
        let events = handle.subscribe();
        let id = handle.add_channel(ChannelKind::Sample);
        handle.set_wave(id, ramp(100)).unwrap();

        handle.start_action_recording().unwrap();
        render(&mut engine, 250, None);
        assert_eq!(handle.status(), SeqStatus::Running);

        handle.press(id, 127).unwrap();
        render(&mut engine, 250, None);
        handle.poll();

        let layout = handle.layout();
        let recorded: Vec<&Action> = layout.actions.iter().collect();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].channel, id);
        assert_eq!(recorded[0].frame, 250);
        assert!(drain(&events).contains(&EngineEvent::ActionRecorded { channel: id, frame: 250 }));

        handle.stop_action_recording().unwrap();
        render(&mut engine, 250, None);
        assert!(layout.channel(id).unwrap().state.read_actions());
    }

    #[test]
    fn test_rigid_input_recording_end_to_end() {
        let (mut engine, handle, _midi) = one_second_loop(EngineConfig::default());
        let events = handle.subscribe();
        let id = handle.add_channel(ChannelKind::Sample);
        handle.set_arm(id, true).unwrap();
        let input = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 250]);

        assert_eq!(
            handle.stop_input_recording(),
            Err(EngineError::NotRecording)
        );

        handle.start().unwrap();
        render(&mut engine, 250, Some(&input));
        handle.start_input_recording().unwrap();
        assert_eq!(handle.set_bpm(90.0), Err(EngineError::InputRecording));

        // Frames 250..1000 are recorded, then the buffer reports full
        for _ in 0..4 {
            render(&mut engine, 250, Some(&input));
        }
        handle.poll();
        assert!(!handle.is_recording_input());

        render(&mut engine, 250, Some(&input));
        handle.poll();

        let layout = handle.layout();
        let sample = layout.channel(id).unwrap().sample_data().unwrap();
        let wave = sample.wave.as_ref().unwrap();
        assert_eq!(wave.name, "TAKE-1");
        assert_eq!(wave.len(), 1000);
        assert_eq!(wave.data[100].left, 0.0);
        assert!((wave.data[500].left - 0.5).abs() < 1e-6);

        assert!(drain(&events).contains(&EngineEvent::InputRecorded {
            frames: 1000,
            channels: vec![id],
        }));
    }

    #[test]
    fn test_nothing_to_record_without_armed_channels() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        handle.add_channel(ChannelKind::Sample);
        assert_eq!(handle.start_input_recording(), Err(EngineError::NothingToRecord));
    }

    #[test]
    fn test_signal_triggered_recording_starts_on_threshold() {
        let config = EngineConfig::default().with_rec_trigger_mode(RecTriggerMode::Signal);
        let (mut engine, handle, _midi) = one_second_loop(config);
        let id = handle.add_channel(ChannelKind::Sample);
        handle.set_arm(id, true).unwrap();

        handle.start_input_recording().unwrap();
        assert!(handle.is_recording_input());

        let quiet = StereoBuffer::from_vec(vec![StereoSample::mono(0.01); 100]);
        render(&mut engine, 100, Some(&quiet));
        handle.poll();
        assert_eq!(handle.status(), SeqStatus::Stopped);

        let loud = StereoBuffer::from_vec(vec![StereoSample::mono(0.9); 100]);
        render(&mut engine, 100, Some(&loud));
        handle.poll();
        render(&mut engine, 100, Some(&loud));

        assert_eq!(handle.status(), SeqStatus::Running);
        assert!(handle.layout().recorder.recording_input);
    }

    #[test]
    fn test_sequencer_stop_ends_action_recording() {
        let (mut engine, handle, _midi) = one_second_loop(EngineConfig::default());
        handle.start_action_recording().unwrap();
        render(&mut engine, 100, None);

        handle.stop().unwrap();
        render(&mut engine, 100, None);
        handle.poll();

        assert!(!handle.is_recording_actions());
    }

    #[test]
    fn test_reset_clears_the_session() {
        let (mut engine, handle, _midi) = one_second_loop(EngineConfig::default());
        let id = handle.add_channel(ChannelKind::Sample);
        handle.set_wave(id, ramp(10)).unwrap();
        handle.start().unwrap();
        render(&mut engine, 100, None);

        handle.reset().unwrap();
        render(&mut engine, 100, None);

        let layout = handle.layout();
        assert_eq!(layout.user_channels().count(), 0);
        assert_eq!(layout.sequencer.status(), SeqStatus::Stopped);
        assert_eq!(layout.sequencer.current_frame(), 0);
        assert!(layout.channel(ChannelId::MASTER_OUT).is_some());
    }

    #[test]
    fn test_recorded_loop_joins_on_next_loop_point() {
        let (mut engine, handle, _midi) = one_second_loop(EngineConfig::default());
        let id = handle.add_channel(ChannelKind::Sample);
        handle.set_arm(id, true).unwrap();
        handle.set_mode(id, SamplePlayerMode::LoopBasic).unwrap();
        let input = StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 250]);

        handle.start().unwrap();
        render(&mut engine, 250, Some(&input));
        handle.start_input_recording().unwrap();
        for _ in 0..4 {
            render(&mut engine, 250, Some(&input));
        }
        handle.poll();
        render(&mut engine, 250, Some(&input));
        handle.poll();

        render(&mut engine, 250, None);
        let state = handle.layout().channel(id).unwrap().state.play_status();
        assert_eq!(state, PlayStatus::Wait);
    }

    #[test]
    fn test_sample_channel_settings() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let id = handle.add_channel(ChannelKind::Sample);
        handle.rename_channel(id, "drums").unwrap();
        handle.set_velocity_as_vol(id, true).unwrap();
        handle.set_input_monitor(id, true).unwrap();
        assert_eq!(handle.toggle_arm(id), Ok(true));

        let layout = handle.layout();
        let channel = layout.channel(id).unwrap();
        assert_eq!(channel.name, "drums");
        assert!(channel.armed);
        let sample = channel.sample_data().unwrap();
        assert!(sample.velocity_as_vol);
        assert!(sample.input_monitor);

        // Protecting a channel that already holds a wave disarms it
        handle.set_wave(id, ramp(10)).unwrap();
        handle.set_overdub_protection(id, true).unwrap();
        let layout = handle.layout();
        let channel = layout.channel(id).unwrap();
        assert!(!channel.armed);
        assert!(channel.sample_data().unwrap().overdub_protection);
    }

    #[test]
    fn test_sample_settings_refuse_midi_channels() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let id = handle.add_channel(ChannelKind::Midi);

        assert_eq!(
            handle.toggle_arm(id),
            Err(EngineError::WrongChannelKind { channel: id, expected: "sample" })
        );
        assert!(matches!(
            handle.set_overdub_protection(id, true),
            Err(EngineError::WrongChannelKind { .. })
        ));
    }

    #[test]
    fn test_midi_channel_ports() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let id = handle.add_channel(ChannelKind::Midi);

        handle.set_midi_out_channel(id, Some(20)).unwrap();
        handle.set_midi_in_channel(id, Some(3)).unwrap();
        let layout = handle.layout();
        let midi = layout.channel(id).unwrap().midi_data().unwrap();
        assert!(midi.out_enabled);
        assert_eq!(midi.out_channel, 15);
        assert_eq!(midi.in_channel, Some(3));

        handle.set_midi_out_channel(id, None).unwrap();
        handle.set_midi_in_channel(id, None).unwrap();
        let layout = handle.layout();
        let midi = layout.channel(id).unwrap().midi_data().unwrap();
        assert!(!midi.out_enabled);
        assert_eq!(midi.out_channel, 15);
        assert_eq!(midi.in_channel, None);
    }

    #[test]
    fn test_solo_and_plugins() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let id = handle.add_channel(ChannelKind::Sample);

        handle.set_solo(id, true).unwrap();
        assert!(handle.layout().mixer.has_solos);
        handle.set_solo(id, false).unwrap();
        assert!(!handle.layout().mixer.has_solos);
        assert_eq!(
            handle.set_solo(ChannelId::MASTER_OUT, true),
            Err(EngineError::InternalChannel(ChannelId::MASTER_OUT))
        );

        handle.set_plugins(ChannelId::MASTER_OUT, vec![7, 8]).unwrap();
        handle.set_plugins(id, vec![1]).unwrap();
        let layout = handle.layout();
        assert_eq!(layout.channel(ChannelId::MASTER_OUT).unwrap().plugins, vec![7, 8]);
        assert_eq!(layout.channel(id).unwrap().plugins, vec![1]);
    }

    #[test]
    fn test_clear_actions() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);
        let a = handle.add_channel(ChannelKind::Sample);
        let b = handle.add_channel(ChannelKind::Sample);
        handle.merge_actions(vec![
            Action::new(a, 0, MidiEvent::new(0x90, 0, 0)),
            Action::new(b, 100, MidiEvent::new(0x90, 0, 0)),
        ]);

        handle.clear_actions(a).unwrap();
        let layout = handle.layout();
        assert!(!layout.actions.has_actions(a));
        assert!(layout.actions.has_actions(b));
        assert!(!layout.channel(a).unwrap().state.has_actions());

        handle.clear_all_actions();
        assert_eq!(handle.layout().actions.len(), 0);
        assert_eq!(handle.clear_actions(ChannelId(99)), Err(EngineError::ChannelNotFound(ChannelId(99))));
    }

    #[test]
    fn test_global_settings() {
        let (_engine, handle, _midi) = create_engine(EngineConfig::default(), 48000);

        handle.set_limit_output(true);
        handle.set_rec_trigger_mode(RecTriggerMode::Signal);
        handle.set_input_rec_mode(InputRecMode::Free).unwrap();
        handle
            .external_transport(TransportState { running: true, bpm: 0.0, frame: 0 })
            .unwrap();

        let layout = handle.layout();
        assert!(layout.mixer.limit_output);
        assert_eq!(layout.config.rec_trigger_mode, RecTriggerMode::Signal);
        assert_eq!(layout.config.input_rec_mode, InputRecMode::Free);
        assert_eq!(layout.recorder.input_rec_mode, InputRecMode::Free);
    }
}
