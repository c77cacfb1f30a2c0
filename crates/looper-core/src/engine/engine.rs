//! Main audio engine - ties together sequencer, channels, mixer and sync
//!
//! The engine is owned by the audio callback. Each block it:
//!
//! 1. takes the current layout snapshot (lock-free)
//! 2. drains the command queue, in arrival order
//! 3. advances the sequencer and dispatches quantized actions
//! 4. lets every channel react to the block's timeline events
//! 5. renders the mixer (line-in, recording, channels, master)
//! 6. adds the metronome on top of the mixed output
//! 7. emits MIDI clock or timecode for the running part of the block
//!
//! Nothing here allocates, locks or logs. While a control thread holds a
//! render pause the block is silence.

use std::sync::Arc;

use super::channel::{MidiInBuffer, RtContext};
use super::command::EngineCommand;
use super::event::{EngineFeedback, Outbox};
use super::mixer::{MixContext, Mixer, RenderInfo};
use super::model::{Layout, ModelStore};
use super::plugin::PluginHost;
use super::quantizer::QuantizedAction;
use super::sequencer::{AdvanceReport, Sequencer};
use super::sync::{Synchronizer, TransportState};
use crate::types::{StereoBuffer, MAX_BUFFER_SIZE};

/// The real-time engine
pub struct AudioEngine {
    model: Arc<ModelStore>,
    sequencer: Sequencer,
    mixer: Mixer,
    synchronizer: Synchronizer,
    command_rx: rtrb::Consumer<EngineCommand>,
    outbox: Outbox,
    /// Live MIDI routed to MIDI channels this block
    midi_in: MidiInBuffer,
    plugin_host: Option<Box<dyn PluginHost>>,
    /// Line-in is captured by the backend
    input_enabled: bool,
    /// Stand-in line-in when the backend delivers none
    silent_input: StereoBuffer,
}

impl AudioEngine {
    pub fn new(
        model: Arc<ModelStore>,
        command_rx: rtrb::Consumer<EngineCommand>,
        outbox: Outbox,
    ) -> Self {
        let sample_rate = model.current().sequencer.sample_rate;
        Self {
            model,
            sequencer: Sequencer::new(sample_rate),
            mixer: Mixer::new(),
            synchronizer: Synchronizer::new(),
            command_rx,
            outbox,
            midi_in: MidiInBuffer::new(),
            plugin_host: None,
            input_enabled: true,
            silent_input: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Install the host that runs channel plugin stacks
    pub fn set_plugin_host(&mut self, host: Box<dyn PluginHost>) {
        self.plugin_host = Some(host);
    }

    pub fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }

    pub fn model(&self) -> &Arc<ModelStore> {
        &self.model
    }

    /// Render one block into `out`
    ///
    /// `input` is the line-in for the same block; `None` (or a length
    /// mismatch) renders without input.
    pub fn process(&mut self, out: &mut StereoBuffer, input: Option<&StereoBuffer>) {
        out.fill_silence();

        let model = Arc::clone(&self.model);
        if !model.gate().enter() {
            return;
        }

        let layout = model.current();
        self.midi_in.clear();
        self.process_commands(&layout);

        let report = self.advance_sequencer(&layout, out.len());

        if !layout.locked {
            self.advance_channels(&layout);
        }

        let len = out.len();
        let (input, has_input) = match input {
            Some(input) if self.input_enabled && input.len() == len => (input, true),
            _ => {
                self.silent_input.set_len_from_capacity(len);
                self.silent_input.fill_silence();
                (&self.silent_input, false)
            }
        };
        let info = RenderInfo::new(&layout, has_input);
        let ctx = MixContext {
            layout: &layout,
            info: &info,
            seq_running: layout.sequencer.is_running(),
            plugins: self.plugin_host.as_deref_mut(),
            midi_in: &self.midi_in,
            outbox: &mut self.outbox,
        };
        self.mixer.render(out, input, ctx);
        // After the master stage: output gain and limiter leave the click alone
        self.sequencer.render(out);

        self.synchronizer.send_block(
            layout.config.midi_sync,
            layout.config.midi_tc_fps,
            &layout.sequencer,
            &report,
            &mut self.outbox,
        );

        model.gate().exit();
    }

    /// Follow an external transport master (e.g. JACK), polled per block
    pub fn sync_transport(&mut self, state: TransportState) {
        let layout = self.model.current();
        self.apply_transport(&layout, state);
    }

    fn process_commands(&mut self, layout: &Layout) {
        while let Ok(command) = self.command_rx.pop() {
            self.apply(layout, command);
        }
    }

    fn apply(&mut self, layout: &Layout, command: EngineCommand) {
        match command {
            EngineCommand::KeyPress { channel, velocity } => {
                if let Some(channel) = layout.channel(channel) {
                    channel.press(&mut self.rt_context(layout), velocity);
                }
            }
            EngineCommand::KeyRelease { channel } => {
                if let Some(channel) = layout.channel(channel) {
                    channel.release(&mut self.rt_context(layout));
                }
            }
            EngineCommand::KeyKill { channel } => {
                if let Some(channel) = layout.channel(channel) {
                    channel.kill(&mut self.rt_context(layout));
                }
            }
            EngineCommand::ToggleReadActions { channel } => {
                if let Some(channel) = layout.channel(channel) {
                    channel.toggle_read_actions(&mut self.rt_context(layout));
                }
            }
            EngineCommand::KillReadActions { channel } => {
                if let Some(channel) = layout.channel(channel) {
                    channel.kill_read_actions(&mut self.rt_context(layout));
                }
            }
            EngineCommand::ChannelMidi { channel, event } => {
                if let Some(channel) = layout.channel(channel) {
                    channel.receive_midi(&mut self.rt_context(layout), event);
                }
            }
            EngineCommand::SequencerStart => self.start(layout),
            EngineCommand::SequencerStop => self.stop(layout),
            EngineCommand::SequencerRewind => self.rewind(layout),
            EngineCommand::SequencerPreroll => {
                if self.sequencer.start_with_preroll(&layout.sequencer) {
                    self.synchronizer
                        .send_rewind(layout.config.midi_sync, &mut self.outbox);
                }
            }
            EngineCommand::SetMetronome(enabled) => {
                layout.sequencer.state.set_metronome(enabled);
            }
            EngineCommand::ExternalTransport(state) => self.apply_transport(layout, state),
            EngineCommand::StartInputRec { buffer, from_start } => {
                let from = if from_start {
                    0
                } else {
                    layout.sequencer.current_frame()
                };
                // A stale buffer is released through the collector
                drop(self.mixer.start_input_rec(buffer, from));
            }
            EngineCommand::StopInputRec => {
                if let Some((buffer, frames)) = self.mixer.stop_input_rec() {
                    self.outbox
                        .feedback(EngineFeedback::InputRecorded { buffer, frames });
                }
            }
            EngineCommand::ArmSignalTrigger => self.mixer.arm_signal_trigger(true),
            EngineCommand::DisarmSignalTrigger => self.mixer.arm_signal_trigger(false),
            EngineCommand::Reset => {
                self.sequencer.reset();
                drop(self.mixer.stop_input_rec());
                self.mixer.arm_signal_trigger(false);
                self.synchronizer.reset();
                self.midi_in.clear();
            }
        }
    }

    fn rt_context<'a>(&'a mut self, layout: &'a Layout) -> RtContext<'a> {
        RtContext {
            layout,
            quantizer: self.sequencer.quantizer_mut(),
            outbox: &mut self.outbox,
            midi_in: &mut self.midi_in,
        }
    }

    fn start(&mut self, layout: &Layout) {
        if self.sequencer.raw_start(&layout.sequencer) {
            self.outbox
                .feedback(EngineFeedback::SequencerStarted { from_wait: false });
            self.synchronizer
                .send_start(layout.config.midi_sync, &mut self.outbox);
        }
    }

    fn stop(&mut self, layout: &Layout) {
        if !layout.sequencer.is_active() {
            return;
        }
        {
            let mut ctx = self.rt_context(layout);
            for channel in layout.user_channels() {
                channel.on_sequencer_stop(&mut ctx);
            }
        }
        if self.sequencer.raw_stop(&layout.sequencer) {
            self.outbox.feedback(EngineFeedback::SequencerStopped);
            self.synchronizer
                .send_stop(layout.config.midi_sync, &mut self.outbox);
        }
    }

    fn rewind(&mut self, layout: &Layout) {
        if !self.sequencer.raw_rewind(&layout.sequencer) {
            // Lands on the next quantizer step
            return;
        }
        {
            let mut ctx = self.rt_context(layout);
            for channel in layout.user_channels() {
                channel.on_sequencer_rewind(&mut ctx);
            }
        }
        self.outbox.feedback(EngineFeedback::SequencerRewound);
        self.synchronizer
            .send_rewind(layout.config.midi_sync, &mut self.outbox);
    }

    fn apply_transport(&mut self, layout: &Layout, state: TransportState) {
        let change = self.synchronizer.recv_transport(state);
        if change.is_empty() {
            return;
        }
        if change.rewind {
            self.rewind(layout);
        }
        if let Some(bpm) = change.bpm {
            self.outbox.feedback(EngineFeedback::BpmChangeRequested(bpm));
        }
        match change.running {
            Some(true) => self.start(layout),
            Some(false) => self.stop(layout),
            None => {}
        }
    }

    fn advance_sequencer(&mut self, layout: &Layout, block: usize) -> AdvanceReport {
        if !layout.sequencer.is_active() {
            return AdvanceReport::default();
        }
        let report = self.sequencer.advance(&layout.sequencer, &layout.actions, block);
        let sync = layout.config.midi_sync;

        if report.started {
            self.outbox
                .feedback(EngineFeedback::SequencerStarted { from_wait: true });
            self.synchronizer.send_start(sync, &mut self.outbox);
        }
        if report.rewound {
            self.outbox.feedback(EngineFeedback::SequencerRewound);
            self.synchronizer.send_rewind(sync, &mut self.outbox);
        }

        // Fired actions are gone from the quantizer: dispatch them even on a
        // locked layout, where only the channel state changes
        for &(action, delta) in self.sequencer.fired() {
            let id = match action {
                QuantizedAction::ChannelPlay(id) | QuantizedAction::ChannelRewind(id) => id,
                QuantizedAction::SequencerRewind => continue,
            };
            if let Some(channel) = layout.channel(id) {
                channel.on_quantized(action, report.offset + delta);
            }
        }
        report
    }

    fn advance_channels(&mut self, layout: &Layout) {
        let (events, quantizer) = self.sequencer.timeline();
        let mut ctx = RtContext {
            layout,
            quantizer,
            outbox: &mut self.outbox,
            midi_in: &mut self.midi_in,
        };
        let has_solos = layout.mixer.has_solos;
        for channel in layout.channels.iter().filter(|c| !c.is_internal()) {
            channel.advance(&mut ctx, events);
        }
        for channel in layout.user_channels() {
            channel.update_lights(channel.is_audible(has_solos), ctx.outbox);
        }
    }
}
