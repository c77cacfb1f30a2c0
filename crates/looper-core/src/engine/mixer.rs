//! Mixer - renders one audio block from line-in to master out
//!
//! Per block, in order:
//! 1. line-in: meter the input, check the record trigger level, prepare the
//!    gain-applied input bridge and run it through the Master In plugins
//! 2. line-in recording into the installed record buffer
//! 3. user channels (skipped while the layout is locked), summed when audible
//! 4. Master Out plugins over the summed output, then Preview
//! 5. finalize: in→out monitoring or output gain, limiter, output peaks
//!
//! Nothing here allocates or locks. All buffers are sized at construction.

use std::sync::atomic::{AtomicU32, Ordering};

use basedrop::{Owned, Shared};

use super::channel::{ChannelRole, MidiInBuffer};
use super::event::{EngineFeedback, Outbox};
use super::gc::gc_handle;
use super::midi::MidiEvent;
use super::model::Layout;
use super::plugin::PluginHost;
use crate::config::{EngineConfig, InputRecMode};
use crate::types::{ChannelId, Frame, Peak, Sample, StereoBuffer, MAX_BUFFER_SIZE};

/// Max MIDI events handed to one channel's plugin stack per block
const MAX_CHANNEL_MIDI_EVENTS: usize = 256;

/// Linear amplitude to decibels (full scale = 0 dB)
#[inline]
pub fn linear_to_db(value: Sample) -> Sample {
    20.0 * value.log10()
}

/// Output and input peaks of the last block, readable from any thread
#[derive(Debug, Default)]
pub struct MixerState {
    peak_out_l: AtomicU32,
    peak_out_r: AtomicU32,
    peak_in_l: AtomicU32,
    peak_in_r: AtomicU32,
}

impl MixerState {
    pub fn peak_out(&self) -> Peak {
        Peak {
            left: load(&self.peak_out_l),
            right: load(&self.peak_out_r),
        }
    }

    pub fn peak_in(&self) -> Peak {
        Peak {
            left: load(&self.peak_in_l),
            right: load(&self.peak_in_r),
        }
    }

    fn set_peak_out(&self, peak: Peak) {
        store(&self.peak_out_l, peak.left);
        store(&self.peak_out_r, peak.right);
    }

    fn set_peak_in(&self, peak: Peak) {
        store(&self.peak_in_l, peak.left);
        store(&self.peak_in_r, peak.right);
    }

    fn reset(&self) {
        self.set_peak_out(Peak::default());
        self.set_peak_in(Peak::default());
    }
}

#[inline]
fn load(atomic: &AtomicU32) -> Sample {
    f32::from_bits(atomic.load(Ordering::Relaxed))
}

#[inline]
fn store(atomic: &AtomicU32, value: Sample) {
    atomic.store(value.to_bits(), Ordering::Relaxed);
}

/// Mixer part of the published layout
#[derive(Clone)]
pub struct MixerLayout {
    /// At least one user channel is soloed
    pub has_solos: bool,
    /// Monitor the line-in on the master output
    pub in_to_out: bool,
    pub limit_output: bool,
    /// Record trigger level in dB
    pub rec_trigger_level: f32,
    pub state: Shared<MixerState>,
}

impl MixerLayout {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            has_solos: false,
            in_to_out: false,
            limit_output: config.limit_output,
            rec_trigger_level: config.rec_trigger_level,
            state: Shared::new(&gc_handle(), MixerState::default()),
        }
    }
}

/// Per-block render parameters, rebuilt every callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderInfo {
    pub is_audio_ready: bool,
    /// The backend delivers line-in and it is enabled
    pub has_input: bool,
    /// Capture the line-in into the record buffer this block
    pub should_line_in_rec: bool,
    pub limit_output: bool,
    pub in_to_out: bool,
    pub max_frames_to_rec: Frame,
    pub out_vol: f32,
    pub in_vol: f32,
    pub rec_trigger_level: f32,
}

impl RenderInfo {
    pub fn new(layout: &Layout, has_input: bool) -> Self {
        let volume = |id| layout.channel(id).map_or(1.0, |c| c.volume);
        let max_frames_to_rec = match layout.recorder.input_rec_mode {
            InputRecMode::Rigid => layout.sequencer.frames_in_loop,
            InputRecMode::Free => layout.sequencer.max_frames_in_loop(),
        };
        Self {
            is_audio_ready: true,
            has_input,
            should_line_in_rec: has_input
                && layout.recorder.recording_input
                && layout.sequencer.is_running(),
            limit_output: layout.mixer.limit_output,
            in_to_out: layout.mixer.in_to_out,
            max_frames_to_rec,
            out_vol: volume(ChannelId::MASTER_OUT),
            in_vol: volume(ChannelId::MASTER_IN),
            rec_trigger_level: layout.mixer.rec_trigger_level,
        }
    }
}

/// Where an input recording session currently writes
struct InputRecording {
    buffer: Owned<StereoBuffer>,
    tracker: Frame,
}

/// What the mixer borrows from the engine for one block
pub struct MixContext<'a> {
    pub layout: &'a Layout,
    pub info: &'a RenderInfo,
    pub seq_running: bool,
    pub plugins: Option<&'a mut (dyn PluginHost + 'static)>,
    pub midi_in: &'a MidiInBuffer,
    pub outbox: &'a mut Outbox,
}

/// Audio-thread mixer
pub struct Mixer {
    /// Line-in after input gain, shared with armed channels and in→out
    in_buffer: StereoBuffer,
    /// One channel's private render buffer
    scratch: StereoBuffer,
    midi: Vec<MidiEvent>,
    recording: Option<InputRecording>,
    signal_armed: bool,
    signal_fired: bool,
    end_of_rec_fired: bool,
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            in_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
            scratch: StereoBuffer::silence(MAX_BUFFER_SIZE),
            midi: Vec::with_capacity(MAX_CHANNEL_MIDI_EVENTS),
            recording: None,
            signal_armed: false,
            signal_fired: false,
            end_of_rec_fired: false,
        }
    }

    /// Install a record buffer; recording starts writing at `from`
    ///
    /// Returns the previously installed buffer, if any.
    pub fn start_input_rec(
        &mut self,
        buffer: Owned<StereoBuffer>,
        from: Frame,
    ) -> Option<Owned<StereoBuffer>> {
        self.signal_fired = false;
        self.end_of_rec_fired = false;
        let tracker = from.max(0);
        self.recording
            .replace(InputRecording { buffer, tracker })
            .map(|rec| rec.buffer)
    }

    /// Remove the record buffer, with the number of frames written into it
    pub fn stop_input_rec(&mut self) -> Option<(Owned<StereoBuffer>, Frame)> {
        self.signal_fired = false;
        self.end_of_rec_fired = false;
        self.recording.take().map(|rec| (rec.buffer, rec.tracker))
    }

    pub fn is_recording_input(&self) -> bool {
        self.recording.is_some()
    }

    /// Report the next line-in peak above the trigger level, once
    pub fn arm_signal_trigger(&mut self, armed: bool) {
        self.signal_armed = armed;
        self.signal_fired = false;
    }

    /// Render one block into `out`
    ///
    /// `out` may already hold audio (the metronome); it is summed into.
    pub fn render(&mut self, out: &mut StereoBuffer, input: &StereoBuffer, ctx: MixContext<'_>) {
        let MixContext {
            layout,
            info,
            seq_running,
            mut plugins,
            midi_in,
            outbox,
        } = ctx;
        let len = out.len();
        let state = &layout.mixer.state;

        self.in_buffer.set_len_from_capacity(len);
        self.in_buffer.fill_silence();
        self.scratch.set_len_from_capacity(len);
        state.reset();

        if info.has_input {
            self.process_line_in(input, info, state, outbox);
            self.render_master_in(layout, plugins.as_deref_mut());
        }

        if info.should_line_in_rec {
            self.line_in_rec(input, info, outbox);
        }

        if !layout.locked {
            self.render_channels(layout, out, seq_running, plugins.as_deref_mut(), midi_in);
        }

        self.render_master_out(layout, out, plugins.as_deref_mut());
        self.render_preview(layout, out, seq_running);

        self.finalize(out, info, state);
    }

    fn process_line_in(
        &mut self,
        input: &StereoBuffer,
        info: &RenderInfo,
        state: &MixerState,
        outbox: &mut Outbox,
    ) {
        let peak = input.peaks();
        if self.signal_armed && !self.signal_fired {
            let level = info.rec_trigger_level;
            if linear_to_db(peak.left) > level || linear_to_db(peak.right) > level {
                outbox.feedback(EngineFeedback::SignalThresholdReached);
                self.signal_fired = true;
            }
        }
        state.set_peak_in(peak);
        self.in_buffer.set_from(input, info.in_vol);
    }

    /// Master In has no audio of its own: it runs its plugins over the bridge
    fn render_master_in(&mut self, layout: &Layout, plugins: Option<&mut (dyn PluginHost + 'static)>) {
        let (Some(host), Some(master_in)) = (plugins, layout.channel(ChannelId::MASTER_IN)) else {
            return;
        };
        if !master_in.plugins.is_empty() {
            host.process(master_in.id, &master_in.plugins, &mut self.in_buffer, &[]);
        }
    }

    /// Sum the raw line-in into the record buffer, looping over at the max
    fn line_in_rec(&mut self, input: &StereoBuffer, info: &RenderInfo, outbox: &mut Outbox) {
        let Some(rec) = self.recording.as_mut() else {
            return;
        };
        let max = info.max_frames_to_rec.min(rec.buffer.len() as Frame);
        if max <= 0 {
            return;
        }
        if rec.tracker >= max && !self.end_of_rec_fired {
            outbox.feedback(EngineFeedback::EndOfRecording);
            self.end_of_rec_fired = true;
            return;
        }

        let dest = rec.buffer.as_mut_slice();
        for (i, sample) in input.iter().enumerate() {
            let at = ((rec.tracker + i as Frame) % max) as usize;
            dest[at] += *sample * info.in_vol;
        }
        rec.tracker += input.len() as Frame;
    }

    fn render_channels(
        &mut self,
        layout: &Layout,
        out: &mut StereoBuffer,
        seq_running: bool,
        mut plugins: Option<&mut (dyn PluginHost + 'static)>,
        midi_in: &MidiInBuffer,
    ) {
        let has_solos = layout.mixer.has_solos;
        for channel in layout.channels.iter().filter(|c| !c.is_internal()) {
            midi_in.collect_for(channel.id, &mut self.midi);
            channel.render(
                &mut self.scratch,
                &self.in_buffer,
                seq_running,
                plugins.as_deref_mut(),
                &self.midi,
            );
            if channel.is_audible(has_solos) {
                let (gain, pan) = channel.output_gain();
                out.sum_panned(&self.scratch, gain, pan);
            }
        }
    }

    /// Master Out runs its plugins over the summed output; its volume is
    /// applied in [`Mixer::finalize`]
    fn render_master_out(
        &mut self,
        layout: &Layout,
        out: &mut StereoBuffer,
        plugins: Option<&mut (dyn PluginHost + 'static)>,
    ) {
        let (Some(host), Some(master_out)) = (plugins, layout.channel(ChannelId::MASTER_OUT)) else {
            return;
        };
        if !master_out.plugins.is_empty() {
            host.process(master_out.id, &master_out.plugins, out, &[]);
        }
    }

    fn render_preview(&mut self, layout: &Layout, out: &mut StereoBuffer, seq_running: bool) {
        let Some(preview) = layout.channel(ChannelId::PREVIEW) else {
            return;
        };
        if !matches!(preview.role, ChannelRole::Preview(_)) || !preview.has_wave() {
            return;
        }
        preview.render(&mut self.scratch, &self.in_buffer, seq_running, None, &[]);
        let (gain, pan) = preview.output_gain();
        out.sum_panned(&self.scratch, gain, pan);
    }

    fn finalize(&mut self, out: &mut StereoBuffer, info: &RenderInfo, state: &MixerState) {
        if info.in_to_out {
            out.sum(&self.in_buffer, info.out_vol);
        } else {
            out.apply_gain(info.out_vol);
        }
        if info.limit_output {
            out.limit();
        }
        state.set_peak_out(out.peaks());
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::channel::test_support::sample_channel;
    use crate::engine::channel::SamplePlayerMode;
    use crate::engine::event::outbox_pair;
    use crate::engine::plugin::test_support::GainHost;
    use crate::types::{PlayStatus, StereoSample};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Bench {
        mixer: Mixer,
        layout: Layout,
        outbox: Outbox,
        feedback: rtrb::Consumer<EngineFeedback>,
        midi_in: MidiInBuffer,
    }

    impl Bench {
        fn new() -> Self {
            let (outbox, feedback, _midi) = outbox_pair();
            let mut layout = Layout::new(48000, EngineConfig::default());
            layout.mixer.limit_output = false;
            Self {
                mixer: Mixer::new(),
                layout,
                outbox,
                feedback,
                midi_in: MidiInBuffer::new(),
            }
        }

        /// Add a playing one-shot channel whose frames read 1, 2, 3, ...
        fn add_playing(&mut self, id: u32) {
            let channel = sample_channel(id, SamplePlayerMode::SingleBasic, 64);
            channel.state.set_play_status(PlayStatus::Play);
            self.layout.channels.push(channel);
        }

        fn render(&mut self, block: usize, input: &StereoBuffer, has_input: bool) -> StereoBuffer {
            self.render_with(block, input, has_input, None)
        }

        fn render_with(
            &mut self,
            block: usize,
            input: &StereoBuffer,
            has_input: bool,
            plugins: Option<&mut (dyn PluginHost + 'static)>,
        ) -> StereoBuffer {
            let mut out = StereoBuffer::silence(block);
            let info = RenderInfo::new(&self.layout, has_input);
            let ctx = MixContext {
                layout: &self.layout,
                info: &info,
                seq_running: false,
                plugins,
                midi_in: &self.midi_in,
                outbox: &mut self.outbox,
            };
            self.mixer.render(&mut out, input, ctx);
            out
        }
    }

    fn left(buffer: &StereoBuffer) -> Vec<f32> {
        buffer.iter().map(|s| s.left).collect()
    }

    #[test]
    fn test_audible_channels_are_summed() {
        let mut bench = Bench::new();
        bench.add_playing(4);
        bench.add_playing(5);

        let out = bench.render(4, &StereoBuffer::silence(4), false);
        assert_eq!(left(&out), vec![2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_solo_and_mute_gate_audibility() {
        let mut bench = Bench::new();
        bench.add_playing(4);
        bench.add_playing(5);
        bench.layout.channels[3].solo = true;
        bench.layout.update_solos();

        let out = bench.render(2, &StereoBuffer::silence(2), false);
        assert_eq!(left(&out), vec![1.0, 2.0]);

        // Inaudible channels still advance
        assert_eq!(bench.layout.channels[4].state.tracker(), 2);
    }

    #[test]
    fn test_pan_is_linear() {
        let mut bench = Bench::new();
        bench.add_playing(4);
        bench.layout.channels[3].pan = 0.0;

        let out = bench.render(1, &StereoBuffer::silence(1), false);
        assert_eq!(out[0], StereoSample::new(1.0, 0.0));
    }

    #[test]
    fn test_locked_layout_skips_channels() {
        let mut bench = Bench::new();
        bench.add_playing(4);
        bench.layout.locked = true;

        let out = bench.render(4, &StereoBuffer::silence(4), false);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(bench.layout.channels[3].state.tracker(), 0);
    }

    #[test]
    fn test_output_gain_limit_and_peaks() {
        let mut bench = Bench::new();
        bench.add_playing(4);
        if let Some(master) = bench.layout.channel_mut(ChannelId::MASTER_OUT) {
            master.volume = 0.5;
        }
        bench.layout.mixer.limit_output = true;

        let out = bench.render(4, &StereoBuffer::silence(4), false);
        assert_eq!(left(&out), vec![0.5, 1.0, 1.0, 1.0]);
        assert_eq!(bench.layout.mixer.state.peak_out().left, 1.0);
    }

    #[test]
    fn test_in_to_out_monitors_input() {
        let mut bench = Bench::new();
        bench.layout.mixer.in_to_out = true;
        if let Some(master_in) = bench.layout.channel_mut(ChannelId::MASTER_IN) {
            master_in.volume = 0.5;
        }
        let input = StereoBuffer::from_vec(vec![StereoSample::mono(0.4); 4]);

        let out = bench.render(4, &input, true);
        assert!((out[0].left - 0.2).abs() < 1e-6);
        assert!((bench.layout.mixer.state.peak_in().left - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_signal_threshold_fires_once_when_armed() {
        let mut bench = Bench::new();
        let loud = StereoBuffer::from_vec(vec![StereoSample::mono(0.9); 8]);

        bench.render(8, &loud, true);
        assert!(bench.feedback.pop().is_err());

        bench.mixer.arm_signal_trigger(true);
        bench.render(8, &loud, true);
        bench.render(8, &loud, true);
        assert!(matches!(bench.feedback.pop(), Ok(EngineFeedback::SignalThresholdReached)));
        assert!(bench.feedback.pop().is_err());
    }

    #[test]
    fn test_line_in_rec_loops_and_reports_end_once() {
        let mut bench = Bench::new();
        bench.layout.recorder.recording_input = true;
        bench.layout.sequencer.state.set_status(crate::types::SeqStatus::Running);
        // 1 kHz, 60 bpm, 1 beat: the loop is 1000 frames
        bench.layout.sequencer.set_sample_rate(1000);
        bench.layout.sequencer.set_bpm(60.0);
        bench.layout.sequencer.set_beats(1, 1);

        let buffer = Owned::new(&gc_handle(), StereoBuffer::silence(1000));
        assert!(bench.mixer.start_input_rec(buffer, 0).is_none());

        let input = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 500]);
        bench.render(500, &input, true);
        bench.render(500, &input, true);
        assert!(bench.feedback.pop().is_err());

        bench.render(500, &input, true);
        bench.render(500, &input, true);
        assert!(matches!(bench.feedback.pop(), Ok(EngineFeedback::EndOfRecording)));
        assert!(bench.feedback.pop().is_err());

        let (buffer, frames) = bench.mixer.stop_input_rec().unwrap();
        assert_eq!(frames, 1500);
        // The block after the end report wrapped and overdubbed the start
        assert!((buffer[0].left - 0.5).abs() < 1e-6);
        assert!((buffer[999].left - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_plugins_process_channels_and_master_out() {
        let mut bench = Bench::new();
        bench.add_playing(4);
        bench.layout.channels[3].plugins = vec![1];
        if let Some(master) = bench.layout.channel_mut(ChannelId::MASTER_OUT) {
            master.plugins = vec![2];
        }
        let mut host = GainHost {
            gain: 0.5,
            midi_seen: Arc::new(AtomicUsize::new(0)),
        };

        let out = bench.render_with(2, &StereoBuffer::silence(2), false, Some(&mut host));
        assert_eq!(left(&out), vec![0.25, 0.5]);
    }
}
