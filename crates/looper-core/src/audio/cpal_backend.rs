//! CPAL audio backend
//!
//! ```text
//! ┌──────────────────┐   push()   ┌──────────────────┐
//! │  Control thread  │───────────►│  Command queue   │
//! │  (EngineHandle)  │            │ (lock-free SPSC) │
//! └──────────────────┘            └────────┬─────────┘
//!                                          │ pop()
//! ┌──────────────────┐   push()   ┌────────▼─────────┐
//! │   Input stream   │───────────►│  Output stream   │
//! │    (line-in)     │  line-in   │ (owns the engine)│
//! └──────────────────┘   ring     └──────────────────┘
//! ```
//!
//! The output callback owns the engine outright; nothing is shared behind a
//! mutex. The input stream only feeds a sample ring that the output callback
//! drains once per block, substituting silence when it runs dry.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::backend::{latency_ms, AudioHandle, AudioSystemResult, StereoPair};
use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{get_available_devices, resolve_device, Direction};
use super::error::{AudioError, AudioResult};
use crate::config::EngineConfig;
use crate::engine::{create_engine, AudioEngine};
use crate::types::{StereoBuffer, StereoSample};

/// Line-in ring size in blocks; absorbs jitter between the two streams
const INPUT_RING_BLOCKS: usize = 8;

/// CPAL-specific audio handle
///
/// Keeps the streams alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _output_stream: Stream,
    _input_stream: Option<Stream>,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn has_input(&self) -> bool {
        self._input_stream.is_some()
    }
}

/// Open the output (and line-in) streams and start the engine
pub fn start_audio_system(
    config: &AudioConfig,
    engine_config: EngineConfig,
) -> AudioResult<AudioSystemResult> {
    let device = resolve_device(config.output_device.as_ref(), Direction::Output)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio output device: {}", device_name);

    let buffer_size = config.buffer_size.frames();
    let supported = get_stream_config(&device, Direction::Output, config.target_sample_rate())?;
    let sample_rate = supported.sample_rate().0;
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    let latency_ms = latency_ms(buffer_size, sample_rate);

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let (mut engine, handle, midi_out) = create_engine(engine_config, sample_rate);

    let line_in = if config.input_enabled {
        match open_input(config, sample_rate, buffer_size) {
            Ok(line_in) => Some(line_in),
            Err(e) => {
                log::warn!("Line-in unavailable, continuing output-only: {}", e);
                None
            }
        }
    } else {
        None
    };
    engine.set_input_enabled(line_in.is_some());

    let (input_stream, input_rx) = match line_in {
        Some((stream, rx)) => (Some(stream), Some(rx)),
        None => (None, None),
    };

    let state = AudioCallbackState::new(engine, input_rx);
    let output_stream = build_output_stream(&device, &stream_config, state)?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;
    if let Some(stream) = &input_stream {
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;
    }

    log::info!(
        "Audio streams started ({})",
        if input_stream.is_some() { "output + line-in" } else { "output only" }
    );

    Ok(AudioSystemResult {
        handle: AudioHandle::Cpal(CpalAudioHandle {
            _output_stream: output_stream,
            _input_stream: input_stream,
            sample_rate,
            buffer_size,
        }),
        engine: Arc::new(handle),
        midi_out,
        client_name: device_name,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// State owned by the output callback
struct AudioCallbackState {
    engine: AudioEngine,
    input_rx: Option<rtrb::Consumer<StereoSample>>,
    /// Pre-allocated output block
    output: StereoBuffer,
    /// Pre-allocated line-in block
    input: StereoBuffer,
}

impl AudioCallbackState {
    fn new(engine: AudioEngine, input_rx: Option<rtrb::Consumer<StereoSample>>) -> Self {
        Self {
            engine,
            input_rx,
            output: StereoBuffer::silence(MAX_BUFFER_SIZE),
            input: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Render one block of at most `MAX_BUFFER_SIZE` frames
    fn process(&mut self, n_frames: usize) {
        self.output.set_len_from_capacity(n_frames);

        match self.input_rx.as_mut() {
            Some(rx) => {
                self.input.set_len_from_capacity(n_frames);
                // Input running ahead: drop the oldest frames to keep latency bounded
                let excess = rx.slots().saturating_sub(n_frames * INPUT_RING_BLOCKS / 2);
                for _ in 0..excess {
                    let _ = rx.pop();
                }
                for sample in self.input.iter_mut() {
                    *sample = rx.pop().unwrap_or_default();
                }
                self.engine.process(&mut self.output, Some(&self.input));
            }
            None => self.engine.process(&mut self.output, None),
        }
    }
}

/// Best supported config for `direction` at the target sample rate
fn get_stream_config(
    device: &cpal::Device,
    direction: Direction,
    target_sample_rate: u32,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Output => device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
        Direction::Input => device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
    };

    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        target_sample_rate >= c.min_sample_rate().0 && target_sample_rate <= c.max_sample_rate().0
    };

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(in_range)
        .or_else(|| {
            supported_configs
                .iter()
                .filter(|c| c.sample_format() == SampleFormat::F32)
                .find(in_range)
        })
        .or_else(|| supported_configs.iter().find(|c| c.sample_format() == SampleFormat::F32))
        .ok_or_else(|| {
            AudioError::ConfigError(format!("No f32 {} configuration available", direction))
        })?;

    let sample_rate = if in_range(&best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok(best_config.clone().with_sample_rate(sample_rate))
}

/// Open the line-in stream; its frames arrive on the returned ring
fn open_input(
    config: &AudioConfig,
    sample_rate: u32,
    buffer_size: u32,
) -> AudioResult<(Stream, rtrb::Consumer<StereoSample>)> {
    let device = resolve_device(config.input_device.as_ref(), Direction::Input)?;
    log::info!(
        "Using audio input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let supported = get_stream_config(&device, Direction::Input, sample_rate)?;
    if supported.sample_rate().0 != sample_rate {
        return Err(AudioError::SampleRateMismatch {
            output: sample_rate,
            input: supported.sample_rate().0,
        });
    }
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let capacity = (buffer_size as usize).max(1) * INPUT_RING_BLOCKS;
    let (tx, rx) = rtrb::RingBuffer::<StereoSample>::new(capacity);
    let stream = build_input_stream(&device, &stream_config, tx)?;
    Ok((stream, rx))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut state: AudioCallbackState,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                // Devices may ask for more than we pre-allocated: render in slices
                for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                    let n_frames = chunk.len() / channels;
                    state.process(n_frames);
                    if channels == 2 && chunk.len() == state.output.len() * 2 {
                        chunk.copy_from_slice(state.output.as_interleaved());
                    } else {
                        write_interleaved(chunk, channels, state.output.as_slice());
                    }
                }
            },
            move |err| {
                log::error!("Output audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut tx: rtrb::Producer<StereoSample>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let sample = read_frame(frame);
                    // Output side stalled: drop rather than block
                    if tx.push(sample).is_err() {
                        break;
                    }
                }
            },
            move |err| {
                log::error!("Input audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Copy stereo frames into a device buffer; extra channels get silence
fn write_interleaved(data: &mut [f32], channels: usize, samples: &[StereoSample]) {
    for (i, frame) in data.chunks_mut(channels).enumerate() {
        let sample = samples.get(i).copied().unwrap_or_default();
        frame[0] = sample.left;
        if channels > 1 {
            frame[1] = sample.right;
        }
        for ch in frame.iter_mut().skip(2) {
            *ch = 0.0;
        }
    }
}

/// First two channels of a device frame; mono inputs feed both sides
fn read_frame(frame: &[f32]) -> StereoSample {
    match frame {
        [] => StereoSample::silence(),
        [mono] => StereoSample::mono(*mono),
        [left, right, ..] => StereoSample::new(*left, *right),
    }
}

/// Output devices listed as pseudo-pairs
pub fn get_available_stereo_pairs() -> Vec<StereoPair> {
    get_available_devices(Direction::Output)
        .into_iter()
        .map(|d| {
            let device_id = d.id.display_label();
            StereoPair {
                label: d.to_string(),
                left: device_id.clone(),
                right: device_id,
            }
        })
        .collect()
}
