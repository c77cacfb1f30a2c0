//! Audio backend configuration
//!
//! Device selection, buffer size, sample rate and line-in settings.

use serde::{Deserialize, Serialize};

pub use crate::types::MAX_BUFFER_SIZE;

/// Default buffer size when no preference is specified (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 256;

/// Buffer size used by [`BufferSize::LowLatency`]
pub const LOW_LATENCY_BUFFER_SIZE: u32 = 128;

/// Smallest buffer we ask a device for
pub const MIN_BUFFER_SIZE: u32 = 32;

/// Default sample rate for the audio system
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default JACK client name
pub const DEFAULT_CLIENT_NAME: &str = "looper";

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// [`DEFAULT_BUFFER_SIZE`]
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to sane bounds)
    Fixed(u32),
    /// Small buffer for live playing
    LowLatency,
}

impl BufferSize {
    /// Buffer size in frames to request from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32),
            BufferSize::LowLatency => LOW_LATENCY_BUFFER_SIZE,
        }
    }

    /// One-way latency in milliseconds at `sample_rate`
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate.max(1) as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (JACK, ALSA, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "JACK", "ALSA", "CoreAudio")
    /// If None, every host is searched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Label including the host, e.g. "[ALSA] hw:0,0"
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default). CPAL only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<DeviceId>,

    /// Line-in device (None = system default). CPAL only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<DeviceId>,

    /// Open the line-in for monitoring and recording
    pub input_enabled: bool,

    /// Playback port pair for the JACK backend (0 = first)
    pub output_pair_index: Option<usize>,

    /// Capture port pair for the JACK backend (0 = first)
    pub input_pair_index: Option<usize>,

    /// JACK client name
    pub client_name: String,

    /// Follow start/stop, rewind and tempo of the JACK transport
    pub jack_transport: bool,

    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = [`DEFAULT_SAMPLE_RATE`])
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_device: None,
            input_device: None,
            input_enabled: true,
            output_pair_index: None,
            input_pair_index: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            jack_transport: true,
            buffer_size: BufferSize::default(),
            sample_rate: None,
        }
    }
}

impl AudioConfig {
    /// Output only, no line-in
    pub fn output_only() -> Self {
        Self {
            input_enabled: false,
            ..Default::default()
        }
    }

    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Sample rate to ask the device for
    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}
