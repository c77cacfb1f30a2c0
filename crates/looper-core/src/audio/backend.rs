//! Backend selection and the handles returned to the application
//!
//! - **Linux with `jack-backend`**: native JACK ports and transport
//! - **Everywhere else**: CPAL output stream plus an optional input stream
//!
//! Both backends create the engine once the device sample rate is known and
//! move the [`AudioEngine`](crate::engine::AudioEngine) into the audio
//! callback. The application keeps the [`EngineHandle`].

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::{EngineHandle, MidiOutConsumer};

use super::config::AudioConfig;
use super::error::AudioResult;

/// Stereo port pair for audio routing
///
/// - On JACK: port names like "system:playback_1" and "system:playback_2"
/// - On CPAL: device label (left and right are the same)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StereoPair {
    /// Human-readable label (e.g., "system 1-2" or "[ALSA] hw:0,0")
    pub label: String,
    pub left: String,
    pub right: String,
}

impl std::fmt::Display for StereoPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Everything the application needs once audio is running
pub struct AudioSystemResult {
    /// Keeps audio alive (drop to stop)
    pub handle: AudioHandle,
    /// Control surface of the engine now owned by the audio thread
    pub engine: Arc<EngineHandle>,
    /// Outbound MIDI (clock, timecode, channel MIDI, lights)
    pub midi_out: MidiOutConsumer,
    /// JACK client name, or the output device name on CPAL
    pub client_name: String,
    pub sample_rate: u32,
    /// Actual buffer size in frames
    pub buffer_size: u32,
    /// One-way output latency in milliseconds
    pub latency_ms: f32,
}

/// Handle to the active audio system
///
/// Keeps the audio streams or client alive. Drop this to stop audio.
pub enum AudioHandle {
    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    Cpal(super::cpal_backend::CpalAudioHandle),

    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    Jack(super::jack_backend::JackAudioHandle),
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.sample_rate(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.sample_rate(),
        }
    }

    pub fn buffer_size(&self) -> u32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.buffer_size(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.buffer_size(),
        }
    }

    pub fn latency_ms(&self) -> f32 {
        latency_ms(self.buffer_size(), self.sample_rate())
    }

    /// Whether a line-in is feeding the engine
    pub fn has_input(&self) -> bool {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.has_input(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(_) => true,
        }
    }
}

#[inline]
pub(crate) fn latency_ms(buffer_size: u32, sample_rate: u32) -> f32 {
    (buffer_size as f32 / sample_rate.max(1) as f32) * 1000.0
}

// ═══════════════════════════════════════════════════════════════════════════════
// Platform-specific audio system startup
// ═══════════════════════════════════════════════════════════════════════════════

/// Open the audio backend and start rendering
///
/// The engine is created at the backend's sample rate with `engine_config`.
pub fn start_audio_system(
    config: &AudioConfig,
    engine_config: EngineConfig,
) -> AudioResult<AudioSystemResult> {
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    {
        super::jack_backend::start_audio_system(config, engine_config)
    }

    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    {
        super::cpal_backend::start_audio_system(config, engine_config)
    }
}

/// Output pairs for a settings listing
pub fn get_available_stereo_pairs() -> Vec<StereoPair> {
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    {
        super::jack_backend::get_available_stereo_pairs()
    }

    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    {
        super::cpal_backend::get_available_stereo_pairs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency() {
        assert!((latency_ms(480, 48000) - 10.0).abs() < 1e-4);
        assert_eq!(latency_ms(256, 0), 256000.0);
    }

    #[test]
    fn test_stereo_pair_display() {
        let pair = StereoPair {
            label: "system 1-2".into(),
            left: "system:playback_1".into(),
            right: "system:playback_2".into(),
        };
        assert_eq!(pair.to_string(), "system 1-2");
    }
}
