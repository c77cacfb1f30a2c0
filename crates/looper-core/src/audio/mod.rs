//! Audio backends
//!
//! - **Linux** with the `jack-backend` feature: native JACK ports and
//!   transport
//! - **Everywhere else**: CPAL output stream plus an optional line-in stream
//!
//! The backend owns the [`AudioEngine`](crate::engine::AudioEngine) on its
//! real-time thread. Control threads talk to it through the
//! [`EngineHandle`](crate::engine::EngineHandle) in [`AudioSystemResult`].
//!
//! ```ignore
//! use looper_core::audio::{start_audio_system, AudioConfig};
//! use looper_core::config::EngineConfig;
//!
//! let audio = start_audio_system(&AudioConfig::default(), EngineConfig::default())?;
//! audio.engine.start()?;
//! ```

mod backend;
mod config;
mod device;
mod error;

#[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
mod cpal_backend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_backend;

pub use backend::{
    get_available_stereo_pairs, start_audio_system, AudioHandle, AudioSystemResult, StereoPair,
};
pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_CLIENT_NAME,
    DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use device::{get_available_devices, get_devices, AudioDevice, Direction};
pub use error::{AudioError, AudioResult};
