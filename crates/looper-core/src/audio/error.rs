//! Audio backend error types

use thiserror::Error;

/// Errors that can occur while opening or running the audio backend
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Line-in and output must run at the same rate
    #[error("Sample rate mismatch: output={output}Hz, input={input}Hz")]
    SampleRateMismatch { output: u32, input: u32 },

    /// JACK server or client failure
    #[error("JACK error: {0}")]
    Jack(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
