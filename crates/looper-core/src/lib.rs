//! Looper Core - real-time engine of the live looper
//!
//! Sample and MIDI channels driven by a looping sequencer, rendered by a
//! mixer on the audio thread and controlled through an [`engine::EngineHandle`].

pub mod audio;
pub mod config;
pub mod engine;
pub mod types;

pub use types::*;
