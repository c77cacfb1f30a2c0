//! Looper engine - model store, sequencer, channels and mixer
//!
//! Rendering happens on the audio thread inside [`AudioEngine::process`].
//! Everything else goes through [`EngineHandle`]:
//! - Layout edits are published to the audio thread through the model store
//! - Key presses and transport intents travel on a lock-free command queue
//! - The audio thread reports back through feedback and MIDI rings
//! - Control threads subscribe to [`EngineEvent`]s

mod actions;
mod channel;
mod command;
mod engine;
mod error;
mod event;
mod gc;
mod handle;
mod metronome;
mod midi;
mod mixer;
mod model;
mod plugin;
mod quantizer;
mod sequencer;
mod sync;

pub use actions::*;
pub use channel::*;
pub use command::*;
pub use engine::*;
pub use error::*;
pub use event::*;
pub use gc::*;
pub use handle::*;
pub use metronome::*;
pub use midi::*;
pub use mixer::*;
pub use model::*;
pub use plugin::*;
pub use quantizer::*;
pub use sequencer::*;
pub use sync::*;
