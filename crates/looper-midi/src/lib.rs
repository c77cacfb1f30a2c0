//! MIDI controller support for the looper
//!
//! This crate provides:
//! - Controller input via midir, mapped to engine actions
//! - Relay of unbound events to MIDI channels
//! - An output worker for clock, timecode, relayed actions and lights
//!
//! # Architecture
//!
//! ```text
//! Controller → midir callback → dispatch → EngineHandle → command queue
//! AudioEngine → MIDI ring → MidiOutputWorker → output port
//! ```

mod config;
mod connection;
mod dispatch;
mod input;
mod output;

pub use config::{ChannelBinding, GlobalBindings, MidiConfig, MidiControlConfig};
pub use connection::{port_matches, MidiConnection, MidiConnectionError};
pub use dispatch::{apply, dispatch, install_lights, resolve, MidiAction};
pub use input::{MidiInputEvent, MidiInputHandler};
pub use output::{MidiOutputWorker, MidiSink};

use looper_core::engine::{EngineHandle, MidiOutConsumer};
use std::sync::Arc;

/// Error type for MIDI operations
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("MIDI connection error: {0}")]
    ConnectionError(#[from] MidiConnectionError),

    #[error("MIDI output error: {0}")]
    OutputError(String),
}

/// Controller input and MIDI output wired to one engine
///
/// Either side may be missing: an unplugged controller or output port is
/// logged and the looper keeps running without it.
pub struct MidiSystem {
    config: Arc<MidiConfig>,
    engine: Arc<EngineHandle>,
    input: Option<MidiInputHandler>,
    output: Option<MidiOutputWorker>,
}

impl MidiSystem {
    /// Connect the configured ports and install channel lights
    ///
    /// Returns Ok even if no port is found (graceful degradation).
    pub fn start(
        config: MidiConfig,
        engine: Arc<EngineHandle>,
        midi_out: MidiOutConsumer,
    ) -> Result<Self, MidiError> {
        let config = Arc::new(config);
        install_lights(&config, &engine);

        let mut system = Self {
            config,
            engine,
            input: None,
            output: None,
        };

        if let Some(pattern) = system.config.input_port.clone() {
            if let Err(e) = system.connect_input(&pattern) {
                log::warn!("MIDI: No input matching '{}': {}", pattern, e);
            }
        }

        match system.config.output_port.clone() {
            Some(pattern) => match MidiConnection::connect_output(&pattern) {
                Ok(connection) => {
                    let worker = MidiOutputWorker::spawn(connection, midi_out)
                        .map_err(|e| MidiError::OutputError(e.to_string()))?;
                    system.output = Some(worker);
                }
                Err(e) => log::warn!("MIDI: No output matching '{}': {}", pattern, e),
            },
            None => log::info!("MIDI: No output port configured, clock and lights disabled"),
        }

        Ok(system)
    }

    /// (Re)connect the controller input
    pub fn connect_input(&mut self, pattern: &str) -> Result<(), MidiError> {
        // Close the old port first; some drivers allow one client per port
        self.input = None;
        let handler =
            MidiInputHandler::connect(pattern, Arc::clone(&self.config), Arc::clone(&self.engine))?;
        log::info!("MIDI: Connected to input matching '{}'", pattern);
        self.input = Some(handler);
        Ok(())
    }

    pub fn config(&self) -> &MidiConfig {
        &self.config
    }

    pub fn input(&self) -> Option<&MidiInputHandler> {
        self.input.as_ref()
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_core::config::EngineConfig;
    use looper_core::engine::create_engine;

    #[test]
    fn test_start_without_ports() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (_engine, handle, midi_out) = create_engine(EngineConfig::default(), 48000);

        let system = MidiSystem::start(MidiConfig::default(), Arc::new(handle), midi_out).unwrap();
        assert!(!system.has_input());
        assert!(!system.has_output());
    }

    #[test]
    fn test_missing_ports_degrade_gracefully() {
        let (_engine, handle, midi_out) = create_engine(EngineConfig::default(), 48000);
        let config = MidiConfig {
            input_port: Some("no such controller 7f3e".into()),
            output_port: Some("no such output 7f3e".into()),
            ..MidiConfig::default()
        };

        let system = MidiSystem::start(config, Arc::new(handle), midi_out).unwrap();
        assert!(!system.has_input());
        assert!(!system.has_output());
        assert_eq!(system.config().input_port.as_deref(), Some("no such controller 7f3e"));
    }
}
