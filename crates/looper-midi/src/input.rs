//! MIDI input handling
//!
//! The midir callback runs on the MIDI driver thread: it parses the raw
//! bytes, dispatches the event to the engine, and forwards a copy on a
//! flume channel for anyone watching the controller (MIDI learn, logs).

use flume::{Receiver, Sender};
use looper_core::engine::{EngineHandle, MidiEvent, CONTROL_CHANGE, NOTE_OFF, NOTE_ON};
use midir::MidiInputConnection;
use std::sync::Arc;

use crate::config::MidiConfig;
use crate::connection::{MidiConnection, MidiConnectionError};
use crate::dispatch;

/// Max events buffered for observers before new ones are dropped
const OBSERVER_QUEUE_CAPACITY: usize = 256;

/// Raw controller event with its driver timestamp (microseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiInputEvent {
    pub timestamp: u64,
    pub event: MidiEvent,
}

impl MidiInputEvent {
    /// Parse raw MIDI bytes
    ///
    /// Only note and control change messages are kept; clock, SysEx,
    /// pitch bend and aftertouch are ignored.
    pub fn parse(timestamp: u64, data: &[u8]) -> Option<Self> {
        let event = MidiEvent::from_bytes(data)?;
        match event.kind() {
            NOTE_ON | NOTE_OFF | CONTROL_CHANGE if data.len() >= 3 => {
                Some(Self { timestamp, event })
            }
            _ => None,
        }
    }

    pub fn is_press(&self) -> bool {
        self.event.kind() == NOTE_ON && self.event.data2 > 0
    }

    pub fn is_release(&self) -> bool {
        self.event.is_note_off()
    }
}

/// Data owned by the midir callback
struct CallbackData {
    config: Arc<MidiConfig>,
    engine: Arc<EngineHandle>,
    observer_tx: Sender<MidiInputEvent>,
}

/// A connected controller input
///
/// Dropping the handler closes the port.
pub struct MidiInputHandler {
    _connection: MidiInputConnection<CallbackData>,
    observer_rx: Receiver<MidiInputEvent>,
}

impl MidiInputHandler {
    /// Connect to the first input port matching `port_match`
    pub fn connect(
        port_match: &str,
        config: Arc<MidiConfig>,
        engine: Arc<EngineHandle>,
    ) -> Result<Self, MidiConnectionError> {
        let (midi_in, port) = MidiConnection::find_input_port(port_match)?;
        let (observer_tx, observer_rx) = flume::bounded(OBSERVER_QUEUE_CAPACITY);

        let callback_data = CallbackData {
            config,
            engine,
            observer_tx,
        };

        let connection = midi_in
            .connect(&port, "looper-midi-input", Self::midi_callback, callback_data)
            .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))?;

        log::info!("MIDI: Input handler connected");

        Ok(Self {
            _connection: connection,
            observer_rx,
        })
    }

    /// Events seen on the controller, after dispatch
    pub fn events(&self) -> &Receiver<MidiInputEvent> {
        &self.observer_rx
    }

    /// Called from the MIDI driver thread for every message
    fn midi_callback(timestamp: u64, data: &[u8], data_ref: &mut CallbackData) {
        let Some(input) = MidiInputEvent::parse(timestamp, data) else {
            return;
        };
        dispatch::dispatch(&data_ref.config, &input.event, &data_ref.engine);
        // Observers are optional; a full queue just drops the copy
        let _ = data_ref.observer_tx.try_send(input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_and_cc() {
        let on = MidiInputEvent::parse(10, &[0x91, 60, 100]).unwrap();
        assert_eq!(on.event, MidiEvent::note_on(1, 60, 100));
        assert!(on.is_press());
        assert!(!on.is_release());

        let cc = MidiInputEvent::parse(11, &[0xB0, 7, 64]).unwrap();
        assert_eq!(cc.event.kind(), CONTROL_CHANGE);
        assert!(!cc.is_press());
    }

    #[test]
    fn test_note_on_zero_velocity_is_release() {
        let event = MidiInputEvent::parse(0, &[0x90, 60, 0]).unwrap();
        assert!(event.is_release());
        assert!(!event.is_press());
    }

    #[test]
    fn test_ignores_other_messages() {
        assert!(MidiInputEvent::parse(0, &[0xF8]).is_none());
        assert!(MidiInputEvent::parse(0, &[0xE0, 0, 64]).is_none());
        assert!(MidiInputEvent::parse(0, &[0x90, 60]).is_none());
        assert!(MidiInputEvent::parse(0, &[]).is_none());
    }
}
