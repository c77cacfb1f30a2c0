//! MIDI port discovery and connection
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on macOS,
//! WinMM on Windows). Ports are matched case-insensitively by substring.

use midir::{MidiInput, MidiInputPort, MidiOutput, MidiOutputConnection, MidiOutputPort};

/// Error type for MIDI connection operations
#[derive(Debug, thiserror::Error)]
pub enum MidiConnectionError {
    #[error("Failed to initialize MIDI input: {0}")]
    InputInitError(String),

    #[error("Failed to initialize MIDI output: {0}")]
    OutputInitError(String),

    #[error("No MIDI {0} ports available")]
    NoPorts(&'static str),

    #[error("No MIDI port found matching pattern: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    ConnectionError(String),

    #[error("Failed to get port info: {0}")]
    PortInfoError(String),
}

/// Case-insensitive substring match of a port name
pub fn port_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// Port lookup helpers
pub struct MidiConnection;

impl MidiConnection {
    /// Find the first input port whose name contains `port_match`
    ///
    /// Returns the `MidiInput` so the caller can connect its own callback.
    pub fn find_input_port(
        port_match: &str,
    ) -> Result<(MidiInput, MidiInputPort), MidiConnectionError> {
        let midi_in = MidiInput::new("looper-midi-in")
            .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

        let in_ports = midi_in.ports();
        if in_ports.is_empty() {
            return Err(MidiConnectionError::NoPorts("input"));
        }

        let input_port = in_ports
            .into_iter()
            .find(|port| {
                midi_in
                    .port_name(port)
                    .map(|name| port_matches(&name, port_match))
                    .unwrap_or(false)
            })
            .ok_or_else(|| MidiConnectionError::PortNotFound(port_match.to_string()))?;

        let port_name = midi_in
            .port_name(&input_port)
            .map_err(|e| MidiConnectionError::PortInfoError(e.to_string()))?;
        log::info!("MIDI: Found input port: {}", port_name);

        Ok((midi_in, input_port))
    }

    /// Find the first output port whose name contains `port_match`
    pub fn find_output_port(
        port_match: &str,
    ) -> Result<(MidiOutput, MidiOutputPort), MidiConnectionError> {
        let midi_out = MidiOutput::new("looper-midi-out")
            .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

        let out_ports = midi_out.ports();
        if out_ports.is_empty() {
            return Err(MidiConnectionError::NoPorts("output"));
        }

        let output_port = out_ports
            .into_iter()
            .find(|port| {
                midi_out
                    .port_name(port)
                    .map(|name| port_matches(&name, port_match))
                    .unwrap_or(false)
            })
            .ok_or_else(|| MidiConnectionError::PortNotFound(port_match.to_string()))?;

        let port_name = midi_out
            .port_name(&output_port)
            .map_err(|e| MidiConnectionError::PortInfoError(e.to_string()))?;
        log::info!("MIDI: Found output port: {}", port_name);

        Ok((midi_out, output_port))
    }

    /// Connect to the first output port matching `port_match`
    pub fn connect_output(port_match: &str) -> Result<MidiOutputConnection, MidiConnectionError> {
        let (midi_out, port) = Self::find_output_port(port_match)?;
        midi_out
            .connect(&port, "looper-midi-output")
            .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))
    }

    /// List all available MIDI input ports
    pub fn list_input_ports() -> Result<Vec<String>, MidiConnectionError> {
        let midi_in = MidiInput::new("looper-midi-list")
            .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    /// List all available MIDI output ports
    pub fn list_output_ports() -> Result<Vec<String>, MidiConnectionError> {
        let midi_out = MidiOutput::new("looper-midi-list")
            .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect())
    }
}
