//! Native JACK audio backend for Linux
//!
//! Registers a stereo line-in and a stereo output, follows the JACK
//! transport and routes to any capture/playback port pair.
//!
//! ```text
//! ┌──────────────────┐   push()   ┌──────────────────┐
//! │  Control thread  │───────────►│  Command queue   │
//! │  (EngineHandle)  │            │ (lock-free SPSC) │
//! └──────────────────┘            └────────┬─────────┘
//!                                          │ pop()
//! ┌──────────────────┐  query()   ┌────────▼─────────┐
//! │  JACK transport  │───────────►│  JACK RT thread  │
//! └──────────────────┘  per cycle │ (owns the engine)│
//!                                 └──────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use jack::{AudioIn, AudioOut, Client, ClientOptions, Control, Port, ProcessScope};

use super::backend::{latency_ms, AudioHandle, AudioSystemResult, StereoPair};
use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::error::{AudioError, AudioResult};
use crate::config::EngineConfig;
use crate::engine::{create_engine, AudioEngine, TransportState};
use crate::types::{Frame, StereoBuffer, StereoSample};

const OUT_LEFT: &str = "out_left";
const OUT_RIGHT: &str = "out_right";
const IN_LEFT: &str = "in_left";
const IN_RIGHT: &str = "in_right";

/// JACK-specific audio handle
///
/// Keeps the JACK client active. Drop this to disconnect from JACK.
pub struct JackAudioHandle {
    _async_client: jack::AsyncClient<JackNotifications, JackProcessor>,
    sample_rate: u32,
    buffer_size: u32,
}

impl JackAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

/// JACK process handler; owns the engine exclusively
struct JackProcessor {
    out_left: Port<AudioOut>,
    out_right: Port<AudioOut>,
    in_left: Port<AudioIn>,
    in_right: Port<AudioIn>,
    engine: AudioEngine,
    follow_transport: bool,
    output: StereoBuffer,
    input: StereoBuffer,
}

impl JackProcessor {
    fn poll_transport(&mut self, client: &Client) {
        let Ok(position) = client.transport().query() else {
            return;
        };
        let state = TransportState {
            running: matches!(position.state, jack::TransportState::Rolling),
            bpm: position.pos.bbt().map_or(0.0, |bbt| bbt.bpm as f32),
            frame: position.pos.frame() as Frame,
        };
        self.engine.sync_transport(state);
    }
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, client: &Client, ps: &ProcessScope) -> Control {
        let n_frames = (ps.n_frames() as usize).min(MAX_BUFFER_SIZE);

        if self.follow_transport {
            self.poll_transport(client);
        }

        self.input.set_len_from_capacity(n_frames);
        let in_left = self.in_left.as_slice(ps);
        let in_right = self.in_right.as_slice(ps);
        for (i, sample) in self.input.iter_mut().enumerate() {
            *sample = StereoSample::new(in_left[i], in_right[i]);
        }

        self.output.set_len_from_capacity(n_frames);
        self.engine.process(&mut self.output, Some(&self.input));

        let out_left = self.out_left.as_mut_slice(ps);
        let out_right = self.out_right.as_mut_slice(ps);
        out_left.fill(0.0);
        out_right.fill(0.0);
        for (i, sample) in self.output.iter().enumerate() {
            out_left[i] = sample.left;
            out_right[i] = sample.right;
        }

        Control::Continue
    }
}

/// JACK notification handler
struct JackNotifications;

impl jack::NotificationHandler for JackNotifications {
    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::info!("JACK sample rate changed to: {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

fn jack_error(what: &str, e: impl std::fmt::Display) -> AudioError {
    AudioError::Jack(format!("{}: {}", what, e))
}

/// Create the JACK client, register ports and start the engine
pub fn start_audio_system(
    config: &AudioConfig,
    engine_config: EngineConfig,
) -> AudioResult<AudioSystemResult> {
    // JACK may rename the client if the name is taken
    let (client, _status) = Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
        .map_err(|e| jack_error("Failed to create client", e))?;
    let client_name = client.name().to_string();

    let sample_rate = client.sample_rate() as u32;
    let buffer_size = client.buffer_size();
    let latency_ms = latency_ms(buffer_size, sample_rate);

    log::info!(
        "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames, latency: {:.1}ms)",
        client_name,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let register = |e| jack_error("Failed to register port", e);
    let out_left = client.register_port(OUT_LEFT, AudioOut::default()).map_err(register)?;
    let out_right = client.register_port(OUT_RIGHT, AudioOut::default()).map_err(register)?;
    let in_left = client.register_port(IN_LEFT, AudioIn::default()).map_err(register)?;
    let in_right = client.register_port(IN_RIGHT, AudioIn::default()).map_err(register)?;

    let (mut engine, handle, midi_out) = create_engine(engine_config, sample_rate);
    engine.set_input_enabled(config.input_enabled);

    let processor = JackProcessor {
        out_left,
        out_right,
        in_left,
        in_right,
        engine,
        follow_transport: config.jack_transport,
        output: StereoBuffer::silence(MAX_BUFFER_SIZE),
        input: StereoBuffer::silence(MAX_BUFFER_SIZE),
    };

    let async_client = client
        .activate_async(JackNotifications, processor)
        .map_err(|e| jack_error("Failed to activate client", e))?;
    log::info!("JACK client activated");

    if let Err(e) = connect_ports(&client_name, config.output_pair_index, config.input_pair_index) {
        log::warn!("Auto-connect failed: {}", e);
    }

    Ok(AudioSystemResult {
        handle: AudioHandle::Jack(JackAudioHandle {
            _async_client: async_client,
            sample_rate,
            buffer_size,
        }),
        engine: Arc::new(handle),
        midi_out,
        client_name,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Port Enumeration
// ═══════════════════════════════════════════════════════════════════════════════

/// Group `device:port` names into stereo pairs
///
/// Understands PipeWire surround naming (FL/FR, RL/RR) and traditional
/// numbered JACK ports.
fn group_stereo_pairs(ports: Vec<String>) -> Vec<StereoPair> {
    let mut devices: HashMap<String, Vec<String>> = HashMap::new();
    for port in ports {
        if let Some(colon_pos) = port.rfind(':') {
            devices.entry(port[..colon_pos].to_string()).or_default().push(port);
        }
    }

    let mut pairs = Vec::new();
    for (device_name, mut device_ports) in devices {
        device_ports.sort();
        let short_name = device_name.split(' ').next().unwrap_or(&device_name);
        let find = |suffix: &str| device_ports.iter().find(|p| p.ends_with(suffix)).cloned();

        if let (Some(fl), Some(fr)) = (find("_FL"), find("_FR")) {
            pairs.push(StereoPair {
                label: format!("{} Front", short_name),
                left: fl,
                right: fr,
            });
            if let (Some(rl), Some(rr)) = (find("_RL"), find("_RR")) {
                pairs.push(StereoPair {
                    label: format!("{} Rear", short_name),
                    left: rl,
                    right: rr,
                });
            }
        } else {
            for (i, chunk) in device_ports.chunks_exact(2).enumerate() {
                pairs.push(StereoPair {
                    label: format!("{} {}-{}", short_name, i * 2 + 1, i * 2 + 2),
                    left: chunk[0].clone(),
                    right: chunk[1].clone(),
                });
            }
        }
    }

    pairs.sort_by(|a, b| a.label.cmp(&b.label));
    pairs
}

fn query_pairs(pattern: &str, flags: jack::PortFlags) -> Vec<StereoPair> {
    let (client, _) = match Client::new("looper_port_query", ClientOptions::NO_START_SERVER) {
        Ok(c) => c,
        Err(e) => {
            log::debug!("Could not connect to JACK to enumerate ports: {}", e);
            return vec![];
        }
    };
    group_stereo_pairs(client.ports(Some(pattern), None, flags))
}

/// Hardware playback pairs (inputs of the audio device)
pub fn get_available_stereo_pairs() -> Vec<StereoPair> {
    query_pairs(".*:playback_.*", jack::PortFlags::IS_INPUT)
}

/// Hardware capture pairs (outputs of the audio device)
pub fn get_available_capture_pairs() -> Vec<StereoPair> {
    query_pairs(".*:capture_.*", jack::PortFlags::IS_OUTPUT)
}

/// Connect our ports to the given playback and capture pairs (0 = first)
pub fn connect_ports(
    client_name: &str,
    output_pair: Option<usize>,
    input_pair: Option<usize>,
) -> AudioResult<()> {
    let (client, _) = Client::new(&format!("{}_connect", client_name), ClientOptions::NO_START_SERVER)
        .map_err(|e| jack_error("Failed to create client", e))?;
    let ours = |port: &str| format!("{}:{}", client_name, port);

    match get_available_stereo_pairs().get(output_pair.unwrap_or(0)) {
        Some(pair) => {
            for (from, to) in [(ours(OUT_LEFT), &pair.left), (ours(OUT_RIGHT), &pair.right)] {
                if let Err(e) = client.connect_ports_by_name(&from, to) {
                    log::warn!("Could not connect {} to {}: {}", from, to, e);
                }
            }
            log::info!("Connected output to {} and {}", pair.left, pair.right);
        }
        None => log::warn!("No JACK playback ports found for connection"),
    }

    match get_available_capture_pairs().get(input_pair.unwrap_or(0)) {
        Some(pair) => {
            for (from, to) in [(&pair.left, ours(IN_LEFT)), (&pair.right, ours(IN_RIGHT))] {
                if let Err(e) = client.connect_ports_by_name(from, &to) {
                    log::warn!("Could not connect {} to {}: {}", from, to, e);
                }
            }
            log::info!("Connected line-in from {} and {}", pair.left, pair.right);
        }
        None => log::debug!("No JACK capture ports found for connection"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_ports_pair_up() {
        let ports = vec![
            "system:playback_2".to_string(),
            "system:playback_1".to_string(),
            "system:playback_3".to_string(),
        ];
        let pairs = group_stereo_pairs(ports);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].label, "system 1-2");
        assert_eq!(pairs[0].left, "system:playback_1");
    }

    #[test]
    fn test_surround_ports_pair_up() {
        let ports = ["FL", "FR", "RL", "RR"]
            .iter()
            .map(|s| format!("Card Pro:playback_{}", s))
            .collect();
        let pairs = group_stereo_pairs(ports);
        let labels: Vec<&str> = pairs.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Card Front", "Card Rear"]);
    }
}
