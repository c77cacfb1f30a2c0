//! Looper - headless live looping workstation
//!
//! This is the main entry point. It:
//! 1. Loads the YAML config (engine, audio, MIDI)
//! 2. Starts the audio backend, which owns the real-time engine
//! 3. Connects the MIDI controller and output port
//! 4. Runs a text console on stdin and pumps engine feedback
//!
//! ## Command line flags
//!
//! - `--config PATH`: Use a config file other than ~/.config/looper/config.yaml
//! - `--list-devices`: Print audio devices and MIDI ports, then exit

mod commands;
mod config;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use looper_core::audio::{
    get_available_devices, start_audio_system, AudioSystemResult, Direction,
};
use looper_core::config::load_config;
use looper_core::engine::{gc_handle, EngineEvent, EngineHandle};
use looper_midi::{MidiConnection, MidiSystem};

use commands::Flow;
use config::AppConfig;

/// How often engine feedback is pumped when the console is idle
const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct Args {
    config_path: PathBuf,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        config_path: config::default_app_config_path(),
        list_devices: false,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config_path = PathBuf::from(path);
            }
            "--list-devices" => parsed.list_devices = true,
            other => anyhow::bail!("unknown argument '{}'", other),
        }
    }
    Ok(parsed)
}

fn list_devices() {
    for direction in [Direction::Output, Direction::Input] {
        println!("Audio {} devices:", direction);
        for device in get_available_devices(direction) {
            println!("  {}", device);
        }
    }
    match MidiConnection::list_input_ports() {
        Ok(ports) => println!("MIDI inputs: {:?}", ports),
        Err(e) => println!("MIDI inputs unavailable: {}", e),
    }
    match MidiConnection::list_output_ports() {
        Ok(ports) => println!("MIDI outputs: {:?}", ports),
        Err(e) => println!("MIDI outputs unavailable: {}", e),
    }
}

/// Read stdin lines on their own thread; the channel closes on EOF
fn spawn_console() -> Result<Receiver<String>> {
    let (tx, rx) = crossbeam::channel::unbounded();
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("console: failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn console thread")?;
    Ok(rx)
}

fn log_event(event: EngineEvent) {
    match event {
        EngineEvent::LayoutChanged { generation } => log::debug!("layout {}", generation),
        EngineEvent::ActionRecorded { channel, frame } => {
            log::debug!("action recorded on channel {} at frame {}", channel, frame)
        }
        EngineEvent::SequencerStarted => log::info!("sequencer started"),
        EngineEvent::SequencerStopped => log::info!("sequencer stopped"),
        EngineEvent::SequencerRewound => log::debug!("sequencer rewound"),
        EngineEvent::BpmChanged(bpm) => log::info!("bpm {:.2}", bpm),
        EngineEvent::ActionRecordingChanged(on) => log::info!("action recording: {}", on),
        EngineEvent::InputRecordingChanged(on) => log::info!("input recording: {}", on),
        EngineEvent::SignalThresholdReached => log::info!("input signal reached the trigger level"),
        EngineEvent::InputRecorded { frames, channels } => {
            log::info!("recorded {} frames into channels {:?}", frames, channels)
        }
        EngineEvent::CommandDropped(name) => log::warn!("dropped command: {}", name),
        EngineEvent::FeedbackOverflow { dropped } => {
            log::warn!("engine feedback lost: {} messages", dropped)
        }
    }
}

fn run_console(engine: &EngineHandle, lines: Receiver<String>) {
    let events = engine.subscribe();
    loop {
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => match commands::parse(&line) {
                Ok(Some(command)) => match commands::execute(command, engine) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("error: {}", e),
                },
                Ok(None) => {}
                Err(e) => println!("{}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        engine.poll();
        for event in events.try_iter() {
            log_event(event);
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    if args.list_devices {
        list_devices();
        return Ok(());
    }

    log::info!("looper starting up");
    let config: AppConfig = load_config(&args.config_path);

    // Start the collector before any layout is allocated
    let _ = gc_handle();

    let AudioSystemResult {
        handle: audio,
        engine,
        midi_out,
        client_name,
        sample_rate,
        buffer_size,
        latency_ms,
    } = start_audio_system(&config.audio, config.engine.clone())
        .context("Failed to start audio")?;

    println!(
        "Audio running on '{}': {} Hz, {} frames ({:.1} ms){}",
        client_name,
        sample_rate,
        buffer_size,
        latency_ms,
        if audio.has_input() { ", line-in enabled" } else { "" }
    );

    let midi = match MidiSystem::start(config.midi.clone(), Arc::clone(&engine), midi_out) {
        Ok(midi) => Some(midi),
        Err(e) => {
            log::warn!("MIDI disabled: {}", e);
            None
        }
    };

    println!("Type 'help' for commands.");
    let lines = spawn_console()?;
    run_console(&engine, lines);

    if let Err(e) = engine.stop() {
        log::warn!("stop on exit failed: {}", e);
    }
    // Let the audio thread see the stop before the streams close
    std::thread::sleep(POLL_INTERVAL);

    drop(midi);
    drop(audio);
    log::info!("looper stopped");
    Ok(())
}
