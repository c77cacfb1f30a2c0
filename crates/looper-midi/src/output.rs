//! MIDI output worker
//!
//! The audio thread queues clock, timecode, channel relays and lights on a
//! lock-free ring. This worker drains the ring on its own thread and writes
//! the bytes to the output port, so the audio callback never touches the
//! MIDI driver.

use std::thread::JoinHandle;
use std::time::Duration;

use flume::{RecvTimeoutError, Sender};
use looper_core::engine::MidiOutConsumer;
use midir::MidiOutputConnection;

/// How often the worker wakes to drain the ring
///
/// MIDI clock at 300 bpm ticks every ~8 ms; 1 ms keeps jitter well under it.
const DRAIN_INTERVAL: Duration = Duration::from_millis(1);

/// Destination for outbound MIDI bytes
pub trait MidiSink: Send + 'static {
    fn send(&mut self, bytes: &[u8]) -> Result<(), String>;
}

impl MidiSink for MidiOutputConnection {
    fn send(&mut self, bytes: &[u8]) -> Result<(), String> {
        MidiOutputConnection::send(self, bytes).map_err(|e| e.to_string())
    }
}

/// Background thread feeding a [`MidiSink`] from the engine's MIDI ring
///
/// Stops and joins on drop; anything still queued is flushed first.
pub struct MidiOutputWorker {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MidiOutputWorker {
    pub fn spawn<S: MidiSink>(sink: S, midi_rx: MidiOutConsumer) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);

        let thread = std::thread::Builder::new()
            .name("midi-out".into())
            .spawn(move || {
                let mut sink = sink;
                let mut midi_rx = midi_rx;
                let mut errors = 0u64;
                loop {
                    let stop = match stop_rx.recv_timeout(DRAIN_INTERVAL) {
                        Err(RecvTimeoutError::Timeout) => false,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                    };
                    while let Ok(message) = midi_rx.pop() {
                        if let Err(e) = sink.send(message.as_bytes()) {
                            errors += 1;
                            // Only the first failure is worth a line; a
                            // vanished port fails every message
                            if errors == 1 {
                                log::warn!("MIDI: output send failed: {}", e);
                            }
                        }
                    }
                    if stop {
                        break;
                    }
                }
                if errors > 0 {
                    log::warn!("MIDI: {} output messages failed", errors);
                }
                log::debug!("MIDI: output worker stopped");
            })?;

        log::info!("MIDI: Output worker started");

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for MidiOutputWorker {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("MIDI: output worker panicked");
            }
        }
    }
}
