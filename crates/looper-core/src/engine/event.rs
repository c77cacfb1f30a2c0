//! Messages leaving the audio thread
//!
//! The audio thread never calls into control-thread code. Whatever it needs
//! to report (recorded actions, recorder notifications, transport changes)
//! goes through an [`Outbox`]: an rtrb ring of [`EngineFeedback`] drained by
//! `EngineHandle::poll`, and an rtrb ring of outbound [`MidiMessage`]s drained
//! by the MIDI output worker. Pushes never block; a full ring drops the
//! message, and dropped feedback is counted so the control side can report
//! the loss.
//!
//! After the control thread has applied a piece of feedback it broadcasts a
//! public [`EngineEvent`] on the [`EventBus`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use basedrop::Owned;
use crossbeam::channel::{Receiver, Sender, TrySendError};

use super::actions::Action;
use super::midi::MidiMessage;
use crate::types::{ChannelId, Frame, StereoBuffer};

/// Capacity of the audio → control feedback ring
pub const FEEDBACK_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the outbound MIDI ring (clock ticks, timecode, relays, lights)
pub const MIDI_OUT_QUEUE_CAPACITY: usize = 4096;

/// Capacity of each subscriber's event channel
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// Audio thread → control thread
pub enum EngineFeedback {
    /// A channel recorded an action; merge it into the layout
    ActionRecorded(Action),
    /// The input crossed the record trigger level
    SignalThresholdReached,
    /// The input record buffer is full
    EndOfRecording,
    /// Input recording stopped; the buffer comes back for finalizing
    InputRecorded {
        buffer: Owned<StereoBuffer>,
        frames: Frame,
    },
    SequencerStarted {
        /// Started by the end of a pre-roll rather than a direct start
        from_wait: bool,
    },
    SequencerStopped,
    SequencerRewound,
    /// External transport asked for a new tempo
    BpmChangeRequested(f32),
}

/// Public engine notifications
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new layout was published
    LayoutChanged { generation: u64 },
    SequencerStarted,
    SequencerStopped,
    SequencerRewound,
    BpmChanged(f32),
    ActionRecorded { channel: ChannelId, frame: Frame },
    ActionRecordingChanged(bool),
    InputRecordingChanged(bool),
    SignalThresholdReached,
    /// A recorded wave was assigned to these channels
    InputRecorded { frames: Frame, channels: Vec<ChannelId> },
    /// A command could not be queued
    CommandDropped(&'static str),
    /// The feedback ring overflowed; recorded actions or a finished input
    /// recording were lost
    FeedbackOverflow { dropped: u32 },
}

/// Audio-thread end of the outbound rings
pub struct Outbox {
    feedback: rtrb::Producer<EngineFeedback>,
    midi: rtrb::Producer<MidiMessage>,
    dropped: Arc<AtomicU32>,
}

impl Outbox {
    /// Queue feedback for the control thread; false if the ring is full
    ///
    /// Rejected feedback is dropped here (owned buffers go to the collector)
    /// and counted.
    pub fn feedback(&mut self, feedback: EngineFeedback) -> bool {
        if self.feedback.push(feedback).is_ok() {
            return true;
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Counter of feedback dropped on a full ring, shared with the reader
    pub fn dropped_feedback(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.dropped)
    }

    /// Queue an outbound MIDI message; false if the ring is full
    pub fn midi(&mut self, message: impl Into<MidiMessage>) -> bool {
        self.midi.push(message.into()).is_ok()
    }
}

/// Create an outbox together with the consumers of its two rings
pub fn outbox_pair() -> (
    Outbox,
    rtrb::Consumer<EngineFeedback>,
    rtrb::Consumer<MidiMessage>,
) {
    let (feedback, feedback_rx) = rtrb::RingBuffer::new(FEEDBACK_QUEUE_CAPACITY);
    let (midi, midi_rx) = rtrb::RingBuffer::new(MIDI_OUT_QUEUE_CAPACITY);
    let outbox = Outbox {
        feedback,
        midi,
        dropped: Arc::new(AtomicU32::new(0)),
    };
    (outbox, feedback_rx, midi_rx)
}

/// Broadcasts [`EngineEvent`]s to every subscriber
///
/// Each subscriber gets its own bounded channel. A subscriber that falls
/// behind loses events rather than stalling the publisher; dropped
/// receivers are pruned on the next publish.
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = crossbeam::channel::bounded(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub fn publish(&self, event: EngineEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("Event subscriber is full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}
