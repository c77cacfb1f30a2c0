//! Quantizer - aligns manual intents to musical boundaries
//!
//! Actions are armed with [`Quantizer::trigger`] and fire once, at the first
//! quantization boundary inside a block passed to [`Quantizer::advance`].
//! The receiver of each action is fixed by its variant, so firing just hands
//! back `(action, delta)` pairs for the engine to dispatch.
//!
//! All storage is pre-allocated; nothing here allocates on the audio thread.

use std::ops::Range;

use crate::types::{ChannelId, Frame};

/// Max actions armed at the same time
pub const MAX_QUANTIZED_ACTIONS: usize = 256;

/// An action that waits for the next quantization boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizedAction {
    /// Rewind the sequencer
    SequencerRewind,
    /// Start a one-shot sample channel
    ChannelPlay(ChannelId),
    /// Retrigger a sample channel from its begin point
    ChannelRewind(ChannelId),
}

/// Schedule of armed actions
pub struct Quantizer {
    pending: Vec<QuantizedAction>,
}

impl Quantizer {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_QUANTIZED_ACTIONS),
        }
    }

    /// Arm an action for the next boundary
    ///
    /// Returns false if it is already armed or the schedule is full.
    pub fn trigger(&mut self, action: QuantizedAction) -> bool {
        if self.is_triggered(action) || self.pending.len() >= MAX_QUANTIZED_ACTIONS {
            return false;
        }
        self.pending.push(action);
        true
    }

    pub fn is_triggered(&self, action: QuantizedAction) -> bool {
        self.pending.contains(&action)
    }

    /// Disarm without firing (no-op if not armed)
    pub fn clear(&mut self, action: QuantizedAction) {
        self.pending.retain(|p| *p != action);
    }

    pub fn clear_all(&mut self) {
        self.pending.clear();
    }

    /// Fire everything armed if a boundary falls inside `range`
    ///
    /// `range` is the absolute frame range of the block just processed. A
    /// boundary is any frame divisible by `step`. Fired actions are appended
    /// to `fired` with their delta from `range.start`, then disarmed.
    pub fn advance(
        &mut self,
        range: Range<Frame>,
        step: Frame,
        fired: &mut Vec<(QuantizedAction, Frame)>,
    ) {
        if self.pending.is_empty() || step <= 0 || range.is_empty() {
            return;
        }
        let boundary = first_multiple_at_or_after(range.start, step);
        if boundary >= range.end {
            return;
        }
        let delta = boundary - range.start;
        for action in self.pending.drain(..) {
            if fired.len() < fired.capacity() {
                fired.push((action, delta));
            }
        }
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn first_multiple_at_or_after(frame: Frame, step: Frame) -> Frame {
    let rem = frame.rem_euclid(step);
    if rem == 0 {
        frame
    } else {
        frame + (step - rem)
    }
}
