//! Plugin host seam
//!
//! The engine does not host plugins itself. A host implementation is
//! installed on the [`AudioEngine`](super::AudioEngine) and called on the
//! audio thread for every channel (and bus) with a non-empty plugin stack.

use super::midi::MidiEvent;
use crate::types::{ChannelId, StereoBuffer};

/// Identifier of a plugin instance owned by the host
pub type PluginId = u32;

/// Processes a buffer through a channel's plugin stack, in place
///
/// Called on the audio thread: implementations must not block or allocate.
pub trait PluginHost: Send {
    fn process(
        &mut self,
        channel: ChannelId,
        plugins: &[PluginId],
        buffer: &mut StereoBuffer,
        midi: &[MidiEvent],
    );
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Scales every processed buffer by `gain` and counts MIDI events seen
    pub struct GainHost {
        pub gain: f32,
        pub midi_seen: Arc<AtomicUsize>,
    }

    impl PluginHost for GainHost {
        fn process(
            &mut self,
            _channel: ChannelId,
            _plugins: &[PluginId],
            buffer: &mut StereoBuffer,
            midi: &[MidiEvent],
        ) {
            buffer.apply_gain(self.gain);
            self.midi_seen.fetch_add(midi.len(), Ordering::Relaxed);
        }
    }
}
